//! HTTP and HTTPS probes: normalize the URL onto the wanted scheme, issue a
//! GET with a bounded timeout, and map the response onto a status.

use once_cell::sync::Lazy;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

use super::CheckOutcome;
use crate::status::ServiceStatus;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

// One shared client for all probes; reqwest clients pool connections.
static PROBE_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .unwrap() // Should not fail with default settings

});

/// Probes a URL over plain HTTP. Healthy iff the response is 200.
pub async fn check_http(url: &str) -> CheckOutcome {
    probe(normalize_url(url, "http")).await
}

/// Probes a URL over HTTPS. Healthy iff the response is 200.
pub async fn check_https(url: &str) -> CheckOutcome {
    probe(normalize_url(url, "https")).await
}

async fn probe(url: String) -> CheckOutcome {
    match PROBE_CLIENT.get(&url).send().await {
        Ok(response) if response.status() == StatusCode::OK => CheckOutcome {
            message: format!("{} - {}", url, status_line(response.status())),
            status: ServiceStatus::Healthy,
        },
        Ok(response) => CheckOutcome {
            message: format!("{} - {}", url, status_line(response.status())),
            status: ServiceStatus::Problem,
        },
        Err(err) => {
            debug!(url = %url, error = %err, "probe failed to connect");
            CheckOutcome {
                message: format!("{url} - error connecting"),
                status: ServiceStatus::Problem,
            }
        }
    }
}

fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

/// Strips a trailing slash and forces the given scheme onto the URL, so a
/// stored `https://example.com/` probes `http://example.com` for an HTTP
/// check and vice versa.
pub(crate) fn normalize_url(url: &str, scheme: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let bare = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    format!("{scheme}://{bare}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    // Minimal one-shot HTTP endpoint for probe tests.
    async fn serve_once(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!("HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    #[test]
    fn normalization_forces_scheme_and_strips_slash() {
        assert_eq!(normalize_url("https://x.com/", "http"), "http://x.com");
        assert_eq!(normalize_url("http://x.com", "https"), "https://x.com");
        assert_eq!(normalize_url("x.com/", "http"), "http://x.com");
    }

    #[tokio::test]
    async fn http_200_is_healthy() {
        let url = serve_once("200 OK").await;
        let outcome = check_http(&url).await;
        assert_eq!(outcome.status, ServiceStatus::Healthy);
        assert!(outcome.message.contains("200 OK"), "{}", outcome.message);
    }

    #[tokio::test]
    async fn http_500_is_problem() {
        let url = serve_once("500 Internal Server Error").await;
        let outcome = check_http(&url).await;
        assert_eq!(outcome.status, ServiceStatus::Problem);
        assert!(outcome.message.contains("500"), "{}", outcome.message);
    }

    #[tokio::test]
    async fn connection_refused_is_problem() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let outcome = check_http(&format!("http://{addr}")).await;
        assert_eq!(outcome.status, ServiceStatus::Problem);
        assert!(outcome.message.ends_with("error connecting"), "{}", outcome.message);
    }
}
