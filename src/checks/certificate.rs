//! TLS-certificate expiry probe: resolves the bare host, completes a TLS
//! handshake with a permissive verifier (an expired certificate must still be
//! inspectable), and classifies the leaf certificate's remaining lifetime.

use chrono::{DateTime, Utc};
use rustls::ClientConfig;
use rustls::pki_types::ServerName;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpStream, lookup_host};
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use x509_parser::prelude::FromDer;
use x509_parser::certificate::X509Certificate;

use super::CheckOutcome;
use crate::status::ServiceStatus;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const TLS_PORT: u16 = 443;

/// Certificates expiring inside this window are at least a warning.
const EXPIRY_WARNING_DAYS: i64 = 30;
/// Certificates expiring inside this window are a problem.
const EXPIRY_PROBLEM_DAYS: i64 = 7;

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("invalid hostname: {0}")]
    InvalidHostname(String),
    #[error("could not resolve {0}")]
    Resolve(String),
    #[error("error connecting to {host}: {source}")]
    Connect {
        host: String,
        source: std::io::Error,
    },
    #[error("timed out connecting to {0}")]
    Timeout(String),
    #[error("tls handshake with {host} failed: {source}")]
    Handshake {
        host: String,
        source: std::io::Error,
    },
    #[error("{0} presented no certificate")]
    NoCertificate(String),
    #[error("could not parse certificate from {0}")]
    Parse(String),
}

/// Expiry metadata pulled from a host's leaf certificate.
#[derive(Debug, Clone)]
pub struct CertificateDetails {
    pub hostname: String,
    pub not_after: DateTime<Utc>,
    pub days_until_expiry: i64,
    pub expired: bool,
}

/// Probes the certificate on `url`. Any resolution, connection, or parse
/// failure maps to `Problem` with the error text as the message.
pub async fn check_certificate(url: &str) -> CheckOutcome {
    let host = bare_host(url);
    match fetch_certificate_details(&host).await {
        Ok(details) => classify_expiry(&details),
        Err(err) => CheckOutcome {
            message: err.to_string(),
            status: ServiceStatus::Problem,
        },
    }
}

/// Classifies a certificate by days until expiry: expired or inside the
/// 7-day window is a problem, inside the 30-day window a warning, anything
/// further out healthy.
pub(crate) fn classify_expiry(details: &CertificateDetails) -> CheckOutcome {
    if details.expired {
        return CheckOutcome {
            message: format!("{} has expired!", details.hostname),
            status: ServiceStatus::Problem,
        };
    }

    let message = format!(
        "{} expiring in {} days",
        details.hostname, details.days_until_expiry
    );
    let status = if details.days_until_expiry < EXPIRY_PROBLEM_DAYS {
        ServiceStatus::Problem
    } else if details.days_until_expiry < EXPIRY_WARNING_DAYS {
        ServiceStatus::Warning
    } else {
        ServiceStatus::Healthy
    };

    CheckOutcome { message, status }
}

async fn fetch_certificate_details(host: &str) -> Result<CertificateDetails, CertificateError> {
    let addr = timeout(CONNECT_TIMEOUT, lookup_host((host, TLS_PORT)))
        .await
        .map_err(|_| CertificateError::Timeout(host.to_string()))?
        .map_err(|_| CertificateError::Resolve(host.to_string()))?
        .next()
        .ok_or_else(|| CertificateError::Resolve(host.to_string()))?;

    let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| CertificateError::Timeout(host.to_string()))?
        .map_err(|source| CertificateError::Connect {
            host: host.to_string(),
            source,
        })?;

    // Expiry inspection must see the certificate even when normal validation
    // would reject it, so the handshake skips verification entirely.
    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| CertificateError::InvalidHostname(host.to_string()))?;

    let tls_stream = timeout(CONNECT_TIMEOUT, connector.connect(server_name, stream))
        .await
        .map_err(|_| CertificateError::Timeout(host.to_string()))?
        .map_err(|source| CertificateError::Handshake {
            host: host.to_string(),
            source,
        })?;

    let (_, connection) = tls_stream.get_ref();
    let leaf = connection
        .peer_certificates()
        .and_then(|certs| certs.first())
        .ok_or_else(|| CertificateError::NoCertificate(host.to_string()))?;

    let (_, cert) = X509Certificate::from_der(leaf.as_ref())
        .map_err(|_| CertificateError::Parse(host.to_string()))?;

    let not_after = DateTime::<Utc>::from_timestamp(cert.validity().not_after.timestamp(), 0)
        .ok_or_else(|| CertificateError::Parse(host.to_string()))?;

    let now = Utc::now();
    Ok(CertificateDetails {
        hostname: host.to_string(),
        not_after,
        days_until_expiry: (not_after - now).num_days(),
        expired: now > not_after,
    })
}

/// Strips the scheme, any path, and a port from the stored URL, leaving the
/// bare hostname the TLS probe dials.
fn bare_host(url: &str) -> String {
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let without_path = without_scheme
        .split_once('/')
        .map(|(host, _)| host)
        .unwrap_or(without_scheme);
    let without_port = without_path
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(without_path);
    without_port.to_string()
}

/// Verifier that accepts every certificate; the probe reports on expiry, it
/// does not gate connections.
#[derive(Debug)]
struct AcceptAnyCertificate;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
