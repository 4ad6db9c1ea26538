//! Checker strategies: pure probe functions polymorphic over the service
//! kind. A checker takes a URL and produces a message plus a status; it never
//! touches persistence, notification, or broadcast.

pub mod certificate;
pub mod http;

use crate::models::ServiceKind;
use crate::status::ServiceStatus;

/// Result of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub status: ServiceStatus,
    pub message: String,
}

/// Dispatches to the checker selected by the service kind.
pub async fn perform_check(kind: ServiceKind, url: &str) -> CheckOutcome {
    match kind {
        ServiceKind::Http => http::check_http(url).await,
        ServiceKind::Https => http::check_https(url).await,
        ServiceKind::SslCertificate => certificate::check_certificate(url).await,
    }
}
