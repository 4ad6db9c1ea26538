//! Service status enumeration and the transition decision used to debounce
//! events and notifications: side effects fire once per state change, not
//! once per tick.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Last known health of a host-service. Freshly created services are
/// `Pending` until their first check completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Pending,
    Healthy,
    Warning,
    Problem,
}

impl ServiceStatus {
    pub const ALL: [ServiceStatus; 4] = [
        ServiceStatus::Pending,
        ServiceStatus::Healthy,
        ServiceStatus::Warning,
        ServiceStatus::Problem,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceStatus::Pending => "pending",
            ServiceStatus::Healthy => "healthy",
            ServiceStatus::Warning => "warning",
            ServiceStatus::Problem => "problem",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown service status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for ServiceStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ServiceStatus::Pending),
            "healthy" => Ok(ServiceStatus::Healthy),
            "warning" => Ok(ServiceStatus::Warning),
            "problem" => Ok(ServiceStatus::Problem),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// The outcome of comparing a probe result against the previous status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub previous: ServiceStatus,
    pub new: ServiceStatus,
}

impl StatusTransition {
    pub fn evaluate(previous: ServiceStatus, new: ServiceStatus) -> Self {
        Self { previous, new }
    }

    /// A transition is qualifying iff the status actually changed. Only
    /// qualifying transitions persist an event, broadcast, or notify.
    pub fn changed(&self) -> bool {
        self.previous != self.new
    }

    /// Operators are notified for qualifying transitions only, and never
    /// while either side is still pending: the first result after a service
    /// is created establishes a baseline rather than announcing a change.
    pub fn should_notify(&self) -> bool {
        self.changed()
            && self.previous != ServiceStatus::Pending
            && self.new != ServiceStatus::Pending
    }
}
