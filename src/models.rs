//! Core data model: hosts, the services monitored on them, and the audit
//! events written when a service changes status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::status::ServiceStatus;

/// A monitored network endpoint (domain or IP).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: i32,
    pub host_name: String,
    pub url: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Services owned by this host, loaded with the host (not live-synced).
    pub services: Vec<HostService>,
}

/// The kind of probe a host-service runs. The numeric ids match the rows of
/// the original services table and are what the store persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceKind {
    Http,
    Https,
    SslCertificate,
}

impl ServiceKind {
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            1 => Some(ServiceKind::Http),
            2 => Some(ServiceKind::Https),
            3 => Some(ServiceKind::SslCertificate),
            _ => None,
        }
    }

    pub fn id(self) -> i32 {
        match self {
            ServiceKind::Http => 1,
            ServiceKind::Https => 2,
            ServiceKind::SslCertificate => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ServiceKind::Http => "HTTP",
            ServiceKind::Https => "HTTPS",
            ServiceKind::SslCertificate => "SSL Certificate",
        }
    }

    /// Icon class shown next to the service in broadcast payloads.
    pub fn icon(self) -> &'static str {
        match self {
            ServiceKind::Http => "fas fa-server",
            ServiceKind::Https => "fas fa-shield-alt",
            ServiceKind::SslCertificate => "fas fa-lock",
        }
    }
}

/// Unit of a host-service check schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl ScheduleUnit {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "s" => Some(ScheduleUnit::Seconds),
            "m" => Some(ScheduleUnit::Minutes),
            "h" => Some(ScheduleUnit::Hours),
            "d" => Some(ScheduleUnit::Days),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleUnit::Seconds => "s",
            ScheduleUnit::Minutes => "m",
            ScheduleUnit::Hours => "h",
            ScheduleUnit::Days => "d",
        }
    }

    fn seconds(self) -> u64 {
        match self {
            ScheduleUnit::Seconds => 1,
            ScheduleUnit::Minutes => 60,
            ScheduleUnit::Hours => 3_600,
            ScheduleUnit::Days => 86_400,
        }
    }
}

/// One monitored capability of a host, with its own schedule and status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostService {
    pub id: i32,
    pub host_id: i32,
    /// Denormalized from the parent host for display and notifications.
    pub host_name: String,
    pub service: ServiceKind,
    pub active: bool,
    pub schedule_number: i32,
    pub schedule_unit: ScheduleUnit,
    pub status: ServiceStatus,
    /// None until the service has been checked at least once.
    pub last_check: Option<DateTime<Utc>>,
    pub last_message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HostService {
    /// Check cadence as a duration. Days are normalized to hours before
    /// scheduling, so this is the single source of truth for the interval.
    pub fn check_interval(&self) -> Duration {
        let n = self.schedule_number.max(1) as u64;
        Duration::from_secs(n * self.schedule_unit.seconds())
    }

    /// Schedule in `@every <N><unit>` form, with days pre-multiplied into
    /// hours (`2d` becomes `@every 48h`).
    pub fn schedule_spec(&self) -> String {
        let n = self.schedule_number.max(1);
        match self.schedule_unit {
            ScheduleUnit::Days => format!("@every {}h", n * 24),
            unit => format!("@every {}{}", n, unit.as_str()),
        }
    }
}

/// Append-only audit record of a status transition. Written once per observed
/// transition, never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: ServiceStatus,
    pub host_service_id: i32,
    pub host_id: i32,
    pub service_name: String,
    pub host_name: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate per-status service counts for the dashboard broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub healthy: i64,
    pub warning: i64,
    pub problem: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn host_service(number: i32, unit: ScheduleUnit) -> HostService {
        HostService {
            id: 1,
            host_id: 1,
            host_name: "example.com".to_string(),
            service: ServiceKind::Http,
            active: true,
            schedule_number: number,
            schedule_unit: unit,
            status: ServiceStatus::Pending,
            last_check: None,
            last_message: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn days_normalize_to_hours_in_schedule_spec() {
        let hs = host_service(2, ScheduleUnit::Days);
        assert_eq!(hs.schedule_spec(), "@every 48h");
    }

    #[test]
    fn schedule_spec_keeps_other_units() {
        assert_eq!(host_service(30, ScheduleUnit::Seconds).schedule_spec(), "@every 30s");
        assert_eq!(host_service(5, ScheduleUnit::Minutes).schedule_spec(), "@every 5m");
        assert_eq!(host_service(3, ScheduleUnit::Hours).schedule_spec(), "@every 3h");
    }

    #[test]
    fn check_interval_matches_unit() {
        assert_eq!(
            host_service(2, ScheduleUnit::Days).check_interval(),
            Duration::from_secs(48 * 3_600)
        );
        assert_eq!(
            host_service(10, ScheduleUnit::Minutes).check_interval(),
            Duration::from_secs(600)
        );
    }

    #[test]
    fn service_kind_round_trips_ids() {
        for kind in [ServiceKind::Http, ServiceKind::Https, ServiceKind::SslCertificate] {
            assert_eq!(ServiceKind::from_id(kind.id()), Some(kind));
        }
        assert_eq!(ServiceKind::from_id(9), None);
    }
}
