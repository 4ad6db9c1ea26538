//! Real-time event broadcast: a narrow publish capability plus the adapter
//! that maps engine events onto channel/event-type/payload triples. Publishing
//! is best-effort; a failure is logged and never fails a check.

pub mod events;
pub mod ws;

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

pub use events::EventBroadcaster;
pub use ws::WsBroadcaster;

/// The single channel all monitor events go out on.
pub const PUBLIC_CHANNEL: &str = "public-channel";

/// Event type names, one per event kind.
pub mod event_types {
    pub const STATUS_CHANGED: &str = "host-service-status-changed";
    pub const COUNTS_CHANGED: &str = "host-service-count-changed";
    pub const SCHEDULE_CHANGED: &str = "schedule-changed-event";
    pub const SCHEDULE_REMOVED: &str = "schedule-item-removed-event";
    pub const NEXT_RUN: &str = "next-run-event";
    pub const APP_STARTING: &str = "app-starting";
}

/// Broadcast payloads are flat string maps; BTreeMap keeps field order
/// stable on the wire.
pub type Payload = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("publish failed: {0}")]
    Transport(String),
}

/// One-way publish capability backed by any pub/sub transport.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        channel: &str,
        event_type: &str,
        payload: &Payload,
    ) -> Result<(), PublishError>;
}
