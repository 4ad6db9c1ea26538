//! Default publish transport: a process-local fan-out over a tokio broadcast
//! channel. WebSocket handlers (or any other consumer) attach with
//! `subscribe` and receive each event as a serialized JSON string.

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::trace;

use super::{Payload, PublishError, Publisher};

#[derive(Debug, Clone)]
pub struct WsBroadcaster {
    tx: broadcast::Sender<String>,
}

impl WsBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl Publisher for WsBroadcaster {
    async fn publish(
        &self,
        channel: &str,
        event_type: &str,
        payload: &Payload,
    ) -> Result<(), PublishError> {
        let message = serde_json::to_string(&json!({
            "channel": channel,
            "event": event_type,
            "payload": payload,
        }))?;

        // A send error only means nobody is subscribed right now; the event
        // is best-effort either way.
        if self.tx.send(message).is_err() {
            trace!(event_type, "no subscribers for broadcast event");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_serialized_events() {
        let broadcaster = WsBroadcaster::new(8);
        let mut rx = broadcaster.subscribe();

        let mut payload = Payload::new();
        payload.insert("status".to_string(), "healthy".to_string());
        broadcaster
            .publish("public-channel", "host-service-status-changed", &payload)
            .await
            .unwrap();

        let message = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&message).unwrap();
        assert_eq!(parsed["channel"], "public-channel");
        assert_eq!(parsed["event"], "host-service-status-changed");
        assert_eq!(parsed["payload"]["status"], "healthy");
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let broadcaster = WsBroadcaster::new(8);
        let payload = Payload::new();
        assert!(broadcaster.publish("public-channel", "app-starting", &payload).await.is_ok());
    }
}
