//! Stateless adapter translating engine events into publish calls. Each event
//! kind has one fixed payload shape; failures are logged and swallowed so a
//! dead transport can never fail a check.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::error;

use super::{PUBLIC_CHANNEL, Payload, Publisher, event_types};
use crate::models::{Host, HostService, StatusCounts};
use crate::status::ServiceStatus;

const TIME_FORMAT: &str = "%m-%d-%Y, %-I:%M:%S %p";
const PENDING_RUN: &str = "Pending...";

#[derive(Clone)]
pub struct EventBroadcaster {
    publisher: Arc<dyn Publisher>,
}

impl EventBroadcaster {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self { publisher }
    }

    async fn send(&self, event_type: &str, payload: Payload) {
        if let Err(err) = self
            .publisher
            .publish(PUBLIC_CHANNEL, event_type, &payload)
            .await
        {
            error!(event_type, error = %err, "failed to broadcast event");
        }
    }

    pub async fn app_starting(&self) {
        let mut payload = Payload::new();
        payload.insert("message".into(), "Monitoring is starting...".into());
        self.send(event_types::APP_STARTING, payload).await;
    }

    pub async fn status_changed(
        &self,
        host: &Host,
        hs: &HostService,
        new_status: ServiceStatus,
    ) {
        let mut payload = Payload::new();
        payload.insert("host_id".into(), hs.host_id.to_string());
        payload.insert("host_service_id".into(), hs.id.to_string());
        payload.insert("host_name".into(), host.host_name.clone());
        payload.insert("service_name".into(), hs.service.name().into());
        payload.insert("icon".into(), hs.service.icon().into());
        payload.insert("status".into(), new_status.to_string());
        payload.insert(
            "message".into(),
            format!("{} on {} reports {}", hs.service.name(), host.host_name, new_status),
        );
        payload.insert("last_check".into(), format_run(Some(Utc::now())));
        self.send(event_types::STATUS_CHANGED, payload).await;
    }

    pub async fn counts_changed(&self, counts: StatusCounts) {
        let mut payload = Payload::new();
        payload.insert("healthy_count".into(), counts.healthy.to_string());
        payload.insert("pending_count".into(), counts.pending.to_string());
        payload.insert("problem_count".into(), counts.problem.to_string());
        payload.insert("warning_count".into(), counts.warning.to_string());
        self.send(event_types::COUNTS_CHANGED, payload).await;
    }

    pub async fn schedule_changed(
        &self,
        hs: &HostService,
        status: ServiceStatus,
        next_run: Option<DateTime<Utc>>,
        last_run: Option<DateTime<Utc>>,
    ) {
        self.send(
            event_types::SCHEDULE_CHANGED,
            schedule_payload(hs, status, next_run, last_run),
        )
        .await;
    }

    /// Bootstrap-only companion to `schedule_changed`, emitted once per job
    /// when monitoring starts.
    pub async fn next_run(
        &self,
        hs: &HostService,
        status: ServiceStatus,
        next_run: Option<DateTime<Utc>>,
        last_run: Option<DateTime<Utc>>,
    ) {
        self.send(
            event_types::NEXT_RUN,
            schedule_payload(hs, status, next_run, last_run),
        )
        .await;
    }

    pub async fn schedule_removed(&self, host_service_id: i32) {
        let mut payload = Payload::new();
        payload.insert("host_service_id".into(), host_service_id.to_string());
        self.send(event_types::SCHEDULE_REMOVED, payload).await;
    }
}

fn schedule_payload(
    hs: &HostService,
    status: ServiceStatus,
    next_run: Option<DateTime<Utc>>,
    last_run: Option<DateTime<Utc>>,
) -> Payload {
    let mut payload = Payload::new();
    payload.insert("host_service_id".into(), hs.id.to_string());
    payload.insert("service_id".into(), hs.service.id().to_string());
    payload.insert("host_id".into(), hs.host_id.to_string());
    payload.insert("next_run".into(), format_run(next_run));
    payload.insert("last_run".into(), format_run(last_run));
    payload.insert("host".into(), hs.host_name.clone());
    payload.insert("service".into(), hs.service.name().into());
    payload.insert("schedule".into(), hs.schedule_spec());
    payload.insert("status".into(), status.to_string());
    payload.insert("icon".into(), hs.service.icon().into());
    payload
}

fn format_run(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(at) => at.format(TIME_FORMAT).to_string(),
        None => PENDING_RUN.to_string(),
    }
}
