//! Monitoring engine: orchestrates one check lifecycle (load → probe →
//! evaluate → persist → notify → broadcast) and owns the table mapping
//! host-services to their scheduled jobs.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::broadcast::{EventBroadcaster, Publisher};
use crate::checks;
use crate::config::{SharedPreferences, prefs};
use crate::models::{Event, HostService};
use crate::notifications::NotificationDispatcher;
use crate::scheduler::{Job, MonitorScheduler, ScheduleHandle};
use crate::status::StatusTransition;
use crate::store::{HostServiceStore, StoreError};

pub struct MonitoringEngine {
    store: Arc<dyn HostServiceStore>,
    scheduler: MonitorScheduler,
    broadcaster: EventBroadcaster,
    dispatcher: NotificationDispatcher,
    preferences: SharedPreferences,
    /// host_service_id → scheduled job, rebuilt on start_monitoring and kept
    /// consistent by the admin add/remove paths.
    monitor_map: DashMap<i32, ScheduleHandle>,
}

/// The recurring unit of work: one scheduled check of one host-service.
struct CheckJob {
    engine: Arc<MonitoringEngine>,
    host_service_id: i32,
}

#[async_trait]
impl Job for CheckJob {
    async fn run(&self) {
        self.engine.run_check(self.host_service_id).await;
    }
}

impl MonitoringEngine {
    pub fn new(
        store: Arc<dyn HostServiceStore>,
        publisher: Arc<dyn Publisher>,
        dispatcher: NotificationDispatcher,
        preferences: SharedPreferences,
    ) -> Self {
        Self {
            store,
            scheduler: MonitorScheduler::new(),
            broadcaster: EventBroadcaster::new(publisher),
            dispatcher,
            preferences,
            monitor_map: DashMap::new(),
        }
    }

    fn monitoring_enabled(&self) -> bool {
        self.preferences
            .read()
            .ok()
            .and_then(|p| p.get(prefs::MONITORING_LIVE).cloned())
            .as_deref()
            == Some("1")
    }

    /// Runs one check for a host-service. Lookup and persistence failures
    /// abort the run; probe failures are a regular `problem` result.
    pub async fn run_check(&self, host_service_id: i32) {
        if let Err(err) = self.perform_scheduled_check(host_service_id).await {
            error!(host_service_id, error = %err, "check aborted");
        }
    }

    async fn perform_scheduled_check(&self, host_service_id: i32) -> Result<(), StoreError> {
        let hs = self.store.host_service(host_service_id).await?;
        let host = self.store.host(hs.host_id).await?;

        let outcome = checks::perform_check(hs.service, &host.url).await;
        let transition = StatusTransition::evaluate(hs.status, outcome.status);

        let now = Utc::now();
        let mut updated = hs.clone();
        updated.status = outcome.status;
        updated.last_message = outcome.message.clone();
        updated.last_check = Some(now);
        updated.updated_at = now;

        // Persist before announcing anything: a state that was not durably
        // saved must never be broadcast or notified.
        self.store.update_host_service(&updated).await?;

        if transition.changed() {
            info!(
                host = %hs.host_name,
                service = hs.service.name(),
                previous = %transition.previous,
                new = %transition.new,
                "service status changed"
            );

            let event = Event {
                event_type: outcome.status,
                host_service_id: hs.id,
                host_id: host.id,
                service_name: hs.service.name().to_string(),
                host_name: hs.host_name.clone(),
                message: outcome.message.clone(),
                created_at: now,
                updated_at: now,
            };
            if let Err(err) = self.store.insert_event(&event).await {
                error!(host_service_id, error = %err, "failed to record status event");
            }

            self.broadcaster
                .status_changed(&host, &hs, outcome.status)
                .await;

            match self.store.status_counts().await {
                Ok(counts) => self.broadcaster.counts_changed(counts).await,
                Err(err) => error!(error = %err, "failed to read status counts"),
            }

            if transition.should_notify() {
                self.dispatcher
                    .dispatch(
                        outcome.status,
                        hs.service.name(),
                        &hs.host_name,
                        &outcome.message,
                    )
                    .await;
            }
        }

        let (next_run, last_run) = match self.monitor_map.get(&hs.id) {
            Some(handle) => (
                self.scheduler.next_run_time(*handle),
                self.scheduler.last_run_time(*handle),
            ),
            None => (None, Some(now)),
        };
        self.broadcaster
            .schedule_changed(&updated, outcome.status, next_run, last_run)
            .await;

        Ok(())
    }

    /// Registers every active service on an active host with the scheduler
    /// and announces the schedule, iff monitoring is globally enabled.
    pub async fn start_monitoring(self: &Arc<Self>) {
        if !self.monitoring_enabled() {
            info!("monitoring is not enabled, nothing scheduled");
            return;
        }

        self.broadcaster.app_starting().await;

        let services = match self.store.services_to_monitor().await {
            Ok(services) => services,
            Err(err) => {
                error!(error = %err, "could not load services to monitor");
                return;
            }
        };

        for hs in services {
            info!(
                host = %hs.host_name,
                service = hs.service.name(),
                schedule = %hs.schedule_spec(),
                "scheduling monitor"
            );
            let handle = self.register(&hs);
            let next_run = self.scheduler.next_run_time(handle);
            self.broadcaster
                .next_run(&hs, hs.status, next_run, hs.last_check)
                .await;
            self.broadcaster
                .schedule_changed(&hs, hs.status, next_run, hs.last_check)
                .await;
        }
    }

    /// Cancels every scheduled job and clears the monitor table. In-flight
    /// probes finish and write their result (accepted staleness window).
    pub fn stop_monitoring(&self) {
        self.scheduler.cancel_all();
        self.monitor_map.clear();
        info!("monitoring stopped");
    }

    /// Registers a single host-service when an admin activates it at
    /// runtime.
    pub async fn add_to_monitor(self: &Arc<Self>, hs: &HostService) {
        if !self.monitoring_enabled() {
            return;
        }
        self.register(hs);
        self.broadcaster
            .schedule_changed(hs, hs.status, None, hs.last_check)
            .await;
    }

    /// Cancels the job for a host-service when an admin deactivates it.
    pub async fn remove_from_monitor(&self, host_service_id: i32) {
        if let Some((_, handle)) = self.monitor_map.remove(&host_service_id) {
            self.scheduler.cancel(handle);
        }
        self.broadcaster.schedule_removed(host_service_id).await;
    }

    pub fn monitored_count(&self) -> usize {
        self.monitor_map.len()
    }

    fn register(self: &Arc<Self>, hs: &HostService) -> ScheduleHandle {
        let job = Arc::new(CheckJob {
            engine: Arc::clone(self),
            host_service_id: hs.id,
        });
        let handle = self.scheduler.schedule(hs.check_interval(), job);
        if let Some(stale) = self.monitor_map.insert(hs.id, handle) {
            self.scheduler.cancel(stale);
        }
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{Payload, PublishError, event_types};
    use crate::config::new_shared_preferences;
    use crate::models::{Host, ScheduleUnit, ServiceKind, StatusCounts};
    use crate::notifications::senders::{EmailSender, MailMessage, SenderError};
    use crate::status::ServiceStatus;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    struct MockStore {
        host: Mutex<Host>,
        host_service: Mutex<HostService>,
        events: Mutex<Vec<Event>>,
        fail_update: AtomicBool,
    }

    impl MockStore {
        fn new(host: Host, host_service: HostService) -> Self {
            Self {
                host: Mutex::new(host),
                host_service: Mutex::new(host_service),
                events: Mutex::new(Vec::new()),
                fail_update: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl HostServiceStore for MockStore {
        async fn host(&self, id: i32) -> Result<Host, StoreError> {
            let host = self.host.lock().unwrap().clone();
            if host.id == id {
                Ok(host)
            } else {
                Err(StoreError::NotFound { entity: "host", id })
            }
        }

        async fn host_service(&self, id: i32) -> Result<HostService, StoreError> {
            let hs = self.host_service.lock().unwrap().clone();
            if hs.id == id {
                Ok(hs)
            } else {
                Err(StoreError::NotFound {
                    entity: "host service",
                    id,
                })
            }
        }

        async fn update_host_service(&self, hs: &HostService) -> Result<(), StoreError> {
            if self.fail_update.load(Ordering::SeqCst) {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            *self.host_service.lock().unwrap() = hs.clone();
            Ok(())
        }

        async fn services_to_monitor(&self) -> Result<Vec<HostService>, StoreError> {
            Ok(vec![self.host_service.lock().unwrap().clone()])
        }

        async fn status_counts(&self) -> Result<StatusCounts, StoreError> {
            let mut counts = StatusCounts::default();
            match self.host_service.lock().unwrap().status {
                ServiceStatus::Pending => counts.pending += 1,
                ServiceStatus::Healthy => counts.healthy += 1,
                ServiceStatus::Warning => counts.warning += 1,
                ServiceStatus::Problem => counts.problem += 1,
            }
            Ok(counts)
        }

        async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        sent: Mutex<Vec<(String, Payload)>>,
    }

    impl RecordingPublisher {
        fn events_of_type(&self, event_type: &str) -> Vec<Payload> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _)| t == event_type)
                .map(|(_, p)| p.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(
            &self,
            _channel: &str,
            event_type: &str,
            payload: &Payload,
        ) -> Result<(), PublishError> {
            self.sent
                .lock()
                .unwrap()
                .push((event_type.to_string(), payload.clone()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingEmail {
        sent: Mutex<Vec<MailMessage>>,
    }

    #[async_trait]
    impl EmailSender for RecordingEmail {
        async fn send(&self, message: &MailMessage) -> Result<(), SenderError> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn fixture(url: &str, status: ServiceStatus) -> (Host, HostService) {
        let now = Utc::now();
        let host = Host {
            id: 3,
            host_name: "example.com".to_string(),
            url: url.to_string(),
            active: true,
            created_at: now,
            updated_at: now,
            services: Vec::new(),
        };
        let hs = HostService {
            id: 7,
            host_id: 3,
            host_name: "example.com".to_string(),
            service: ServiceKind::Http,
            active: true,
            schedule_number: 1,
            schedule_unit: ScheduleUnit::Hours,
            status,
            last_check: None,
            last_message: String::new(),
            created_at: now,
            updated_at: now,
        };
        (host, hs)
    }

    fn preferences(live: bool, email: bool) -> SharedPreferences {
        let mut map = HashMap::new();
        map.insert(
            prefs::MONITORING_LIVE.to_string(),
            if live { "1" } else { "0" }.to_string(),
        );
        map.insert(
            prefs::NOTIFY_VIA_EMAIL.to_string(),
            if email { "1" } else { "0" }.to_string(),
        );
        map.insert(prefs::NOTIFY_NAME.to_string(), "Ops".to_string());
        map.insert(prefs::NOTIFY_EMAIL.to_string(), "ops@example.com".to_string());
        new_shared_preferences(map)
    }

    struct Harness {
        engine: Arc<MonitoringEngine>,
        store: Arc<MockStore>,
        publisher: Arc<RecordingPublisher>,
        email: Arc<RecordingEmail>,
    }

    fn harness(url: &str, status: ServiceStatus, live: bool, notify: bool) -> Harness {
        let (host, hs) = fixture(url, status);
        let store = Arc::new(MockStore::new(host, hs));
        let publisher = Arc::new(RecordingPublisher::default());
        let email = Arc::new(RecordingEmail::default());
        let preferences = preferences(live, notify);
        let dispatcher = NotificationDispatcher::new(
            Some(email.clone()),
            None,
            Arc::clone(&preferences),
        );
        let engine = Arc::new(MonitoringEngine::new(
            store.clone(),
            publisher.clone(),
            dispatcher,
            preferences,
        ));
        Harness {
            engine,
            store,
            publisher,
            email,
        }
    }

    // Serves `count` requests with the given status line, then stops.
    async fn serve(status_line: &'static str, count: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for _ in 0..count {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn first_healthy_check_persists_event_and_broadcast() {
        let url = serve("200 OK", 1).await;
        let h = harness(&url, ServiceStatus::Pending, true, false);

        h.engine.run_check(7).await;

        let hs = h.store.host_service.lock().unwrap().clone();
        assert_eq!(hs.status, ServiceStatus::Healthy);
        assert!(hs.last_check.is_some());

        let events = h.store.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, ServiceStatus::Healthy);
        assert_eq!(events[0].host_service_id, 7);
        assert_eq!(events[0].host_id, 3);

        let status_changes = h.publisher.events_of_type(event_types::STATUS_CHANGED);
        assert_eq!(status_changes.len(), 1);
        assert_eq!(status_changes[0]["status"], "healthy");

        assert_eq!(h.publisher.events_of_type(event_types::COUNTS_CHANGED).len(), 1);
    }

    #[tokio::test]
    async fn unchanged_status_updates_last_check_only() {
        let url = serve("200 OK", 1).await;
        let h = harness(&url, ServiceStatus::Healthy, true, true);

        h.engine.run_check(7).await;

        let hs = h.store.host_service.lock().unwrap().clone();
        assert_eq!(hs.status, ServiceStatus::Healthy);
        assert!(hs.last_check.is_some());

        assert!(h.store.events.lock().unwrap().is_empty());
        assert!(h.publisher.events_of_type(event_types::STATUS_CHANGED).is_empty());
        assert!(h.email.sent.lock().unwrap().is_empty());
        // The informational schedule event still goes out every run.
        assert_eq!(h.publisher.events_of_type(event_types::SCHEDULE_CHANGED).len(), 1);
    }

    #[tokio::test]
    async fn notification_fires_once_per_transition() {
        // Nothing listens on this address: probes report problem.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = format!("http://{addr}");

        let h = harness(&url, ServiceStatus::Healthy, true, true);

        h.engine.run_check(7).await;
        h.engine.run_check(7).await;

        let mails = h.email.sent.lock().unwrap();
        assert_eq!(mails.len(), 1);
        assert_eq!(mails[0].subject, "PROBLEM: service HTTP on example.com");
        assert_eq!(h.store.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pending_baseline_does_not_notify() {
        let url = serve("200 OK", 1).await;
        let h = harness(&url, ServiceStatus::Pending, true, true);

        h.engine.run_check(7).await;

        // Event and broadcast happen, notification does not.
        assert_eq!(h.store.events.lock().unwrap().len(), 1);
        assert!(h.email.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_aborts_before_announcing() {
        let url = serve("200 OK", 1).await;
        let h = harness(&url, ServiceStatus::Pending, true, true);
        h.store.fail_update.store(true, Ordering::SeqCst);

        h.engine.run_check(7).await;

        assert!(h.store.events.lock().unwrap().is_empty());
        assert!(h.publisher.sent.lock().unwrap().is_empty());
        assert!(h.email.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn lookup_failure_writes_nothing() {
        let h = harness("http://example.com", ServiceStatus::Pending, true, true);

        h.engine.run_check(999).await;

        let hs = h.store.host_service.lock().unwrap().clone();
        assert_eq!(hs.status, ServiceStatus::Pending);
        assert!(hs.last_check.is_none());
        assert!(h.publisher.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_monitoring_registers_jobs_and_announces() {
        let h = harness("http://example.com", ServiceStatus::Pending, true, false);

        h.engine.start_monitoring().await;

        assert_eq!(h.engine.monitored_count(), 1);
        assert_eq!(h.publisher.events_of_type(event_types::APP_STARTING).len(), 1);
        let next_runs = h.publisher.events_of_type(event_types::NEXT_RUN);
        assert_eq!(next_runs.len(), 1);
        assert_eq!(next_runs[0]["next_run"], "Pending...");
        assert_eq!(h.publisher.events_of_type(event_types::SCHEDULE_CHANGED).len(), 1);

        h.engine.stop_monitoring();
        assert_eq!(h.engine.monitored_count(), 0);
    }

    #[tokio::test]
    async fn start_monitoring_is_a_no_op_when_disabled() {
        let h = harness("http://example.com", ServiceStatus::Pending, false, false);

        h.engine.start_monitoring().await;

        assert_eq!(h.engine.monitored_count(), 0);
        assert!(h.publisher.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_from_monitor_cancels_and_announces() {
        let h = harness("http://example.com", ServiceStatus::Pending, true, false);
        h.engine.start_monitoring().await;
        assert_eq!(h.engine.monitored_count(), 1);

        h.engine.remove_from_monitor(7).await;

        assert_eq!(h.engine.monitored_count(), 0);
        let removed = h.publisher.events_of_type(event_types::SCHEDULE_REMOVED);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0]["host_service_id"], "7");
    }

    #[tokio::test]
    async fn scheduled_job_runs_checks_end_to_end() {
        let url = serve("200 OK", 3).await;
        let h = harness(&url, ServiceStatus::Pending, true, false);

        // One-second schedule so the scheduler itself drives the check.
        {
            let mut hs = h.store.host_service.lock().unwrap();
            hs.schedule_number = 1;
            hs.schedule_unit = ScheduleUnit::Seconds;
        }

        h.engine.start_monitoring().await;
        tokio::time::sleep(Duration::from_millis(1500)).await;
        h.engine.stop_monitoring();

        let hs = h.store.host_service.lock().unwrap().clone();
        assert_eq!(hs.status, ServiceStatus::Healthy);
        assert_eq!(h.store.events.lock().unwrap().len(), 1);
    }
}
