//! Recurring-job scheduler: one ticker task per registered job, each due tick
//! dispatched onto its own task. Two policies are load-bearing here: a tick
//! that arrives while the previous run is still going is dropped (overlap
//! protection), and a panicking job is contained and logged without touching
//! the ticker or any other job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// A unit of recurring work.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    async fn run(&self);
}

/// Opaque token identifying a scheduled job; kept by the caller for later
/// cancellation and next-run queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleHandle(u64);

#[derive(Debug, Clone, Copy, Default)]
struct RunTimes {
    /// None until the job has ticked at least once ("Pending..." semantics).
    next_run: Option<DateTime<Utc>>,
    last_run: Option<DateTime<Utc>>,
}

struct Entry {
    ticker: JoinHandle<()>,
    times: Arc<RwLock<RunTimes>>,
}

/// In-memory table of recurring jobs. Cheap to share; all state lives behind
/// a concurrent map keyed by handle.
pub struct MonitorScheduler {
    entries: DashMap<ScheduleHandle, Entry>,
    next_id: AtomicU64,
}

impl Default for MonitorScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorScheduler {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers `job` to run every `every`, first run one period from now.
    pub fn schedule(&self, every: Duration, job: Arc<dyn Job>) -> ScheduleHandle {
        let handle = ScheduleHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let times = Arc::new(RwLock::new(RunTimes::default()));
        let guard = Arc::new(Mutex::new(()));

        let ticker_times = Arc::clone(&times);
        let ticker = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + every;
            let mut interval = tokio::time::interval_at(start, every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                let now = Utc::now();
                if let Ok(mut t) = ticker_times.write() {
                    t.last_run = Some(now);
                    t.next_run = Some(now + every);
                }

                // Previous run still in flight: drop this tick, never queue it.
                let Ok(run_guard) = Arc::clone(&guard).try_lock_owned() else {
                    warn!("previous run still in progress, skipping tick");
                    continue;
                };

                let job = Arc::clone(&job);
                tokio::spawn(async move {
                    let _held = run_guard;
                    if AssertUnwindSafe(job.run()).catch_unwind().await.is_err() {
                        error!("scheduled job panicked");
                    }
                });
            }
        });

        self.entries.insert(handle, Entry { ticker, times });
        handle
    }

    /// Cancels future ticks for `handle`. An in-flight run is allowed to
    /// complete and write its result. Returns false for unknown handles.
    pub fn cancel(&self, handle: ScheduleHandle) -> bool {
        match self.entries.remove(&handle) {
            Some((_, entry)) => {
                entry.ticker.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels every registered job.
    pub fn cancel_all(&self) {
        self.entries.retain(|_, entry| {
            entry.ticker.abort();
            false
        });
    }

    /// When the job will next fire, or None until it has ticked once.
    pub fn next_run_time(&self, handle: ScheduleHandle) -> Option<DateTime<Utc>> {
        let entry = self.entries.get(&handle)?;
        entry.times.read().ok()?.next_run
    }

    /// When the job last fired, or None if it never has.
    pub fn last_run_time(&self, handle: ScheduleHandle) -> Option<DateTime<Utc>> {
        let entry = self.entries.get(&handle)?;
        entry.times.read().ok()?.last_run
    }

    pub fn job_count(&self) -> usize {
        self.entries.len()
    }
}

impl Drop for MonitorScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Test job that tracks how many instances of itself run concurrently.
    struct SlowJob {
        runs: Arc<AtomicUsize>,
        concurrent: Arc<AtomicUsize>,
        max_concurrent: Arc<AtomicUsize>,
        duration: Duration,
    }

    #[async_trait]
    impl Job for SlowJob {
        async fn run(&self) {
            let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.duration).await;
            self.concurrent.fetch_sub(1, Ordering::SeqCst);
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CountingJob {
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Job for CountingJob {
        async fn run(&self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct PanickingJob;

    #[async_trait]
    impl Job for PanickingJob {
        async fn run(&self) {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn overlap_guard_prevents_concurrent_runs() {
        let scheduler = MonitorScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));

        // Runs take four times the tick interval, so every other tick fires
        // while the previous run is still in flight.
        scheduler.schedule(
            Duration::from_millis(25),
            Arc::new(SlowJob {
                runs: Arc::clone(&runs),
                concurrent: Arc::clone(&concurrent),
                max_concurrent: Arc::clone(&max_concurrent),
                duration: Duration::from_millis(100),
            }),
        );

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(runs.load(Ordering::SeqCst) >= 2);
        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_stops_future_ticks() {
        let scheduler = MonitorScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let handle = scheduler.schedule(
            Duration::from_millis(20),
            Arc::new(CountingJob {
                runs: Arc::clone(&runs),
            }),
        );

        tokio::time::sleep(Duration::from_millis(90)).await;
        assert!(scheduler.cancel(handle));
        // Let any in-flight run finish before taking the baseline.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let at_cancel = runs.load(Ordering::SeqCst);
        assert!(at_cancel >= 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(runs.load(Ordering::SeqCst), at_cancel);
        assert!(!scheduler.cancel(handle));
    }

    #[tokio::test]
    async fn panicking_job_does_not_disturb_siblings() {
        let scheduler = MonitorScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let panicking = scheduler.schedule(Duration::from_millis(20), Arc::new(PanickingJob));
        scheduler.schedule(
            Duration::from_millis(20),
            Arc::new(CountingJob {
                runs: Arc::clone(&runs),
            }),
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(runs.load(Ordering::SeqCst) >= 2);
        // The panicking job's ticker survives its own panics too.
        assert!(scheduler.next_run_time(panicking).is_some());
    }

    #[tokio::test]
    async fn next_run_is_pending_until_first_tick() {
        let scheduler = MonitorScheduler::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let handle = scheduler.schedule(
            Duration::from_secs(3600),
            Arc::new(CountingJob {
                runs: Arc::clone(&runs),
            }),
        );

        assert_eq!(scheduler.next_run_time(handle), None);
        assert_eq!(scheduler.last_run_time(handle), None);
    }

    #[tokio::test]
    async fn cancel_all_empties_the_table() {
        let scheduler = MonitorScheduler::new();
        for _ in 0..3 {
            scheduler.schedule(
                Duration::from_secs(60),
                Arc::new(CountingJob {
                    runs: Arc::new(AtomicUsize::new(0)),
                }),
            );
        }
        assert_eq!(scheduler.job_count(), 3);
        scheduler.cancel_all();
        assert_eq!(scheduler.job_count(), 0);
    }
}
