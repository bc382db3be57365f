//! Client-side view of the queue, kept in sync by polling.
//!
//! The store publishes a [`SyncState`] through a `watch` channel. Views hold
//! receivers and re-render on change; only the store's own operations write.
//! Auto-refresh runs as a detached timer task that spawns one fetch per tick,
//! so stopping the timer never cancels a fetch that is already on the wire.
//! Overlapping fetches are allowed unless the policy says otherwise, and the
//! last response to arrive wins.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Local;
use rand::Rng;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::error::ApiError;
use crate::core::queue::QueueService;
use crate::core::task::{ApiResponse, HealthStatus, QueueStats, StatsResponse};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(5000);
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_STALE_TIMEOUT_MINUTES: u32 = 60;
pub const DEFAULT_CLEANUP_DAYS: u32 = 7;

const FETCH_FAILED: &str = "Failed to fetch queue stats";
const RESET_FAILED: &str = "Failed to reset stale tasks";
const CLEANUP_FAILED: &str = "Failed to clean up old tasks";
const HEALTH_FAILED: &str = "Health check failed";

/// Published state. Readers get clones; only [`SyncStore`] mutates it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncState {
    pub stats: QueueStats,
    pub total: u64,
    pub last_update: Option<String>,
    pub loading: bool,
    pub error: Option<String>,
    pub auto_refresh: bool,
}

/// How the auto-refresh timer schedules ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub interval: Duration,
    /// Cap on the delay multiplier after consecutive failed fetches.
    /// `1` keeps a fixed interval.
    pub max_backoff_factor: u32,
    /// Skip a tick while an earlier fetch has not resolved yet.
    pub skip_when_busy: bool,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REFRESH_INTERVAL,
            max_backoff_factor: 8,
            skip_when_busy: false,
        }
    }
}

impl RefreshPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_backoff_factor: 1,
            skip_when_busy: false,
        }
    }

    /// Delay before the next tick given the current run of failed fetches.
    /// Doubles per failure up to the cap, plus up to 10% jitter while backing off.
    pub fn delay_after(&self, failures: u32) -> Duration {
        if failures == 0 || self.max_backoff_factor <= 1 {
            return self.interval;
        }
        let factor = 2u32
            .saturating_pow(failures.min(16))
            .min(self.max_backoff_factor);
        let base = self.interval * factor;
        let spread = (base.as_millis() / 10) as u64;
        let jitter = if spread == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=spread)
        };
        base + Duration::from_millis(jitter)
    }
}

pub struct SyncStore {
    service: Arc<dyn QueueService>,
    state: watch::Sender<SyncState>,
    timer: Mutex<Option<JoinHandle<()>>>,
    policy: RefreshPolicy,
    in_flight: AtomicUsize,
    failures: AtomicU32,
}

impl SyncStore {
    pub fn new(service: Arc<dyn QueueService>) -> Arc<Self> {
        Self::with_policy(service, RefreshPolicy::default())
    }

    pub fn with_policy(service: Arc<dyn QueueService>, policy: RefreshPolicy) -> Arc<Self> {
        let (state, _) = watch::channel(SyncState::default());
        Arc::new(Self {
            service,
            state,
            timer: Mutex::new(None),
            policy,
            in_flight: AtomicUsize::new(0),
            failures: AtomicU32::new(0),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SyncState {
        self.state.borrow().clone()
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    pub fn is_polling(&self) -> bool {
        self.timer_slot().is_some()
    }

    pub async fn fetch_stats(&self) -> Result<StatsResponse, ApiError> {
        let _busy = InFlight::enter(&self.in_flight);
        let _loading = self.begin_loading();

        match self.service.get_stats().await {
            Ok(resp) => {
                let stats = resp.normalized();
                let total = resp.total();
                let stamp = resp
                    .timestamp
                    .clone()
                    .unwrap_or_else(|| Local::now().to_rfc3339());
                self.state.send_modify(|s| {
                    s.stats = stats;
                    s.total = total;
                    s.last_update = Some(stamp);
                });
                self.failures.store(0, Ordering::SeqCst);
                debug!(total, "Queue stats refreshed");
                Ok(resp)
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::SeqCst);
                self.record_error(&err, FETCH_FAILED);
                Err(err)
            }
        }
    }

    /// Starts polling: one fetch right away, then one per tick. Returns
    /// `false` without doing anything when polling is already on.
    pub fn start_auto_refresh(self: &Arc<Self>, interval: Duration) -> bool {
        let mut timer = self.timer_slot();
        if timer.is_some() {
            debug!("Auto-refresh already running");
            return false;
        }

        let interval = if interval < MIN_REFRESH_INTERVAL {
            warn!(
                requested_ms = interval.as_millis() as u64,
                "Refresh interval too small, clamping"
            );
            MIN_REFRESH_INTERVAL
        } else {
            interval
        };
        let policy = RefreshPolicy {
            interval,
            ..self.policy
        };

        self.state.send_modify(|s| s.auto_refresh = true);
        *timer = Some(tokio::spawn(run_timer(Arc::downgrade(self), policy)));
        info!(interval_ms = interval.as_millis() as u64, "Auto-refresh started");
        true
    }

    /// Stops future ticks. Fetches already dispatched still complete and
    /// publish their result. Safe to call when not polling.
    pub fn stop_auto_refresh(&self) {
        let mut timer = self.timer_slot();
        self.state.send_modify(|s| s.auto_refresh = false);
        if let Some(handle) = timer.take() {
            handle.abort();
            info!("Auto-refresh stopped");
        }
    }

    pub async fn reset_stale_tasks(&self, timeout_minutes: u32) -> Result<ApiResponse, ApiError> {
        let _loading = self.begin_loading();
        let resp = match self.service.reset_stale(timeout_minutes).await {
            Ok(resp) => resp,
            Err(err) => {
                self.record_error(&err, RESET_FAILED);
                return Err(err);
            }
        };
        if let Err(err) = self.fetch_stats().await {
            self.record_error(&err, RESET_FAILED);
            return Err(err);
        }
        Ok(resp)
    }

    pub async fn cleanup_old_tasks(&self, days: u32) -> Result<ApiResponse, ApiError> {
        let _loading = self.begin_loading();
        let resp = match self.service.cleanup(days).await {
            Ok(resp) => resp,
            Err(err) => {
                self.record_error(&err, CLEANUP_FAILED);
                return Err(err);
            }
        };
        if let Err(err) = self.fetch_stats().await {
            self.record_error(&err, CLEANUP_FAILED);
            return Err(err);
        }
        Ok(resp)
    }

    pub async fn check_health(&self) -> Result<HealthStatus, ApiError> {
        match self.service.health_check().await {
            Ok(health) => Ok(health),
            Err(err) => {
                self.record_error(&err, HEALTH_FAILED);
                Err(err)
            }
        }
    }

    pub fn clear_error(&self) {
        self.state.send_modify(|s| s.error = None);
    }

    /// Stops polling and puts every published field back to its default.
    pub fn reset(&self) {
        self.stop_auto_refresh();
        self.failures.store(0, Ordering::SeqCst);
        self.state.send_modify(|s| *s = SyncState::default());
    }

    fn begin_loading(&self) -> LoadingGuard<'_> {
        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });
        LoadingGuard { state: &self.state }
    }

    fn record_error(&self, err: &ApiError, fallback: &str) {
        let message = err.user_message().unwrap_or_else(|| fallback.to_string());
        warn!(error = %message, kind = %err.kind(), "Queue sync failed");
        self.state.send_modify(|s| s.error = Some(message));
    }

    fn timer_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for SyncStore {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().ok().and_then(Option::take) {
            handle.abort();
        }
    }
}

/// Clears `loading` on every exit path, including the future being dropped.
struct LoadingGuard<'a> {
    state: &'a watch::Sender<SyncState>,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.state.send_modify(|s| s.loading = false);
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Holds only a weak reference so dropping the store ends the loop.
async fn run_timer(store: Weak<SyncStore>, policy: RefreshPolicy) {
    loop {
        let Some(store) = store.upgrade() else {
            break;
        };

        if policy.skip_when_busy && store.in_flight.load(Ordering::SeqCst) > 0 {
            debug!("Previous refresh still in flight, skipping tick");
        } else {
            let tick = Arc::clone(&store);
            tokio::spawn(async move {
                if let Err(err) = tick.fetch_stats().await {
                    debug!(error = %err, "Refresh tick failed");
                }
            });
        }

        let delay = policy.delay_after(store.failures.load(Ordering::SeqCst));
        drop(store);
        tokio::time::sleep(delay).await;
    }
}
