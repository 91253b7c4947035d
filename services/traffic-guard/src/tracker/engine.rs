use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::alert::{AlertDispatcher, AlertEvent};
use crate::config::TrafficGuardConfig;
use crate::persistence::{PersistedRecord, PersistenceError, StateFile};
use crate::store::{
    AddOutcome, SharedStore, ROLLOVER_LOCK_KEY, TRAFFIC_BYTES_KEY, TRAFFIC_MONTH_KEY,
};

use super::clock::{month_label, Clock, SystemClock};
use super::election::{elect_timer_owner, release_timer_owner, Election};
use super::error::TimerError;
use super::status::TrafficSnapshot;
use super::{LimitDecision, StateOrigin, TrafficPhase};

const ROLLOVER_LOCK_TTL: Duration = Duration::from_secs(30);

/// Per-worker handle onto the host-wide traffic counter.
///
/// Every worker builds its own engine over the same [`SharedStore`]; clones
/// are cheap and share everything.
#[derive(Clone)]
pub struct TrafficEngine {
    worker_id: usize,
    store: Arc<dyn SharedStore>,
    state_file: Arc<StateFile>,
    alerts: AlertDispatcher,
    clock: Arc<dyn Clock>,
    ceiling: u64,
    save_interval: Duration,
}

impl TrafficEngine {
    pub fn new(
        worker_id: usize,
        store: Arc<dyn SharedStore>,
        state_file: Arc<StateFile>,
        alerts: AlertDispatcher,
        config: &TrafficGuardConfig,
    ) -> Self {
        Self {
            worker_id,
            store,
            state_file,
            alerts,
            clock: Arc::new(SystemClock),
            ceiling: config.limit_bytes,
            save_interval: config.save_interval(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// Seeds the shared state if needed and runs the save timer election.
    /// Returns the timer when this worker won it; dropping the timer stops it.
    pub fn start(&self) -> Option<SaveTimer> {
        let origin = self.initialize_state();
        info!(
            worker_id = self.worker_id,
            origin = ?origin,
            bytes_used = self.get_usage(),
            month = ?self.stored_month(),
            "traffic state ready"
        );

        match elect_timer_owner(self.store.as_ref(), self.worker_id) {
            Election::Follower => None,
            Election::Owner => match self.start_save_timer() {
                Ok(timer) => Some(timer),
                Err(err) => {
                    error!(worker_id = self.worker_id, error = %err, "failed to start save timer");
                    release_timer_owner(self.store.as_ref(), self.worker_id);
                    None
                }
            },
        }
    }

    /// Shared store first (warm worker restart), then the state file (cold
    /// restart), then zero usage in the current month.
    pub fn initialize_state(&self) -> StateOrigin {
        if self.stored_month().is_some() {
            return StateOrigin::SharedStore;
        }

        let (origin, record) = match self.state_file.load() {
            Some(record) => (StateOrigin::Persisted, record),
            None => (
                StateOrigin::Fresh,
                PersistedRecord::new(0, self.clock.current_month()),
            ),
        };

        if let Err(err) = self
            .store
            .add_if_absent(TRAFFIC_BYTES_KEY, record.bytes_used, None)
        {
            warn!(error = %err, "failed to seed traffic counter");
        }

        match self
            .store
            .add_if_absent(TRAFFIC_MONTH_KEY, u64::from(record.reset_month), None)
        {
            Ok(AddOutcome::Added) => origin,
            Ok(AddOutcome::AlreadyExists) => StateOrigin::SharedStore,
            Err(err) => {
                warn!(error = %err, "failed to seed reset month");
                origin
            }
        }
    }

    pub fn get_usage(&self) -> u64 {
        match self.store.get(TRAFFIC_BYTES_KEY) {
            Ok(used) => used.unwrap_or(0),
            Err(err) => {
                warn!(error = %err, "traffic counter unavailable, assuming zero");
                0
            }
        }
    }

    pub fn add_usage(&self, bytes: u64) {
        if bytes == 0 {
            return;
        }

        match self.store.incr(TRAFFIC_BYTES_KEY, bytes) {
            Ok(total) => {
                if total >= self.ceiling && total.saturating_sub(bytes) < self.ceiling {
                    info!(
                        worker_id = self.worker_id,
                        bytes_used = total,
                        ceiling = self.ceiling,
                        "traffic ceiling crossed"
                    );
                }
            }
            Err(err) => warn!(bytes, error = %err, "failed to record traffic"),
        }
    }

    pub fn stored_month(&self) -> Option<u32> {
        match self.store.get(TRAFFIC_MONTH_KEY) {
            Ok(month) => month
                .and_then(|month| u32::try_from(month).ok())
                .filter(|month| (1..=12).contains(month)),
            Err(err) => {
                warn!(error = %err, "reset month unavailable");
                None
            }
        }
    }

    /// Resets the counter when the calendar month moved on. Only the caller
    /// holding the rollover lock performs the reset and the forced save.
    pub fn reset_if_new_month(&self) -> bool {
        let current = u64::from(self.clock.current_month());
        let stored = match self.store.get(TRAFFIC_MONTH_KEY) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(error = %err, "reset month unavailable, skipping rollover check");
                return false;
            }
        };

        if stored == Some(current) {
            return false;
        }

        match self
            .store
            .add_if_absent(ROLLOVER_LOCK_KEY, current, Some(ROLLOVER_LOCK_TTL))
        {
            Ok(AddOutcome::Added) => {}
            Ok(AddOutcome::AlreadyExists) => return false,
            Err(err) => {
                warn!(error = %err, "failed to claim month rollover");
                return false;
            }
        }

        let rolled = self.roll_over(stored, current);
        if let Err(err) = self.store.delete(ROLLOVER_LOCK_KEY) {
            warn!(error = %err, "failed to release rollover lock");
        }

        if rolled {
            info!(
                worker_id = self.worker_id,
                previous_month = ?stored,
                month = current,
                "new month started, traffic counter reset"
            );
            self.save_after_rollover();
        }
        rolled
    }

    /// Drains the previous month's bytes, then publishes the new month.
    /// Increments that land in between are kept, and a reader that sees the
    /// new month never sees the old month's usage.
    fn roll_over(&self, stored: Option<u64>, current: u64) -> bool {
        match self.store.get(TRAFFIC_MONTH_KEY) {
            Ok(month) if month == stored => {}
            Ok(_) => return false,
            Err(err) => {
                warn!(error = %err, "reset month unavailable, abandoning rollover");
                return false;
            }
        }

        let drained = match self.store.get(TRAFFIC_BYTES_KEY) {
            Ok(used) => used.unwrap_or(0),
            Err(err) => {
                warn!(error = %err, "traffic counter unavailable, abandoning rollover");
                return false;
            }
        };
        if let Err(err) = self.store.decr(TRAFFIC_BYTES_KEY, drained) {
            warn!(error = %err, "failed to reset traffic counter");
            return false;
        }

        match self.store.compare_and_swap(TRAFFIC_MONTH_KEY, stored, current) {
            Ok(true) => true,
            Ok(false) => {
                warn!(month = current, "reset month changed during rollover");
                false
            }
            Err(err) => {
                error!(error = %err, "failed to publish new reset month");
                false
            }
        }
    }

    fn save_after_rollover(&self) {
        match Handle::try_current() {
            Ok(runtime) => {
                let engine = self.clone();
                runtime.spawn_blocking(move || engine.persist_rollover());
            }
            Err(_) => self.persist_rollover(),
        }
    }

    fn persist_rollover(&self) {
        if let Err(err) = self.save_now() {
            error!(error = %err, "failed to save traffic state after month reset");
        }
    }

    /// Gate run before a response is produced.
    pub fn check_limit(&self) -> LimitDecision {
        // The month is read before the counter so an alert is only claimed
        // for the month whose usage was observed.
        let epoch = self
            .stored_month()
            .unwrap_or_else(|| self.clock.current_month());
        let used = self.get_usage();
        if used < self.ceiling {
            return LimitDecision::Allow;
        }

        let now = self.clock.now();
        self.alerts.maybe_alert(
            epoch,
            AlertEvent {
                bytes_used: used,
                ceiling: self.ceiling,
                month: month_label(now),
                triggered_at: now,
            },
        );

        LimitDecision::Deny {
            used,
            ceiling: self.ceiling,
        }
    }

    pub fn phase(&self) -> TrafficPhase {
        if self.get_usage() >= self.ceiling {
            TrafficPhase::OverLimit
        } else {
            TrafficPhase::Accumulating
        }
    }

    pub fn is_alerted(&self) -> bool {
        self.alerts.is_alerted()
    }

    pub fn snapshot(&self) -> TrafficSnapshot {
        let now = self.clock.now();
        TrafficSnapshot {
            timestamp: now.timestamp(),
            bytes_used: self.get_usage(),
            ceiling: self.ceiling,
            current_month: month_label(now),
        }
    }

    pub fn save_now(&self) -> Result<(), PersistenceError> {
        let month = self
            .stored_month()
            .unwrap_or_else(|| self.clock.current_month());
        self.state_file
            .save(&PersistedRecord::new(self.get_usage(), month))
    }

    pub fn start_save_timer(&self) -> Result<SaveTimer, TimerError> {
        let runtime = Handle::try_current().map_err(|_| TimerError::NoRuntime)?;
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let engine = self.clone();

        let handle = runtime.spawn(async move {
            let mut ticker = interval(engine.save_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => match engine.save_now() {
                        Ok(()) => debug!(worker_id = engine.worker_id, "persisted traffic state"),
                        Err(err) => error!(error = %err, "failed to persist traffic state"),
                    },
                    _ = shutdown_rx.changed() => {
                        debug!(worker_id = engine.worker_id, "save timer stopped");
                        break;
                    }
                }
            }
        });

        info!(
            worker_id = self.worker_id,
            interval_secs = self.save_interval.as_secs(),
            path = %self.state_file.path().display(),
            "save timer started"
        );
        Ok(SaveTimer {
            shutdown: shutdown_tx,
            handle,
        })
    }
}

/// Periodic save task owned by the elected worker.
pub struct SaveTimer {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SaveTimer {
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stops the timer without a final save.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.handle.await {
            warn!(error = %err, "save timer ended abnormally");
        }
    }
}
