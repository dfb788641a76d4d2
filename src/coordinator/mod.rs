//! Coordinator layer: polls account metrics and publishes snapshots.
//!
//! One refresh cycle fetches the balance and the sent-message count
//! concurrently. The balance is the primary signal: if it cannot be fetched the
//! cycle fails and the last good snapshot stays published, marked as stale. The
//! message count is best effort and only degrades to `None`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::client::{SmsToClient, SmsToError};
use crate::domain::AccountSnapshot;

/// Cadence of the periodic refresh.
pub const UPDATE_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, thiserror::Error)]
/// A refresh cycle failed because the balance could not be fetched.
#[error("failed to fetch balance: {source}")]
pub struct UpdateFailed {
    #[source]
    pub source: SmsToError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing,
    Success,
    Failed,
}

impl RefreshPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Refreshing,
            2 => Self::Success,
            3 => Self::Failed,
            _ => Self::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Refreshing => 1,
            Self::Success => 2,
            Self::Failed => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RefreshStatus {
    /// A new snapshot was published.
    Updated(AccountSnapshot),
    /// Another refresh was already running; this request was dropped.
    Coalesced,
}

#[derive(Debug, Clone, Default, PartialEq)]
/// What observers see: the last good snapshot and whether the latest cycle succeeded.
pub struct CoordinatorState {
    pub snapshot: Option<AccountSnapshot>,
    pub last_update_success: bool,
    pub last_error: Option<String>,
}

/// Sink for refresh results. Implementations must swap in the new snapshot in
/// one assignment so readers never observe a partial update.
pub trait Publisher: Send + Sync {
    fn publish(&self, snapshot: AccountSnapshot);

    /// Mark the current data as stale; the previous snapshot must be retained.
    fn publish_failure(&self, error: &UpdateFailed);
}

#[derive(Debug)]
/// [`Publisher`] backed by a `tokio::sync::watch` channel.
pub struct WatchPublisher {
    tx: watch::Sender<CoordinatorState>,
}

impl WatchPublisher {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(CoordinatorState::default());
        Self { tx }
    }

    /// Read-only handle for sensors and other observers.
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> CoordinatorState {
        self.tx.borrow().clone()
    }
}

impl Default for WatchPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for WatchPublisher {
    fn publish(&self, snapshot: AccountSnapshot) {
        self.tx.send_replace(CoordinatorState {
            snapshot: Some(snapshot),
            last_update_success: true,
            last_error: None,
        });
    }

    fn publish_failure(&self, error: &UpdateFailed) {
        let message = error.to_string();
        self.tx.send_modify(|state| {
            state.last_update_success = false;
            state.last_error = Some(message);
        });
    }
}

/// Owns the refresh cycle for one configured account.
pub struct Coordinator {
    client: SmsToClient,
    publisher: Arc<dyn Publisher>,
    in_flight: Mutex<()>,
    phase: AtomicU8,
}

impl Coordinator {
    pub fn new(client: SmsToClient, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            client,
            publisher,
            in_flight: Mutex::new(()),
            phase: AtomicU8::new(RefreshPhase::Idle.as_u8()),
        }
    }

    pub fn phase(&self) -> RefreshPhase {
        RefreshPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: RefreshPhase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
    }

    /// Run one refresh cycle unless another one is already in flight.
    pub async fn refresh(&self) -> Result<RefreshStatus, UpdateFailed> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("refresh already in flight; coalescing");
            return Ok(RefreshStatus::Coalesced);
        };
        self.run_cycle().await.map(RefreshStatus::Updated)
    }

    /// Forced refresh used at startup; waits for any running cycle instead of coalescing.
    pub async fn first_refresh(&self) -> Result<AccountSnapshot, UpdateFailed> {
        let _guard = self.in_flight.lock().await;
        self.run_cycle().await
    }

    async fn run_cycle(&self) -> Result<AccountSnapshot, UpdateFailed> {
        self.set_phase(RefreshPhase::Refreshing);
        debug!("fetching SMS.to account data");

        let (balance, total_messages) = tokio::join!(
            self.client.get_balance(),
            self.client.get_total_messages()
        );

        let balance = match balance {
            Ok(balance) => balance,
            Err(source) => {
                error!(error = %source, "failed to fetch balance");
                let failed = UpdateFailed { source };
                self.publisher.publish_failure(&failed);
                self.set_phase(RefreshPhase::Failed);
                return Err(failed);
            }
        };

        let total_messages = match total_messages {
            Ok(total) => Some(total),
            Err(err) => {
                error!(error = %err, "failed to fetch total messages; keeping balance");
                None
            }
        };

        let snapshot = AccountSnapshot::new(balance, total_messages);
        self.publisher.publish(snapshot);
        self.set_phase(RefreshPhase::Success);
        debug!(
            balance = ?snapshot.balance,
            total_messages = ?snapshot.total_messages,
            "account data refreshed"
        );
        Ok(snapshot)
    }
}

/// Drives a [`Coordinator`] on a fixed interval.
pub struct RefreshScheduler;

impl RefreshScheduler {
    /// Spawn the polling task. The first periodic refresh happens one full
    /// `interval` after spawning; the startup refresh is the caller's job.
    pub fn spawn(coordinator: Arc<Coordinator>, interval: Duration) -> SchedulerHandle {
        let force = Arc::new(Notify::new());
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task_force = Arc::clone(&force);
        let task = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {}
                    _ = task_force.notified() => ticker.reset(),
                }
                // Failures are already logged and published by the coordinator.
                let _ = coordinator.refresh().await;
            }
            debug!("refresh scheduler stopped");
        });

        info!(interval_secs = interval.as_secs(), "refresh scheduler started");
        SchedulerHandle {
            force,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

/// Control handle for a running [`RefreshScheduler`] task.
pub struct SchedulerHandle {
    force: Arc<Notify>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Request an immediate refresh; the interval restarts afterwards.
    pub fn force_refresh(&self) {
        self.force.notify_one();
    }

    /// Stop the polling task and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
