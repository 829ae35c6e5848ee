//! Periodic background sync with failure backoff.
//!
//! The loop waits for the next delay (or a [`AutoSync::trigger_now`] call when
//! the application regains focus), runs [`SyncCoordinator::sync`], and
//! publishes [`SyncEvent`]s. Failures are never surfaced beyond a `Failed`
//! event; they only stretch the schedule.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{RemoteChange, SyncCoordinator};
use crate::config::Config;
use crate::document::DocumentId;
use crate::vcs::VersionControl;

/// Consecutive failures after which the delay doubles
pub const BACKOFF_THRESHOLD: u32 = 3;

const EVENT_CAPACITY: usize = 32;

/// Scheduling state for auto-sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub consecutive_failures: u32,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl Backoff {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            consecutive_failures: 0,
            last_synced_at: None,
        }
    }

    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.consecutive_failures = 0;
        self.last_synced_at = Some(now);
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    /// Base interval, doubled once [`BACKOFF_THRESHOLD`] failures have accrued
    pub fn next_delay(&self) -> Duration {
        if self.consecutive_failures >= BACKOFF_THRESHOLD {
            self.base.saturating_mul(2)
        } else {
            self.base
        }
    }
}

/// The document currently shown to the user, shared with the sync loop.
#[derive(Debug, Clone, Default)]
pub struct OpenDocument(Arc<RwLock<Option<DocumentId>>>);

impl OpenDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: Option<DocumentId>) {
        match self.0.write() {
            Ok(mut slot) => *slot = id,
            Err(poisoned) => *poisoned.into_inner() = id,
        }
    }

    pub fn get(&self) -> Option<DocumentId> {
        match self.0.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Published by the auto-sync loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Started,
    Succeeded { at: DateTime<Utc> },
    Failed { consecutive_failures: u32 },
    /// The open document differs on the remote; the local buffer is untouched
    RemoteChanged(RemoteChange),
}

/// Handle to a running auto-sync loop. Dropping it stops the schedule.
pub struct AutoSync {
    cancel: CancellationToken,
    trigger: Arc<Notify>,
    events: broadcast::Sender<SyncEvent>,
    backoff: Arc<Mutex<Backoff>>,
    handle: Option<JoinHandle<()>>,
}

impl AutoSync {
    /// Start the loop, or return `None` when auto-sync is disabled or no remote
    /// is configured.
    ///
    /// `cancel` stops the schedule when cancelled; pass a child of the owning
    /// workspace's token.
    pub async fn start<V: VersionControl + 'static>(
        coordinator: Arc<SyncCoordinator<V>>,
        config: &Config,
        open: OpenDocument,
        cancel: CancellationToken,
    ) -> Option<Self> {
        if !config.auto_sync {
            log::debug!("[AutoSync] Disabled in config");
            return None;
        }
        if !coordinator.has_remote().await {
            log::debug!("[AutoSync] No remote '{}', not starting", coordinator.remote());
            return None;
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let trigger = Arc::new(Notify::new());
        let backoff = Arc::new(Mutex::new(Backoff::new(config.sync_interval())));

        log::info!(
            "[AutoSync] Starting with base interval {:?}",
            config.sync_interval()
        );
        let handle = tokio::spawn(run_loop(
            coordinator,
            open,
            cancel.clone(),
            Arc::clone(&trigger),
            events.clone(),
            Arc::clone(&backoff),
        ));

        Some(Self {
            cancel,
            trigger,
            events,
            backoff,
            handle: Some(handle),
        })
    }

    /// Run a sync as soon as possible (e.g. the window regained focus)
    pub fn trigger_now(&self) {
        self.trigger.notify_one();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Current scheduling state
    pub fn backoff(&self) -> Backoff {
        lock_backoff(&self.backoff).clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop scheduling further runs. A sync already in flight completes.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait for the loop to exit
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            log::warn!("[AutoSync] Loop ended abnormally: {}", e);
        }
    }
}

impl Drop for AutoSync {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn lock_backoff(backoff: &Mutex<Backoff>) -> std::sync::MutexGuard<'_, Backoff> {
    backoff.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn run_loop<V: VersionControl>(
    coordinator: Arc<SyncCoordinator<V>>,
    open: OpenDocument,
    cancel: CancellationToken,
    trigger: Arc<Notify>,
    events: broadcast::Sender<SyncEvent>,
    backoff: Arc<Mutex<Backoff>>,
) {
    loop {
        let delay = lock_backoff(&backoff).next_delay();
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
            _ = trigger.notified() => {
                log::debug!("[AutoSync] Triggered");
            }
        }
        if cancel.is_cancelled() {
            break;
        }

        // Send errors only mean nobody is subscribed
        let _ = events.send(SyncEvent::Started);
        let open_id = open.get();

        let (succeeded, remote_change) = match coordinator.sync(open_id.as_ref()).await {
            Ok(report) => (report.is_success(), report.remote_change),
            Err(e) => {
                log::debug!("[AutoSync] Sync failed: {}", e);
                (false, None)
            }
        };

        if let Some(change) = remote_change {
            let _ = events.send(SyncEvent::RemoteChanged(change));
        }

        if succeeded {
            let now = Utc::now();
            lock_backoff(&backoff).record_success(now);
            let _ = events.send(SyncEvent::Succeeded { at: now });
        } else {
            let consecutive_failures = {
                let mut state = lock_backoff(&backoff);
                state.record_failure();
                state.consecutive_failures
            };
            log::debug!(
                "[AutoSync] {} consecutive failure(s), next run in {:?}",
                consecutive_failures,
                lock_backoff(&backoff).next_delay()
            );
            let _ = events.send(SyncEvent::Failed {
                consecutive_failures,
            });
        }
    }

    log::info!("[AutoSync] Loop ended");
}
