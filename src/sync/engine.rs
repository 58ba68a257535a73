use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::api::{ApiError, StorySubmission, StoryTransport};
use crate::auth::CredentialSource;
use crate::net::Connectivity;
use crate::notify::Notifier;
use crate::queue::{QueueEntry, QueueStore};
use crate::worker::ClientMessage;

use super::types::{SkipReason, SyncError, SyncOutcome, SyncSummary, SyncTrigger};

/// Result of pushing a single queued entry.
enum EntryResult {
  Sent,
  Failed,
  Unreadable,
}

/// Drains the offline queue into the story API.
///
/// Owns its periodic timer and a "pass running" flag, so two triggers firing
/// back to back never upload the same entry twice in parallel.
pub struct SyncEngine {
  store: Arc<dyn QueueStore>,
  transport: Arc<dyn StoryTransport>,
  credentials: Arc<dyn CredentialSource>,
  connectivity: Connectivity,
  notifier: Arc<dyn Notifier>,
  running: AtomicBool,
  timer: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
  pub fn new(
    store: Arc<dyn QueueStore>,
    transport: Arc<dyn StoryTransport>,
    credentials: Arc<dyn CredentialSource>,
    connectivity: Connectivity,
    notifier: Arc<dyn Notifier>,
  ) -> Self {
    Self {
      store,
      transport,
      credentials,
      connectivity,
      notifier,
      running: AtomicBool::new(false),
      timer: Mutex::new(None),
    }
  }

  /// Run one pass over every unsynced entry.
  ///
  /// Offline, an empty queue, or a pass already in progress end the pass
  /// without touching the store or the network. A missing credential is
  /// reported to the user and returned as [`SyncError::AuthMissing`].
  pub async fn sync_pass(&self, trigger: SyncTrigger) -> Result<SyncOutcome, SyncError> {
    if !self.connectivity.is_online() {
      debug!(%trigger, "offline, skipping sync");
      return Ok(SyncOutcome::Skipped(SkipReason::Offline));
    }

    let _guard = match PassGuard::acquire(&self.running) {
      Some(guard) => guard,
      None => {
        debug!(%trigger, "sync already running");
        return Ok(SyncOutcome::Skipped(SkipReason::AlreadyRunning));
      }
    };

    let entries = self.store.get_unsynced().map_err(SyncError::Store)?;
    if entries.is_empty() {
      debug!(%trigger, "no queued stories");
      return Ok(SyncOutcome::Skipped(SkipReason::EmptyQueue));
    }

    let token = match self.credentials.token() {
      Some(token) => token,
      None => {
        let err = SyncError::AuthMissing {
          pending: entries.len(),
        };
        warn!(%trigger, pending = entries.len(), "no credential, sync aborted");
        self.notifier.alert(&err.to_string());
        return Err(err);
      }
    };

    info!(%trigger, pending = entries.len(), "sync started");

    let mut summary = SyncSummary::default();
    for entry in &entries {
      match self.sync_entry(entry, &token).await {
        EntryResult::Sent => summary.succeeded += 1,
        EntryResult::Failed => summary.failed += 1,
        EntryResult::Unreadable => summary.skipped += 1,
      }
    }

    info!(
      %trigger,
      succeeded = summary.succeeded,
      failed = summary.failed,
      skipped = summary.skipped,
      "sync finished"
    );
    // Unreadable entries stay in the queue; repeating them every pass is noise.
    if summary.succeeded + summary.failed > 0 {
      self.notifier.notify(summary.notification());
    }

    Ok(SyncOutcome::Completed(summary))
  }

  async fn sync_entry(&self, entry: &QueueEntry, token: &str) -> EntryResult {
    // Corrupt rows are left alone; retrying cannot fix them.
    let photo = match entry.decode_photo() {
      Ok(photo) => photo,
      Err(e) => {
        error!(id = entry.id, error = %e, "queued story has an unreadable photo, skipping");
        return EntryResult::Unreadable;
      }
    };

    let submission = StorySubmission {
      photo,
      description: entry.description.clone(),
      location: entry.location,
    };

    match self.transport.create_story(&submission, token).await {
      Ok(_) => {
        info!(id = entry.id, "queued story sent");
        if let Err(e) = self.store.delete(entry.id) {
          // Server has it; leaving the row means it is sent again next pass.
          error!(id = entry.id, error = %e, "failed to remove sent story from queue");
        }
        EntryResult::Sent
      }
      Err(ApiError::InvalidRequest(e)) => {
        error!(id = entry.id, error = %e, "queued story cannot be uploaded, skipping");
        EntryResult::Unreadable
      }
      Err(e) => {
        warn!(id = entry.id, error = %e, "failed to send queued story");
        match self.store.update(entry.id, false) {
          Ok(true) => {}
          Ok(false) => debug!(id = entry.id, "queued story vanished during sync"),
          Err(e) => error!(id = entry.id, error = %e, "failed to record sync attempt"),
        }
        EntryResult::Failed
      }
    }
  }

  /// Run a pass for a trigger nobody awaits; errors only go to the log.
  pub async fn run_pass(&self, trigger: SyncTrigger) {
    if let Err(e) = self.sync_pass(trigger).await {
      warn!(%trigger, error = %e, "sync pass aborted");
    }
  }

  /// Start the periodic timer, replacing any timer already running.
  ///
  /// The first pass runs one full `interval` after this call.
  pub fn start_periodic_sync(self: &Arc<Self>, interval: Duration) {
    let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(previous) = timer.take() {
      previous.abort();
    }

    let engine: Weak<Self> = Arc::downgrade(self);
    *timer = Some(tokio::spawn(async move {
      let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let Some(engine) = engine.upgrade() else {
          break;
        };
        engine.run_pass(SyncTrigger::Periodic).await;
      }
    }));

    info!(interval_secs = interval.as_secs(), "periodic sync started");
  }

  /// Stop the periodic timer. Safe to call when none is running.
  pub fn stop_periodic_sync(&self) {
    let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(handle) = timer.take() {
      handle.abort();
      info!("periodic sync stopped");
    }
  }

  #[cfg(test)]
  pub fn is_periodic_sync_running(&self) -> bool {
    let timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
    timer.as_ref().is_some_and(|handle| !handle.is_finished())
  }

  /// Run a pass every time connectivity goes from offline to online.
  pub fn watch_connectivity(self: &Arc<Self>) -> JoinHandle<()> {
    let mut rx = self.connectivity.subscribe();
    let engine = Arc::downgrade(self);

    tokio::spawn(async move {
      let mut was_online = *rx.borrow_and_update();
      while rx.changed().await.is_ok() {
        let online = *rx.borrow_and_update();
        if online && !was_online {
          let Some(engine) = engine.upgrade() else {
            break;
          };
          engine.run_pass(SyncTrigger::Online).await;
        }
        was_online = online;
      }
    })
  }

  /// Act on messages the boundary cache broadcasts to foreground clients.
  pub fn follow_worker(self: &Arc<Self>, mut rx: broadcast::Receiver<ClientMessage>) -> JoinHandle<()> {
    let engine = Arc::downgrade(self);

    tokio::spawn(async move {
      loop {
        match rx.recv().await {
          Ok(ClientMessage::SyncOfflineStories) => {
            let Some(engine) = engine.upgrade() else {
              break;
            };
            engine.run_pass(SyncTrigger::Background).await;
          }
          Ok(other) => debug!(?other, "ignoring worker message"),
          Err(broadcast::error::RecvError::Lagged(skipped)) => {
            warn!(skipped, "missed worker messages");
          }
          Err(broadcast::error::RecvError::Closed) => break,
        }
      }
    })
  }
}

impl Drop for SyncEngine {
  fn drop(&mut self) {
    if let Some(handle) = self
      .timer
      .get_mut()
      .unwrap_or_else(PoisonError::into_inner)
      .take()
    {
      handle.abort();
    }
  }
}

/// Holds the "pass running" flag for the lifetime of a pass.
struct PassGuard<'a> {
  flag: &'a AtomicBool,
}

impl<'a> PassGuard<'a> {
  fn acquire(flag: &'a AtomicBool) -> Option<Self> {
    flag
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| Self { flag })
  }
}

impl Drop for PassGuard<'_> {
  fn drop(&mut self) {
    self.flag.store(false, Ordering::Release);
  }
}
