use std::fmt;
use thiserror::Error;

use crate::notify::Notification;

/// What started a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
  /// Connectivity came back
  Online,
  /// Periodic timer
  Periodic,
  /// Explicit user request
  Manual,
  /// The boundary cache asked foreground clients to sync
  Background,
}

impl fmt::Display for SyncTrigger {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      SyncTrigger::Online => "online",
      SyncTrigger::Periodic => "periodic",
      SyncTrigger::Manual => "manual",
      SyncTrigger::Background => "background",
    };
    f.write_str(name)
  }
}

/// Why a pass ended before touching any entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
  Offline,
  EmptyQueue,
  AlreadyRunning,
}

impl fmt::Display for SkipReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let reason = match self {
      SkipReason::Offline => "offline",
      SkipReason::EmptyQueue => "queue is empty",
      SkipReason::AlreadyRunning => "a sync is already running",
    };
    f.write_str(reason)
  }
}

/// Per-pass counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
  pub succeeded: usize,
  pub failed: usize,
  /// Entries that can never be uploaded as stored; logged, not announced
  pub skipped: usize,
}

impl SyncSummary {
  pub fn notification(&self) -> Notification {
    let body = format!(
      "{} stor{} sent, {} failed",
      self.succeeded,
      if self.succeeded == 1 { "y" } else { "ies" },
      self.failed
    );
    Notification::new("Offline stories synced", body)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
  Skipped(SkipReason),
  Completed(SyncSummary),
}

#[derive(Debug, Error)]
pub enum SyncError {
  #[error("log in required to send {pending} queued stories")]
  AuthMissing { pending: usize },
  #[error("queue store error: {0}")]
  Store(color_eyre::Report),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_summary_notification_text() {
    let summary = SyncSummary {
      succeeded: 2,
      failed: 1,
      skipped: 0,
    };
    assert_eq!(summary.notification().body, "2 stories sent, 1 failed");

    let summary = SyncSummary {
      succeeded: 1,
      failed: 0,
      skipped: 1,
    };
    assert_eq!(summary.notification().body, "1 story sent, 0 failed");
  }
}
