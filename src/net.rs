//! Connectivity signal shared by the submitter and the sync engine.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Online/offline flag with change notification.
#[derive(Clone)]
pub struct Connectivity {
  tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
  pub fn new(online: bool) -> Self {
    let (tx, _rx) = watch::channel(online);
    Self { tx: Arc::new(tx) }
  }

  pub fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  /// Record the current state. Returns true if it changed.
  pub fn set_online(&self, online: bool) -> bool {
    let changed = self.tx.send_if_modified(|current| {
      if *current == online {
        false
      } else {
        *current = online;
        true
      }
    });
    if changed {
      info!(online, "connectivity changed");
    }
    changed
  }

  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }
}

/// Periodically checks whether the API host answers and feeds [`Connectivity`].
pub struct ConnectivityProbe {
  http: reqwest::Client,
  url: String,
  interval: Duration,
}

impl ConnectivityProbe {
  pub fn new(url: impl Into<String>, interval: Duration) -> Self {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(5))
      .build()
      .unwrap_or_default();
    Self {
      http,
      url: url.into(),
      interval,
    }
  }

  /// Any HTTP answer, even an error status, counts as online.
  pub async fn check(&self) -> bool {
    match self.http.head(&self.url).send().await {
      Ok(_) => true,
      Err(e) => {
        debug!(error = %e, "connectivity probe failed");
        false
      }
    }
  }

  /// Probe forever. Intended to be spawned.
  pub async fn run(self, connectivity: Connectivity) {
    let mut ticker = tokio::time::interval(self.interval);
    loop {
      ticker.tick().await;
      let online = self.check().await;
      connectivity.set_online(online);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_set_online_reports_changes_only() {
    let connectivity = Connectivity::new(false);
    assert!(!connectivity.is_online());
    assert!(connectivity.set_online(true));
    assert!(!connectivity.set_online(true));
    assert!(connectivity.is_online());
  }

  #[tokio::test]
  async fn test_subscribers_see_transitions() {
    let connectivity = Connectivity::new(false);
    let mut rx = connectivity.subscribe();

    connectivity.set_online(true);
    rx.changed().await.unwrap();
    assert!(*rx.borrow_and_update());

    // Unchanged value does not wake subscribers
    connectivity.set_online(true);
    assert!(!rx.has_changed().unwrap());
  }
}
