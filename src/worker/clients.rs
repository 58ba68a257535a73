//! Foreground contexts controlled by the boundary cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

use super::messages::ClientMessage;

/// One open view of the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientWindow {
  pub id: u64,
  pub url: String,
  pub focused: bool,
}

/// A connected client: its id and its message inbox.
pub struct ClientHandle {
  pub id: u64,
  pub messages: broadcast::Receiver<ClientMessage>,
}

/// What activating a notification did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
  /// An open view already showed the target and was focused
  Focused(u64),
  /// A new view was opened on the target
  Opened(u64),
}

pub struct ClientRegistry {
  windows: Mutex<Vec<ClientWindow>>,
  next_id: AtomicU64,
  tx: broadcast::Sender<ClientMessage>,
}

impl Default for ClientRegistry {
  fn default() -> Self {
    Self::new()
  }
}

impl ClientRegistry {
  pub fn new() -> Self {
    let (tx, _rx) = broadcast::channel(32);
    Self {
      windows: Mutex::new(Vec::new()),
      next_id: AtomicU64::new(1),
      tx,
    }
  }

  /// Register a view showing `url` and subscribe it to worker messages.
  pub fn connect(&self, url: impl Into<String>) -> ClientHandle {
    let id = self.open(url.into(), false);
    ClientHandle {
      id,
      messages: self.tx.subscribe(),
    }
  }

  pub fn disconnect(&self, id: u64) {
    self.lock().retain(|w| w.id != id);
  }

  #[cfg(test)]
  pub fn windows(&self) -> Vec<ClientWindow> {
    self.lock().clone()
  }

  /// Send a message to every connected client. Returns how many received it.
  pub fn post_all(&self, message: ClientMessage) -> usize {
    self.tx.send(message).unwrap_or(0)
  }

  /// Focus a view already on `url`, or open a new one.
  pub fn focus_or_open(&self, url: &str) -> ClickOutcome {
    let mut windows = self.lock();
    let existing = windows
      .iter()
      .filter(|w| same_target(&w.url, url))
      .max_by_key(|w| w.focused)
      .map(|w| w.id);

    match existing {
      Some(id) => {
        for w in windows.iter_mut() {
          w.focused = w.id == id;
        }
        ClickOutcome::Focused(id)
      }
      None => {
        drop(windows);
        ClickOutcome::Opened(self.open(url.to_string(), true))
      }
    }
  }

  fn open(&self, url: String, focused: bool) -> u64 {
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let mut windows = self.lock();
    if focused {
      for w in windows.iter_mut() {
        w.focused = false;
      }
    }
    windows.push(ClientWindow { id, url, focused });
    id
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ClientWindow>> {
    self.windows.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Compare view targets, ignoring a trailing slash.
fn same_target(a: &str, b: &str) -> bool {
  a.trim_end_matches('/') == b.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_focus_existing_view() {
    let registry = ClientRegistry::new();
    let home = registry.connect("/#/");
    let detail = registry.connect("/#/stories/story-1");

    let outcome = registry.focus_or_open("/#/stories/story-1/");
    assert_eq!(outcome, ClickOutcome::Focused(detail.id));

    let windows = registry.windows();
    assert_eq!(windows.len(), 2);
    assert!(windows.iter().find(|w| w.id == detail.id).unwrap().focused);
    assert!(!windows.iter().find(|w| w.id == home.id).unwrap().focused);
  }

  #[test]
  fn test_open_when_no_view_matches() {
    let registry = ClientRegistry::new();
    registry.connect("/#/");

    let outcome = registry.focus_or_open("/#/stories/story-9");
    let ClickOutcome::Opened(id) = outcome else {
      panic!("expected a new view, got {:?}", outcome);
    };

    // A second click reuses the view it just opened
    assert_eq!(registry.focus_or_open("/#/stories/story-9"), ClickOutcome::Focused(id));
    assert_eq!(registry.windows().len(), 2);
  }

  #[tokio::test]
  async fn test_post_all_reaches_every_client() {
    let registry = ClientRegistry::new();
    let mut a = registry.connect("/#/");
    let mut b = registry.connect("/#/add");

    assert_eq!(registry.post_all(ClientMessage::SyncOfflineStories), 2);
    assert_eq!(a.messages.recv().await.unwrap(), ClientMessage::SyncOfflineStories);
    assert_eq!(b.messages.recv().await.unwrap(), ClientMessage::SyncOfflineStories);
  }

  #[test]
  fn test_post_without_clients_is_harmless() {
    let registry = ClientRegistry::new();
    assert_eq!(registry.post_all(ClientMessage::SyncOfflineStories), 0);
  }

  #[test]
  fn test_disconnect() {
    let registry = ClientRegistry::new();
    let a = registry.connect("/#/");
    registry.disconnect(a.id);
    assert!(registry.windows().is_empty());
  }
}
