//! User-facing notifications.

use tracing::info;

/// A message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub title: String,
  pub body: String,
  /// Where activating the notification should lead, if anywhere
  pub target: Option<String>,
}

impl Notification {
  pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      body: body.into(),
      target: None,
    }
  }

  pub fn with_target(mut self, target: impl Into<String>) -> Self {
    self.target = Some(target.into());
    self
  }
}

pub trait Notifier: Send + Sync {
  fn notify(&self, notification: Notification);

  /// Short blocking-style alert, e.g. "log in required".
  fn alert(&self, message: &str) {
    self.notify(Notification::new("storysync", message));
  }
}

/// Prints notifications to stdout.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
  fn notify(&self, notification: Notification) {
    info!(title = %notification.title, body = %notification.body, "notification");
    println!("[{}] {}", notification.title, notification.body);
  }
}
