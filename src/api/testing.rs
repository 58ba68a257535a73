//! In-process stand-in for the story API.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{ApiError, ApiMessage, StorySubmission, StoryTransport};

/// Records every upload and fails on demand.
#[derive(Default)]
pub struct FakeTransport {
  calls: Mutex<Vec<StorySubmission>>,
  rejected: Mutex<HashSet<String>>,
  malformed: Mutex<HashSet<String>>,
  unreachable: AtomicBool,
  delay: Option<Duration>,
}

impl FakeTransport {
  pub fn new() -> Self {
    Self::default()
  }

  /// Sleep this long inside every call.
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  /// Answer 500 for submissions with this description.
  pub fn reject(&self, description: &str) {
    self.rejected.lock().unwrap().insert(description.to_string());
  }

  /// Fail to build the request for submissions with this description.
  pub fn malformed(&self, description: &str) {
    self.malformed.lock().unwrap().insert(description.to_string());
  }

  /// Simulate the network being down.
  pub fn set_unreachable(&self, unreachable: bool) {
    self.unreachable.store(unreachable, Ordering::SeqCst);
  }

  pub fn calls(&self) -> Vec<StorySubmission> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self) -> usize {
    self.calls.lock().unwrap().len()
  }
}

#[async_trait]
impl StoryTransport for FakeTransport {
  async fn create_story(
    &self,
    submission: &StorySubmission,
    _token: &str,
  ) -> Result<ApiMessage, ApiError> {
    self.calls.lock().unwrap().push(submission.clone());

    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }

    if self.unreachable.load(Ordering::SeqCst) {
      return Err(ApiError::Transport("connection refused".to_string()));
    }

    if self.malformed.lock().unwrap().contains(&submission.description) {
      return Err(ApiError::InvalidRequest("bad MIME type".to_string()));
    }

    if self.rejected.lock().unwrap().contains(&submission.description) {
      return Err(ApiError::Rejected {
        status: 500,
        message: "Internal Server Error".to_string(),
      });
    }

    Ok(ApiMessage {
      error: false,
      message: "Story created successfully".to_string(),
    })
  }
}
