//! Story submission: send now, or park the story in the offline queue.

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::api::{ApiError, ApiMessage, StorySubmission, StoryTransport};
use crate::auth::CredentialSource;
use crate::net::Connectivity;
use crate::queue::{NewQueueEntry, QueueStore};

#[derive(Debug)]
pub enum SubmitOutcome {
  /// Uploaded immediately
  Sent(ApiMessage),
  /// Saved offline; the sync engine will send it once back online
  Queued { id: i64 },
}

#[derive(Debug, Error)]
pub enum SubmitError {
  #[error("description must not be empty")]
  EmptyDescription,
  #[error("log in required to send stories")]
  AuthMissing,
  /// The server answered and said no. Nothing is queued.
  #[error(transparent)]
  Api(ApiError),
  #[error("failed to save story offline: {0}")]
  Store(color_eyre::Report),
}

pub struct Submitter {
  store: Arc<dyn QueueStore>,
  transport: Arc<dyn StoryTransport>,
  credentials: Arc<dyn CredentialSource>,
  connectivity: Connectivity,
}

impl Submitter {
  pub fn new(
    store: Arc<dyn QueueStore>,
    transport: Arc<dyn StoryTransport>,
    credentials: Arc<dyn CredentialSource>,
    connectivity: Connectivity,
  ) -> Self {
    Self {
      store,
      transport,
      credentials,
      connectivity,
    }
  }

  /// Send a story, falling back to the queue when the network is unavailable.
  pub async fn submit(&self, submission: StorySubmission) -> Result<SubmitOutcome, SubmitError> {
    if submission.description.trim().is_empty() {
      return Err(SubmitError::EmptyDescription);
    }

    if !self.connectivity.is_online() {
      info!("offline, saving story to queue");
      return self.enqueue(&submission);
    }

    let token = self.credentials.token().ok_or(SubmitError::AuthMissing)?;

    match self.transport.create_story(&submission, &token).await {
      Ok(message) => {
        info!(message = %message.message, "story sent");
        Ok(SubmitOutcome::Sent(message))
      }
      Err(e) if e.is_transport() => {
        warn!(error = %e, "upload failed, saving story to queue");
        self.connectivity.set_online(false);
        self.enqueue(&submission)
      }
      Err(e) => Err(SubmitError::Api(e)),
    }
  }

  /// Save a story to the queue without trying the network.
  pub fn enqueue(&self, submission: &StorySubmission) -> Result<SubmitOutcome, SubmitError> {
    if submission.description.trim().is_empty() {
      return Err(SubmitError::EmptyDescription);
    }

    let entry = NewQueueEntry::from_payload(
      submission.description.clone(),
      &submission.photo,
      submission.location,
    );
    let id = self.store.add(entry).map_err(SubmitError::Store)?;
    info!(id, "story queued");
    Ok(SubmitOutcome::Queued { id })
  }
}
