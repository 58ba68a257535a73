//! Registering this device for push notifications with the story API.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::api::{ApiError, ApiMessage, PushSubscription, StoryClient};
use crate::auth::{CredentialSource, TokenStore};
use crate::notify::Notifier;

const INVALID_TOKEN_ALERT: &str = "invalid token, please log in again";

/// The subscription endpoints of the story API.
#[async_trait]
pub trait PushApi: Send + Sync {
  async fn subscribe(&self, subscription: &PushSubscription, token: &str) -> Result<ApiMessage, ApiError>;
  async fn unsubscribe(&self, endpoint: &str, token: &str) -> Result<ApiMessage, ApiError>;
}

#[async_trait]
impl PushApi for StoryClient {
  async fn subscribe(&self, subscription: &PushSubscription, token: &str) -> Result<ApiMessage, ApiError> {
    self.subscribe_push(subscription, token).await
  }

  async fn unsubscribe(&self, endpoint: &str, token: &str) -> Result<ApiMessage, ApiError> {
    self.unsubscribe_push(endpoint, token).await
  }
}

#[derive(Debug, Error)]
pub enum PushError {
  #[error("log in required to manage push notifications")]
  AuthMissing,
  /// The server refused the token; it has been forgotten
  #[error("{}", INVALID_TOKEN_ALERT)]
  InvalidToken,
  #[error(transparent)]
  Api(ApiError),
}

pub struct PushRegistrar {
  api: Arc<dyn PushApi>,
  credentials: Arc<dyn CredentialSource>,
  tokens: TokenStore,
  notifier: Arc<dyn Notifier>,
}

impl PushRegistrar {
  pub fn new(
    api: Arc<dyn PushApi>,
    credentials: Arc<dyn CredentialSource>,
    tokens: TokenStore,
    notifier: Arc<dyn Notifier>,
  ) -> Self {
    Self {
      api,
      credentials,
      tokens,
      notifier,
    }
  }

  pub async fn subscribe(&self, subscription: &PushSubscription) -> Result<ApiMessage, PushError> {
    let token = self.credentials.token().ok_or(PushError::AuthMissing)?;
    let result = self.api.subscribe(subscription, &token).await;
    match result {
      Ok(message) => {
        info!(endpoint = %subscription.endpoint, "push subscription registered");
        Ok(message)
      }
      Err(e) => Err(self.failure(e)),
    }
  }

  /// Remove a subscription. One the server no longer knows counts as removed.
  pub async fn unsubscribe(&self, endpoint: &str) -> Result<ApiMessage, PushError> {
    let token = self.credentials.token().ok_or(PushError::AuthMissing)?;
    match self.api.unsubscribe(endpoint, &token).await {
      Ok(message) => {
        info!(endpoint, "push subscription removed");
        Ok(message)
      }
      Err(ApiError::Rejected { status: 404, message }) => {
        info!(endpoint, %message, "push subscription was already gone");
        Ok(ApiMessage {
          error: false,
          message,
        })
      }
      Err(e) => Err(self.failure(e)),
    }
  }

  fn failure(&self, error: ApiError) -> PushError {
    match error {
      ApiError::Unauthorized { message } => {
        warn!(%message, "token rejected, clearing stored login");
        if let Err(e) = self.tokens.clear() {
          warn!(error = %e, "failed to clear stored token");
        }
        self.notifier.alert(INVALID_TOKEN_ALERT);
        PushError::InvalidToken
      }
      other => PushError::Api(other),
    }
  }
}
