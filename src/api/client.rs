use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

use crate::config::Config;
use crate::worker::{Fetch, FetchError, FormPart, Request, Response};

use super::types::{ApiMessage, LoginResponse, LoginResult, PushSubscription, StorySubmission};

#[derive(Debug, Error)]
pub enum ApiError {
  /// Network unreachable, timeout, connection reset
  #[error("network error: {0}")]
  Transport(String),
  /// The request could not be built locally, e.g. a bad photo MIME type
  #[error("invalid request: {0}")]
  InvalidRequest(String),
  #[error("server rejected request ({status}): {message}")]
  Rejected { status: u16, message: String },
  #[error("unauthorized: {message}")]
  Unauthorized { message: String },
  #[error("invalid response: {0}")]
  InvalidResponse(String),
}

impl From<FetchError> for ApiError {
  fn from(e: FetchError) -> Self {
    match e {
      FetchError::Network(message) => ApiError::Transport(message),
      FetchError::InvalidRequest(message) => ApiError::InvalidRequest(message),
    }
  }
}

impl ApiError {
  /// True when the request never got an answer from the server.
  pub fn is_transport(&self) -> bool {
    matches!(self, ApiError::Transport(_))
  }
}

/// The one remote call the sync engine and submitter depend on.
#[async_trait]
pub trait StoryTransport: Send + Sync {
  async fn create_story(
    &self,
    submission: &StorySubmission,
    token: &str,
  ) -> Result<ApiMessage, ApiError>;
}

/// Story API client. Every call goes out through a [`Fetch`], normally the
/// boundary cache.
#[derive(Clone)]
pub struct StoryClient {
  fetcher: Arc<dyn Fetch>,
  base_url: String,
}

impl StoryClient {
  pub fn new(config: &Config, fetcher: Arc<dyn Fetch>) -> Result<Self> {
    let base_url = config.api_base().to_string();
    Url::parse(&base_url).map_err(|e| eyre!("Invalid API URL '{}': {}", base_url, e))?;

    Ok(Self { fetcher, base_url })
  }

  /// URL of the story listing, filtered to stories with a location when `location` is set.
  pub fn stories_url(&self, location: bool) -> String {
    format!(
      "{}/stories?location={}",
      self.base_url,
      if location { 1 } else { 0 }
    )
  }

  fn request(&self, method: Method, path: &str) -> Result<Request, ApiError> {
    let url = Url::parse(&format!("{}{}", self.base_url, path))
      .map_err(|e| ApiError::InvalidRequest(format!("bad URL for {}: {}", path, e)))?;
    Ok(Request::new(method, url))
  }

  async fn send<T: DeserializeOwned>(&self, request: Request) -> Result<T, ApiError> {
    let response = self.fetcher.fetch(&request).await?;
    parse_response(response)
  }

  /// Create a new account
  pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<ApiMessage, ApiError> {
    let request = self
      .request(Method::POST, "/register")?
      .with_json(json!({ "name": name, "email": email, "password": password }));

    self.send(request).await
  }

  /// Log in and return the session token
  pub async fn login(&self, email: &str, password: &str) -> Result<LoginResult, ApiError> {
    let request = self
      .request(Method::POST, "/login")?
      .with_json(json!({ "email": email, "password": password }));

    let body: LoginResponse = self.send(request).await?;
    body.login_result.ok_or_else(|| {
      ApiError::InvalidResponse(format!("login response has no loginResult: {}", body.message))
    })
  }

  /// Register a push subscription for the logged-in user
  pub async fn subscribe_push(
    &self,
    subscription: &PushSubscription,
    token: &str,
  ) -> Result<ApiMessage, ApiError> {
    let body = serde_json::to_value(subscription)
      .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
    let request = self
      .request(Method::POST, "/notifications/subscribe")?
      .with_bearer(token)
      .with_json(body);

    self.send(request).await
  }

  /// Remove a push subscription
  pub async fn unsubscribe_push(&self, endpoint: &str, token: &str) -> Result<ApiMessage, ApiError> {
    let request = self
      .request(Method::DELETE, "/notifications/subscribe")?
      .with_bearer(token)
      .with_json(json!({ "endpoint": endpoint }));

    self.send(request).await
  }
}

#[async_trait]
impl StoryTransport for StoryClient {
  async fn create_story(
    &self,
    submission: &StorySubmission,
    token: &str,
  ) -> Result<ApiMessage, ApiError> {
    let mut parts = vec![
      FormPart::File {
        name: "photo".to_string(),
        file_name: submission.photo.name.clone(),
        mime_type: submission.photo.mime_type.clone(),
        bytes: submission.photo.bytes.clone(),
      },
      FormPart::Text {
        name: "description".to_string(),
        value: submission.description.clone(),
      },
    ];
    if let Some(location) = submission.location {
      for (name, value) in [("lat", location.lat), ("lon", location.lon)] {
        parts.push(FormPart::Text {
          name: name.to_string(),
          value: value.to_string(),
        });
      }
    }

    let request = self
      .request(Method::POST, "/stories")?
      .with_bearer(token)
      .with_multipart(parts);

    self.send(request).await
  }
}

/// Error body the API sends, plus the flag the boundary cache sets on its
/// own offline answer.
#[derive(Deserialize)]
struct FailureBody {
  #[serde(default)]
  message: String,
  #[serde(default)]
  offline: bool,
}

fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
  if !response.is_success() {
    return Err(failure_from(response.status, &response.text()));
  }

  serde_json::from_slice(&response.body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

/// Map a non-2xx answer to an error, preferring the server's own message.
fn failure_from(status: u16, body: &str) -> ApiError {
  let parsed = serde_json::from_str::<FailureBody>(body).ok();
  let offline = parsed.as_ref().is_some_and(|b| b.offline);
  let message = parsed
    .map(|b| b.message)
    .filter(|m| !m.is_empty())
    .unwrap_or_else(|| {
      StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("unknown error")
        .to_string()
    });

  if offline {
    return ApiError::Transport(message);
  }
  if status == StatusCode::UNAUTHORIZED.as_u16() {
    ApiError::Unauthorized { message }
  } else {
    ApiError::Rejected { status, message }
  }
}
