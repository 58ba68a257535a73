//! Serde types matching the story API payloads.

use serde::{Deserialize, Serialize};

use crate::codec::PhotoPayload;
use crate::queue::Coordinates;

/// The `{error, message}` envelope every endpoint returns.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApiMessage {
  #[serde(default)]
  pub error: bool,
  #[serde(default)]
  pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Story {
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(rename = "photoUrl", default)]
  pub photo_url: String,
  #[serde(rename = "createdAt", default)]
  pub created_at: String,
  pub lat: Option<f64>,
  pub lon: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ListStoriesResponse {
  #[serde(default)]
  pub error: bool,
  #[serde(default)]
  pub message: String,
  #[serde(rename = "listStory", default)]
  pub list_story: Vec<Story>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResult {
  #[serde(rename = "userId")]
  pub user_id: String,
  pub name: String,
  pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
  #[serde(default)]
  pub message: String,
  #[serde(rename = "loginResult")]
  pub login_result: Option<LoginResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushKeys {
  pub p256dh: String,
  pub auth: String,
}

/// Web push subscription as registered with the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushSubscription {
  pub endpoint: String,
  pub keys: PushKeys,
}

/// A story ready to upload: photo, description and optional location.
#[derive(Debug, Clone, PartialEq)]
pub struct StorySubmission {
  pub photo: PhotoPayload,
  pub description: String,
  pub location: Option<Coordinates>,
}
