//! Records held by the offline queue.

use chrono::{DateTime, Utc};

use crate::codec::{self, DecodeError, PhotoPayload};

/// A latitude/longitude pair. Stories carry both or neither.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
  pub lat: f64,
  pub lon: f64,
}

impl Coordinates {
  pub fn new(lat: f64, lon: f64) -> Self {
    Self { lat, lon }
  }

  /// Pair up optional coordinates; returns None unless both are present.
  pub fn from_parts(lat: Option<f64>, lon: Option<f64>) -> Option<Self> {
    match (lat, lon) {
      (Some(lat), Some(lon)) => Some(Self { lat, lon }),
      _ => None,
    }
  }
}

/// A submission waiting to be queued. The store assigns the id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQueueEntry {
  pub description: String,
  pub photo_encoded: String,
  pub photo_name: String,
  pub photo_type: String,
  pub location: Option<Coordinates>,
}

impl NewQueueEntry {
  /// Build an entry from a raw photo, encoding it for storage.
  pub fn from_payload(
    description: impl Into<String>,
    photo: &PhotoPayload,
    location: Option<Coordinates>,
  ) -> Self {
    Self {
      description: description.into(),
      photo_encoded: codec::encode(photo),
      photo_name: photo.name.clone(),
      photo_type: photo.mime_type.clone(),
      location,
    }
  }
}

/// A pending story submission as persisted in the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
  pub id: i64,
  pub description: String,
  pub photo_encoded: String,
  pub photo_name: String,
  pub photo_type: String,
  pub location: Option<Coordinates>,
  pub created_at: DateTime<Utc>,
  pub synced: bool,
  /// Time of the last sync attempt, successful or not
  pub synced_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
  /// Rebuild the original photo upload.
  pub fn decode_photo(&self) -> Result<PhotoPayload, DecodeError> {
    codec::decode(&self.photo_encoded, &self.photo_name, &self.photo_type)
  }
}
