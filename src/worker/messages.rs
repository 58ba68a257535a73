//! Messages exchanged between foreground clients and the boundary cache.
//!
//! Both directions use a JSON object tagged by `type`, e.g.
//! `{"type": "SYNC_OFFLINE_STORIES"}`.

use serde::{Deserialize, Serialize};

/// Foreground → worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
  /// Activate a waiting version now
  SkipWaiting,
  /// Drop every cache region in a prefix family (configured family if absent)
  ClearCache {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    prefix: Option<String>,
  },
}

/// Worker → every foreground client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
  /// Run the sync engine; the worker cannot, it has no credential
  SyncOfflineStories,
  /// A new worker version took over
  Activated { version: String },
  /// Regions removed by a CLEAR_CACHE request
  CacheCleared { removed: Vec<String> },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_wire_format() {
    assert_eq!(
      serde_json::to_string(&ClientMessage::SyncOfflineStories).unwrap(),
      r#"{"type":"SYNC_OFFLINE_STORIES"}"#
    );
    assert_eq!(
      serde_json::to_string(&WorkerMessage::SkipWaiting).unwrap(),
      r#"{"type":"SKIP_WAITING"}"#
    );
    assert_eq!(
      serde_json::to_string(&WorkerMessage::ClearCache { prefix: None }).unwrap(),
      r#"{"type":"CLEAR_CACHE"}"#
    );
  }

  #[test]
  fn test_parse_clear_cache_with_and_without_prefix() {
    let bare: WorkerMessage = serde_json::from_str(r#"{"type":"CLEAR_CACHE"}"#).unwrap();
    assert_eq!(bare, WorkerMessage::ClearCache { prefix: None });

    let scoped: WorkerMessage =
      serde_json::from_str(r#"{"type":"CLEAR_CACHE","prefix":"storysync-images"}"#).unwrap();
    assert_eq!(
      scoped,
      WorkerMessage::ClearCache {
        prefix: Some("storysync-images".to_string())
      }
    );
  }

  #[test]
  fn test_unknown_type_is_rejected() {
    assert!(serde_json::from_str::<WorkerMessage>(r#"{"type":"REBOOT"}"#).is_err());
  }
}
