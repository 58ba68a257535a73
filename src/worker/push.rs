//! Push payloads delivered by the story API.

use serde::Deserialize;

use crate::notify::Notification;

const DEFAULT_TITLE: &str = "New story";
const HOME_TARGET: &str = "/#/";

#[derive(Debug, Default, Deserialize)]
struct PushPayload {
  #[serde(default)]
  title: Option<String>,
  #[serde(default)]
  options: PushOptions,
}

#[derive(Debug, Default, Deserialize)]
struct PushOptions {
  #[serde(default)]
  body: Option<String>,
  #[serde(default)]
  data: PushData,
}

#[derive(Debug, Default, Deserialize)]
struct PushData {
  #[serde(rename = "storyId", default)]
  story_id: Option<String>,
  #[serde(default)]
  url: Option<String>,
}

/// Turn a raw push payload into a notification.
///
/// JSON payloads follow `{title, options: {body, data: {storyId | url}}}`;
/// anything else becomes the body of a default notification.
pub fn notification_from_push(data: Option<&[u8]>) -> Notification {
  let raw = data.map(|d| String::from_utf8_lossy(d).into_owned()).unwrap_or_default();

  let payload: PushPayload = match serde_json::from_str(&raw) {
    Ok(payload) => payload,
    Err(_) => {
      let body = if raw.trim().is_empty() {
        "You have a new notification".to_string()
      } else {
        raw
      };
      return Notification::new(DEFAULT_TITLE, body).with_target(HOME_TARGET);
    }
  };

  let target = match (payload.options.data.url, payload.options.data.story_id) {
    (Some(url), _) => url,
    (None, Some(id)) => format!("/#/stories/{}", id),
    (None, None) => HOME_TARGET.to_string(),
  };

  Notification::new(
    payload.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
    payload.options.body.unwrap_or_default(),
  )
  .with_target(target)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_story_payload() {
    let payload = br#"{
      "title": "Story berhasil dibuat",
      "options": { "body": "Anda telah membuat story baru", "data": { "storyId": "story-42" } }
    }"#;
    let n = notification_from_push(Some(payload));
    assert_eq!(n.title, "Story berhasil dibuat");
    assert_eq!(n.body, "Anda telah membuat story baru");
    assert_eq!(n.target.as_deref(), Some("/#/stories/story-42"));
  }

  #[test]
  fn test_explicit_url_wins() {
    let payload = br#"{"title":"t","options":{"data":{"url":"/#/map","storyId":"x"}}}"#;
    let n = notification_from_push(Some(payload));
    assert_eq!(n.target.as_deref(), Some("/#/map"));
  }

  #[test]
  fn test_plain_text_payload() {
    let n = notification_from_push(Some(b"hello there"));
    assert_eq!(n.title, DEFAULT_TITLE);
    assert_eq!(n.body, "hello there");
    assert_eq!(n.target.as_deref(), Some(HOME_TARGET));
  }

  #[test]
  fn test_empty_payload() {
    let n = notification_from_push(None);
    assert_eq!(n.body, "You have a new notification");
  }
}
