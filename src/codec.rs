//! Lossless text encoding for photo payloads.
//!
//! The queue database stores photos as RFC 2397 data URLs
//! (`data:<mime>;base64,<body>`) so a row carries everything needed to rebuild
//! the original upload.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// A file-like binary payload: raw bytes plus the metadata needed to upload it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoPayload {
  pub bytes: Vec<u8>,
  pub name: String,
  pub mime_type: String,
}

impl PhotoPayload {
  pub fn new(bytes: Vec<u8>, name: impl Into<String>, mime_type: impl Into<String>) -> Self {
    Self {
      bytes,
      name: name.into(),
      mime_type: mime_type.into(),
    }
  }

  /// Read a photo from disk, guessing the MIME type from the extension.
  pub fn from_path(path: &std::path::Path) -> std::io::Result<Self> {
    let bytes = std::fs::read(path)?;
    let name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| "photo".to_string());
    let mime_type = mime_from_name(&name).to_string();
    Ok(Self {
      bytes,
      name,
      mime_type,
    })
  }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
  #[error("data URL has no ',' separator")]
  MissingSeparator,
  #[error("data URL is not base64 encoded: {0}")]
  NotBase64(String),
  #[error("invalid base64 body: {0}")]
  InvalidBase64(String),
}

/// Encode a payload as a data URL.
pub fn encode(payload: &PhotoPayload) -> String {
  let mime = if payload.mime_type.is_empty() {
    "application/octet-stream"
  } else {
    payload.mime_type.as_str()
  };
  format!("data:{};base64,{}", mime, STANDARD.encode(&payload.bytes))
}

/// Rebuild a payload from its stored text form.
///
/// Accepts either a full data URL or a bare base64 body.
pub fn decode(text: &str, name: &str, mime_type: &str) -> Result<PhotoPayload, DecodeError> {
  let text = text.trim();
  let body = if let Some(rest) = text.strip_prefix("data:") {
    let (header, body) = rest.split_once(',').ok_or(DecodeError::MissingSeparator)?;
    if !header.ends_with(";base64") {
      return Err(DecodeError::NotBase64(header.to_string()));
    }
    body
  } else {
    text
  };

  let bytes = STANDARD
    .decode(body)
    .map_err(|e| DecodeError::InvalidBase64(e.to_string()))?;

  Ok(PhotoPayload::new(bytes, name, mime_type))
}

/// Best-effort MIME type from a file name.
pub fn mime_from_name(name: &str) -> &'static str {
  let ext = name
    .rsplit_once('.')
    .map(|(_, ext)| ext.to_ascii_lowercase())
    .unwrap_or_default();
  match ext.as_str() {
    "jpg" | "jpeg" => "image/jpeg",
    "png" => "image/png",
    "gif" => "image/gif",
    "webp" => "image/webp",
    "avif" => "image/avif",
    "bmp" => "image/bmp",
    "svg" => "image/svg+xml",
    _ => "application/octet-stream",
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_round_trip_preserves_bytes_and_metadata() {
    let bytes: Vec<u8> = (0..=255u8).cycle().take(1031).collect();
    let payload = PhotoPayload::new(bytes, "beach.png", "image/png");

    let text = encode(&payload);
    assert!(text.starts_with("data:image/png;base64,"));

    let decoded = decode(&text, "beach.png", "image/png").unwrap();
    assert_eq!(decoded, payload);
  }

  #[test]
  fn test_empty_payload() {
    let payload = PhotoPayload::new(Vec::new(), "empty.jpg", "image/jpeg");
    let decoded = decode(&encode(&payload), "empty.jpg", "image/jpeg").unwrap();
    assert!(decoded.bytes.is_empty());
  }

  #[test]
  fn test_encode_is_deterministic() {
    let payload = PhotoPayload::new(b"same bytes".to_vec(), "a.jpg", "image/jpeg");
    assert_eq!(encode(&payload), encode(&payload));
  }

  #[test]
  fn test_bare_base64_body() {
    let decoded = decode("aGVsbG8=", "a.txt", "text/plain").unwrap();
    assert_eq!(decoded.bytes, b"hello");
  }

  #[test]
  fn test_corrupt_body_is_decode_error() {
    let err = decode("data:image/png;base64,@@not base64@@", "a.png", "image/png").unwrap_err();
    assert!(matches!(err, DecodeError::InvalidBase64(_)));
  }

  #[test]
  fn test_missing_separator() {
    let err = decode("data:image/png;base64", "a.png", "image/png").unwrap_err();
    assert_eq!(err, DecodeError::MissingSeparator);
  }

  #[test]
  fn test_non_base64_header() {
    let err = decode("data:text/plain,hello", "a.txt", "text/plain").unwrap_err();
    assert!(matches!(err, DecodeError::NotBase64(_)));
  }

  #[test]
  fn test_mime_from_name() {
    assert_eq!(mime_from_name("IMG_001.JPG"), "image/jpeg");
    assert_eq!(mime_from_name("x.webp"), "image/webp");
    assert_eq!(mime_from_name("noext"), "application/octet-stream");
  }
}
