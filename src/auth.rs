//! Bearer credential lookup.

use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Supplies the bearer token attached to outgoing writes.
pub trait CredentialSource: Send + Sync {
  /// The current token, or None when the user is not logged in.
  fn token(&self) -> Option<String>;
}

/// Token persisted by `storysync login`.
#[derive(Debug, Clone)]
pub struct TokenStore {
  path: PathBuf,
}

impl TokenStore {
  pub fn new(data_dir: &Path) -> Self {
    Self {
      path: data_dir.join("token"),
    }
  }

  pub fn load(&self) -> Option<String> {
    std::fs::read_to_string(&self.path)
      .ok()
      .map(|t| t.trim().to_string())
      .filter(|t| !t.is_empty())
  }

  pub fn save(&self, token: &str) -> Result<()> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create data directory: {}", e))?;
    }
    std::fs::write(&self.path, token)
      .map_err(|e| eyre!("Failed to write token file {}: {}", self.path.display(), e))
  }

  /// Forget the stored token. Missing file is fine.
  pub fn clear(&self) -> Result<()> {
    match std::fs::remove_file(&self.path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(eyre!("Failed to remove token file: {}", e)),
    }
  }
}

/// STORYSYNC_TOKEN if set, otherwise the stored login token.
///
/// Read on every call so a login in another process is picked up by a
/// running `watch`.
pub struct StoredCredentials {
  tokens: TokenStore,
}

impl StoredCredentials {
  pub fn new(tokens: TokenStore) -> Self {
    Self { tokens }
  }
}

impl CredentialSource for StoredCredentials {
  fn token(&self) -> Option<String> {
    Config::env_token().or_else(|| self.tokens.load())
  }
}
