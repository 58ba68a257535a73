//! Named, request-keyed response cache backed by SQLite.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use super::http::{Request, Response};

/// A stored response and when it was stored.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  pub cached_at: DateTime<Utc>,
}

/// Trait for response cache backends.
///
/// Entries live in named regions; a region exists once something is put in it.
pub trait ResponseCache: Send + Sync {
  /// Look up a key in one region.
  fn get(&self, cache_name: &str, key: &str) -> Result<Option<CachedResponse>>;

  /// Look up a key in every region, newest copy first.
  fn get_any(&self, key: &str) -> Result<Option<CachedResponse>>;

  /// Store or replace a response.
  fn put(&self, cache_name: &str, key: &str, url: &str, response: &Response) -> Result<()>;

  /// Names of all regions holding at least one entry.
  fn cache_names(&self) -> Result<Vec<String>>;

  /// Drop a whole region. Returns false if it did not exist.
  fn delete_cache(&self, cache_name: &str) -> Result<bool>;

  /// Read a worker setting stored next to the regions.
  fn setting(&self, name: &str) -> Result<Option<String>>;

  /// Store or replace a worker setting.
  fn set_setting(&self, name: &str, value: &str) -> Result<()>;
}

/// Stable key for a request: SHA-256 of method and absolute URL.
pub fn request_key(request: &Request) -> String {
  let input = format!("{} {}", request.method, request.url);

  let mut hasher = Sha256::new();
  hasher.update(input.as_bytes());
  hex::encode(hasher.finalize())
}

/// SQLite-based response cache.
pub struct SqliteResponseCache {
  conn: Mutex<Connection>,
}

/// Schema for cached responses.
const RESPONSE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS response_cache (
    cache_name TEXT NOT NULL,
    request_key TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_name, request_key)
);

CREATE INDEX IF NOT EXISTS idx_response_cache_key ON response_cache(request_key);

CREATE TABLE IF NOT EXISTS worker_settings (
    name TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

impl SqliteResponseCache {
  /// Open or create the cache database at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;
    conn
      .busy_timeout(Duration::from_secs(5))
      .map_err(|e| eyre!("Failed to set busy timeout: {}", e))?;

    Self::with_connection(conn)
  }

  pub fn in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(RESPONSE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lookup(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Option<CachedResponse>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(u16, String, Vec<u8>, String)> = conn
      .query_row(sql, args, |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .optional()
      .map_err(|e| eyre!("Failed to query response cache: {}", e))?;

    match row {
      Some((status, headers, body, cached_at)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize cached headers: {}", e))?;
        Ok(Some(CachedResponse {
          response: Response {
            status,
            headers,
            body,
          },
          cached_at: parse_datetime(&cached_at)?,
        }))
      }
      None => Ok(None),
    }
  }
}

impl ResponseCache for SqliteResponseCache {
  fn get(&self, cache_name: &str, key: &str) -> Result<Option<CachedResponse>> {
    self.lookup(
      "SELECT status, headers, body, cached_at FROM response_cache
       WHERE cache_name = ? AND request_key = ?",
      params![cache_name, key],
    )
  }

  fn get_any(&self, key: &str) -> Result<Option<CachedResponse>> {
    self.lookup(
      "SELECT status, headers, body, cached_at FROM response_cache
       WHERE request_key = ?
       ORDER BY cached_at DESC, rowid DESC
       LIMIT 1",
      params![key],
    )
  }

  fn put(&self, cache_name: &str, key: &str, url: &str, response: &Response) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO response_cache (cache_name, request_key, url, status, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
        params![cache_name, key, url, response.status, headers, response.body],
      )
      .map_err(|e| eyre!("Failed to store response: {}", e))?;

    Ok(())
  }

  fn cache_names(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT DISTINCT cache_name FROM response_cache ORDER BY cache_name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache name: {}", e))?;

    Ok(names)
  }

  fn delete_cache(&self, cache_name: &str) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let removed = conn
      .execute(
        "DELETE FROM response_cache WHERE cache_name = ?",
        params![cache_name],
      )
      .map_err(|e| eyre!("Failed to delete cache {}: {}", cache_name, e))?;

    Ok(removed > 0)
  }

  fn setting(&self, name: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT value FROM worker_settings WHERE name = ?",
        params![name],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read setting {}: {}", name, e))
  }

  fn set_setting(&self, name: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO worker_settings (name, value) VALUES (?, ?)",
        params![name, value],
      )
      .map_err(|e| eyre!("Failed to store setting {}: {}", name, e))?;

    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::Method;
  use url::Url;

  fn get(url: &str) -> Request {
    Request::get(Url::parse(url).unwrap())
  }

  #[test]
  fn test_request_key_distinguishes_method_and_query() {
    let a = get("https://api.example/v1/stories?location=1");
    let b = get("https://api.example/v1/stories?location=0");
    let head = Request::new(Method::HEAD, a.url.clone());

    assert_eq!(request_key(&a), request_key(&a.clone()));
    assert_ne!(request_key(&a), request_key(&b));
    assert_ne!(request_key(&a), request_key(&head));
    assert_eq!(request_key(&a).len(), 64);
  }

  #[test]
  fn test_put_then_get_in_region() {
    let cache = SqliteResponseCache::in_memory().unwrap();
    let response = Response::json(200, &serde_json::json!({"error": false}));

    cache.put("api-v1", "k1", "https://x/stories", &response).unwrap();

    let hit = cache.get("api-v1", "k1").unwrap().unwrap();
    assert_eq!(hit.response, response);
    assert_eq!(
      hit.response.headers,
      vec![("content-type".to_string(), "application/json".to_string())]
    );
    assert!(cache.get("images-v1", "k1").unwrap().is_none());
    assert!(cache.get_any("k1").unwrap().is_some());
  }

  #[test]
  fn test_put_replaces_existing_copy() {
    let cache = SqliteResponseCache::in_memory().unwrap();
    cache.put("api-v1", "k1", "u", &Response::new(200, "old")).unwrap();
    cache.put("api-v1", "k1", "u", &Response::new(200, "new")).unwrap();

    assert_eq!(cache.get("api-v1", "k1").unwrap().unwrap().response.text(), "new");
  }

  #[test]
  fn test_delete_cache_only_touches_named_region() {
    let cache = SqliteResponseCache::in_memory().unwrap();
    cache.put("api-v1", "k1", "u", &Response::new(200, "a")).unwrap();
    cache.put("images-v1", "k2", "u", &Response::new(200, "b")).unwrap();

    assert_eq!(cache.cache_names().unwrap(), vec!["api-v1", "images-v1"]);
    assert!(cache.delete_cache("api-v1").unwrap());
    assert!(!cache.delete_cache("api-v1").unwrap());
    assert_eq!(cache.cache_names().unwrap(), vec!["images-v1"]);
    assert!(cache.get("images-v1", "k2").unwrap().is_some());
  }

  #[test]
  fn test_settings_are_separate_from_regions() {
    let cache = SqliteResponseCache::in_memory().unwrap();
    assert_eq!(cache.setting("active").unwrap(), None);

    cache.set_setting("active", "one").unwrap();
    cache.set_setting("active", "two").unwrap();
    assert_eq!(cache.setting("active").unwrap().as_deref(), Some("two"));
    assert!(cache.cache_names().unwrap().is_empty());
  }
}
