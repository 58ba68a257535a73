//! Queue storage trait and SQLite implementation.

use chrono::{DateTime, SecondsFormat, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, error};

use super::types::{Coordinates, NewQueueEntry, QueueEntry};

/// Trait for queue storage backends.
///
/// Implementations must be safe to share between the foreground command path
/// and background timers without extra locking by the caller.
pub trait QueueStore: Send + Sync {
  /// Persist a new entry and return its assigned id.
  fn add(&self, entry: NewQueueEntry) -> Result<i64>;

  /// All entries, oldest first, regardless of sync state.
  fn get_all(&self) -> Result<Vec<QueueEntry>>;

  /// Entries with `synced = false`, oldest first.
  fn get_unsynced(&self) -> Result<Vec<QueueEntry>>;

  /// Set the synced flag and stamp `synced_at`. Returns false if the id is gone.
  fn update(&self, id: i64, synced: bool) -> Result<bool>;

  /// Remove an entry. Deleting a missing id is not an error.
  fn delete(&self, id: i64) -> Result<()>;

  /// Remove every entry.
  fn clear(&self) -> Result<()>;

  /// Number of entries still waiting to be sent.
  fn count_unsynced(&self) -> Result<usize> {
    Ok(self.get_unsynced()?.len())
  }
}

/// SQLite-based queue storage.
pub struct SqliteQueueStore {
  conn: Mutex<Connection>,
}

/// Schema for the queue table.
const QUEUE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS offline_stories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    description TEXT NOT NULL,
    photo_encoded TEXT NOT NULL,
    photo_name TEXT NOT NULL,
    photo_type TEXT NOT NULL,
    lat REAL,
    lon REAL,
    created_at TEXT NOT NULL,
    synced INTEGER NOT NULL DEFAULT 0,
    synced_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_offline_stories_synced
    ON offline_stories(synced, id);
"#;

const SELECT_COLUMNS: &str = "SELECT id, description, photo_encoded, photo_name, photo_type, \
   lat, lon, created_at, synced, synced_at FROM offline_stories";

impl SqliteQueueStore {
  /// Open or create the queue database at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create queue directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open queue database at {}: {}", path.display(), e))?;

    // Another process (e.g. `storysync watch`) may hold a write lock briefly.
    conn
      .busy_timeout(Duration::from_secs(5))
      .map_err(|e| eyre!("Failed to set busy timeout: {}", e))?;

    Self::with_connection(conn)
  }

  /// Open a private in-memory queue.
  pub fn in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory queue: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Run database migrations for the queue table.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(QUEUE_SCHEMA)
      .map_err(|e| eyre!("Failed to run queue migrations: {}", e))?;

    Ok(())
  }

  fn query_entries(&self, sql: &str) -> Result<Vec<QueueEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(sql)
      .map_err(|e| eyre!("Failed to prepare queue query: {}", e))?;

    let rows = stmt
      .query_map([], read_row)
      .map_err(|e| eyre!("Failed to query queue: {}", e))?;

    // One unreadable row must not hide the rest of the queue
    let mut entries = Vec::new();
    for row in rows {
      let raw = match row {
        Ok(raw) => raw,
        Err(e) => {
          error!(error = %e, "skipping unreadable queue row");
          continue;
        }
      };
      let id = raw.id;
      match raw.into_entry() {
        Ok(entry) => entries.push(entry),
        Err(e) => error!(id, error = %e, "skipping malformed queue row"),
      }
    }
    Ok(entries)
  }
}

impl QueueStore for SqliteQueueStore {
  fn add(&self, entry: NewQueueEntry) -> Result<i64> {
    if entry.description.trim().is_empty() {
      return Err(eyre!("Story description must not be empty"));
    }

    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let (lat, lon) = match entry.location {
      Some(c) => (Some(c.lat), Some(c.lon)),
      None => (None, None),
    };

    conn
      .execute(
        "INSERT INTO offline_stories
           (description, photo_encoded, photo_name, photo_type, lat, lon, created_at, synced)
         VALUES (?, ?, ?, ?, ?, ?, ?, 0)",
        params![
          entry.description,
          entry.photo_encoded,
          entry.photo_name,
          entry.photo_type,
          lat,
          lon,
          format_datetime(Utc::now()),
        ],
      )
      .map_err(|e| eyre!("Failed to add story to queue: {}", e))?;

    let id = conn.last_insert_rowid();
    debug!(id, "queued story");
    Ok(id)
  }

  fn get_all(&self) -> Result<Vec<QueueEntry>> {
    self.query_entries(&format!("{} ORDER BY id", SELECT_COLUMNS))
  }

  fn get_unsynced(&self) -> Result<Vec<QueueEntry>> {
    self.query_entries(&format!("{} WHERE synced = 0 ORDER BY id", SELECT_COLUMNS))
  }

  fn update(&self, id: i64, synced: bool) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let changed = conn
      .execute(
        "UPDATE offline_stories SET synced = ?, synced_at = ? WHERE id = ?",
        params![synced, format_datetime(Utc::now()), id],
      )
      .map_err(|e| eyre!("Failed to update queued story {}: {}", id, e))?;

    Ok(changed > 0)
  }

  fn delete(&self, id: i64) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM offline_stories WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to delete queued story {}: {}", id, e))?;

    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM offline_stories", [])
      .map_err(|e| eyre!("Failed to clear queue: {}", e))?;

    Ok(())
  }

  fn count_unsynced(&self) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let count: Option<i64> = conn
      .query_row(
        "SELECT COUNT(*) FROM offline_stories WHERE synced = 0",
        [],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to count queue: {}", e))?;

    Ok(count.unwrap_or(0) as usize)
  }
}

/// Column values as stored, before timestamp parsing.
struct RawRow {
  id: i64,
  description: String,
  photo_encoded: String,
  photo_name: String,
  photo_type: String,
  lat: Option<f64>,
  lon: Option<f64>,
  created_at: String,
  synced: bool,
  synced_at: Option<String>,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
  Ok(RawRow {
    id: row.get(0)?,
    description: row.get(1)?,
    photo_encoded: row.get(2)?,
    photo_name: row.get(3)?,
    photo_type: row.get(4)?,
    lat: row.get(5)?,
    lon: row.get(6)?,
    created_at: row.get(7)?,
    synced: row.get(8)?,
    synced_at: row.get(9)?,
  })
}

impl RawRow {
  fn into_entry(self) -> Result<QueueEntry> {
    Ok(QueueEntry {
      id: self.id,
      description: self.description,
      photo_encoded: self.photo_encoded,
      photo_name: self.photo_name,
      photo_type: self.photo_type,
      location: Coordinates::from_parts(self.lat, self.lon),
      created_at: parse_datetime(&self.created_at)?,
      synced: self.synced,
      synced_at: self.synced_at.as_deref().map(parse_datetime).transpose()?,
    })
  }
}

fn format_datetime(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
