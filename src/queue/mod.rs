//! Durable queue of story submissions that have not reached the server yet.
//!
//! Entries are added by the submission flow when the network is unavailable
//! and drained by the sync engine. The SQLite file is the only copy of the
//! queue; nothing here keeps entries in memory between calls.

mod store;
mod types;

pub use store::{QueueStore, SqliteQueueStore};
pub use types::{Coordinates, NewQueueEntry, QueueEntry};
