//! Reconciliation of the offline queue with the story API.
//!
//! A pass drains every unsynced entry, one at a time, in queue order.
//! Successful uploads are deleted; failed ones stay queued with a fresh
//! `synced_at` so the next pass retries them. Delivery is at-least-once: a
//! crash between the server accepting a story and the local delete sends it
//! again on the next pass.

mod engine;
mod types;

pub use engine::SyncEngine;
pub use types::{SyncOutcome, SyncTrigger};
