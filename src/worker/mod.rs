//! The network boundary cache.
//!
//! Sits between every view and the network. Story listings are network
//! first with a cached fallback, images are cache first, other reads fall
//! back to any cached copy and writes always go to the network.

mod boundary;
mod cache;
mod clients;
mod http;
mod messages;
mod policy;
mod push;

pub use boundary::{BoundaryCache, ServedFrom, SYNC_TAG};
pub use cache::SqliteResponseCache;
pub use clients::{ClickOutcome, ClientRegistry};
pub use http::{Destination, Fetch, FetchError, FormPart, HttpFetcher, Request, Response};
pub use messages::{ClientMessage, WorkerMessage};

#[cfg(test)]
pub use http::Body;
