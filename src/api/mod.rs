mod client;
mod types;

pub use client::{ApiError, StoryClient, StoryTransport};
pub use types::{ApiMessage, ListStoriesResponse, PushKeys, PushSubscription, StorySubmission};

#[cfg(test)]
pub mod testing;
