//! Which caching policy applies to a request.

use super::http::{Destination, Request};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "avif", "bmp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePolicy {
  /// Writes go straight to the network and are never cached
  Passthrough,
  /// Story listing: network first, then cached copy, then an empty listing
  StoryList,
  /// Images: cached copy first, network on miss
  Image,
  /// Any other read: network first, then cached copy
  NetworkFirst,
}

/// Classify a request. Checks run in precedence order: method, story list, image.
pub fn classify(request: &Request) -> RoutePolicy {
  if !request.is_read() {
    return RoutePolicy::Passthrough;
  }
  if is_story_list(request) {
    return RoutePolicy::StoryList;
  }
  if is_image(request) {
    return RoutePolicy::Image;
  }
  RoutePolicy::NetworkFirst
}

fn is_story_list(request: &Request) -> bool {
  request.url.path().trim_end_matches('/').ends_with("/stories")
}

fn is_image(request: &Request) -> bool {
  if request.destination == Destination::Image {
    return true;
  }
  request
    .url
    .path()
    .rsplit_once('.')
    .map(|(_, ext)| {
      let ext = ext.to_ascii_lowercase();
      IMAGE_EXTENSIONS.contains(&ext.as_str())
    })
    .unwrap_or(false)
}
