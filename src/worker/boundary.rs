//! The boundary cache: applies a caching policy to every outgoing request.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::notify::{Notification, Notifier};

use super::cache::{request_key, CachedResponse, ResponseCache};
use super::clients::{ClickOutcome, ClientRegistry};
use super::http::{Fetch, FetchError, Request, Response};
use super::messages::{ClientMessage, WorkerMessage};
use super::policy::{classify, RoutePolicy};
use super::push::notification_from_push;

/// Background sync tag the worker reacts to.
pub const SYNC_TAG: &str = "sync-offline-stories";

/// Setting holding the active [`CacheConfig`] as JSON.
const ACTIVE_VERSION: &str = "active_version";

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
  Network,
  Cache,
  /// Built locally because the network failed and nothing was cached
  Synthesized,
}

/// A response plus metadata about its source.
#[derive(Debug, Clone)]
pub struct Served {
  pub response: Response,
  pub source: ServedFrom,
  /// When the copy was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl Served {
  fn network(response: Response) -> Self {
    Self {
      response,
      source: ServedFrom::Network,
      cached_at: None,
    }
  }

  fn cached(response: Response, cached_at: DateTime<Utc>) -> Self {
    Self {
      response,
      source: ServedFrom::Cache,
      cached_at: Some(cached_at),
    }
  }

  fn synthesized(response: Response) -> Self {
    Self {
      response,
      source: ServedFrom::Synthesized,
      cached_at: None,
    }
  }
}

/// Active version plus an update waiting to take over.
struct Lifecycle {
  active: CacheConfig,
  waiting: Option<CacheConfig>,
}

/// Intercepts requests and owns the response cache regions.
///
/// Talks to foreground code only through [`WorkerMessage`]s in and
/// [`ClientMessage`]s out; it never sees the queue or the credential.
pub struct BoundaryCache {
  fetcher: Arc<dyn Fetch>,
  cache: Arc<dyn ResponseCache>,
  clients: Arc<ClientRegistry>,
  notifier: Arc<dyn Notifier>,
  lifecycle: Mutex<Lifecycle>,
}

impl BoundaryCache {
  /// Create a worker for `config`.
  ///
  /// On first start `config` is activated right away. When an earlier,
  /// different version is still recorded as active it keeps serving and
  /// `config` waits for a `SKIP_WAITING` message.
  pub fn new(
    fetcher: Arc<dyn Fetch>,
    cache: Arc<dyn ResponseCache>,
    clients: Arc<ClientRegistry>,
    notifier: Arc<dyn Notifier>,
    config: CacheConfig,
  ) -> Self {
    let previous = stored_version(cache.as_ref());
    let worker = Self {
      fetcher,
      cache,
      clients,
      notifier,
      lifecycle: Mutex::new(Lifecycle {
        active: previous.clone().unwrap_or_else(|| config.clone()),
        waiting: None,
      }),
    };
    match previous {
      Some(active) if active != config => worker.install(config),
      _ => worker.activate(config),
    }
    worker
  }

  pub fn clients(&self) -> &Arc<ClientRegistry> {
    &self.clients
  }

  /// Cache names of the active version: (api, images).
  pub fn active_caches(&self) -> (String, String) {
    let lifecycle = self.lifecycle();
    (
      lifecycle.active.api_cache_name(),
      lifecycle.active.image_cache_name(),
    )
  }

  /// Handle one outgoing request.
  pub async fn handle_fetch(&self, request: &Request) -> Result<Served, FetchError> {
    let policy = classify(request);
    debug!(method = %request.method, url = %request.url, ?policy, "intercepted request");

    match policy {
      RoutePolicy::Passthrough => self.passthrough(request).await,
      RoutePolicy::StoryList => Ok(self.story_list(request).await),
      RoutePolicy::Image => self.cache_first(request).await,
      RoutePolicy::NetworkFirst => self.network_first(request).await,
    }
  }

  /// Writes always hit the network. A network failure becomes a 503 the
  /// caller can parse; a request that could not be built is returned as is.
  async fn passthrough(&self, request: &Request) -> Result<Served, FetchError> {
    match self.fetcher.fetch(request).await {
      Ok(response) => Ok(Served::network(response)),
      Err(FetchError::Network(e)) => {
        warn!(url = %request.url, error = %e, "write failed while offline");
        Ok(Served::synthesized(Response::json(
          503,
          &json!({
            "error": true,
            "message": "Offline - request will be retried when back online",
            "offline": true,
          }),
        )))
      }
      Err(e) => Err(e),
    }
  }

  /// Network first; on failure the cached listing, else an empty one.
  async fn story_list(&self, request: &Request) -> Served {
    let (api_cache, _) = self.active_caches();
    let key = request_key(request);

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        if response.is_success() {
          self.store(&api_cache, &key, request, &response);
        }
        Served::network(response)
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "story list offline, trying cache");
        if let Some(hit) = self.lookup(Some(&api_cache), &key) {
          return Served::cached(hit.response, hit.cached_at);
        }
        Served::synthesized(Response::json(
          200,
          &json!({
            "error": true,
            "message": "Offline - no cached stories available",
            "listStory": [],
          }),
        ))
      }
    }
  }

  /// Cached image if present, otherwise fetch and remember it.
  async fn cache_first(&self, request: &Request) -> Result<Served, FetchError> {
    let (_, image_cache) = self.active_caches();
    let key = request_key(request);

    if let Some(hit) = self.lookup(Some(&image_cache), &key) {
      return Ok(Served::cached(hit.response, hit.cached_at));
    }

    let response = self.fetcher.fetch(request).await?;
    if response.is_success() {
      self.store(&image_cache, &key, request, &response);
    }
    Ok(Served::network(response))
  }

  /// Network first, any cached copy on failure, otherwise the error.
  async fn network_first(&self, request: &Request) -> Result<Served, FetchError> {
    match self.fetcher.fetch(request).await {
      Ok(response) => Ok(Served::network(response)),
      Err(e) => match self.lookup(None, &request_key(request)) {
        Some(hit) => Ok(Served::cached(hit.response, hit.cached_at)),
        None => Err(e),
      },
    }
  }

  /// Cache read; a broken cache counts as a miss.
  fn lookup(&self, cache_name: Option<&str>, key: &str) -> Option<CachedResponse> {
    let result = match cache_name {
      Some(name) => self.cache.get(name, key),
      None => self.cache.get_any(key),
    };
    result.unwrap_or_else(|e| {
      warn!(error = %e, "response cache read failed");
      None
    })
  }

  /// Cache write; failures are logged and the live response still returned.
  fn store(&self, cache_name: &str, key: &str, request: &Request, response: &Response) {
    if let Err(e) = self.cache.put(cache_name, key, request.url.as_str(), response) {
      warn!(cache = cache_name, error = %e, "response cache write failed");
    }
  }

  /// Install a new version. It waits until a `SKIP_WAITING` message.
  pub fn install(&self, config: CacheConfig) {
    let mut lifecycle = self.lifecycle();
    info!(
      api = %config.api_cache_name(),
      images = %config.image_cache_name(),
      "new version waiting"
    );
    lifecycle.waiting = Some(config);
  }

  /// True when an installed version waits for activation.
  pub fn has_waiting(&self) -> bool {
    self.lifecycle().waiting.is_some()
  }

  /// Make `config` the active version and drop regions it no longer uses.
  fn activate(&self, config: CacheConfig) {
    let current = [config.api_cache_name(), config.image_cache_name()];
    let stale = self.clear_family(&config.prefix, &current);

    let version = format!("api-v{}/images-v{}", config.api_version, config.image_version);
    info!(%version, removed = ?stale, "version activated");

    match serde_json::to_string(&config) {
      Ok(json) => {
        if let Err(e) = self.cache.set_setting(ACTIVE_VERSION, &json) {
          warn!(error = %e, "failed to record active version");
        }
      }
      Err(e) => warn!(error = %e, "failed to encode active version"),
    }

    self.lifecycle().active = config;
    self.clients.post_all(ClientMessage::Activated { version });
  }

  /// Delete every region starting with `prefix` except those in `keep`.
  fn clear_family(&self, prefix: &str, keep: &[String]) -> Vec<String> {
    let names = match self.cache.cache_names() {
      Ok(names) => names,
      Err(e) => {
        warn!(error = %e, "could not list cache regions");
        return Vec::new();
      }
    };

    let mut removed = Vec::new();
    for name in names {
      if !name.starts_with(prefix) || keep.contains(&name) {
        continue;
      }
      match self.cache.delete_cache(&name) {
        Ok(_) => removed.push(name),
        Err(e) => warn!(cache = %name, error = %e, "failed to delete cache region"),
      }
    }
    removed
  }

  /// Handle a maintenance message from a foreground client.
  pub fn handle_message(&self, message: WorkerMessage) {
    match message {
      WorkerMessage::SkipWaiting => {
        let waiting = self.lifecycle().waiting.take();
        match waiting {
          Some(config) => self.activate(config),
          None => debug!("SKIP_WAITING with nothing waiting"),
        }
      }
      WorkerMessage::ClearCache { prefix } => {
        let prefix = prefix.unwrap_or_else(|| self.lifecycle().active.prefix.clone());
        let removed = self.clear_family(&prefix, &[]);
        info!(%prefix, ?removed, "caches cleared");
        self.clients.post_all(ClientMessage::CacheCleared { removed });
      }
    }
  }

  /// Platform signal that deferred work can be retried.
  ///
  /// The worker cannot sync itself; it asks every client to do it.
  pub fn on_background_sync(&self, tag: &str) -> usize {
    if tag != SYNC_TAG {
      debug!(tag, "ignoring unknown sync tag");
      return 0;
    }
    let reached = self.clients.post_all(ClientMessage::SyncOfflineStories);
    info!(clients = reached, "asked clients to sync offline stories");
    reached
  }

  /// Show a notification for an incoming push.
  pub fn on_push(&self, data: Option<&[u8]>) -> Notification {
    let notification = notification_from_push(data);
    self.notifier.notify(notification.clone());
    notification
  }

  /// Route to the view a notification points at.
  pub fn on_notification_click(&self, notification: &Notification) -> ClickOutcome {
    let target = notification.target.as_deref().unwrap_or("/#/");
    self.clients.focus_or_open(target)
  }

  /// Process foreground messages until every sender is dropped.
  pub fn spawn(self: Arc<Self>, mut rx: mpsc::Receiver<WorkerMessage>) -> JoinHandle<()> {
    tokio::spawn(async move {
      while let Some(message) = rx.recv().await {
        self.handle_message(message);
      }
      debug!("worker message channel closed");
    })
  }

  fn lifecycle(&self) -> std::sync::MutexGuard<'_, Lifecycle> {
    self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Foreground code fetches through the worker, so every request gets a policy.
#[async_trait]
impl Fetch for BoundaryCache {
  async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
    self.handle_fetch(request).await.map(|served| served.response)
  }
}

fn stored_version(cache: &dyn ResponseCache) -> Option<CacheConfig> {
  let json = match cache.setting(ACTIVE_VERSION) {
    Ok(json) => json?,
    Err(e) => {
      warn!(error = %e, "could not read active version");
      return None;
    }
  };
  serde_json::from_str(&json)
    .map_err(|e| warn!(error = %e, "ignoring unreadable active version"))
    .ok()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::notify::testing::RecordingNotifier;
  use crate::worker::cache::SqliteResponseCache;
  use crate::worker::http::Destination;
  use async_trait::async_trait;
  use reqwest::Method;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
  use url::Url;

  /// Serves canned responses by URL and counts calls.
  #[derive(Default)]
  struct FakeNetwork {
    routes: Mutex<HashMap<String, Response>>,
    down: AtomicBool,
    malformed: AtomicBool,
    calls: AtomicUsize,
  }

  impl FakeNetwork {
    fn route(&self, url: &str, response: Response) {
      self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    fn set_down(&self, down: bool) {
      self.down.store(down, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl Fetch for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if self.down.load(Ordering::SeqCst) {
        return Err(FetchError::Network("offline".to_string()));
      }
      if self.malformed.load(Ordering::SeqCst) {
        return Err(FetchError::InvalidRequest("bad MIME type".to_string()));
      }
      Ok(
        self
          .routes
          .lock()
          .unwrap()
          .get(request.url.as_str())
          .cloned()
          .unwrap_or_else(|| Response::new(404, "not found")),
      )
    }
  }

  const STORIES: &str = "https://api.example/v1/stories?location=1";
  const PHOTO: &str = "https://api.example/images/stories/photo-1.jpg";

  struct Harness {
    worker: BoundaryCache,
    network: Arc<FakeNetwork>,
    cache: Arc<SqliteResponseCache>,
    notifier: Arc<RecordingNotifier>,
  }

  fn harness() -> Harness {
    let network = Arc::new(FakeNetwork::default());
    let cache = Arc::new(SqliteResponseCache::in_memory().unwrap());
    let notifier = Arc::new(RecordingNotifier::default());
    let worker = BoundaryCache::new(
      network.clone(),
      cache.clone(),
      Arc::new(ClientRegistry::new()),
      notifier.clone(),
      CacheConfig::default(),
    );
    Harness {
      worker,
      network,
      cache,
      notifier,
    }
  }

  fn get(url: &str) -> Request {
    Request::get(Url::parse(url).unwrap())
  }

  fn listing(ids: &[&str]) -> Response {
    let stories: Vec<_> = ids
      .iter()
      .map(|id| json!({"id": id, "name": "n", "description": "d", "photoUrl": "", "createdAt": ""}))
      .collect();
    Response::json(200, &json!({"error": false, "message": "ok", "listStory": stories}))
  }

  #[tokio::test]
  async fn test_story_list_network_success_refreshes_cache() {
    let h = harness();
    h.network.route(STORIES, listing(&["a"]));
    let first = h.worker.handle_fetch(&get(STORIES)).await.unwrap();
    assert_eq!(first.source, ServedFrom::Network);

    h.network.route(STORIES, listing(&["a", "b"]));
    h.worker.handle_fetch(&get(STORIES)).await.unwrap();

    let key = request_key(&get(STORIES));
    let stored = h.cache.get("storysync-api-v3", &key).unwrap().unwrap();
    assert_eq!(stored.response, listing(&["a", "b"]));
  }

  #[tokio::test]
  async fn test_story_list_offline_serves_cached_copy() {
    let h = harness();
    h.network.route(STORIES, listing(&["a"]));
    h.worker.handle_fetch(&get(STORIES)).await.unwrap();

    h.network.set_down(true);
    let served = h.worker.handle_fetch(&get(STORIES)).await.unwrap();
    assert_eq!(served.source, ServedFrom::Cache);
    assert!(served.cached_at.is_some());
    assert_eq!(served.response, listing(&["a"]));

    // A different query string is a different key
    let other = h
      .worker
      .handle_fetch(&get("https://api.example/v1/stories?location=0"))
      .await
      .unwrap();
    assert_eq!(other.source, ServedFrom::Synthesized);
  }

  #[tokio::test]
  async fn test_story_list_offline_without_cache_is_empty_listing() {
    let h = harness();
    h.network.set_down(true);

    let served = h.worker.handle_fetch(&get(STORIES)).await.unwrap();
    assert_eq!(served.source, ServedFrom::Synthesized);
    assert_eq!(served.response.status, 200);

    let body: crate::api::ListStoriesResponse = serde_json::from_slice(&served.response.body).unwrap();
    assert!(body.error);
    assert!(body.list_story.is_empty());
  }

  #[tokio::test]
  async fn test_story_list_error_status_is_not_cached() {
    let h = harness();
    h.network.route(STORIES, listing(&["good"]));
    h.worker.handle_fetch(&get(STORIES)).await.unwrap();

    h.network.route(STORIES, Response::new(401, "unauthorized"));
    let served = h.worker.handle_fetch(&get(STORIES)).await.unwrap();
    assert_eq!(served.response.status, 401);

    let key = request_key(&get(STORIES));
    let stored = h.cache.get("storysync-api-v3", &key).unwrap().unwrap();
    assert_eq!(stored.response, listing(&["good"]));
  }

  #[tokio::test]
  async fn test_image_cache_first_skips_network_once_cached() {
    let h = harness();
    h.network.route(PHOTO, Response::new(200, vec![0xFF, 0xD8, 0xFF, 0xE0]));

    let online = h.worker.handle_fetch(&get(PHOTO)).await.unwrap();
    assert_eq!(online.source, ServedFrom::Network);
    assert_eq!(h.network.calls(), 1);

    h.network.set_down(true);
    let first = h.worker.handle_fetch(&get(PHOTO)).await.unwrap();
    let second = h.worker.handle_fetch(&get(PHOTO)).await.unwrap();

    assert_eq!(first.source, ServedFrom::Cache);
    assert_eq!(first.response.body, vec![0xFF, 0xD8, 0xFF, 0xE0]);
    assert_eq!(first.response, second.response);
    assert_eq!(h.network.calls(), 1);
  }

  #[tokio::test]
  async fn test_image_by_destination_goes_to_image_region() {
    let h = harness();
    let tile = "https://tile.example/5/10/12";
    h.network.route(tile, Response::new(200, "tile"));

    let request = get(tile).with_destination(Destination::Image);
    h.worker.handle_fetch(&request).await.unwrap();

    let stored = h.cache.get("storysync-images-v1", &request_key(&request)).unwrap();
    assert!(stored.is_some());
  }

  #[tokio::test]
  async fn test_image_miss_while_offline_propagates_error() {
    let h = harness();
    h.network.set_down(true);
    let err = h.worker.handle_fetch(&get(PHOTO)).await.unwrap_err();
    assert!(matches!(err, FetchError::Network(_)));
  }

  #[tokio::test]
  async fn test_write_failure_is_structured_offline_response() {
    let h = harness();
    h.network.set_down(true);
    let post = Request::new(Method::POST, Url::parse("https://api.example/v1/stories").unwrap());

    let served = h.worker.handle_fetch(&post).await.unwrap();
    assert_eq!(served.source, ServedFrom::Synthesized);
    assert_eq!(served.response.status, 503);
    let body: serde_json::Value = serde_json::from_slice(&served.response.body).unwrap();
    assert_eq!(body["offline"], json!(true));
    assert!(h.cache.cache_names().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_write_that_cannot_be_built_is_not_reported_offline() {
    let h = harness();
    h.network.malformed.store(true, Ordering::SeqCst);
    let post = Request::new(Method::POST, Url::parse("https://api.example/v1/stories").unwrap());

    let err = h.worker.handle_fetch(&post).await.unwrap_err();
    assert!(matches!(err, FetchError::InvalidRequest(_)));
  }

  #[tokio::test]
  async fn test_fetch_through_worker_applies_policies() {
    let h = harness();
    h.network.route(STORIES, listing(&["a"]));
    let fetcher: &dyn Fetch = &h.worker;
    fetcher.fetch(&get(STORIES)).await.unwrap();

    h.network.set_down(true);
    assert_eq!(fetcher.fetch(&get(STORIES)).await.unwrap(), listing(&["a"]));

    let post = Request::new(Method::POST, Url::parse("https://api.example/v1/stories").unwrap());
    assert_eq!(fetcher.fetch(&post).await.unwrap().status, 503);
  }

  #[tokio::test]
  async fn test_writes_are_never_cached() {
    let h = harness();
    let url = "https://api.example/v1/stories";
    h.network.route(url, Response::json(201, &json!({"error": false, "message": "created"})));
    let post = Request::new(Method::POST, Url::parse(url).unwrap());

    let served = h.worker.handle_fetch(&post).await.unwrap();
    assert_eq!(served.source, ServedFrom::Network);
    assert!(h.cache.cache_names().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_other_reads_fall_back_to_any_cached_copy() {
    let h = harness();
    let page = "https://app.example/index.html";
    let request = get(page);
    h.cache
      .put("storysync-precache-v1", &request_key(&request), page, &Response::new(200, "<html>"))
      .unwrap();

    h.network.set_down(true);
    let served = h.worker.handle_fetch(&request).await.unwrap();
    assert_eq!(served.source, ServedFrom::Cache);
    assert_eq!(served.response.text(), "<html>");

    let missing = h.worker.handle_fetch(&get("https://app.example/other.html")).await;
    assert!(missing.is_err());
  }

  #[tokio::test]
  async fn test_clear_cache_purges_family_only() {
    let h = harness();
    h.cache.put("storysync-api-v3", "k", "u", &Response::new(200, "a")).unwrap();
    h.cache.put("storysync-images-v1", "k", "u", &Response::new(200, "b")).unwrap();
    h.cache.put("thirdparty-tiles", "k", "u", &Response::new(200, "c")).unwrap();

    let mut inbox = h.worker.clients().connect("/#/");
    h.worker.handle_message(WorkerMessage::ClearCache {
      prefix: Some("storysync-images".to_string()),
    });
    assert_eq!(
      h.cache.cache_names().unwrap(),
      vec!["storysync-api-v3", "thirdparty-tiles"]
    );
    assert_eq!(
      inbox.messages.recv().await.unwrap(),
      ClientMessage::CacheCleared {
        removed: vec!["storysync-images-v1".to_string()]
      }
    );

    h.worker.handle_message(WorkerMessage::ClearCache { prefix: None });
    assert_eq!(h.cache.cache_names().unwrap(), vec!["thirdparty-tiles"]);
  }

  #[tokio::test]
  async fn test_skip_waiting_activates_new_version_and_drops_old_regions() {
    let h = harness();
    h.network.route(STORIES, listing(&["a"]));
    h.network.route(PHOTO, Response::new(200, "jpeg"));
    h.worker.handle_fetch(&get(STORIES)).await.unwrap();
    h.worker.handle_fetch(&get(PHOTO)).await.unwrap();

    let next = CacheConfig {
      api_version: 4,
      ..CacheConfig::default()
    };
    h.worker.install(next);
    assert!(h.worker.has_waiting());
    // Still serving the old version
    assert_eq!(h.worker.active_caches().0, "storysync-api-v3");

    h.worker.handle_message(WorkerMessage::SkipWaiting);
    assert!(!h.worker.has_waiting());
    assert_eq!(h.worker.active_caches().0, "storysync-api-v4");
    // Image region is versioned separately and survives
    assert_eq!(h.cache.cache_names().unwrap(), vec!["storysync-images-v1"]);
  }

  #[tokio::test]
  async fn test_new_version_waits_after_restart() {
    let h = harness();
    h.network.route(STORIES, listing(&["a"]));
    h.worker.handle_fetch(&get(STORIES)).await.unwrap();
    drop(h.worker);

    let next = CacheConfig {
      api_version: 4,
      ..CacheConfig::default()
    };
    let restarted = BoundaryCache::new(
      h.network.clone(),
      h.cache.clone(),
      Arc::new(ClientRegistry::new()),
      h.notifier.clone(),
      next.clone(),
    );
    assert!(restarted.has_waiting());
    assert_eq!(restarted.active_caches().0, "storysync-api-v3");
    assert!(h.cache.cache_names().unwrap().contains(&"storysync-api-v3".to_string()));

    let mut view = restarted.clients().connect("/#/");
    restarted.handle_message(WorkerMessage::SkipWaiting);
    assert_eq!(
      view.messages.recv().await.unwrap(),
      ClientMessage::Activated {
        version: "api-v4/images-v1".to_string()
      }
    );

    // The activated version is what the next start finds
    let again = BoundaryCache::new(
      h.network.clone(),
      h.cache.clone(),
      Arc::new(ClientRegistry::new()),
      h.notifier.clone(),
      next,
    );
    assert!(!again.has_waiting());
    assert_eq!(again.active_caches().0, "storysync-api-v4");
  }

  #[tokio::test]
  async fn test_background_sync_notifies_clients() {
    let h = harness();
    let mut a = h.worker.clients().connect("/#/");
    let mut b = h.worker.clients().connect("/#/add");

    assert_eq!(h.worker.on_background_sync("other-tag"), 0);
    assert_eq!(h.worker.on_background_sync(SYNC_TAG), 2);
    assert_eq!(a.messages.recv().await.unwrap(), ClientMessage::SyncOfflineStories);
    assert_eq!(b.messages.recv().await.unwrap(), ClientMessage::SyncOfflineStories);
  }

  #[tokio::test]
  async fn test_push_then_click_reuses_open_view() {
    let h = harness();
    let view = h.worker.clients().connect("/#/stories/story-7");

    let notification = h
      .worker
      .on_push(Some(br#"{"title":"New story","options":{"body":"hi","data":{"storyId":"story-7"}}}"#));
    assert_eq!(h.notifier.notifications(), vec![notification.clone()]);

    assert_eq!(h.worker.on_notification_click(&notification), ClickOutcome::Focused(view.id));
    assert_eq!(h.worker.clients().windows().len(), 1);
  }

  #[tokio::test]
  async fn test_message_pump_handles_channel_messages() {
    let h = harness();
    h.cache.put("storysync-api-v3", "k", "u", &Response::new(200, "a")).unwrap();
    let cache = h.cache.clone();
    let worker = Arc::new(h.worker);

    let (tx, rx) = mpsc::channel(4);
    let pump = worker.clone().spawn(rx);
    tx.send(WorkerMessage::ClearCache { prefix: None }).await.unwrap();
    drop(tx);
    pump.await.unwrap();

    assert!(cache.cache_names().unwrap().is_empty());
  }
}
