use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use url::Url;

use crate::api::{ListStoriesResponse, PushKeys, PushSubscription, StoryClient, StorySubmission};
use crate::auth::{CredentialSource, StoredCredentials, TokenStore};
use crate::codec::PhotoPayload;
use crate::config::Config;
use crate::net::{Connectivity, ConnectivityProbe};
use crate::notify::ConsoleNotifier;
use crate::push::PushRegistrar;
use crate::queue::{Coordinates, QueueStore, SqliteQueueStore};
use crate::submit::{SubmitOutcome, Submitter};
use crate::sync::{SyncEngine, SyncOutcome, SyncTrigger};
use crate::worker::{
  BoundaryCache, ClickOutcome, ClientMessage, ClientRegistry, Destination, HttpFetcher, Request,
  ServedFrom, SqliteResponseCache, WorkerMessage, SYNC_TAG,
};

/// Everything a command needs, opened once from config.
pub struct App {
  config: Config,
  /// Every request, API calls included, goes out through the worker
  worker: Arc<BoundaryCache>,
  client: StoryClient,
  tokens: TokenStore,
  credentials: Arc<StoredCredentials>,
  store: Arc<SqliteQueueStore>,
  connectivity: Connectivity,
  notifier: Arc<ConsoleNotifier>,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let data_dir = config.data_dir()?;
    let notifier = Arc::new(ConsoleNotifier);

    let fetcher = HttpFetcher::new(Duration::from_secs(config.api.timeout_secs))
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;
    let cache = SqliteResponseCache::open(&data_dir.join("cache.db"))?;
    let worker = Arc::new(BoundaryCache::new(
      Arc::new(fetcher),
      Arc::new(cache),
      Arc::new(ClientRegistry::new()),
      notifier.clone(),
      config.cache.clone(),
    ));

    let client = StoryClient::new(&config, worker.clone())?;
    let tokens = TokenStore::new(&data_dir);
    let credentials = Arc::new(StoredCredentials::new(tokens.clone()));
    let store = Arc::new(SqliteQueueStore::open(&data_dir.join("queue.db"))?);

    Ok(Self {
      config,
      worker,
      client,
      tokens,
      credentials,
      store,
      // Assume online until a probe or a failed request says otherwise
      connectivity: Connectivity::new(true),
      notifier,
    })
  }

  fn probe(&self) -> ConnectivityProbe {
    ConnectivityProbe::new(self.config.api_base(), self.config.sync.probe_interval())
  }

  async fn refresh_connectivity(&self) {
    let online = self.probe().check().await;
    self.connectivity.set_online(online);
  }

  fn sync_engine(&self) -> SyncEngine {
    SyncEngine::new(
      self.store.clone(),
      Arc::new(self.client.clone()),
      self.credentials.clone(),
      self.connectivity.clone(),
      self.notifier.clone(),
    )
  }

  pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<()> {
    let message = self
      .client
      .register(name, email, password)
      .await
      .map_err(|e| eyre!("Registration failed: {}", e))?;
    println!("{}", message.message);
    Ok(())
  }

  pub async fn login(&self, email: &str, password: &str) -> Result<()> {
    let result = self
      .client
      .login(email, password)
      .await
      .map_err(|e| eyre!("Login failed: {}", e))?;
    self.tokens.save(&result.token)?;
    info!(user = %result.user_id, "logged in");
    println!("Logged in as {}", result.name);
    Ok(())
  }

  pub fn logout(&self) -> Result<()> {
    self.tokens.clear()?;
    println!("Logged out");
    Ok(())
  }

  pub async fn submit(
    &self,
    photo: &Path,
    description: String,
    lat: Option<f64>,
    lon: Option<f64>,
    offline: bool,
  ) -> Result<()> {
    let photo = PhotoPayload::from_path(photo)
      .map_err(|e| eyre!("Failed to read photo {}: {}", photo.display(), e))?;
    let submission = StorySubmission {
      photo,
      description,
      location: Coordinates::from_parts(lat, lon),
    };

    let submitter = Submitter::new(
      self.store.clone(),
      Arc::new(self.client.clone()),
      self.credentials.clone(),
      self.connectivity.clone(),
    );

    let outcome = if offline {
      submitter.enqueue(&submission)
    } else {
      self.refresh_connectivity().await;
      submitter.submit(submission).await
    };

    match outcome.map_err(|e| eyre!("Submit failed: {}", e))? {
      SubmitOutcome::Sent(message) => println!("{}", message.message),
      SubmitOutcome::Queued { id } => {
        println!("Story #{} saved offline, it will be sent automatically when online", id)
      }
    }
    Ok(())
  }

  pub fn list_queue(&self) -> Result<()> {
    let entries = self.store.get_all()?;
    if entries.is_empty() {
      println!("No queued stories");
      return Ok(());
    }

    for entry in entries {
      let location = entry
        .location
        .map(|c| format!("{:.5},{:.5}", c.lat, c.lon))
        .unwrap_or_else(|| "-".to_string());
      let last_attempt = entry
        .synced_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "never".to_string());
      println!(
        "#{:<4} {}  {:<20} {:<24} last attempt: {}  {}",
        entry.id,
        entry.created_at.format("%Y-%m-%d %H:%M"),
        entry.photo_name,
        location,
        last_attempt,
        entry.description
      );
    }
    Ok(())
  }

  pub fn clear_queue(&self) -> Result<()> {
    let count = self.store.get_all()?.len();
    self.store.clear()?;
    println!("Removed {} queued stories", count);
    Ok(())
  }

  /// One manual sync pass.
  pub async fn sync(&self) -> Result<()> {
    self.refresh_connectivity().await;
    let engine = self.sync_engine();

    match engine.sync_pass(SyncTrigger::Manual).await {
      Ok(SyncOutcome::Completed(_)) => {}
      Ok(SyncOutcome::Skipped(reason)) => println!("Nothing sent: {}", reason),
      Err(e) => return Err(eyre!("Sync failed: {}", e)),
    }
    Ok(())
  }

  /// Run until Ctrl-C: probe connectivity, sync on reconnect and on a timer.
  pub async fn watch(&self) -> Result<()> {
    let engine = Arc::new(self.sync_engine());
    let worker = self.worker.clone();

    self.refresh_connectivity().await;
    let probe = tokio::spawn(self.probe().run(self.connectivity.clone()));

    let reconnect = engine.watch_connectivity();
    engine.start_periodic_sync(self.config.sync.interval());

    // This process is the worker's only client
    let client = worker.clients().connect("/#/");
    let follow = engine.follow_worker(client.messages);
    let background = spawn_background_sync(worker.clone(), self.connectivity.clone());

    info!(
      interval_secs = self.config.sync.interval_secs,
      "watching for connectivity changes"
    );
    println!("Watching, press Ctrl-C to stop");

    // Drain whatever was queued while we were not running
    engine.run_pass(SyncTrigger::Manual).await;

    tokio::signal::ctrl_c()
      .await
      .map_err(|e| eyre!("Failed to listen for Ctrl-C: {}", e))?;

    engine.stop_periodic_sync();
    for task in [probe, reconnect, follow, background] {
      task.abort();
    }
    info!("watch stopped");
    Ok(())
  }

  /// List stories through the boundary cache.
  pub async fn stories(&self, location: bool) -> Result<()> {
    let url = Url::parse(&self.client.stories_url(location))
      .map_err(|e| eyre!("Invalid stories URL: {}", e))?;
    let request = self.authorized(Request::get(url));

    let served = self
      .worker
      .handle_fetch(&request)
      .await
      .map_err(|e| eyre!("Failed to load stories: {}", e))?;

    let listing: ListStoriesResponse = serde_json::from_slice(&served.response.body)
      .map_err(|e| eyre!("Unexpected stories response: {}", e))?;

    match (served.source, served.cached_at) {
      (ServedFrom::Cache, Some(at)) => println!("(offline copy from {})", at.format("%Y-%m-%d %H:%M")),
      (ServedFrom::Synthesized, _) => println!("({})", listing.message),
      _ => {}
    }
    if listing.error && served.source == ServedFrom::Network {
      return Err(eyre!("Server error: {}", listing.message));
    }

    for story in &listing.list_story {
      let location = match (story.lat, story.lon) {
        (Some(lat), Some(lon)) => format!(" @ {:.4},{:.4}", lat, lon),
        _ => String::new(),
      };
      println!("{}  {}: {}{}", story.id, story.name, story.description, location);
    }
    Ok(())
  }

  /// Fetch any URL through the boundary cache, optionally saving the body.
  /// `image` marks the request as an image so it is cached first.
  pub async fn fetch(&self, url: &str, output: Option<&Path>, image: bool) -> Result<()> {
    let url = Url::parse(url).map_err(|e| eyre!("Invalid URL '{}': {}", url, e))?;
    let mut request = Request::get(url);
    if image {
      request = request.with_destination(Destination::Image);
    }

    let served = self
      .worker
      .handle_fetch(&request)
      .await
      .map_err(|e| eyre!("Fetch failed: {}", e))?;

    println!(
      "{} from {:?}, {} bytes",
      served.response.status,
      served.source,
      served.response.body.len()
    );
    if let Some(path) = output {
      std::fs::write(path, &served.response.body)
        .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
    }
    Ok(())
  }

  /// Ask the worker to drop cache regions and report what went.
  pub async fn clear_cache(&self, prefix: Option<String>) -> Result<()> {
    let removed = self
      .ask_worker(WorkerMessage::ClearCache { prefix }, |reply| match reply {
        ClientMessage::CacheCleared { removed } => Some(removed),
        _ => None,
      })
      .await?;

    if removed.is_empty() {
      println!("No caches to remove");
    }
    for name in removed {
      println!("Removed {}", name);
    }
    Ok(())
  }

  /// Activate a cache version installed by a config change.
  pub async fn cache_activate(&self) -> Result<()> {
    if !self.worker.has_waiting() {
      println!("No new cache version waiting");
      return Ok(());
    }

    let version = self
      .ask_worker(WorkerMessage::SkipWaiting, |reply| match reply {
        ClientMessage::Activated { version } => Some(version),
        _ => None,
      })
      .await?;
    println!("Activated {}", version);
    Ok(())
  }

  /// Send one message to the worker as a connected client and wait for the
  /// broadcast `reply` picks out.
  async fn ask_worker<T>(
    &self,
    message: WorkerMessage,
    mut reply: impl FnMut(ClientMessage) -> Option<T>,
  ) -> Result<T> {
    let mut client = self.worker.clients().connect("/#/");

    let (tx, rx) = mpsc::channel(1);
    let pump = self.worker.clone().spawn(rx);
    tx.send(message)
      .await
      .map_err(|e| eyre!("Worker is not running: {}", e))?;
    drop(tx);

    let answer = loop {
      match client.messages.recv().await {
        Ok(message) => {
          if let Some(answer) = reply(message) {
            break Ok(answer);
          }
        }
        Err(e) => break Err(eyre!("Worker stopped without answering: {}", e)),
      }
    };
    self.worker.clients().disconnect(client.id);

    pump
      .await
      .map_err(|e| eyre!("Worker task failed: {}", e))?;
    answer
  }

  /// Hand a push payload to the worker, as the push service would, and
  /// optionally activate the notification it shows.
  pub fn push_receive(&self, payload: Option<String>, open: bool) -> Result<()> {
    let notification = self.worker.on_push(payload.as_deref().map(str::as_bytes));
    if !open {
      return Ok(());
    }

    let target = notification.target.clone().unwrap_or_else(|| "/#/".to_string());
    match self.worker.on_notification_click(&notification) {
      ClickOutcome::Focused(id) => println!("Focused view #{} on {}", id, target),
      ClickOutcome::Opened(id) => println!("Opened view #{} on {}", id, target),
    }
    Ok(())
  }

  fn push_registrar(&self) -> PushRegistrar {
    PushRegistrar::new(
      Arc::new(self.client.clone()),
      self.credentials.clone(),
      self.tokens.clone(),
      self.notifier.clone(),
    )
  }

  pub async fn push_subscribe(&self, endpoint: String, p256dh: String, auth: String) -> Result<()> {
    let subscription = PushSubscription {
      endpoint,
      keys: PushKeys { p256dh, auth },
    };
    let message = self
      .push_registrar()
      .subscribe(&subscription)
      .await
      .map_err(|e| eyre!("Push subscription failed: {}", e))?;
    println!("{}", message.message);
    Ok(())
  }

  pub async fn push_unsubscribe(&self, endpoint: &str) -> Result<()> {
    let message = self
      .push_registrar()
      .unsubscribe(endpoint)
      .await
      .map_err(|e| eyre!("Push unsubscribe failed: {}", e))?;
    println!("{}", message.message);
    Ok(())
  }

  fn authorized(&self, request: Request) -> Request {
    match self.credentials.token() {
      Some(token) => request.with_bearer(&token),
      None => request,
    }
  }
}

/// Fire the worker's background sync whenever connectivity comes back.
fn spawn_background_sync(
  worker: Arc<BoundaryCache>,
  connectivity: Connectivity,
) -> tokio::task::JoinHandle<()> {
  let mut rx = connectivity.subscribe();
  tokio::spawn(async move {
    let mut was_online = *rx.borrow_and_update();
    while rx.changed().await.is_ok() {
      let online = *rx.borrow_and_update();
      if online && !was_online {
        worker.on_background_sync(SYNC_TAG);
      }
      was_online = online;
    }
  })
}
