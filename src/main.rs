mod api;
mod app;
mod auth;
mod codec;
mod config;
mod logging;
mod net;
mod notify;
mod push;
mod queue;
mod submit;
mod sync;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "storysync")]
#[command(about = "Share stories, even when the network is not there")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/storysync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Create an account
  Register {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
  },
  /// Log in and remember the session token
  Login {
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
  },
  /// Forget the session token
  Logout,
  /// Send a story now, or queue it when offline
  Submit {
    #[arg(long)]
    photo: PathBuf,
    #[arg(long)]
    description: String,
    #[arg(long, allow_hyphen_values = true, requires = "lon")]
    lat: Option<f64>,
    #[arg(long, allow_hyphen_values = true, requires = "lat")]
    lon: Option<f64>,
    /// Queue without trying the network
    #[arg(long)]
    offline: bool,
  },
  /// List queued stories
  Queue,
  /// Remove every queued story
  QueueClear,
  /// Send queued stories now
  Sync,
  /// Keep running and send queued stories whenever the network comes back
  Watch,
  /// List stories (served from cache when offline)
  Stories {
    /// Only stories with a location
    #[arg(long)]
    location: bool,
  },
  /// Fetch a URL through the cache
  Fetch {
    url: String,
    /// Write the body to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Treat the URL as an image (cache first)
    #[arg(long)]
    image: bool,
  },
  /// Drop cached responses
  CacheClear {
    /// Cache name prefix (default: the configured prefix)
    #[arg(long)]
    prefix: Option<String>,
  },
  /// Switch to a cache version installed by a config change
  CacheActivate,
  /// Register a push subscription
  PushSubscribe {
    #[arg(long)]
    endpoint: String,
    #[arg(long)]
    p256dh: String,
    #[arg(long)]
    auth: String,
  },
  /// Remove a push subscription
  PushUnsubscribe {
    #[arg(long)]
    endpoint: String,
  },
  /// Show the notification for a push payload (JSON or plain text)
  PushReceive {
    payload: Option<String>,
    /// Also act on the notification as if it was clicked
    #[arg(long)]
    open: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.data_dir()?)?;

  let app = app::App::new(config)?;

  match args.command {
    Command::Register {
      name,
      email,
      password,
    } => app.register(&name, &email, &password).await,
    Command::Login { email, password } => app.login(&email, &password).await,
    Command::Logout => app.logout(),
    Command::Submit {
      photo,
      description,
      lat,
      lon,
      offline,
    } => app.submit(&photo, description, lat, lon, offline).await,
    Command::Queue => app.list_queue(),
    Command::QueueClear => app.clear_queue(),
    Command::Sync => app.sync().await,
    Command::Watch => app.watch().await,
    Command::Stories { location } => app.stories(location).await,
    Command::Fetch { url, output, image } => app.fetch(&url, output.as_deref(), image).await,
    Command::CacheClear { prefix } => app.clear_cache(prefix).await,
    Command::CacheActivate => app.cache_activate().await,
    Command::PushSubscribe {
      endpoint,
      p256dh,
      auth,
    } => app.push_subscribe(endpoint, p256dh, auth).await,
    Command::PushUnsubscribe { endpoint } => app.push_unsubscribe(&endpoint).await,
    Command::PushReceive { payload, open } => app.push_receive(payload, open),
  }
}
