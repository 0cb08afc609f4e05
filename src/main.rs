//! site-worker - drive the offline worker against a deployed or local site.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use offline_site_worker::cache::{CacheStorage, DiskCacheStorage};
use offline_site_worker::config::SiteConfig;
use offline_site_worker::http::{Method, Request, Response};
use offline_site_worker::network::{Disconnected, HttpNetwork, Network, NetworkError, SiteDirectory};
use offline_site_worker::page::{ControlledFetch, PageContext, load_catalog, register_worker};
use offline_site_worker::worker::{FetchEvent, OfflineWorker, WorkerSettings};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use url::Url;

/// Offline worker for static lesson sites
#[derive(Parser, Debug)]
#[command(name = "site-worker")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Configuration file (defaults to site-worker.config.json in the working directory)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Directory holding the cache buckets
  #[arg(long)]
  cache_dir: Option<PathBuf>,

  /// Serve the site from this directory instead of the configured origin
  #[arg(long)]
  site_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Show the base path a page resolves and where common assets point
  Resolve {
    /// Page URL
    page_url: Url,

    /// HTML of the page, checked for a site-base meta declaration
    #[arg(long)]
    html: Option<PathBuf>,
  },

  /// Precache core assets and activate the configured cache version
  Install,

  /// Route one request through the worker
  Fetch {
    /// Request URL
    url: Url,

    /// Treat the request as a page navigation
    #[arg(long)]
    navigate: bool,

    /// HTTP method
    #[arg(long, default_value = "GET")]
    method: String,

    /// Simulate a lost connection
    #[arg(long)]
    offline: bool,
  },

  /// List cache buckets and their entry counts
  Status,

  /// Load the lesson catalog the way a page does
  Catalog {
    /// Page URL
    page_url: Url,

    /// Simulate a lost connection
    #[arg(long)]
    offline: bool,
  },
}

/// Whichever network the command runs against.
enum SiteNetwork {
  Http(HttpNetwork),
  Local(SiteDirectory),
  Offline(Disconnected),
}

impl Network for SiteNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    match self {
      Self::Http(network) => network.fetch(request).await,
      Self::Local(network) => network.fetch(request).await,
      Self::Offline(network) => network.fetch(request).await,
    }
  }
}

type Worker = OfflineWorker<DiskCacheStorage, SiteNetwork>;

struct Runtime {
  config: SiteConfig,
  settings: WorkerSettings,
  cache_dir: PathBuf,
  site_dir: Option<PathBuf>,
}

impl Runtime {
  fn load(cli: &Cli) -> Result<Self> {
    let cwd = std::env::current_dir().context("failed to read the working directory")?;
    let config = match &cli.config {
      Some(path) => SiteConfig::from_path(path)?,
      None => SiteConfig::discover(&cwd),
    };
    let settings = config.worker_settings()?;
    let cache_dir = cli
      .cache_dir
      .clone()
      .unwrap_or_else(|| config.cache_dir_path(&cwd));
    let site_dir = cli
      .site_dir
      .clone()
      .or_else(|| config.site_dir.as_ref().map(|dir| cwd.join(dir)));

    tracing::debug!(
      scope = %settings.scope,
      base_path = %settings.context,
      bucket = %settings.version,
      cache_dir = %cache_dir.display(),
      "loaded configuration"
    );
    Ok(Self {
      config,
      settings,
      cache_dir,
      site_dir,
    })
  }

  fn network(&self, offline: bool) -> Result<SiteNetwork> {
    if offline {
      return Ok(SiteNetwork::Offline(Disconnected));
    }
    match &self.site_dir {
      Some(dir) => Ok(SiteNetwork::Local(SiteDirectory::new(
        dir.clone(),
        self.settings.context.clone(),
      ))),
      None => Ok(SiteNetwork::Http(
        HttpNetwork::new().context("failed to build the HTTP client")?,
      )),
    }
  }

  fn storage(&self) -> DiskCacheStorage {
    DiskCacheStorage::new(self.cache_dir.clone())
  }

  fn worker(&self, network: Arc<SiteNetwork>) -> Worker {
    OfflineWorker::new(self.settings.clone(), Arc::new(self.storage()), network)
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::registry()
    .with(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| "offline_site_worker=info".into()),
    )
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .init();

  let cli = Cli::parse();
  let runtime = Runtime::load(&cli)?;

  match cli.command {
    Commands::Resolve { page_url, html } => resolve(&runtime, page_url, html).await,
    Commands::Install => install(&runtime).await,
    Commands::Fetch {
      url,
      navigate,
      method,
      offline,
    } => fetch(&runtime, url, navigate, &method, offline).await,
    Commands::Status => status(&runtime).await,
    Commands::Catalog { page_url, offline } => catalog(&runtime, page_url, offline).await,
  }
}

async fn resolve(runtime: &Runtime, page_url: Url, html: Option<PathBuf>) -> Result<()> {
  let markup = match html {
    Some(path) => tokio::fs::read_to_string(&path)
      .await
      .with_context(|| format!("failed to read {}", path.display()))?,
    None => String::new(),
  };
  let page = PageContext::load(page_url, &markup, &runtime.config.reserved_dirs());
  let context = page.context();

  println!("base path: {context}");
  println!("home:      {}", context.home());
  for path in ["data/lessons.json", "assets/styles.css", "sw.js"] {
    let url = page
      .resolve_url(path)
      .with_context(|| format!("failed to resolve {path}"))?;
    println!("{path:<18} {:<28} {url}", context.absolute_path(path));
  }

  if let Some(info) = page.debug_info() {
    println!("{}", serde_json::to_string_pretty(info)?);
  }
  Ok(())
}

async fn install(runtime: &Runtime) -> Result<()> {
  let worker = runtime.worker(Arc::new(runtime.network(false)?));
  let installed = worker.install().await.context("install failed")?;
  let activated = worker.activate().await.context("activation failed")?;

  println!("installed {} ({} assets)", installed.bucket, installed.cached.len());
  for name in &activated.deleted {
    println!("deleted   {name}");
  }
  Ok(())
}

async fn fetch(
  runtime: &Runtime,
  url: Url,
  navigate: bool,
  method: &str,
  offline: bool,
) -> Result<()> {
  let network = Arc::new(runtime.network(offline)?);
  let worker = runtime.worker(Arc::clone(&network));
  if !worker.resume().await? {
    bail!(
      "no cache bucket {} under {}; run `site-worker install` first",
      worker.bucket_name(),
      runtime.cache_dir.display()
    );
  }

  let request = if navigate {
    Request::navigate(url)
  } else {
    Request::get(url)
  }
  .with_method(Method::parse(method));

  let mut event = FetchEvent::new(request.clone());
  let (response, source) = match worker.handle_fetch(&mut event).await {
    Some(response) if event.pending() > 0 => (response, "cache"),
    Some(response) => (response, "worker"),
    None => (
      network
        .fetch(&request)
        .await
        .context("request outside the worker scope failed")?,
      "network",
    ),
  };
  event.settle().await;

  println!("status: {}", response.status);
  println!("source: {source}");
  println!("bytes:  {}", response.body.len());
  Ok(())
}

async fn status(runtime: &Runtime) -> Result<()> {
  let storage = runtime.storage();
  let current = runtime.settings.version.bucket_name();
  let buckets = storage.keys().await?;
  if buckets.is_empty() {
    println!("no cache buckets under {}", runtime.cache_dir.display());
    return Ok(());
  }

  for bucket in buckets {
    let entries = storage.entries(&bucket).await?;
    let marker = if bucket == current { "*" } else { " " };
    println!("{marker} {bucket} ({} entries)", entries.len());
  }
  Ok(())
}

async fn catalog(runtime: &Runtime, page_url: Url, offline: bool) -> Result<()> {
  let network = Arc::new(runtime.network(offline)?);
  let worker = Arc::new(runtime.worker(Arc::clone(&network)));
  let mut page = PageContext::load(page_url, "", &runtime.config.reserved_dirs());

  let registration = register_worker(&page, &*worker).await;
  if registration.is_none() {
    tracing::warn!("continuing without offline support");
  }
  let controlled = ControlledFetch::new(Arc::clone(&worker), network);
  let result = load_catalog(&mut page, &controlled).await;
  controlled.settle().await;
  if let Some(registration) = registration {
    worker.clients().close(registration.client);
  }

  if let Some(info) = page.debug_info() {
    println!("{}", info.render_overlay());
  }
  let catalog = result.context("failed to load lessons")?;
  for lesson in &catalog.lessons {
    println!(
      "{:>3}. {} ({} min) [{}]",
      lesson.number,
      lesson.title,
      lesson.minutes,
      lesson.tags.join(", ")
    );
  }
  Ok(())
}
