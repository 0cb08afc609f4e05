//! Installable offline worker: precache on install, evict stale buckets on activate, and
//! serve same-origin requests cache-first with background revalidation.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinSet;
use url::Url;

use crate::base_path::{
  DeclaredOverride, DeploymentContext, PathnameDetection, default_reserved_dirs,
  resolve_base_path,
};
use crate::cache::{CacheError, CacheStorage};
use crate::http::{Request, Response};
use crate::manifest::{CacheVersion, CoreAssetManifest};
use crate::network::{Network, NetworkError};

mod clients;
mod fetch;
mod offline_page;

pub use clients::{Client, Clients};
pub use fetch::FetchEvent;
pub use offline_page::{offline_response, render_offline_page};

/// Lifecycle position of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Constructed, not yet installed.
  Parsed,
  /// Precaching core assets.
  Installing,
  /// Installed and waiting to take over.
  Installed,
  /// Evicting stale buckets.
  Activating,
  /// Serving fetches.
  Activated,
  /// Install failed; a later registration starts over.
  Redundant,
}

impl fmt::Display for WorkerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let label = match self {
      Self::Parsed => "parsed",
      Self::Installing => "installing",
      Self::Installed => "installed",
      Self::Activating => "activating",
      Self::Activated => "activated",
      Self::Redundant => "redundant",
    };
    f.write_str(label)
  }
}

/// Errors raised by the worker lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
  /// A core asset could not be fetched at all.
  #[error("failed to fetch core asset {url}: {source}")]
  AssetFetch {
    /// Asset URL.
    url: String,
    /// Underlying network failure.
    source: NetworkError,
  },

  /// A core asset answered with a non-success status.
  #[error("core asset {url} returned HTTP {status}")]
  AssetStatus {
    /// Asset URL.
    url: String,
    /// Status received.
    status: u16,
  },

  /// A core asset path does not form a valid URL under the scope.
  #[error("core asset path {path:?} is not a valid URL: {source}")]
  InvalidAssetPath {
    /// Offending path after base resolution.
    path: String,
    /// Parse failure.
    source: url::ParseError,
  },

  /// Cache storage failed.
  #[error(transparent)]
  Cache(#[from] CacheError),

  /// The requested transition is not allowed from the current state.
  #[error("cannot {operation} while {state}")]
  InvalidState {
    /// Attempted operation.
    operation: &'static str,
    /// State at the time.
    state: WorkerState,
  },
}

/// Everything fixed for a worker at deploy time.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
  /// Registration scope; its origin defines which requests are same-origin.
  pub scope: Url,
  /// Deployment prefix shared with the pages.
  pub context: DeploymentContext,
  /// Bucket version.
  pub version: CacheVersion,
  /// Assets precached on install.
  pub manifest: CoreAssetManifest,
}

impl WorkerSettings {
  /// Settings whose deployment prefix is detected from the scope path, unless an explicit
  /// override is given.
  pub fn detect(
    scope: Url,
    base_path_override: Option<&str>,
    reserved: &BTreeSet<String>,
    version: CacheVersion,
    manifest: CoreAssetManifest,
  ) -> Self {
    let declared = DeclaredOverride::new(base_path_override);
    let detected = PathnameDetection::new(scope.path(), reserved);
    let context = resolve_base_path(&[&declared, &detected]);
    Self {
      scope,
      context,
      version,
      manifest,
    }
  }

  /// Default version, manifest and reserved directories for `scope`.
  pub fn for_scope(scope: Url) -> Self {
    Self::detect(
      scope,
      None,
      &default_reserved_dirs(),
      CacheVersion::default(),
      CoreAssetManifest::default(),
    )
  }
}

/// Summary of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
  /// Bucket that was populated.
  pub bucket: String,
  /// Cache keys written, in manifest order.
  pub cached: Vec<String>,
}

/// Summary of a successful activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
  /// Bucket now serving requests.
  pub bucket: String,
  /// Stale buckets that were deleted.
  pub deleted: Vec<String>,
  /// Number of open pages claimed.
  pub claimed: usize,
}

/// The offline worker for one scope and cache version.
pub struct OfflineWorker<S, N> {
  settings: WorkerSettings,
  storage: Arc<S>,
  network: Arc<N>,
  clients: Clients,
  state: Mutex<WorkerState>,
}

impl<S, N> fmt::Debug for OfflineWorker<S, N> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("OfflineWorker")
      .field("scope", &self.settings.scope.as_str())
      .field("bucket", &self.settings.version.bucket_name())
      .field("state", &self.state())
      .finish()
  }
}

impl<S, N> OfflineWorker<S, N> {
  /// A freshly parsed worker.
  pub fn new(settings: WorkerSettings, storage: Arc<S>, network: Arc<N>) -> Self {
    Self {
      settings,
      storage,
      network,
      clients: Clients::new(),
      state: Mutex::new(WorkerState::Parsed),
    }
  }

  /// Deploy-time settings.
  pub fn settings(&self) -> &WorkerSettings {
    &self.settings
  }

  /// Deployment prefix in use.
  pub fn context(&self) -> &DeploymentContext {
    &self.settings.context
  }

  /// Name of the bucket this worker owns.
  pub fn bucket_name(&self) -> String {
    self.settings.version.bucket_name()
  }

  /// Open pages within scope.
  pub fn clients(&self) -> &Clients {
    &self.clients
  }

  /// Shared cache storage.
  pub fn storage(&self) -> &Arc<S> {
    &self.storage
  }

  /// Current lifecycle state.
  pub fn state(&self) -> WorkerState {
    *self.lock_state()
  }

  fn lock_state(&self) -> MutexGuard<'_, WorkerState> {
    self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn set_state(&self, state: WorkerState) {
    *self.lock_state() = state;
  }

  fn transition(
    &self,
    operation: &'static str,
    allowed: &[WorkerState],
    next: WorkerState,
  ) -> Result<(), WorkerError> {
    let mut state = self.lock_state();
    if !allowed.contains(&*state) {
      return Err(WorkerError::InvalidState {
        operation,
        state: *state,
      });
    }
    *state = next;
    Ok(())
  }
}

impl<S: CacheStorage, N: Network> OfflineWorker<S, N> {
  /// Absolute URL for a site-relative asset path.
  pub fn asset_url(&self, path: &str) -> Result<Url, WorkerError> {
    let resolved = self.settings.context.with_base(path);
    self
      .settings
      .scope
      .join(&resolved)
      .map_err(|source| WorkerError::InvalidAssetPath {
        path: resolved,
        source,
      })
  }

  /// Resume an already installed worker after the host restarted it.
  ///
  /// All durable state lives in the bucket: when it exists the worker is active again.
  pub async fn resume(&self) -> Result<bool, WorkerError> {
    if self.storage.has(&self.bucket_name()).await? {
      self.set_state(WorkerState::Activated);
      tracing::debug!(bucket = %self.bucket_name(), "resumed active worker");
      return Ok(true);
    }
    Ok(false)
  }

  /// Precache every core asset.
  ///
  /// All assets are fetched before anything is written, so a single failure leaves the
  /// bucket untouched and the worker [`WorkerState::Redundant`]. A failed write discards
  /// the bucket only when this install created it. On success the worker skips waiting and
  /// is ready for [`OfflineWorker::activate`].
  pub async fn install(&self) -> Result<InstallReport, WorkerError> {
    self.transition(
      "install",
      &[WorkerState::Parsed, WorkerState::Redundant],
      WorkerState::Installing,
    )?;

    let bucket = self.bucket_name();
    tracing::info!(
      version = self.settings.version.version(),
      base_path = %self.settings.context,
      assets = self.settings.manifest.len(),
      "installing offline worker"
    );

    match self.precache(&bucket).await {
      Ok(cached) => {
        self.set_state(WorkerState::Installed);
        tracing::info!(bucket = %bucket, "install complete, skipping waiting");
        Ok(InstallReport { bucket, cached })
      }
      Err(err) => {
        self.set_state(WorkerState::Redundant);
        tracing::error!(error = %err, "install failed");
        Err(err)
      }
    }
  }

  async fn precache(&self, bucket: &str) -> Result<Vec<String>, WorkerError> {
    let mut requests = Vec::with_capacity(self.settings.manifest.len());
    for path in self.settings.manifest.paths() {
      requests.push(Request::get(self.asset_url(path)?));
    }

    let mut tasks = JoinSet::new();
    for (index, request) in requests.iter().cloned().enumerate() {
      let network = Arc::clone(&self.network);
      tasks.spawn(async move {
        let result = network.fetch(&request).await;
        (index, request, result)
      });
    }

    let mut fetched: Vec<Option<Response>> = vec![None; requests.len()];
    while let Some(joined) = tasks.join_next().await {
      let (index, request, result) = match joined {
        Ok(outcome) => outcome,
        Err(err) => {
          tracing::error!(error = %err, "core asset fetch task aborted");
          continue;
        }
      };
      let url = request.url.to_string();
      let response = result.map_err(|source| WorkerError::AssetFetch {
        url: url.clone(),
        source,
      })?;
      if !response.ok() {
        return Err(WorkerError::AssetStatus {
          url,
          status: response.status,
        });
      }
      fetched[index] = Some(response);
    }

    let mut staged = Vec::with_capacity(requests.len());
    for (request, response) in requests.into_iter().zip(fetched) {
      match response {
        Some(response) => staged.push((request, response)),
        None => {
          return Err(WorkerError::AssetFetch {
            url: request.url.to_string(),
            source: NetworkError::Disconnected,
          });
        }
      }
    }

    tracing::debug!(bucket, assets = staged.len(), "writing core assets");
    let existed = self.storage.has(bucket).await?;
    self.storage.open(bucket).await?;
    let mut cached = Vec::with_capacity(staged.len());
    for (request, response) in &staged {
      if let Err(err) = self.storage.put(bucket, request, response).await {
        if existed {
          // A complete earlier install of this version keeps serving.
          tracing::warn!(bucket, "write failed, keeping the existing bucket");
        } else if let Err(cleanup) = self.storage.delete(bucket).await {
          tracing::warn!(error = %cleanup, bucket, "failed to discard partial bucket");
        }
        return Err(err.into());
      }
      cached.push(request.cache_key());
    }
    Ok(cached)
  }

  /// Delete every bucket but the current one, then claim open pages.
  pub async fn activate(&self) -> Result<ActivationReport, WorkerError> {
    self.transition(
      "activate",
      &[WorkerState::Installed],
      WorkerState::Activating,
    )?;

    match self.evict_stale_buckets().await {
      Ok(deleted) => {
        let claimed = self.clients.claim(&self.settings.scope);
        self.set_state(WorkerState::Activated);
        tracing::info!(
          bucket = %self.bucket_name(),
          deleted = deleted.len(),
          claimed,
          "worker activated"
        );
        Ok(ActivationReport {
          bucket: self.bucket_name(),
          deleted,
          claimed,
        })
      }
      Err(err) => {
        self.set_state(WorkerState::Installed);
        Err(err)
      }
    }
  }

  async fn evict_stale_buckets(&self) -> Result<Vec<String>, WorkerError> {
    let stale: Vec<String> = self
      .storage
      .keys()
      .await?
      .into_iter()
      .filter(|name| self.settings.version.is_stale(name))
      .collect();

    if !stale.is_empty() {
      tracing::info!(buckets = ?stale, "cleaning old caches");
    }
    for name in &stale {
      self.storage.delete(name).await?;
    }
    Ok(stale)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryCacheStorage;
  use crate::cache::testing::FailingCacheStorage;
  use crate::network::testing::ScriptedNetwork;

  const SCOPE: &str = "https://example.github.io/my-app/";

  fn settings(paths: &[&str], version: &str) -> WorkerSettings {
    WorkerSettings::detect(
      Url::parse(SCOPE).unwrap(),
      None,
      &default_reserved_dirs(),
      CacheVersion::new("site", version),
      CoreAssetManifest::new(paths.iter().copied()),
    )
  }

  fn worker(
    paths: &[&str],
    version: &str,
    storage: &MemoryCacheStorage,
    network: &ScriptedNetwork,
  ) -> OfflineWorker<MemoryCacheStorage, ScriptedNetwork> {
    OfflineWorker::new(
      settings(paths, version),
      Arc::new(storage.clone()),
      Arc::new(network.clone()),
    )
  }

  #[test]
  fn detects_project_prefix_from_scope() {
    let settings = settings(&["index.html"], "v1");
    assert_eq!(settings.context.base_path(), "/my-app");
  }

  #[test]
  fn explicit_override_beats_scope_detection() {
    let settings = WorkerSettings::detect(
      Url::parse("https://example.com/lessons-site/").unwrap(),
      Some("/"),
      &default_reserved_dirs(),
      CacheVersion::default(),
      CoreAssetManifest::default(),
    );
    assert!(settings.context.is_root());
  }

  #[tokio::test]
  async fn install_caches_every_core_asset() {
    let storage = MemoryCacheStorage::new();
    let network = ScriptedNetwork::new();
    network
      .respond("https://example.github.io/my-app/", 200, "home")
      .respond("https://example.github.io/my-app/index.html", 200, "index")
      .respond("https://example.github.io/my-app/data/lessons.json", 200, "{}");

    let worker = worker(&["./", "index.html", "data/lessons.json"], "v1", &storage, &network);
    let report = worker.install().await.unwrap();

    assert_eq!(report.bucket, "site-cache-v1");
    assert_eq!(report.cached, vec![
      "https://example.github.io/my-app/".to_string(),
      "https://example.github.io/my-app/index.html".to_string(),
      "https://example.github.io/my-app/data/lessons.json".to_string(),
    ]);
    assert_eq!(worker.state(), WorkerState::Installed);
    assert_eq!(storage.entries("site-cache-v1").await.unwrap().len(), 3);
  }

  #[tokio::test]
  async fn failed_asset_leaves_no_bucket() {
    let storage = MemoryCacheStorage::new();
    let network = ScriptedNetwork::new();
    network.respond("https://example.github.io/my-app/index.html", 200, "index");

    let worker = worker(&["index.html", "assets/missing.css"], "v1", &storage, &network);
    let err = worker.install().await.unwrap_err();

    assert!(matches!(err, WorkerError::AssetStatus { status: 404, .. }));
    assert_eq!(worker.state(), WorkerState::Redundant);
    assert!(!storage.has("site-cache-v1").await.unwrap());
    assert!(matches!(
      worker.activate().await,
      Err(WorkerError::InvalidState { state: WorkerState::Redundant, .. })
    ));
    assert!(!worker.resume().await.unwrap());
  }

  #[tokio::test]
  async fn network_failure_during_install_is_fatal() {
    let storage = MemoryCacheStorage::new();
    let network = ScriptedNetwork::new();
    network
      .respond("https://example.github.io/my-app/index.html", 200, "index")
      .fail("https://example.github.io/my-app/sw.js");

    let worker = worker(&["index.html", "sw.js"], "v1", &storage, &network);
    assert!(matches!(
      worker.install().await,
      Err(WorkerError::AssetFetch { .. })
    ));
    assert!(storage.keys().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn failed_write_discards_new_bucket() {
    let storage = FailingCacheStorage::failing_after(1);
    let network = ScriptedNetwork::new();
    network
      .respond("https://example.github.io/my-app/index.html", 200, "index")
      .respond("https://example.github.io/my-app/sw.js", 200, "worker");

    let worker = OfflineWorker::new(
      settings(&["index.html", "sw.js"], "v1"),
      Arc::new(storage.clone()),
      Arc::new(network),
    );
    assert!(matches!(worker.install().await, Err(WorkerError::Cache(_))));
    assert_eq!(worker.state(), WorkerState::Redundant);
    assert!(!storage.has("site-cache-v1").await.unwrap());
  }

  #[tokio::test]
  async fn failed_reinstall_keeps_existing_bucket() {
    let storage = MemoryCacheStorage::new();
    let network = ScriptedNetwork::new();
    network
      .respond("https://example.github.io/my-app/index.html", 200, "index")
      .respond("https://example.github.io/my-app/sw.js", 200, "worker");
    worker(&["index.html", "sw.js"], "v1", &storage, &network)
      .install()
      .await
      .unwrap();

    let failing = FailingCacheStorage::wrapping(storage.clone());
    failing.fail_writes();
    let reinstall = OfflineWorker::new(
      settings(&["index.html", "sw.js"], "v1"),
      Arc::new(failing.clone()),
      Arc::new(network.clone()),
    );
    assert!(reinstall.install().await.is_err());
    assert_eq!(failing.inner().entries("site-cache-v1").await.unwrap().len(), 2);
  }

  #[tokio::test]
  async fn redundant_worker_can_retry_install() {
    let storage = MemoryCacheStorage::new();
    let network = ScriptedNetwork::new();
    network.fail("https://example.github.io/my-app/index.html");

    let worker = worker(&["index.html"], "v1", &storage, &network);
    assert!(worker.install().await.is_err());

    network.respond("https://example.github.io/my-app/index.html", 200, "index");
    assert!(worker.install().await.is_ok());
  }

  #[tokio::test]
  async fn activation_evicts_previous_versions_and_claims_pages() {
    let storage = MemoryCacheStorage::new();
    let network = ScriptedNetwork::new();
    network.respond("https://example.github.io/my-app/index.html", 200, "index");

    let previous = worker(&["index.html"], "v1", &storage, &network);
    previous.install().await.unwrap();
    previous.activate().await.unwrap();

    let current = worker(&["index.html"], "v2", &storage, &network);
    let page = current
      .clients()
      .open(Url::parse("https://example.github.io/my-app/lessons/index.html").unwrap());
    current.install().await.unwrap();
    let report = current.activate().await.unwrap();

    assert_eq!(report.deleted, vec!["site-cache-v1".to_string()]);
    assert_eq!(report.claimed, 1);
    assert!(current.clients().is_controlled(page));
    assert_eq!(storage.keys().await.unwrap(), vec!["site-cache-v2".to_string()]);
    assert_eq!(
      storage.entries("site-cache-v2").await.unwrap(),
      vec!["https://example.github.io/my-app/index.html".to_string()]
    );
    assert_eq!(current.state(), WorkerState::Activated);
  }

  #[tokio::test]
  async fn activate_requires_install() {
    let storage = MemoryCacheStorage::new();
    let network = ScriptedNetwork::new();
    let worker = worker(&["index.html"], "v1", &storage, &network);
    assert!(matches!(
      worker.activate().await,
      Err(WorkerError::InvalidState { state: WorkerState::Parsed, .. })
    ));
  }

  #[tokio::test]
  async fn resume_reactivates_from_existing_bucket() {
    let storage = MemoryCacheStorage::new();
    let network = ScriptedNetwork::new();
    storage.open("site-cache-v1").await.unwrap();

    let worker = worker(&["index.html"], "v1", &storage, &network);
    assert!(worker.resume().await.unwrap());
    assert_eq!(worker.state(), WorkerState::Activated);
  }
}
