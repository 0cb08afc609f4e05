//! Page-side view of the site: base-path resolution for one page load, worker
//! registration, lesson data loading and diagnostics.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use url::Url;

use crate::base_path::{DeploymentContext, MetaOverride, PathnameDetection, resolve_base_path};
use crate::cache::CacheStorage;
use crate::http::{Request, Response};
use crate::network::{Network, NetworkError};
use crate::worker::{FetchEvent, OfflineWorker, WorkerState};

mod catalog;
mod diagnostics;

pub use catalog::{
  CatalogError, LEGACY_LESSONS_DATA_PATH, LESSONS_DATA_PATH, Lesson, LessonCatalog, load_catalog,
};
pub use diagnostics::{DEBUG_QUERY_PARAM, DebugInfo, debug_requested};

/// Script path the page registers as its offline worker.
pub const WORKER_SCRIPT_PATH: &str = "sw.js";

/// One page load: its URL, resolved deployment prefix and optional diagnostics.
#[derive(Debug, Clone)]
pub struct PageContext {
  url: Url,
  context: DeploymentContext,
  debug: Option<DebugInfo>,
}

impl PageContext {
  /// Resolve the base path for a page from its markup and URL.
  ///
  /// The `site-base` meta declaration wins, then the first path segment unless it is a
  /// reserved content directory, then the root.
  pub fn load(url: Url, html: &str, reserved: &BTreeSet<String>) -> Self {
    let meta = MetaOverride::new(html);
    let detected = PathnameDetection::new(url.path(), reserved);
    let context = resolve_base_path(&[&meta, &detected]);
    Self::with_context(url, context)
  }

  /// Page with an already resolved deployment prefix.
  pub fn with_context(url: Url, context: DeploymentContext) -> Self {
    let debug = debug_requested(&url).then(|| DebugInfo {
      base_path: context.base_path().to_string(),
      location: url.path().to_string(),
      manifest_url: context.with_base(LEGACY_LESSONS_DATA_PATH),
      lessons_count: None,
      last_error: None,
    });

    tracing::debug!(page = %url, base_path = %context, "page base path resolved");
    Self {
      url,
      context,
      debug,
    }
  }

  /// Page URL.
  pub fn url(&self) -> &Url {
    &self.url
  }

  /// Resolved deployment prefix.
  pub fn context(&self) -> &DeploymentContext {
    &self.context
  }

  /// Shorthand for the context's `with_base`.
  pub fn with_base(&self, relative_path: &str) -> String {
    self.context.with_base(relative_path)
  }

  /// Root of the site: the origin plus the base path.
  pub fn site_root(&self) -> Result<Url, url::ParseError> {
    self.url.join(&self.context.home())
  }

  /// Absolute URL for a site-relative path.
  ///
  /// Resolution is anchored at the site root rather than the current document, so a
  /// lesson page one directory deep resolves `data/lessons.json` exactly like the home page.
  pub fn resolve_url(&self, relative_path: &str) -> Result<Url, url::ParseError> {
    self.site_root()?.join(&self.with_base(relative_path))
  }

  /// Diagnostics, present only when the URL carries `debug=1`.
  pub fn debug_info(&self) -> Option<&DebugInfo> {
    self.debug.as_ref()
  }

  pub(crate) fn record_manifest_url(&mut self, url: &str) {
    if let Some(info) = self.debug.as_mut() {
      info.manifest_url = url.to_string();
    }
  }

  pub(crate) fn record_lessons(&mut self, count: usize) {
    if let Some(info) = self.debug.as_mut() {
      info.lessons_count = Some(count);
      info.last_error = None;
    }
  }

  pub(crate) fn record_error(&mut self, message: &str) {
    let base = if self.context.is_root() {
      "(none)".to_string()
    } else {
      self.context.base_path().to_string()
    };
    if let Some(info) = self.debug.as_mut() {
      info.last_error = Some(format!(
        "{message}\n\nAttempted URL: {}\nBase path: {base}",
        info.manifest_url
      ));
    }
  }
}

/// Outcome of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
  /// Worker script URL.
  pub script_url: Url,
  /// Scope the worker controls.
  pub scope: Url,
  /// Worker state after registration.
  pub state: WorkerState,
  /// Client opened for the page. Close it through [`crate::worker::Clients::close`] when
  /// the page goes away.
  pub client: u64,
}

/// Register `worker` for `page` at `with_base("sw.js")`.
///
/// Registration is best effort: any failure is logged and `None` returned, and the page
/// keeps working against the network. A failed registration leaves no client behind.
pub async fn register_worker<S: CacheStorage, N: Network>(
  page: &PageContext,
  worker: &OfflineWorker<S, N>,
) -> Option<Registration> {
  let script_url = match page.resolve_url(WORKER_SCRIPT_PATH) {
    Ok(url) => url,
    Err(err) => {
      tracing::warn!(error = %err, "worker registration failed: invalid script URL");
      return None;
    }
  };
  let scope = match script_url.join("./") {
    Ok(scope) => scope,
    Err(err) => {
      tracing::warn!(error = %err, "worker registration failed: invalid scope");
      return None;
    }
  };
  if scope != worker.settings().scope {
    tracing::warn!(
      script = %script_url,
      expected = %worker.settings().scope,
      "worker registration failed: script is outside the worker scope"
    );
    return None;
  }

  let client = worker.clients().open(page.url().clone());

  let registered = |state| {
    Some(Registration {
      script_url: script_url.clone(),
      scope: scope.clone(),
      state,
      client,
    })
  };
  let abandon = || -> Option<Registration> {
    worker.clients().close(client);
    None
  };

  match worker.state() {
    WorkerState::Activated => return registered(WorkerState::Activated),
    WorkerState::Parsed => match worker.resume().await {
      Ok(true) => {
        worker.clients().claim(&scope);
        return registered(WorkerState::Activated);
      }
      Ok(false) => {}
      Err(err) => {
        tracing::warn!(error = %err, "could not inspect existing cache");
      }
    },
    _ => {}
  }

  if let Err(err) = worker.install().await {
    tracing::warn!(error = %err, "worker registration failed");
    return abandon();
  }
  if let Err(err) = worker.activate().await {
    tracing::warn!(error = %err, "worker activation failed");
    return abandon();
  }
  registered(worker.state())
}

/// Page networking: requests go through the worker when it intercepts them and straight to
/// the network otherwise.
pub struct ControlledFetch<S, N> {
  worker: Arc<OfflineWorker<S, N>>,
  network: Arc<N>,
  pending: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: CacheStorage, N: Network> ControlledFetch<S, N> {
  /// Route requests through `worker`, using `network` for anything it does not intercept.
  pub fn new(worker: Arc<OfflineWorker<S, N>>, network: Arc<N>) -> Self {
    Self {
      worker,
      network,
      pending: Mutex::new(Vec::new()),
    }
  }

  /// Revalidations still running. Finished ones are dropped as they are noticed.
  pub fn pending(&self) -> usize {
    self
      .pending
      .lock()
      .map(|mut pending| {
        pending.retain(|task| !task.is_finished());
        pending.len()
      })
      .unwrap_or_default()
  }

  /// Wait for background revalidation started by earlier requests.
  pub async fn settle(&self) {
    let pending: Vec<JoinHandle<()>> = self
      .pending
      .lock()
      .map(|mut pending| pending.drain(..).collect())
      .unwrap_or_default();
    for task in pending {
      if let Err(err) = task.await {
        tracing::warn!(error = %err, "revalidation did not complete");
      }
    }
  }
}

impl<S: CacheStorage, N: Network> Network for ControlledFetch<S, N> {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    let mut event = FetchEvent::new(request.clone());
    match self.worker.handle_fetch(&mut event).await {
      Some(response) => {
        if event.pending() > 0 {
          let task = tokio::spawn(event.settle());
          if let Ok(mut pending) = self.pending.lock() {
            pending.retain(|task| !task.is_finished());
            pending.push(task);
          }
        }
        Ok(response)
      }
      None => self.network.fetch(request).await,
    }
  }
}
