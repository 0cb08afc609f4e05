//! Fetch interception: cache-first with background revalidation.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::cache::{CacheError, CacheStorage};
use crate::http::{Method, Request, Response};
use crate::network::{Network, NetworkError};
use crate::worker::offline_page::offline_response;
use crate::worker::{OfflineWorker, WorkerState};

/// A request routed through the worker, plus the work it must outlive.
///
/// Background tasks registered with [`FetchEvent::wait_until`] keep the event alive; the
/// host awaits [`FetchEvent::settle`] before it may tear the worker down, so revalidation
/// writes are never lost.
#[derive(Debug)]
pub struct FetchEvent {
  request: Request,
  extensions: Vec<JoinHandle<()>>,
}

impl FetchEvent {
  /// Wrap an incoming request.
  pub fn new(request: Request) -> Self {
    Self {
      request,
      extensions: Vec::new(),
    }
  }

  /// The intercepted request.
  pub fn request(&self) -> &Request {
    &self.request
  }

  /// Extend the event's lifetime until `task` completes.
  pub fn wait_until(&mut self, task: JoinHandle<()>) {
    self.extensions.push(task);
  }

  /// Number of outstanding lifetime extensions.
  pub fn pending(&self) -> usize {
    self.extensions.len()
  }

  /// Wait for every lifetime extension to finish.
  pub async fn settle(self) {
    for task in self.extensions {
      if let Err(err) = task.await {
        tracing::warn!(error = %err, "fetch event extension did not complete");
      }
    }
  }
}

async fn fetch_and_store<S: CacheStorage, N: Network>(
  storage: Arc<S>,
  network: Arc<N>,
  bucket: String,
  request: Request,
) -> Result<Response, NetworkError> {
  let response = network.fetch(&request).await?;

  if request.method == Method::Get && response.ok() {
    match storage.put(&bucket, &request, &response).await {
      Ok(()) => {}
      Err(CacheError::MissingBucket(_)) => {
        tracing::debug!(url = %request.url, bucket, "bucket retired, revalidation dropped");
      }
      Err(err) => {
        tracing::warn!(url = %request.url, error = %err, "failed to update cache entry");
      }
    }
  }
  Ok(response)
}

impl<S: CacheStorage, N: Network> OfflineWorker<S, N> {
  /// Returns `true` when the worker would intercept `request`.
  ///
  /// Only an activated worker intercepts, and only requests to its own origin.
  pub fn intercepts(&self, request: &Request) -> bool {
    self.state() == WorkerState::Activated
      && request.url.origin() == self.settings.scope.origin()
  }

  /// Answer a fetch event, or `None` to let the request go to the network untouched.
  ///
  /// The network request starts before the cache lookup. A cached response is returned
  /// immediately while the network response refreshes the bucket in the background; without
  /// one, the network response is awaited. When the network fails, navigations receive the
  /// offline notice and everything else an empty `503`.
  pub async fn handle_fetch(&self, event: &mut FetchEvent) -> Option<Response> {
    if !self.intercepts(event.request()) {
      tracing::trace!(url = %event.request().url, "request not intercepted");
      return None;
    }

    let request = event.request().clone();
    let bucket = self.bucket_name();
    let network_task = tokio::spawn(fetch_and_store(
      Arc::clone(&self.storage),
      Arc::clone(&self.network),
      bucket.clone(),
      request.clone(),
    ));

    let cached = match self.storage.match_request(&bucket, &request).await {
      Ok(cached) => cached,
      Err(err) => {
        tracing::warn!(url = %request.url, error = %err, "cache lookup failed");
        None
      }
    };

    if let Some(cached) = cached {
      tracing::debug!(url = %request.url, "serving from cache, revalidating");
      let url = request.url.clone();
      event.wait_until(tokio::spawn(async move {
        match network_task.await {
          Ok(Ok(response)) => {
            tracing::debug!(%url, status = response.status, "revalidated");
          }
          Ok(Err(err)) => {
            tracing::debug!(%url, error = %err, "background revalidation failed");
          }
          Err(err) => {
            tracing::warn!(%url, error = %err, "revalidation task aborted");
          }
        }
      }));
      return Some(cached);
    }

    match network_task.await {
      Ok(Ok(response)) => {
        tracing::debug!(url = %request.url, status = response.status, "served from network");
        Some(response)
      }
      Ok(Err(err)) => {
        tracing::debug!(url = %request.url, error = %err, "network failed with nothing cached");
        Some(self.offline_fallback(&request))
      }
      Err(err) => {
        tracing::warn!(url = %request.url, error = %err, "network task aborted");
        Some(self.offline_fallback(&request))
      }
    }
  }

  fn offline_fallback(&self, request: &Request) -> Response {
    if request.is_navigation() {
      offline_response(&self.settings.context)
    } else {
      Response::service_unavailable()
    }
  }
}
