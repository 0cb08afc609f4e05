//! Network seam used by the worker for install fetches and runtime revalidation.

use std::future::Future;
use std::path::PathBuf;

use crate::http::{Request, Response};

mod http;
mod site_dir;
#[cfg(test)]
pub(crate) mod testing;

pub use self::http::HttpNetwork;
pub use site_dir::SiteDirectory;

/// Errors raised when a request cannot produce any response at all.
///
/// An HTTP error status is not a network error: it is a response and is returned as one.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
  /// The HTTP client failed to send the request or read the body.
  #[error("request failed: {0}")]
  Http(#[from] reqwest::Error),

  /// Reading a file from a local site directory failed.
  #[error("failed to read {}: {source}", path.display())]
  Io {
    /// Path that caused the error.
    path: PathBuf,
    /// Source I/O error.
    source: std::io::Error,
  },

  /// The method name is not a valid HTTP token.
  #[error("invalid HTTP method {0:?}")]
  InvalidMethod(String),

  /// No connectivity.
  #[error("network unavailable")]
  Disconnected,
}

/// Something that can turn a request into a response.
pub trait Network: Send + Sync + 'static {
  /// Perform the request.
  fn fetch(&self, request: &Request)
  -> impl Future<Output = Result<Response, NetworkError>> + Send;
}

/// A network that is always down.
#[derive(Debug, Clone, Copy, Default)]
pub struct Disconnected;

impl Network for Disconnected {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    tracing::debug!(url = %request.url, "network disconnected");
    Err(NetworkError::Disconnected)
  }
}
