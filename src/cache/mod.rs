//! Named, persistent request/response buckets.
//!
//! A bucket is keyed by request URL and only stores `GET` responses. Writes are atomic per
//! key and last-writer-wins; there is no cross-key transaction, so callers that need a
//! bucket to be all-or-nothing (worker install) stage their writes themselves.

use std::future::Future;
use std::path::PathBuf;

use crate::http::{Request, Response};

mod disk;
mod memory;
#[cfg(test)]
pub(crate) mod testing;

pub use disk::DiskCacheStorage;
pub use memory::MemoryCacheStorage;

/// Errors raised by cache storage backends.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
  /// Filesystem access failed.
  #[error("cache I/O failed at {}: {source}", path.display())]
  Io {
    /// Path that caused the error.
    path: PathBuf,
    /// Source I/O error.
    source: std::io::Error,
  },

  /// A stored entry could not be serialised or parsed.
  #[error("failed to encode cache entry: {0}")]
  Encode(#[from] serde_json::Error),

  /// A stored entry exists but its contents are unusable.
  #[error("corrupt cache entry at {}: {reason}", path.display())]
  Corrupt {
    /// Entry path.
    path: PathBuf,
    /// What was wrong with it.
    reason: String,
  },

  /// Bucket names are restricted to characters safe for directory names.
  #[error("invalid cache bucket name {0:?}")]
  InvalidBucketName(String),

  /// The bucket does not exist. Only [`CacheStorage::open`] creates buckets.
  #[error("cache bucket {0:?} does not exist")]
  MissingBucket(String),

  /// Only `GET` requests can be stored.
  #[error("cannot cache {0} requests")]
  UnsupportedMethod(String),
}

/// Storage holding every cache bucket for one origin.
pub trait CacheStorage: Send + Sync + 'static {
  /// Create the bucket if it does not exist.
  fn open(&self, bucket: &str) -> impl Future<Output = Result<(), CacheError>> + Send;

  /// Names of all existing buckets, sorted.
  fn keys(&self) -> impl Future<Output = Result<Vec<String>, CacheError>> + Send;

  /// Returns `true` when the bucket exists.
  fn has(&self, bucket: &str) -> impl Future<Output = Result<bool, CacheError>> + Send;

  /// Delete a bucket and everything in it. Returns `false` when it did not exist.
  fn delete(&self, bucket: &str) -> impl Future<Output = Result<bool, CacheError>> + Send;

  /// Stored response for the request, if any. Non-`GET` requests never match.
  fn match_request(
    &self,
    bucket: &str,
    request: &Request,
  ) -> impl Future<Output = Result<Option<Response>, CacheError>> + Send;

  /// Store a response, replacing any previous entry for the same URL.
  ///
  /// Fails with [`CacheError::MissingBucket`] when the bucket was never opened or has been
  /// deleted, so a late write cannot bring a retired bucket back.
  fn put(
    &self,
    bucket: &str,
    request: &Request,
    response: &Response,
  ) -> impl Future<Output = Result<(), CacheError>> + Send;

  /// Cache keys stored in the bucket, sorted. Missing buckets have no entries.
  fn entries(&self, bucket: &str) -> impl Future<Output = Result<Vec<String>, CacheError>> + Send;
}

pub(crate) fn ensure_cacheable(request: &Request) -> Result<(), CacheError> {
  if request.method == crate::http::Method::Get {
    Ok(())
  } else {
    Err(CacheError::UnsupportedMethod(request.method.to_string()))
  }
}
