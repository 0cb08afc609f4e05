//! Cache storage whose writes can be made to fail, used by unit tests.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::cache::{CacheError, CacheStorage, MemoryCacheStorage};
use crate::http::{Request, Response};

/// In-memory storage that starts refusing `put` after a set number of successful writes.
#[derive(Debug, Clone, Default)]
pub(crate) struct FailingCacheStorage {
  inner: MemoryCacheStorage,
  writes_left: Arc<Mutex<Option<usize>>>,
}

impl FailingCacheStorage {
  /// Every write fails.
  pub(crate) fn failing() -> Self {
    Self::failing_after(0)
  }

  /// The first `writes` puts succeed, every later one fails.
  pub(crate) fn failing_after(writes: usize) -> Self {
    Self {
      writes_left: Arc::new(Mutex::new(Some(writes))),
      ..Self::default()
    }
  }

  /// Storage shared with `inner` that never fails until told to.
  pub(crate) fn wrapping(inner: MemoryCacheStorage) -> Self {
    Self {
      inner,
      writes_left: Arc::new(Mutex::new(None)),
    }
  }

  /// Fail every write from now on.
  pub(crate) fn fail_writes(&self) {
    *self.writes_left.lock().unwrap() = Some(0);
  }

  pub(crate) fn inner(&self) -> &MemoryCacheStorage {
    &self.inner
  }
}

impl CacheStorage for FailingCacheStorage {
  async fn open(&self, bucket: &str) -> Result<(), CacheError> {
    self.inner.open(bucket).await
  }

  async fn keys(&self) -> Result<Vec<String>, CacheError> {
    self.inner.keys().await
  }

  async fn has(&self, bucket: &str) -> Result<bool, CacheError> {
    self.inner.has(bucket).await
  }

  async fn delete(&self, bucket: &str) -> Result<bool, CacheError> {
    self.inner.delete(bucket).await
  }

  async fn match_request(
    &self,
    bucket: &str,
    request: &Request,
  ) -> Result<Option<Response>, CacheError> {
    self.inner.match_request(bucket, request).await
  }

  async fn put(
    &self,
    bucket: &str,
    request: &Request,
    response: &Response,
  ) -> Result<(), CacheError> {
    let refused = {
      let mut writes_left = self.writes_left.lock().unwrap();
      match writes_left.as_mut() {
        Some(0) => true,
        Some(left) => {
          *left -= 1;
          false
        }
        None => false,
      }
    };
    if refused {
      return Err(CacheError::Io {
        path: PathBuf::from(bucket),
        source: io::Error::other("quota exceeded"),
      });
    }
    self.inner.put(bucket, request, response).await
  }

  async fn entries(&self, bucket: &str) -> Result<Vec<String>, CacheError> {
    self.inner.entries(bucket).await
  }
}
