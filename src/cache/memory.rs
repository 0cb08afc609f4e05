use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::cache::{CacheError, CacheStorage, ensure_cacheable};
use crate::http::{Method, Request, Response};

type Buckets = BTreeMap<String, BTreeMap<String, Response>>;

/// In-process cache storage. Clones share the same buckets.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStorage {
  buckets: Arc<Mutex<Buckets>>,
}

impl MemoryCacheStorage {
  /// Empty storage.
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, Buckets> {
    self
      .buckets
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

impl CacheStorage for MemoryCacheStorage {
  async fn open(&self, bucket: &str) -> Result<(), CacheError> {
    self.lock().entry(bucket.to_string()).or_default();
    Ok(())
  }

  async fn keys(&self) -> Result<Vec<String>, CacheError> {
    Ok(self.lock().keys().cloned().collect())
  }

  async fn has(&self, bucket: &str) -> Result<bool, CacheError> {
    Ok(self.lock().contains_key(bucket))
  }

  async fn delete(&self, bucket: &str) -> Result<bool, CacheError> {
    Ok(self.lock().remove(bucket).is_some())
  }

  async fn match_request(
    &self,
    bucket: &str,
    request: &Request,
  ) -> Result<Option<Response>, CacheError> {
    if request.method != Method::Get {
      return Ok(None);
    }
    Ok(
      self
        .lock()
        .get(bucket)
        .and_then(|entries| entries.get(&request.cache_key()))
        .cloned(),
    )
  }

  async fn put(
    &self,
    bucket: &str,
    request: &Request,
    response: &Response,
  ) -> Result<(), CacheError> {
    ensure_cacheable(request)?;
    let mut buckets = self.lock();
    let entries = buckets
      .get_mut(bucket)
      .ok_or_else(|| CacheError::MissingBucket(bucket.to_string()))?;
    entries.insert(request.cache_key(), response.clone());
    Ok(())
  }

  async fn entries(&self, bucket: &str) -> Result<Vec<String>, CacheError> {
    Ok(
      self
        .lock()
        .get(bucket)
        .map(|entries| entries.keys().cloned().collect())
        .unwrap_or_default(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  fn request(path: &str) -> Request {
    Request::get(Url::parse("https://example.com/").unwrap().join(path).unwrap())
  }

  #[tokio::test]
  async fn put_overwrites_previous_entry() {
    let storage = MemoryCacheStorage::new();
    storage.open("a").await.unwrap();
    storage.put("a", &request("x.css"), &Response::new(200, "old")).await.unwrap();
    storage.put("a", &request("x.css"), &Response::new(200, "new")).await.unwrap();

    let hit = storage.match_request("a", &request("x.css")).await.unwrap();
    assert_eq!(hit.unwrap().text(), "new");
    assert_eq!(storage.entries("a").await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn buckets_are_isolated_and_deletable() {
    let storage = MemoryCacheStorage::new();
    storage.open("old").await.unwrap();
    storage.open("new").await.unwrap();
    storage.put("new", &request("x.css"), &Response::new(200, "x")).await.unwrap();

    assert_eq!(storage.keys().await.unwrap(), vec!["new".to_string(), "old".to_string()]);
    assert!(storage.match_request("old", &request("x.css")).await.unwrap().is_none());

    assert!(storage.delete("old").await.unwrap());
    assert!(!storage.delete("old").await.unwrap());
    assert!(!storage.has("old").await.unwrap());
  }

  #[tokio::test]
  async fn put_does_not_recreate_deleted_bucket() {
    let storage = MemoryCacheStorage::new();
    storage.open("site-cache-v1").await.unwrap();
    storage.delete("site-cache-v1").await.unwrap();

    let result = storage
      .put("site-cache-v1", &request("x.css"), &Response::new(200, "late"))
      .await;
    assert!(matches!(result, Err(CacheError::MissingBucket(_))));
    assert!(storage.keys().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn refuses_non_get_requests() {
    let storage = MemoryCacheStorage::new();
    let post = request("api").with_method(Method::Post);
    let result = storage.put("a", &post, &Response::new(200, "")).await;
    assert!(matches!(result, Err(CacheError::UnsupportedMethod(_))));
    assert!(storage.match_request("a", &post).await.unwrap().is_none());
  }
}
