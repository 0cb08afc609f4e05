//! Directory-backed cache storage.
//!
//! Layout: `<root>/<bucket>/<entry>.json`, where the entry file name is the URL-safe base64
//! SHA-256 digest of the cache key and the key itself is stored inside the entry. Each entry
//! is written to a temporary file and renamed into place, so a reader sees either the
//! previous or the new response, never a partial one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::{Engine as _, engine::general_purpose};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::cache::{CacheError, CacheStorage, ensure_cacheable};
use crate::http::{Method, Request, Response};

const ENTRY_EXTENSION: &str = "json";
const TEMP_PREFIX: &str = ".tmp-";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
  url: String,
  status: u16,
  #[serde(default)]
  headers: Vec<(String, String)>,
  body: String,
}

/// Cache storage persisted below a directory on disk.
#[derive(Debug, Clone)]
pub struct DiskCacheStorage {
  root: PathBuf,
}

fn bucket_name_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("invalid bucket name regex")
  })
}

fn io_error(path: &Path, source: std::io::Error) -> CacheError {
  CacheError::Io {
    path: path.to_path_buf(),
    source,
  }
}

fn entry_file_name(key: &str) -> String {
  let digest = Sha256::digest(key.as_bytes());
  format!(
    "{}.{}",
    general_purpose::URL_SAFE_NO_PAD.encode(digest),
    ENTRY_EXTENSION
  )
}

async fn read_entry(path: &Path) -> Result<Option<StoredEntry>, CacheError> {
  let content = match tokio::fs::read_to_string(path).await {
    Ok(content) => content,
    Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
    Err(err) => return Err(io_error(path, err)),
  };
  Ok(Some(serde_json::from_str(&content)?))
}

impl DiskCacheStorage {
  /// Storage rooted at `root`. The directory is created lazily.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// Root directory holding the buckets.
  pub fn root(&self) -> &Path {
    &self.root
  }

  fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, CacheError> {
    if !bucket_name_pattern().is_match(bucket) {
      return Err(CacheError::InvalidBucketName(bucket.to_string()));
    }
    Ok(self.root.join(bucket))
  }
}

impl CacheStorage for DiskCacheStorage {
  async fn open(&self, bucket: &str) -> Result<(), CacheError> {
    let dir = self.bucket_dir(bucket)?;
    tokio::fs::create_dir_all(&dir)
      .await
      .map_err(|err| io_error(&dir, err))
  }

  async fn keys(&self) -> Result<Vec<String>, CacheError> {
    let mut entries = match tokio::fs::read_dir(&self.root).await {
      Ok(entries) => entries,
      Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
      Err(err) => return Err(io_error(&self.root, err)),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries
      .next_entry()
      .await
      .map_err(|err| io_error(&self.root, err))?
    {
      let is_dir = entry
        .file_type()
        .await
        .map_err(|err| io_error(&entry.path(), err))?
        .is_dir();
      let name = entry.file_name().to_string_lossy().to_string();
      if is_dir && bucket_name_pattern().is_match(&name) {
        names.push(name);
      }
    }
    names.sort();
    Ok(names)
  }

  async fn has(&self, bucket: &str) -> Result<bool, CacheError> {
    let dir = self.bucket_dir(bucket)?;
    match tokio::fs::metadata(&dir).await {
      Ok(metadata) => Ok(metadata.is_dir()),
      Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
      Err(err) => Err(io_error(&dir, err)),
    }
  }

  async fn delete(&self, bucket: &str) -> Result<bool, CacheError> {
    let dir = self.bucket_dir(bucket)?;
    match tokio::fs::remove_dir_all(&dir).await {
      Ok(()) => Ok(true),
      Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
      Err(err) => Err(io_error(&dir, err)),
    }
  }

  async fn match_request(
    &self,
    bucket: &str,
    request: &Request,
  ) -> Result<Option<Response>, CacheError> {
    if request.method != Method::Get {
      return Ok(None);
    }

    let path = self
      .bucket_dir(bucket)?
      .join(entry_file_name(&request.cache_key()));
    let Some(stored) = read_entry(&path).await? else {
      return Ok(None);
    };
    let body = general_purpose::STANDARD
      .decode(stored.body.as_bytes())
      .map_err(|err| CacheError::Corrupt {
        path: path.clone(),
        reason: err.to_string(),
      })?;

    Ok(Some(Response {
      status: stored.status,
      headers: stored.headers,
      body,
    }))
  }

  async fn put(
    &self,
    bucket: &str,
    request: &Request,
    response: &Response,
  ) -> Result<(), CacheError> {
    ensure_cacheable(request)?;

    let dir = self.bucket_dir(bucket)?;
    if !self.has(bucket).await? {
      return Err(CacheError::MissingBucket(bucket.to_string()));
    }

    let key = request.cache_key();
    let stored = StoredEntry {
      url: key.clone(),
      status: response.status,
      headers: response.headers.clone(),
      body: general_purpose::STANDARD.encode(&response.body),
    };
    let json = serde_json::to_vec(&stored)?;

    let target = dir.join(entry_file_name(&key));
    let temp = dir.join(format!(
      "{TEMP_PREFIX}{}-{}",
      std::process::id(),
      TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    match tokio::fs::write(&temp, &json).await {
      Ok(()) => {}
      Err(err) if err.kind() == ErrorKind::NotFound => {
        return Err(CacheError::MissingBucket(bucket.to_string()));
      }
      Err(err) => return Err(io_error(&temp, err)),
    }
    if let Err(err) = tokio::fs::rename(&temp, &target).await {
      let _ = tokio::fs::remove_file(&temp).await;
      return Err(io_error(&target, err));
    }
    Ok(())
  }

  async fn entries(&self, bucket: &str) -> Result<Vec<String>, CacheError> {
    let dir = self.bucket_dir(bucket)?;
    let mut entries = match tokio::fs::read_dir(&dir).await {
      Ok(entries) => entries,
      Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
      Err(err) => return Err(io_error(&dir, err)),
    };

    let mut keys = Vec::new();
    while let Some(entry) = entries
      .next_entry()
      .await
      .map_err(|err| io_error(&dir, err))?
    {
      let name = entry.file_name().to_string_lossy().to_string();
      if name.starts_with(TEMP_PREFIX) || !name.ends_with(ENTRY_EXTENSION) {
        continue;
      }
      if let Some(stored) = read_entry(&entry.path()).await? {
        keys.push(stored.url);
      }
    }
    keys.sort();
    Ok(keys)
  }
}
