//! Deployment configuration loader for the offline worker.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use url::Url;

use crate::base_path::DEFAULT_RESERVED_DIRS;
use crate::manifest::{
    CacheVersion, CoreAssetManifest, DEFAULT_APP_NAME, DEFAULT_CACHE_VERSION, DEFAULT_CORE_ASSETS,
};
use crate::worker::WorkerSettings;

/// File name searched for in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "site-worker.config.json";

/// Discoverable deployment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Application name embedded in bucket names.
    pub app_name: String,
    /// Cache version tag; bump it whenever a precached asset changes.
    pub cache_version: String,
    /// Origin the site is served from.
    pub origin: String,
    /// Worker scope path on the origin.
    pub scope: String,
    /// Explicit base path, taking precedence over detection from the scope.
    pub base_path: Option<String>,
    /// First path segments that belong to site content rather than a project prefix.
    pub reserved_dirs: Vec<String>,
    /// Site-relative paths precached on install.
    pub core_assets: Vec<String>,
    /// Directory holding the persistent cache buckets.
    pub cache_dir: String,
    /// Local directory to serve instead of fetching from the origin.
    pub site_dir: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.into(),
            cache_version: DEFAULT_CACHE_VERSION.into(),
            origin: "http://localhost:8000/".into(),
            scope: "/".into(),
            base_path: None,
            reserved_dirs: DEFAULT_RESERVED_DIRS.iter().map(|dir| dir.to_string()).collect(),
            core_assets: DEFAULT_CORE_ASSETS.iter().map(|path| path.to_string()).collect(),
            cache_dir: "target/site-worker".into(),
            site_dir: None,
        }
    }
}

impl SiteConfig {
    /// Attempt to load configuration from the provided directory.
    ///
    /// A missing or unparsable file yields the defaults.
    pub fn discover(dir: &Path) -> Self {
        let candidate = dir.join(DEFAULT_CONFIG_FILE);
        match Self::from_path(&candidate) {
            Ok(config) => config,
            Err(err) => {
                if candidate.exists() {
                    tracing::warn!(error = %format!("{err:#}"), "ignoring invalid configuration");
                }
                Self::default()
            }
        }
    }

    /// Read configuration from a specific JSON file.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Reserved directory names, trimmed and de-duplicated.
    pub fn reserved_dirs(&self) -> BTreeSet<String> {
        normalise_list(self.reserved_dirs.iter().cloned())
    }

    /// Worker scope as an absolute URL on the configured origin.
    pub fn scope_url(&self) -> anyhow::Result<Url> {
        let origin = Url::parse(&self.origin)
            .with_context(|| format!("invalid origin {:?}", self.origin))?;
        let scope = if self.scope.ends_with('/') {
            self.scope.clone()
        } else {
            format!("{}/", self.scope)
        };
        origin
            .join(&scope)
            .with_context(|| format!("invalid scope {:?}", self.scope))
    }

    /// Bucket version for this deployment.
    pub fn cache_version(&self) -> CacheVersion {
        CacheVersion::new(self.app_name.trim(), self.cache_version.trim())
    }

    /// Core assets, dropping blank entries.
    pub fn manifest(&self) -> CoreAssetManifest {
        CoreAssetManifest::new(
            self.core_assets
                .iter()
                .map(|path| path.trim())
                .filter(|path| !path.is_empty()),
        )
    }

    /// Everything the worker needs, with the base path resolved.
    pub fn worker_settings(&self) -> anyhow::Result<WorkerSettings> {
        Ok(WorkerSettings::detect(
            self.scope_url()?,
            self.base_path.as_deref(),
            &self.reserved_dirs(),
            self.cache_version(),
            self.manifest(),
        ))
    }

    /// Cache directory resolved against `dir` when relative.
    pub fn cache_dir_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.cache_dir)
    }
}

fn normalise_list(values: impl IntoIterator<Item = String>) -> BTreeSet<String> {
    values
        .into_iter()
        .map(|value| value.trim().trim_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .collect()
}
