//! Versioned bucket naming and the list of assets precached on install.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::base_path::DeploymentContext;

/// Application name used when none is configured.
pub const DEFAULT_APP_NAME: &str = "islamic-kids";

/// Cache version tag shipped with this release.
///
/// Any change to [`DEFAULT_CORE_ASSETS`] or to the content of a precached asset must be
/// paired with a new tag, otherwise returning visitors keep the previous bucket.
pub const DEFAULT_CACHE_VERSION: &str = "v1.1.3";

/// Site-relative paths precached on install.
pub const DEFAULT_CORE_ASSETS: [&str; 13] = [
    "./",
    "index.html",
    "parents.html",
    "lessons/index.html",
    "lessons/lesson.html",
    "assets/styles.css",
    "assets/app.js",
    "assets/main.js",
    "assets/base-path.js",
    "data/lessons.json",
    "manifest.webmanifest",
    "assets/icon.svg",
    "assets/icon-maskable.svg",
];

/// Version tag naming the current cache bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheVersion {
    app_name: String,
    version: String,
}

impl CacheVersion {
    /// Version tag for an application.
    pub fn new(app_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            version: version.into(),
        }
    }

    /// The raw version tag, e.g. `v1.1.3`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Bucket name `<app-name>-cache-<version>`.
    pub fn bucket_name(&self) -> String {
        format!("{}-cache-{}", self.app_name, self.version)
    }

    /// Returns `true` when `bucket` is not the current bucket and should be evicted.
    pub fn is_stale(&self, bucket: &str) -> bool {
        bucket != self.bucket_name()
    }
}

impl Default for CacheVersion {
    fn default() -> Self {
        Self::new(DEFAULT_APP_NAME, DEFAULT_CACHE_VERSION)
    }
}

impl fmt::Display for CacheVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.bucket_name())
    }
}

/// Ordered, de-duplicated set of site-relative paths that must be available offline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreAssetManifest {
    paths: Vec<String>,
}

impl CoreAssetManifest {
    /// Build from site-relative paths, keeping the first occurrence of duplicates.
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for path in paths {
            let path = path.into();
            if !unique.contains(&path) {
                unique.push(path);
            }
        }
        Self { paths: unique }
    }

    /// The site-relative paths as declared.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Number of assets.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Returns `true` when nothing is precached.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Every path passed through the deployment's `with_base`.
    pub fn resolve(&self, context: &DeploymentContext) -> Vec<String> {
        self.paths
            .iter()
            .map(|path| context.with_base(path))
            .collect()
    }
}

impl Default for CoreAssetManifest {
    fn default() -> Self {
        Self::new(DEFAULT_CORE_ASSETS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_name_embeds_app_and_version() {
        let version = CacheVersion::default();
        assert_eq!(version.bucket_name(), "islamic-kids-cache-v1.1.3");
        assert!(version.is_stale("islamic-kids-cache-v1.1.2"));
        assert!(!version.is_stale("islamic-kids-cache-v1.1.3"));
    }

    #[test]
    fn resolves_paths_through_project_prefix() {
        let manifest = CoreAssetManifest::new(["./", "index.html", "data/lessons.json"]);
        let resolved = manifest.resolve(&DeploymentContext::from_declared("/my-app"));
        assert_eq!(resolved, vec![
            "/my-app/".to_string(),
            "/my-app/index.html".to_string(),
            "/my-app/data/lessons.json".to_string(),
        ]);
    }

    #[test]
    fn drops_duplicate_paths() {
        let manifest = CoreAssetManifest::new(["index.html", "index.html", "sw.js"]);
        assert_eq!(manifest.len(), 2);
    }

    #[test]
    fn default_manifest_includes_lesson_data() {
        let manifest = CoreAssetManifest::default();
        assert!(manifest.paths().iter().any(|path| path == "data/lessons.json"));
        assert_eq!(manifest.len(), DEFAULT_CORE_ASSETS.len());
    }
}
