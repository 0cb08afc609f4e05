//! The resolved deployment prefix and the path builder every caller goes through.

use std::fmt;

use crate::base_path::filters::{is_absolute_url, strip_current_dir};

/// Deployment prefix computed once per page or worker lifetime.
///
/// The base path is either empty (the site is served from its host's root) or a single
/// leading segment such as `/my-app`, never with a trailing slash. The value is immutable
/// once built; a new page load or worker activation resolves a fresh context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentContext {
  base_path: String,
}

impl DeploymentContext {
  /// Context for a site served from the host root.
  pub fn root() -> Self {
    Self::default()
  }

  /// Context for an explicitly declared base path.
  ///
  /// A single trailing slash is stripped, so both `/my-app/` and `/my-app` declare the
  /// same prefix and `/` declares the root.
  pub fn from_declared(value: &str) -> Self {
    let base_path = value.strip_suffix('/').unwrap_or(value).to_string();
    Self { base_path }
  }

  /// The computed prefix, `""` for root deployments.
  pub fn base_path(&self) -> &str {
    &self.base_path
  }

  /// Returns `true` when the site is served from the host root.
  pub fn is_root(&self) -> bool {
    self.base_path.is_empty()
  }

  /// Link target for the site home page.
  pub fn home(&self) -> String {
    if self.is_root() {
      "/".to_string()
    } else {
      format!("{}/", self.base_path)
    }
  }

  /// Build the URL for a site-relative path.
  ///
  /// Paths must not begin with `/`. Such paths are returned unchanged and logged, because
  /// a root-relative path silently bypasses a non-empty base. Absolute `http(s)://` URLs
  /// pass through. A leading `./` is ignored, and an empty path names the site home.
  ///
  /// Root deployments produce document-relative paths (`assets/x.json`), project
  /// deployments produce root-relative ones (`/my-app/assets/x.json`).
  pub fn with_base(&self, relative_path: &str) -> String {
    if is_absolute_url(relative_path) {
      return relative_path.to_string();
    }

    if relative_path.starts_with('/') {
      tracing::warn!(
        path = relative_path,
        base_path = %self.base_path,
        "path passed to with_base starts with '/' and will not receive the base prefix"
      );
      return relative_path.to_string();
    }

    let cleaned = strip_current_dir(relative_path);
    if cleaned.is_empty() {
      return self.home();
    }

    if self.is_root() {
      cleaned.to_string()
    } else {
      format!("{}/{}", self.base_path, cleaned)
    }
  }

  /// Build a root-relative path suitable for joining onto an origin URL.
  pub fn absolute_path(&self, relative_path: &str) -> String {
    let resolved = self.with_base(relative_path);
    if resolved.starts_with('/') || is_absolute_url(&resolved) {
      resolved
    } else {
      format!("/{resolved}")
    }
  }
}

impl fmt::Display for DeploymentContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_root() {
      f.write_str("(root)")
    } else {
      f.write_str(&self.base_path)
    }
  }
}
