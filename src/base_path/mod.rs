//! Deployment base-path resolution shared by pages and the offline worker.
//!
//! A site may be served from its host root or from a one-level project subpath. The
//! resolver evaluates an ordered list of [`BasePathStrategy`] values and the first one that
//! produces a value wins; when none does, the site is assumed to live at the root. The
//! result is a [`DeploymentContext`] that callers thread through to everything building
//! URLs, instead of consulting global state.

mod context;
mod filters;
mod strategies;

pub use context::DeploymentContext;
pub use filters::is_absolute_url;
pub use strategies::{
  BASE_PATH_META_NAME, BasePathStrategy, DEFAULT_RESERVED_DIRS, DeclaredOverride, MetaOverride,
  PathnameDetection, default_reserved_dirs, find_meta_content,
};

/// Evaluate strategies in order and build the deployment context from the first match.
pub fn resolve_base_path(strategies: &[&dyn BasePathStrategy]) -> DeploymentContext {
  for strategy in strategies {
    if let Some(value) = strategy.resolve() {
      tracing::debug!(strategy = strategy.name(), base_path = %value, "resolved base path");
      return DeploymentContext::from_declared(&value);
    }
  }

  tracing::debug!("no base path strategy matched, assuming root deployment");
  DeploymentContext::root()
}
