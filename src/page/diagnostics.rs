//! Read-only diagnostic overlay enabled with `?debug=1`.

use serde::Serialize;
use url::Url;

use crate::html::escape_html;

/// Query parameter that turns on the overlay.
pub const DEBUG_QUERY_PARAM: &str = "debug";

/// Returns `true` when the page URL asks for diagnostics.
pub fn debug_requested(url: &Url) -> bool {
  url
    .query_pairs()
    .any(|(key, value)| key == DEBUG_QUERY_PARAM && value == "1")
}

/// Snapshot of what the page resolved, reported by the overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
  /// Computed base path, `""` for root deployments.
  pub base_path: String,
  /// Path of the current page.
  pub location: String,
  /// Last lesson data URL the page tried.
  pub manifest_url: String,
  /// Lessons loaded, once known.
  pub lessons_count: Option<usize>,
  /// Most recent load failure.
  pub last_error: Option<String>,
}

impl DebugInfo {
  /// Render the overlay as an HTML fragment.
  pub fn render_overlay(&self) -> String {
    let lessons = self
      .lessons_count
      .map(|count| count.to_string())
      .unwrap_or_else(|| "\u{2014}".to_string());
    let error = self
      .last_error
      .as_deref()
      .map(|err| {
        format!(
          "\n  <div class=\"debug-error\"><strong>Last Error:</strong><br>{}</div>",
          escape_html(err)
        )
      })
      .unwrap_or_default();

    format!(
      r#"<div id="debug-overlay">
  <div class="debug-title">DEBUG MODE</div>
  <div><strong>Base Path:</strong> "{base}"</div>
  <div><strong>Location:</strong> {location}</div>
  <div><strong>Manifest URL:</strong> {manifest}</div>
  <div><strong>Lessons Count:</strong> {lessons}</div>{error}
  <div class="debug-hint">Remove ?debug=1 to hide</div>
</div>"#,
      base = escape_html(&self.base_path),
      location = escape_html(&self.location),
      manifest = escape_html(&self.manifest_url),
    )
  }
}
