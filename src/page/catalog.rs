//! Lesson catalog loading through the page's base path.

use serde::{Deserialize, Serialize};

use crate::http::Request;
use crate::network::{Network, NetworkError};
use crate::page::PageContext;

/// Canonical location of the lesson data.
pub const LESSONS_DATA_PATH: &str = "data/lessons.json";

/// Older location still served by some deployments.
pub const LEGACY_LESSONS_DATA_PATH: &str = "assets/lessons.json";

/// Top-level lesson data document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LessonCatalog {
  /// Schema version of the document.
  pub version: u32,
  /// Lessons in display order.
  #[serde(default)]
  pub lessons: Vec<Lesson>,
}

/// A single lesson entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Lesson {
  /// Stable identifier used in lesson URLs.
  pub id: String,
  /// Lesson number shown to learners.
  pub number: u32,
  /// Lesson title.
  pub title: String,
  /// Estimated duration in minutes.
  pub minutes: u32,
  /// Topic tags used by search chips.
  #[serde(default)]
  pub tags: Vec<String>,
}

impl LessonCatalog {
  /// Look up a lesson by identifier.
  pub fn lesson(&self, id: &str) -> Option<&Lesson> {
    self.lessons.iter().find(|lesson| lesson.id == id)
  }
}

/// Errors raised while loading the catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
  /// The data path could not be turned into a URL.
  #[error("invalid lesson data URL for {path:?}: {source}")]
  InvalidUrl {
    /// Site-relative path.
    path: String,
    /// Parse failure.
    source: url::ParseError,
  },

  /// The request produced no response.
  #[error("failed to load {url}: {source}")]
  Network {
    /// Attempted URL.
    url: String,
    /// Underlying failure.
    source: NetworkError,
  },

  /// The server answered with an error status.
  #[error("HTTP {status} when fetching {url}")]
  Status {
    /// Attempted URL.
    url: String,
    /// Status received.
    status: u16,
  },

  /// The document is not a valid catalog.
  #[error("invalid lesson data at {url}: {source}")]
  Parse {
    /// Attempted URL.
    url: String,
    /// Parse failure.
    source: serde_json::Error,
  },
}

async fn fetch_catalog<N: Network>(
  page: &mut PageContext,
  network: &N,
  path: &str,
) -> Result<LessonCatalog, CatalogError> {
  let url = page
    .resolve_url(path)
    .map_err(|source| CatalogError::InvalidUrl {
      path: path.to_string(),
      source,
    })?;
  page.record_manifest_url(&page.with_base(path));
  tracing::debug!(%url, "fetching lesson data");

  let url_text = url.to_string();
  let response = network
    .fetch(&Request::get(url))
    .await
    .map_err(|source| CatalogError::Network {
      url: url_text.clone(),
      source,
    })?;
  if !response.ok() {
    return Err(CatalogError::Status {
      url: url_text,
      status: response.status,
    });
  }

  serde_json::from_slice(&response.body).map_err(|source| CatalogError::Parse {
    url: url_text,
    source,
  })
}

/// Load the lesson catalog, falling back to the legacy data location.
///
/// Failures are recorded in the page's debug info together with the attempted URL and the
/// base path, since a wrong base path is the usual cause.
pub async fn load_catalog<N: Network>(
  page: &mut PageContext,
  network: &N,
) -> Result<LessonCatalog, CatalogError> {
  let result = match fetch_catalog(page, network, LESSONS_DATA_PATH).await {
    Ok(catalog) => Ok(catalog),
    Err(err) => {
      tracing::warn!(error = %err, "lesson data unavailable, trying legacy location");
      fetch_catalog(page, network, LEGACY_LESSONS_DATA_PATH).await
    }
  };

  match result {
    Ok(catalog) => {
      tracing::info!(lessons = catalog.lessons.len(), "loaded lesson catalog");
      page.record_lessons(catalog.lessons.len());
      Ok(catalog)
    }
    Err(err) => {
      tracing::error!(error = %err, "failed to load lessons");
      page.record_error(&err.to_string());
      Err(err)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::base_path::default_reserved_dirs;
  use crate::network::testing::ScriptedNetwork;
  use url::Url;

  const CATALOG: &str = r#"{
    "version": 2,
    "lessons": [
      { "id": "wudu", "number": 1, "title": "Wudu", "minutes": 5, "tags": ["prayer"] },
      { "id": "salah", "number": 2, "title": "Salah", "minutes": 7 }
    ]
  }"#;

  fn page(url: &str) -> PageContext {
    PageContext::load(Url::parse(url).unwrap(), "", &default_reserved_dirs())
  }

  #[tokio::test]
  async fn loads_catalog_under_project_prefix() {
    let network = ScriptedNetwork::new();
    network.respond("https://x.github.io/my-app/data/lessons.json", 200, CATALOG);
    let mut page = page("https://x.github.io/my-app/lessons/index.html?debug=1");

    let catalog = load_catalog(&mut page, &network).await.unwrap();
    assert_eq!(catalog.lessons.len(), 2);
    assert_eq!(catalog.lesson("salah").map(|l| l.tags.len()), Some(0));

    let info = page.debug_info().unwrap();
    assert_eq!(info.lessons_count, Some(2));
    assert_eq!(info.manifest_url, "/my-app/data/lessons.json");
  }

  #[tokio::test]
  async fn falls_back_to_legacy_location() {
    let network = ScriptedNetwork::new();
    network.respond("https://x.github.io/assets/lessons.json", 200, CATALOG);
    let mut page = page("https://x.github.io/lessons/index.html");

    let catalog = load_catalog(&mut page, &network).await.unwrap();
    assert_eq!(catalog.version, 2);
    assert_eq!(network.calls(), vec![
      "https://x.github.io/data/lessons.json".to_string(),
      "https://x.github.io/assets/lessons.json".to_string(),
    ]);
  }

  #[tokio::test]
  async fn records_failure_in_debug_info() {
    let network = ScriptedNetwork::new();
    network.respond("https://x.github.io/my-app/assets/lessons.json", 200, "not json");
    let mut page = page("https://x.github.io/my-app/?debug=1");

    let err = load_catalog(&mut page, &network).await.unwrap_err();
    assert!(matches!(err, CatalogError::Parse { .. }));

    let info = page.debug_info().unwrap();
    let message = info.last_error.as_deref().unwrap();
    assert!(message.contains("Attempted URL: /my-app/assets/lessons.json"));
    assert!(message.contains("Base path: /my-app"));
  }
}
