use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::base_path::DeploymentContext;
use crate::http::{Method, Request, Response};
use crate::network::{Network, NetworkError};

const INDEX_FILE: &str = "index.html";

/// Serves a built site from a local directory as if it were deployed under a base path.
///
/// Requests outside the base path, for missing files, or with `..` segments receive a
/// `404` response rather than an error, matching what a static host would return.
#[derive(Debug, Clone)]
pub struct SiteDirectory {
  root: PathBuf,
  context: DeploymentContext,
}

impl SiteDirectory {
  /// Serve `root` under the prefix described by `context`.
  pub fn new(root: impl Into<PathBuf>, context: DeploymentContext) -> Self {
    Self {
      root: root.into(),
      context,
    }
  }

  /// Directory being served.
  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Map a URL path onto a file below the site root.
  fn resolve_file(&self, url_path: &str) -> Option<PathBuf> {
    let within_site = if self.context.is_root() {
      url_path
    } else {
      let rest = url_path.strip_prefix(self.context.base_path())?;
      if rest.is_empty() {
        "/"
      } else if rest.starts_with('/') {
        rest
      } else {
        return None;
      }
    };

    let segments: Vec<&str> = within_site
      .split('/')
      .filter(|segment| !segment.is_empty() && *segment != ".")
      .collect();
    if segments.iter().any(|segment| *segment == "..") {
      return None;
    }

    let mut path = self.root.clone();
    for segment in &segments {
      path.push(segment);
    }
    if within_site.ends_with('/') {
      path.push(INDEX_FILE);
    }
    Some(path)
  }
}

/// Content type guessed from a file extension.
pub(crate) fn content_type_for(path: &Path) -> &'static str {
  match path.extension().and_then(|ext| ext.to_str()) {
    Some("html") => "text/html; charset=utf-8",
    Some("css") => "text/css; charset=utf-8",
    Some("js") => "text/javascript; charset=utf-8",
    Some("json") => "application/json",
    Some("webmanifest") => "application/manifest+json",
    Some("svg") => "image/svg+xml",
    Some("png") => "image/png",
    Some("mp3") => "audio/mpeg",
    _ => "application/octet-stream",
  }
}

impl Network for SiteDirectory {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    if !matches!(request.method, Method::Get | Method::Head) {
      return Ok(Response::new(405, Vec::new()));
    }

    let Some(path) = self.resolve_file(request.url.path()) else {
      return Ok(Response::new(404, Vec::new()));
    };

    match tokio::fs::read(&path).await {
      Ok(bytes) => {
        let body = if request.method == Method::Head {
          Vec::new()
        } else {
          bytes
        };
        Ok(Response::with_content_type(content_type_for(&path), body))
      }
      Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::IsADirectory) => {
        Ok(Response::new(404, Vec::new()))
      }
      Err(err) => Err(NetworkError::Io { path, source: err }),
    }
  }
}
