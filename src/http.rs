//! Request and response values passed between pages, the worker, caches and the network.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// HTTP request method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
  /// `GET`
  Get,
  /// `HEAD`
  Head,
  /// `POST`
  Post,
  /// Any other method, kept verbatim.
  Other(String),
}

impl Method {
  /// Parse a method name case-insensitively.
  pub fn parse(value: &str) -> Self {
    match value.to_ascii_uppercase().as_str() {
      "GET" => Self::Get,
      "HEAD" => Self::Head,
      "POST" => Self::Post,
      other => Self::Other(other.to_string()),
    }
  }

  /// Canonical method name.
  pub fn as_str(&self) -> &str {
    match self {
      Self::Get => "GET",
      Self::Head => "HEAD",
      Self::Post => "POST",
      Self::Other(value) => value,
    }
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// What the requesting context intends to do with the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Destination {
  /// Top-level page navigation.
  Document,
  /// Script or worker source.
  Script,
  /// Stylesheet.
  Style,
  /// Image or icon.
  Image,
  /// Data fetched by page scripts (JSON, partials) or anything else.
  #[default]
  Other,
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  /// Fully resolved request URL.
  pub url: Url,
  /// Request method.
  pub method: Method,
  /// Request destination; [`Destination::Document`] marks navigations.
  pub destination: Destination,
}

impl Request {
  /// A `GET` request for a sub-resource.
  pub fn get(url: Url) -> Self {
    Self {
      url,
      method: Method::Get,
      destination: Destination::Other,
    }
  }

  /// A `GET` navigation request for a page.
  pub fn navigate(url: Url) -> Self {
    Self {
      url,
      method: Method::Get,
      destination: Destination::Document,
    }
  }

  /// Replace the method.
  pub fn with_method(mut self, method: Method) -> Self {
    self.method = method;
    self
  }

  /// Returns `true` for top-level document fetches.
  pub fn is_navigation(&self) -> bool {
    self.destination == Destination::Document
  }

  /// Cache key for this request: the URL without its fragment.
  pub fn cache_key(&self) -> String {
    let mut url = self.url.clone();
    url.set_fragment(None);
    url.to_string()
  }
}

/// A response produced by the network, a cache, or synthesized by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  /// HTTP status code.
  pub status: u16,
  /// Response headers in arrival order.
  #[serde(default)]
  pub headers: Vec<(String, String)>,
  /// Response body.
  #[serde(default)]
  pub body: Vec<u8>,
}

impl Response {
  /// Build a response with no headers.
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  /// Build a `200` response with the given content type.
  pub fn with_content_type(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
    Self::new(200, body).with_header("Content-Type", content_type)
  }

  /// Empty `503 Service Unavailable` response used when nothing can be served.
  pub fn service_unavailable() -> Self {
    Self::new(503, Vec::new())
  }

  /// Append a header.
  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  /// First header value with the given case-insensitive name.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(key, _)| key.eq_ignore_ascii_case(name))
      .map(|(_, value)| value.as_str())
  }

  /// Returns `true` for 2xx statuses.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Body decoded as UTF-8, replacing invalid sequences.
  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cache_key_drops_fragment_but_keeps_query() {
    let url = Url::parse("https://example.com/app/lessons/lesson.html?id=3#quiz").unwrap();
    assert_eq!(
      Request::get(url).cache_key(),
      "https://example.com/app/lessons/lesson.html?id=3"
    );
  }

  #[test]
  fn ok_covers_only_success_statuses() {
    assert!(Response::new(200, "x").ok());
    assert!(Response::new(204, "").ok());
    assert!(!Response::new(304, "").ok());
    assert!(!Response::new(404, "").ok());
    assert!(!Response::service_unavailable().ok());
  }

  #[test]
  fn header_lookup_is_case_insensitive() {
    let response = Response::with_content_type("text/html; charset=utf-8", "<p>");
    assert_eq!(response.header("content-type"), Some("text/html; charset=utf-8"));
  }

  #[test]
  fn parses_methods() {
    assert_eq!(Method::parse("get"), Method::Get);
    assert_eq!(Method::parse("Put"), Method::Other("PUT".into()));
  }
}
