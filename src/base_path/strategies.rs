use std::collections::BTreeSet;

use regex::Regex;

/// Content directories that sit at the site root and must never be taken for a prefix.
pub const DEFAULT_RESERVED_DIRS: [&str; 2] = ["lessons", "assets"];

/// Name of the page-embedded meta declaration carrying an explicit base path.
pub const BASE_PATH_META_NAME: &str = "site-base";

/// A single way of working out the deployment prefix.
///
/// Strategies are pure: each inspects the inputs it was built with and either produces a
/// base path or declines so the next strategy can run.
pub trait BasePathStrategy {
  /// Short label used when logging which strategy produced the base path.
  fn name(&self) -> &'static str;

  /// Produce a base path, or `None` to fall through.
  fn resolve(&self) -> Option<String>;
}

/// Explicit override supplied by configuration rather than markup.
#[derive(Debug, Clone)]
pub struct DeclaredOverride<'a> {
  value: Option<&'a str>,
}

impl<'a> DeclaredOverride<'a> {
  /// Wrap an optional configured base path.
  pub fn new(value: Option<&'a str>) -> Self {
    Self { value }
  }
}

impl BasePathStrategy for DeclaredOverride<'_> {
  fn name(&self) -> &'static str {
    "declared"
  }

  fn resolve(&self) -> Option<String> {
    let value = self.value?;
    if value.is_empty() {
      return None;
    }
    Some(value.strip_suffix('/').unwrap_or(value).to_string())
  }
}

/// Override read from `<meta name="site-base" content="...">` in the page markup.
///
/// Empty content is treated as absent and defers to auto-detection; `content="/"` is the
/// way to declare a root deployment explicitly.
#[derive(Debug, Clone)]
pub struct MetaOverride<'a> {
  html: &'a str,
}

impl<'a> MetaOverride<'a> {
  /// Inspect the provided page markup.
  pub fn new(html: &'a str) -> Self {
    Self { html }
  }
}

impl BasePathStrategy for MetaOverride<'_> {
  fn name(&self) -> &'static str {
    "meta"
  }

  fn resolve(&self) -> Option<String> {
    let content = find_meta_content(self.html, BASE_PATH_META_NAME)?;
    if content.is_empty() {
      return None;
    }
    Some(content.strip_suffix('/').unwrap_or(&content).to_string())
  }
}

fn meta_tag_pattern() -> &'static Regex {
  use std::sync::OnceLock;

  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("invalid meta tag regex"))
}

fn attribute_pattern() -> &'static Regex {
  use std::sync::OnceLock;

  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r#"(?is)([a-z-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
      .expect("invalid attribute regex")
  })
}

/// Return the `content` attribute of the first `<meta>` tag whose `name` matches.
pub fn find_meta_content(html: &str, name: &str) -> Option<String> {
  for tag in meta_tag_pattern().find_iter(html) {
    let mut tag_name = None;
    let mut content = None;
    for caps in attribute_pattern().captures_iter(tag.as_str()) {
      let value = caps
        .get(2)
        .or_else(|| caps.get(3))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
      match caps[1].to_ascii_lowercase().as_str() {
        "name" => tag_name = Some(value),
        "content" => content = Some(value),
        _ => {}
      }
    }

    if tag_name.as_deref() == Some(name) {
      return Some(content.unwrap_or_default());
    }
  }
  None
}

/// Auto-detection from the first segment of a page or scope path.
///
/// `/my-app/lessons/index.html` yields `/my-app`. A first segment naming a reserved content
/// directory, or a path with no directory segment at all, yields nothing. A root deployment
/// whose pages live one directory deep under a non-reserved name cannot be told apart from
/// a project deployment; such sites need an explicit override.
#[derive(Debug, Clone)]
pub struct PathnameDetection<'a> {
  path: &'a str,
  reserved: &'a BTreeSet<String>,
}

impl<'a> PathnameDetection<'a> {
  /// Detect from the given URL path using the provided reserved directory names.
  pub fn new(path: &'a str, reserved: &'a BTreeSet<String>) -> Self {
    Self { path, reserved }
  }
}

impl BasePathStrategy for PathnameDetection<'_> {
  fn name(&self) -> &'static str {
    "pathname"
  }

  fn resolve(&self) -> Option<String> {
    let rest = self.path.strip_prefix('/')?;
    let (segment, _) = rest.split_once('/')?;
    if segment.is_empty() || self.reserved.contains(segment) {
      return None;
    }
    Some(format!("/{segment}"))
  }
}

/// Reserved directory set built from [`DEFAULT_RESERVED_DIRS`].
pub fn default_reserved_dirs() -> BTreeSet<String> {
  DEFAULT_RESERVED_DIRS.iter().map(|dir| dir.to_string()).collect()
}
