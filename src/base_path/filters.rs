use regex::Regex;

fn absolute_url_patterns() -> &'static [Regex] {
    use std::sync::OnceLock;

    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            vec![
                Regex::new(r"^http://").expect("invalid http regex"),
                Regex::new(r"^https://").expect("invalid https regex"),
            ]
        })
        .as_slice()
}

/// Determine whether a path handed to `with_base` is already an absolute URL.
///
/// Absolute URLs already carry their own origin and path, so prefixing them with the
/// deployment base would corrupt them.
pub fn is_absolute_url(value: &str) -> bool {
    absolute_url_patterns()
        .iter()
        .any(|pattern| pattern.is_match(value))
}

/// Strip a single `./` prefix, which is equivalent to no prefix at all.
pub fn strip_current_dir(value: &str) -> &str {
    value.strip_prefix("./").unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::{is_absolute_url, strip_current_dir};

    #[test]
    fn detects_http_and_https_urls() {
        assert!(is_absolute_url("https://cdn.example.com/app.js"));
        assert!(is_absolute_url("http://localhost:8000/index.html"));
    }

    #[test]
    fn keeps_relative_and_protocol_less_paths() {
        assert!(!is_absolute_url("assets/styles.css"));
        assert!(!is_absolute_url("httpdocs/index.html"));
        assert!(!is_absolute_url("//cdn.example.com/app.js"));
    }

    #[test]
    fn strips_only_one_current_dir_prefix() {
        assert_eq!(strip_current_dir("./lessons/"), "lessons/");
        assert_eq!(strip_current_dir("././x"), "./x");
        assert_eq!(strip_current_dir("data/lessons.json"), "data/lessons.json");
    }
}
