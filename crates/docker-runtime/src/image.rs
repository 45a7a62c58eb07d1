//! Image mapping rules
//!
//! An image mapping rewrites a requested image reference to an alternate one
//! before any pull or run, typically to route through a mirror registry.
//! Mappings are ordered and the first matching pattern wins; an image with no
//! matching pattern is used unchanged.

use serde::{Deserialize, Serialize};

/// One image substitution rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMapping {
    /// Wildcard pattern matched against the requested image (`*` matches any
    /// run of characters)
    pub from: String,
    /// Replacement image reference
    pub to: String,
}

impl ImageMapping {
    /// Create a mapping rule
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Whether this rule matches the given image reference
    pub fn matches(&self, image: &str) -> bool {
        wildcard_match(&self.from, image)
    }
}

/// Apply the ordered mappings to an image reference, first match wins
pub fn map_image(mappings: &[ImageMapping], image: &str) -> String {
    for mapping in mappings {
        if mapping.matches(image) {
            return mapping.to.clone();
        }
    }
    image.to_string()
}

/// Match `text` against `pattern` where `*` matches any (possibly empty) run
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    // Classic two-pointer wildcard scan with backtracking to the last star.
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_when_no_match() {
        let mappings = vec![ImageMapping::new("alpine*", "mirror/alpine")];
        assert_eq!(map_image(&mappings, "ubuntu:22.04"), "ubuntu:22.04");
    }

    #[test]
    fn first_match_wins_over_more_specific_later_rule() {
        let mappings = vec![
            ImageMapping::new("foo*", "bar"),
            ImageMapping::new("foo/baz", "qux"),
        ];
        // Ordered, non-longest-match semantics: "foo*" shadows "foo/baz".
        assert_eq!(map_image(&mappings, "foo/baz"), "bar");
    }

    #[test]
    fn exact_pattern_matches_exactly() {
        let mappings = vec![ImageMapping::new("postgres:16", "mirror/postgres:16")];
        assert_eq!(map_image(&mappings, "postgres:16"), "mirror/postgres:16");
        assert_eq!(map_image(&mappings, "postgres:15"), "postgres:15");
    }

    #[test]
    fn star_spans_registries_and_tags() {
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("docker.io/*", "docker.io/library/alpine"));
        assert!(wildcard_match("*alpine*", "registry/alpine:3.19"));
        assert!(!wildcard_match("docker.io/*", "ghcr.io/x"));
    }

    #[test]
    fn empty_pattern_matches_only_empty() {
        assert!(wildcard_match("", ""));
        assert!(!wildcard_match("", "x"));
    }
}
