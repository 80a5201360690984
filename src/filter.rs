//! Host denylist gate (tinyproxy
//! `filter.c`). Patterns are regexes, matched against the request host,
//! following `bytedance-g3/g3proxy`'s use of `regex` for its own
//! domain/path matching rules.

use regex::RegexSet;

pub struct Filter {
    enabled: bool,
    patterns: RegexSet,
}

impl Filter {
    pub fn new(enabled: bool, patterns: &[String]) -> Self {
        let set = RegexSet::new(patterns).unwrap_or_else(|_| RegexSet::empty());
        Filter {
            enabled,
            patterns: set,
        }
    }

    /// `true` when `host` matches a denied pattern and must be refused.
    pub fn is_denied(&self, host: &str) -> bool {
        self.enabled && self.patterns.is_match(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_filter_denies_nothing() {
        let filter = Filter::new(false, &[r"^blocked\.test$".to_string()]);
        assert!(!filter.is_denied("blocked.test"));
    }

    #[test]
    fn matches_configured_pattern() {
        let filter = Filter::new(true, &[r"^blocked\.test$".to_string(), r"\.ads\.".to_string()]);
        assert!(filter.is_denied("blocked.test"));
        assert!(filter.is_denied("x.ads.example.com"));
        assert!(!filter.is_denied("example.org"));
    }
}
