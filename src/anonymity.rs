//! Anonymity allow-list (tinyproxy `anonymous_search`,
//! tinyproxy `anonymous.c`). When enabled, only header names present in
//! the allow-list are forwarded to the origin/upstream.

use std::collections::HashSet;

pub struct Anonymity {
    enabled: bool,
    allowed: HashSet<String>,
}

impl Anonymity {
    pub fn new(enabled: bool, allowed_headers: &[String]) -> Self {
        Anonymity {
            enabled,
            allowed: allowed_headers.iter().map(|s| s.to_ascii_lowercase()).collect(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// `true` when `name` (any case) is on the allow-list.
    pub fn is_allowed(&self, name: &str) -> bool {
        self.allowed.contains(&name.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_mode_does_not_gate() {
        let anon = Anonymity::new(false, &[]);
        assert!(!anon.is_enabled());
    }

    #[test]
    fn allow_list_is_case_insensitive() {
        let anon = Anonymity::new(true, &["Accept".to_string(), "user-agent".to_string()]);
        assert!(anon.is_allowed("accept"));
        assert!(anon.is_allowed("User-Agent"));
        assert!(!anon.is_allowed("Cookie"));
    }
}
