//! Case-insensitive, multi-entry header map with deterministic enumeration.
//!
//! Keys are folded to lowercase for storage and lookup, but a header name
//! may be inserted more than once (e.g. repeated `Via` or `Set-Cookie`
//! lines) and all values are retained. `keys()` walks distinct keys in the
//! order their first value was inserted, which is what the header
//! rewriting pipeline relies on for stable, reproducible output.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct HeaderMap {
    order: Vec<String>,
    values: HashMap<String, Vec<Vec<u8>>>,
}

impl HeaderMap {
    pub fn new() -> Self {
        HeaderMap::default()
    }

    /// Inserts a header value, preserving any earlier values under the same key.
    pub fn insert(&mut self, name: &str, value: Vec<u8>) {
        let key = name.to_ascii_lowercase();
        match self.values.get_mut(&key) {
            Some(bucket) => bucket.push(value),
            None => {
                self.order.push(key.clone());
                self.values.insert(key, vec![value]);
            }
        }
    }

    /// Case-insensitive lookup of the first inserted value, with its length.
    pub fn get(&self, name: &str) -> Option<(&[u8], usize)> {
        let key = name.to_ascii_lowercase();
        self.values
            .get(&key)
            .and_then(|bucket| bucket.first())
            .map(|v| (v.as_slice(), v.len()))
    }

    /// All values inserted under `name`, in insertion order.
    pub fn get_all(&self, name: &str) -> &[Vec<u8>] {
        static EMPTY: &[Vec<u8>] = &[];
        let key = name.to_ascii_lowercase();
        self.values.get(&key).map(|v| v.as_slice()).unwrap_or(EMPTY)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(&name.to_ascii_lowercase())
    }

    /// Removes every value stored under `name`.
    pub fn remove(&mut self, name: &str) {
        let key = name.to_ascii_lowercase();
        if self.values.remove(&key).is_some() {
            self.order.retain(|k| k != &key);
        }
    }

    /// Distinct keys in first-insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut map = HeaderMap::new();
        map.insert("Content-Type", b"text/plain".to_vec());
        let (value, len) = map.get("content-TYPE").unwrap();
        assert_eq!(value, b"text/plain");
        assert_eq!(len, 10);
    }

    #[test]
    fn keys_enumerate_in_first_insertion_order() {
        let mut map = HeaderMap::new();
        map.insert("Accept", b"*/*".to_vec());
        map.insert("User-Agent", b"curl".to_vec());
        map.insert("accept", b"text/html".to_vec());
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["accept", "user-agent"]);
        assert_eq!(map.get("Accept").unwrap().0, b"*/*");
        assert_eq!(map.get_all("accept").len(), 2);
    }

    #[test]
    fn remove_drops_key_from_enumeration() {
        let mut map = HeaderMap::new();
        map.insert("Host", b"example.org".to_vec());
        map.insert("Connection", b"close".to_vec());
        map.remove("host");
        assert!(!map.contains("Host"));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["connection"]);
    }
}
