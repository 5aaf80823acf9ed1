//! String-keyed variable bag for protocol metadata and board options

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An ordered map of string keys to string values.
///
/// Remote protocols attach arbitrary metadata to forums, threads, and login
/// responses; boards keep their options (refresh rate, per-page counts,
/// user-agent, encryption settings) in the same shape. Values are stored as
/// text and parsed on access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vars {
    entries: BTreeMap<String, String>,
}

impl Vars {
    /// Create an empty bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any existing entry
    pub fn set(&mut self, key: &str, value: impl ToString) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    /// Get a value as text
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Get a boolean value; `"true"` and `"1"` are true, anything else
    /// (including a missing key) is false
    pub fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key), Some("true" | "1"))
    }

    /// Parse a value into any `FromStr` type; `None` if the key is missing
    /// or the value does not parse
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Whether the bag holds a value for `key`
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove an entry, returning its previous value
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bag is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(key, value)` pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<'a> IntoIterator for &'a Vars {
    type Item = (&'a String, &'a String);
    type IntoIter = std::collections::btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<(String, String)> for Vars {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut vars = Vars::new();
        vars.set("refreshRate", 600);
        vars.set("showImages", true);

        assert_eq!(vars.get("refreshRate"), Some("600"));
        assert_eq!(vars.get_parsed::<u64>("refreshRate"), Some(600));
        assert!(vars.get_bool("showImages"));
        assert!(!vars.get_bool("missing"));
    }

    #[test]
    fn test_replace_existing() {
        let mut vars = Vars::new();
        vars.set("displayOrder", 1);
        vars.set("displayOrder", 2);

        assert_eq!(vars.get_parsed::<u32>("displayOrder"), Some(2));
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn test_numeric_bool() {
        let mut vars = Vars::new();
        vars.set("enabled", "1");
        assert!(vars.get_bool("enabled"));

        vars.set("enabled", "0");
        assert!(!vars.get_bool("enabled"));
    }

    #[test]
    fn test_bad_parse_is_none() {
        let mut vars = Vars::new();
        vars.set("threadsPerPage", "lots");
        assert_eq!(vars.get_parsed::<u32>("threadsPerPage"), None);
    }
}
