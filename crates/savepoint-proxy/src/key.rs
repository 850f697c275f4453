//! Pooling keys.
//!
//! Connections are shared only between requests that produce an equal
//! [`ConnectionKey`]: the same canonical address and the same properties.

use std::collections::BTreeMap;
use std::collections::btree_map;

use crate::address::canonical_address;

/// Connection properties passed through to the real driver.
///
/// Backed by an ordered map so that two bags with the same entries compare
/// and hash equal regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    /// Create an empty property bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a property, returning the previous value for that key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    /// Get a property value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no properties.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over properties in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.entries.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Properties {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Key identifying a pool bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    canonical_address: String,
    properties: Properties,
}

impl ConnectionKey {
    /// Derive a key from a requested address and its properties.
    ///
    /// Any `?query` suffix on the address is dropped.
    #[must_use]
    pub fn new(address: &str, properties: &Properties) -> Self {
        Self {
            canonical_address: canonical_address(address).to_string(),
            properties: properties.clone(),
        }
    }

    /// The address with its query suffix removed.
    #[must_use]
    pub fn canonical_address(&self) -> &str {
        &self.canonical_address
    }

    /// The properties that are part of this key.
    #[must_use]
    pub fn properties(&self) -> &Properties {
        &self.properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn user(name: &str) -> Properties {
        Properties::new().with("user", name)
    }

    #[test]
    fn test_query_suffix_ignored() {
        let a = ConnectionKey::new("proxy:host/db?x=1", &user("app"));
        let b = ConnectionKey::new("proxy:host/db?x=2", &user("app"));
        assert_eq!(a, b);
        assert_eq!(a.canonical_address(), "proxy:host/db");
    }

    #[test]
    fn test_properties_distinguish_keys() {
        let a = ConnectionKey::new("proxy:host/db", &user("app"));
        let b = ConnectionKey::new("proxy:host/db", &user("admin"));
        assert_ne!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_property_order_irrelevant() {
        let a = Properties::new().with("user", "app").with("ssl", "true");
        let b: Properties = [("ssl", "true"), ("user", "app")].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(
            ConnectionKey::new("proxy:h", &a),
            ConnectionKey::new("proxy:h", &b)
        );
    }

    #[test]
    fn test_properties_accessors() {
        let mut props = Properties::new();
        assert!(props.is_empty());
        assert_eq!(props.insert("user", "a"), None);
        assert_eq!(props.insert("user", "b"), Some("a".to_string()));
        assert_eq!(props.get("user"), Some("b"));
        assert_eq!(props.len(), 1);
        assert_eq!(props.iter().count(), 1);
    }

    proptest! {
        #[test]
        fn prop_same_base_same_key(
            base in "[a-z:/.]{1,20}",
            q1 in "[a-z0-9=&]{0,10}",
            q2 in "[a-z0-9=&]{0,10}",
            value in "[a-z]{0,8}",
        ) {
            let props = Properties::new().with("user", value);
            let k1 = ConnectionKey::new(&format!("{base}?{q1}"), &props);
            let k2 = ConnectionKey::new(&format!("{base}?{q2}"), &props);
            prop_assert_eq!(k1, k2);
        }

        #[test]
        fn prop_different_values_different_key(v1 in "[a-z]{1,8}", v2 in "[a-z]{1,8}") {
            prop_assume!(v1 != v2);
            let k1 = ConnectionKey::new("proxy:h/db", &Properties::new().with("user", v1));
            let k2 = ConnectionKey::new("proxy:h/db", &Properties::new().with("user", v2));
            prop_assert_ne!(k1, k2);
        }
    }
}
