//! An ordered multimap of form and query values.

use std::collections::BTreeMap;

use tracing::warn;

/// Form or query values: each key maps to one or more values.
///
/// Keys are kept sorted, so [`Values::encode`] is deterministic.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Values {
    inner: BTreeMap<String, Vec<String>>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an `application/x-www-form-urlencoded` string.
    pub fn parse(input: &str) -> Self {
        if input.is_empty() {
            return Self::new();
        }

        match serde_urlencoded::from_str::<Vec<(String, String)>>(input) {
            Ok(pairs) => pairs.into_iter().collect(),
            Err(e) => {
                warn!(cause = %e, "ignore malformed urlencoded values");
                Self::new()
            }
        }
    }

    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.entry(key.into()).or_default().push(value.into());
    }

    pub fn del(&mut self, key: &str) {
        self.inner.remove(key);
    }

    /// Returns the first value of `key`, or `""` when absent.
    pub fn get(&self, key: &str) -> &str {
        self.inner.get(key).and_then(|values| values.first()).map(String::as_str).unwrap_or_default()
    }

    pub fn gets(&self, key: &str) -> &[String] {
        self.inner.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.insert(key.into(), vec![value.into()]);
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Encodes the values as `application/x-www-form-urlencoded`, sorted by key.
    pub fn encode(&self) -> String {
        let pairs = self.iter().collect::<Vec<_>>();
        serde_urlencoded::to_string(pairs).unwrap_or_default()
    }

    pub fn all(&self) -> &BTreeMap<String, Vec<String>> {
        &self.inner
    }

    /// Replaces the content with `values`.
    pub fn reset(&mut self, values: Values) {
        self.inner = values.inner;
    }

    /// Appends every value of `other` after the values already present.
    pub fn merge(&mut self, other: &Values) {
        for (key, value) in other.iter() {
            self.add(key, value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Iterates over every `(key, value)` pair, keys in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().flat_map(|(key, values)| values.iter().map(move |value| (key.as_str(), value.as_str())))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Values {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut values = Values::new();
        for (key, value) in iter {
            values.add(key, value);
        }
        values
    }
}

impl From<BTreeMap<String, Vec<String>>> for Values {
    fn from(inner: BTreeMap<String, Vec<String>>) -> Self {
        Self { inner }
    }
}
