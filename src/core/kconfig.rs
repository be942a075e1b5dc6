//! Key-config (`CONFIG_*`) option sets.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// An ordered set of `KEY=VALUE` configuration options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct KConfig(BTreeMap<String, String>);

impl KConfig {
    pub fn new() -> Self {
        KConfig::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// True when `key` is enabled (`y`).
    pub fn is_yes(&self, key: &str) -> bool {
        self.get(key) == Some("y")
    }

    /// Add every entry of `other`; entries already present win.
    pub fn extend_missing(&mut self, other: &KConfig) {
        for (k, v) in &other.0 {
            self.0.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    /// Add every entry of `other`, overriding existing ones.
    pub fn extend_override(&mut self, other: &KConfig) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `KEY=VALUE` strings, in key order.
    pub fn to_lines(&self) -> Vec<String> {
        self.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }

    /// Every option of `self` is present in `other` with the same value.
    pub fn is_subset_of(&self, other: &KConfig) -> bool {
        self.iter().all(|(k, v)| other.get(k) == Some(v))
    }

    /// Parse a `.config` file body, ignoring comments and blank lines.
    pub fn parse(contents: &str) -> Self {
        let mut config = KConfig::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((k, v)) = line.split_once('=') {
                config.set(k.trim(), v.trim());
            }
        }
        config
    }
}

impl fmt::Display for KConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.to_lines() {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for KConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        KConfig(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl From<Scalar> for String {
    fn from(s: Scalar) -> Self {
        match s {
            Scalar::Bool(true) => "y".into(),
            Scalar::Bool(false) => "n".into(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Str(s) => s,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KConfigRepr {
    List(Vec<String>),
    Map(BTreeMap<String, Scalar>),
}

/// Accepts either `["KEY=VALUE", ...]` or `{KEY: VALUE, ...}`.
impl<'de> Deserialize<'de> for KConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match KConfigRepr::deserialize(deserializer)? {
            KConfigRepr::List(items) => items
                .iter()
                .map(|item| match item.split_once('=') {
                    Some((k, v)) => (k.to_string(), v.to_string()),
                    None => (item.to_string(), "y".to_string()),
                })
                .collect(),
            KConfigRepr::Map(map) => map
                .into_iter()
                .map(|(k, v)| (k, String::from(v)))
                .collect(),
        })
    }
}
