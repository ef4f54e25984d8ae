//! `{{placeholder}}` substitution over prompt content.
//!
//! Content arrives as freshly deserialized JSON, so recursion is bounded by
//! the structure's depth and no cycle detection is needed.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::Value;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([^}]+)\}\}").expect("placeholder regex"));

/// A key/value pair as collected by host UIs (variables, context entries).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Flat placeholder-name to replacement-text mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableMap(HashMap<String, String>);

impl VariableMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the map from collected pairs. Entries with an empty key are
    /// skipped; duplicate keys keep the last value.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = KeyValue>,
    {
        let mut map = HashMap::new();
        for pair in pairs {
            if pair.key.is_empty() {
                continue;
            }
            map.insert(pair.key, pair.value);
        }
        Self(map)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if key.is_empty() {
            return;
        }
        self.0.insert(key, value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<K, V> FromIterator<(K, V)> for VariableMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(
            iter.into_iter()
                .map(|(key, value)| KeyValue::new(key, value)),
        )
    }
}

/// Replaces every `{{ key }}` occurrence inside the string leaves of
/// `content` with the mapped value.
///
/// Identifiers are trimmed before lookup; unknown identifiers stay literal.
/// Arrays map element-wise and objects value-wise, preserving keys; numbers,
/// booleans and null pass through unchanged. An empty map is a no-op.
pub fn compile_template(content: &Value, variables: &VariableMap) -> Value {
    if variables.is_empty() {
        return content.clone();
    }
    match content {
        Value::String(text) => Value::String(compile_text(text, variables)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| compile_template(item, variables))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), compile_template(value, variables)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// String-leaf substitution behind [`compile_template`].
pub fn compile_text(text: &str, variables: &VariableMap) -> String {
    if variables.is_empty() {
        return text.to_string();
    }
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| {
            let key = caps[1].trim();
            match variables.get(key) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
