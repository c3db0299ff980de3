//! Flattened event view consumed by the matcher.
//!
//! The matcher only needs `field → value` string pairs, where the field is the
//! full dotted path (`*req.Account`), the same form index keys use.

use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatEvent {
    fields: BTreeMap<String, String>,
}

impl FlatEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn with(mut self, field: &str, value: &str) -> Self {
        self.insert(field, value);
        self
    }

    /// Flattens a JSON document under `root` (`*req`, `*opts`, ...).
    /// Nested objects become dotted paths, arrays `field[i]`; nulls are dropped.
    pub fn from_json(root: &str, doc: &Value) -> Self {
        let mut ev = Self::new();
        ev.merge_json(root, doc);
        ev
    }

    pub fn merge_json(&mut self, root: &str, doc: &Value) {
        flatten_into(&mut self.fields, root.to_string(), doc);
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FlatEvent {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

fn flatten_into(out: &mut BTreeMap<String, String>, path: String, value: &Value) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (k, v) in map {
                flatten_into(out, format!("{path}.{k}"), v);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_into(out, format!("{path}[{i}]"), v);
            }
        }
        Value::String(s) => {
            out.insert(path, s.clone());
        }
        other => {
            out.insert(path, other.to_string());
        }
    }
}
