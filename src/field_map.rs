//! Insertion-ordered string-keyed map used for `envs`, `vars`, headers and
//! request parameters.
//!
//! Accepts two document shapes:
//! - a mapping whose values are scalars or sequences of scalars
//! - a sequence of `key=value` strings

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use minijinja::value::{Enumerator, Object, ObjectRepr};
use minijinja::Value;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single declared value: one string or an ordered list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Str(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            FieldValue::List(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => write!(f, "{s}"),
            FieldValue::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::List(value)
    }
}

impl From<&FieldValue> for Value {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Str(s) => Value::from(s.as_str()),
            FieldValue::List(items) => Value::from(items.clone()),
        }
    }
}

/// Ordered `(key, value)` pairs with unique keys.
///
/// [`OrderedFieldMap::set`] on an existing key keeps its position; new keys
/// are appended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedFieldMap {
    entries: IndexMap<String, FieldValue>,
}

impl OrderedFieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.get(key)
    }

    pub fn set<K: Into<String>, V: Into<FieldValue>>(&mut self, key: K, value: V) {
        self.entries.insert(key.into(), value.into());
    }

    /// Removes `key` keeping the relative order of the remaining entries.
    pub fn delete(&mut self, key: &str) -> Option<FieldValue> {
        self.entries.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Re-sorts the entries by key with the given comparator.
    pub fn sort_keys_by<F>(&mut self, mut compare: F)
    where
        F: FnMut(&str, &str) -> std::cmp::Ordering,
    {
        self.entries.sort_by(|a, _, b, _| compare(a, b));
    }

    /// Builds a map from a generic YAML value.
    ///
    /// Scalars are kept as their textual form (`null` becomes an empty
    /// string). Nested mappings, or sequences holding anything but scalars,
    /// raise [`Error::UnsupportedTypeError`].
    pub fn from_yaml(value: serde_yaml::Value) -> Result<Self> {
        let mut map = OrderedFieldMap::new();
        match value {
            serde_yaml::Value::Mapping(mapping) => {
                for (key, val) in mapping {
                    let key = scalar_to_string(&key)
                        .ok_or_else(|| Error::UnsupportedTypeError { key: format!("{key:?}") })?;
                    let field = match val {
                        serde_yaml::Value::Sequence(items) => {
                            let mut values = Vec::with_capacity(items.len());
                            for item in &items {
                                values.push(
                                    scalar_to_string(item).ok_or_else(|| {
                                        Error::UnsupportedTypeError { key: key.clone() }
                                    })?,
                                );
                            }
                            FieldValue::List(values)
                        }
                        other => FieldValue::Str(
                            scalar_to_string(&other)
                                .ok_or_else(|| Error::UnsupportedTypeError { key: key.clone() })?,
                        ),
                    };
                    map.set(key, field);
                }
            }
            serde_yaml::Value::Sequence(items) => {
                for item in items {
                    let serde_yaml::Value::String(pair) = &item else {
                        return Err(Error::UnsupportedTypeError { key: format!("{item:?}") });
                    };
                    let (key, val) = pair.split_once('=').unwrap_or((pair.as_str(), ""));
                    map.set(key.trim(), val);
                }
            }
            serde_yaml::Value::Null => {}
            other => return Err(Error::UnsupportedTypeError { key: format!("{other:?}") }),
        }
        Ok(map)
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::Null => Some(String::new()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for OrderedFieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = OrderedFieldMap::new();
        for (k, v) in iter {
            map.set(k, v);
        }
        map
    }
}

impl<'de> Deserialize<'de> for OrderedFieldMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = serde_yaml::Value::deserialize(deserializer)?;
        OrderedFieldMap::from_yaml(value).map_err(de::Error::custom)
    }
}

impl Serialize for OrderedFieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Exposed to expressions as an ordered map, so it can be indexed,
/// iterated and used as a range source.
impl Object for OrderedFieldMap {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Map
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        self.get(key.as_str()?).map(Value::from)
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Values(self.entries.keys().map(|k| Value::from(k.as_str())).collect())
    }
}
