//! Node option values.
//!
//! Options are kept in key order so that the structural hash of a node does
//! not depend on the order in which they were set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Floats(Vec<f64>),
}

impl OptionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptionValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Integers widen to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            OptionValue::Float(v) => Some(*v),
            OptionValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            OptionValue::Floats(v) => Some(v),
            _ => None,
        }
    }

    /// Canonical text used in node descriptions.
    pub fn describe(&self) -> String {
        match self {
            OptionValue::Bool(v) => v.to_string(),
            OptionValue::Int(v) => v.to_string(),
            OptionValue::Float(v) => format!("{:?}", v),
            OptionValue::String(v) => format!("{:?}", v),
            OptionValue::Floats(v) => {
                let parts: Vec<String> = v.iter().map(|x| format!("{:?}", x)).collect();
                format!("[{}]", parts.join(","))
            }
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self {
        OptionValue::Int(v)
    }
}

impl From<f64> for OptionValue {
    fn from(v: f64) -> Self {
        OptionValue::Float(v)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::String(v.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self {
        OptionValue::String(v)
    }
}

impl From<Vec<f64>> for OptionValue {
    fn from(v: Vec<f64>) -> Self {
        OptionValue::Floats(v)
    }
}

/// Ordered option set of a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options {
    values: BTreeMap<String, OptionValue>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Options::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Set an option. Returns `true` when the stored value changed.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> bool {
        let value = value.into();
        let key = key.into();
        if self.values.get(&key) == Some(&value) {
            return false;
        }
        self.values.insert(key, value);
        true
    }

    pub fn remove(&mut self, key: &str) -> Option<OptionValue> {
        self.values.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.values.get(key)
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(OptionValue::as_float)
    }

    pub fn get_floats(&self, key: &str) -> Option<&[f64]> {
        self.get(key).and_then(OptionValue::as_floats)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(OptionValue::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(OptionValue::as_bool)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::approx_constant)]
    fn test_option_value_accessors() {
        assert_eq!(OptionValue::Bool(true).as_bool(), Some(true));
        assert_eq!(OptionValue::Int(42).as_int(), Some(42));
        assert_eq!(OptionValue::Int(2).as_float(), Some(2.0));
        assert_eq!(OptionValue::Float(3.14).as_float(), Some(3.14));
        assert_eq!(OptionValue::String("srgb".into()).as_str(), Some("srgb"));
        assert_eq!(OptionValue::Floats(vec![1.0]).as_floats(), Some(&[1.0][..]));
    }

    #[test]
    fn test_set_reports_changes() {
        let mut opts = Options::new();
        assert!(opts.set("gamma", 2.2));
        assert!(!opts.set("gamma", 2.2));
        assert!(opts.set("gamma", 1.8));
        assert_eq!(opts.get_float("gamma"), Some(1.8));
    }

    #[test]
    fn test_iteration_is_key_ordered() {
        let opts = Options::new().with("z", 1i64).with("a", 2i64).with("m", 3i64);
        let keys: Vec<&str> = opts.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "m", "z"]);
    }

    #[test]
    fn test_untagged_json_shape() {
        let opts: Options =
            serde_json::from_str(r#"{"gain": 2, "gamma": 2.2, "name": "x", "m": [1.0, 0.5]}"#)
                .unwrap();
        assert_eq!(opts.get("gain"), Some(&OptionValue::Int(2)));
        assert_eq!(opts.get_float("gamma"), Some(2.2));
        assert_eq!(opts.get_str("name"), Some("x"));
        assert_eq!(opts.get_floats("m"), Some(&[1.0, 0.5][..]));
    }
}
