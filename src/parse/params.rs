//! Defensive access to loosely-typed step parameters.
//!
//! Jenkins exports parameter values with whatever shape the step happened to
//! receive: the same key can be a string in one trace and a number or a list
//! in another. Every accessor here returns `None`/empty instead of failing.

use serde_json::{Map, Value};

/// A possibly-absent parameter value.
#[derive(Debug, Clone, Copy)]
pub struct Param<'a>(Slot<'a>);

#[derive(Debug, Clone, Copy)]
enum Slot<'a> {
    Absent,
    Value(&'a Value),
    Object(&'a Map<String, Value>),
}

impl<'a> Param<'a> {
    pub fn new(value: Option<&'a Value>) -> Self {
        match value {
            None | Some(Value::Null) => Param(Slot::Absent),
            Some(v) => Param(Slot::Value(v)),
        }
    }

    /// View over a bare JSON object, such as a span's parameter map.
    pub fn object(map: &'a Map<String, Value>) -> Self {
        Param(Slot::Object(map))
    }

    pub fn absent() -> Self {
        Param(Slot::Absent)
    }

    pub fn is_absent(&self) -> bool {
        matches!(self.0, Slot::Absent)
    }

    /// Nested lookup; absent when `self` is not an object.
    pub fn get(&self, key: &str) -> Param<'a> {
        match self.as_map() {
            Some(map) => Param::new(map.get(key)),
            None => Param::absent(),
        }
    }

    pub fn as_str(&self) -> Option<&'a str> {
        match self.0 {
            Slot::Value(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// String form of any scalar. Objects and lists are absent.
    pub fn as_string(&self) -> Option<String> {
        match self.0 {
            Slot::Value(Value::String(s)) => Some(s.clone()),
            Slot::Value(Value::Number(n)) => Some(n.to_string()),
            Slot::Value(Value::Bool(b)) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Like `as_string` but blank strings are absent.
    pub fn as_text(&self) -> Option<String> {
        self.as_string().filter(|s| !s.trim().is_empty())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.0 {
            Slot::Value(Value::Bool(b)) => Some(*b),
            Slot::Value(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.0 {
            Slot::Value(Value::Number(n)) => n.as_f64(),
            Slot::Value(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> &'a [Value] {
        match self.0 {
            Slot::Value(Value::Array(items)) => items.as_slice(),
            _ => &[],
        }
    }

    pub fn as_map(&self) -> Option<&'a Map<String, Value>> {
        match self.0 {
            Slot::Value(Value::Object(map)) => Some(map),
            Slot::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Strings from a list value; a single string reads as a one-item list.
    pub fn as_string_list(&self) -> Vec<String> {
        if let Some(single) = self.as_text() {
            return vec![single];
        }
        self.as_list()
            .iter()
            .filter_map(|item| Param::new(Some(item)).as_text())
            .collect()
    }

    /// Depth-first search for the first non-null value stored under `key`,
    /// at any nesting level inside objects and lists.
    pub fn find(&self, key: &str) -> Param<'a> {
        let found = match self.0 {
            Slot::Absent => None,
            Slot::Value(v) => find_key(v, key),
            Slot::Object(map) => find_in_map(map, key),
        };
        Param::new(found)
    }
}

fn find_key<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => find_in_map(map, key),
        Value::Array(items) => items.iter().find_map(|item| find_key(item, key)),
        _ => None,
    }
}

fn find_in_map<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    match map.get(key) {
        Some(found) if !found.is_null() => Some(found),
        _ => map.values().find_map(|v| find_key(v, key)),
    }
}

/// The JSON payload stored in the `harness-attribute` span attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Sidecar {
    Absent,
    Malformed(String),
    Present(Value),
}

impl Sidecar {
    pub fn read(raw: Option<&str>) -> Self {
        let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
            return Sidecar::Absent;
        };
        match serde_json::from_str::<Value>(raw) {
            // Some exporters encode the payload twice.
            Ok(Value::String(inner)) => match serde_json::from_str::<Value>(&inner) {
                Ok(value @ Value::Object(_)) => Sidecar::Present(value),
                _ => Sidecar::Malformed(format!("expected a JSON object, got string '{}'", inner)),
            },
            Ok(value @ Value::Object(_)) => Sidecar::Present(value),
            Ok(other) => Sidecar::Malformed(format!("expected a JSON object, got {}", kind(&other))),
            Err(e) => Sidecar::Malformed(e.to_string()),
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Sidecar::Present(_))
    }

    /// The payload root; absent when missing or malformed.
    pub fn root(&self) -> Param<'_> {
        match self {
            Sidecar::Present(value) => Param::new(Some(value)),
            _ => Param::absent(),
        }
    }

    pub fn get(&self, key: &str) -> Param<'_> {
        self.root().get(key)
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
