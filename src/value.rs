//! `HostValue` — the tagged union standing in for the host runtime's dynamic
//! value system (strings, numbers, booleans, arrays, objects, null).
//!
//! The underlying SQL engine's types never cross the Query Façade boundary;
//! every shaped result and every bound argument passes through this type
//! instead.

use serde_json::Value as JsonValue;

/// A value as the host runtime would see it.
///
/// `Obj` is a `Vec` of `(name, value)` pairs rather than a map: result
/// shaping must emit dictionary keys in column order, and a hash map would
/// not preserve that.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Arr(Vec<HostValue>),
    Obj(Vec<(String, HostValue)>),
}

impl HostValue {
    pub fn str(s: impl Into<String>) -> Self {
        HostValue::Str(s.into())
    }

    pub fn array(items: Vec<HostValue>) -> Self {
        HostValue::Arr(items)
    }

    pub fn empty_object() -> Self {
        HostValue::Obj(Vec::new())
    }

    /// Push a named field onto an `Obj`. No-op on any other variant.
    pub fn set_property(&mut self, name: impl Into<String>, value: HostValue) {
        if let HostValue::Obj(fields) = self {
            fields.push((name.into(), value));
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[HostValue]> {
        match self {
            HostValue::Arr(items) => Some(items),
            _ => None,
        }
    }

    pub fn get_property(&self, name: &str) -> Option<&HostValue> {
        match self {
            HostValue::Obj(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Convert from a parsed JSON value — used when a host delivers batch
    /// operations or query arguments across a wire boundary as JSON text.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => HostValue::Null,
            JsonValue::Bool(b) => HostValue::Bool(*b),
            JsonValue::Number(n) => HostValue::Num(n.as_f64().unwrap_or(0.0)),
            JsonValue::String(s) => HostValue::Str(s.clone()),
            JsonValue::Array(items) => HostValue::Arr(items.iter().map(HostValue::from_json).collect()),
            JsonValue::Object(fields) => HostValue::Obj(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), HostValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to a JSON value, e.g. for logging or diagnostic dumps.
    pub fn to_json(&self) -> JsonValue {
        match self {
            HostValue::Null => JsonValue::Null,
            HostValue::Bool(b) => JsonValue::Bool(*b),
            HostValue::Num(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            HostValue::Str(s) => JsonValue::String(s.clone()),
            HostValue::Arr(items) => JsonValue::Array(items.iter().map(HostValue::to_json).collect()),
            HostValue::Obj(fields) => {
                let mut map = serde_json::Map::new();
                for (k, v) in fields {
                    map.insert(k.clone(), v.to_json());
                }
                JsonValue::Object(map)
            }
        }
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::Str(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::Str(s)
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        HostValue::Num(n)
    }
}

impl From<i64> for HostValue {
    fn from(n: i64) -> Self {
        HostValue::Num(n as f64)
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_preserves_insertion_order() {
        let mut obj = HostValue::empty_object();
        obj.set_property("b", HostValue::from(2.0));
        obj.set_property("a", HostValue::from(1.0));
        match obj {
            HostValue::Obj(fields) => {
                assert_eq!(fields[0].0, "b");
                assert_eq!(fields[1].0, "a");
            }
            _ => panic!("expected Obj"),
        }
    }

    #[test]
    fn json_roundtrip_for_scalars_and_containers() {
        let v = HostValue::Arr(vec![
            HostValue::Null,
            HostValue::Bool(true),
            HostValue::Num(3.5),
            HostValue::str("x"),
        ]);
        let json = v.to_json();
        let back = HostValue::from_json(&json);
        assert_eq!(v, back);
    }
}
