//! [`StructuredValue`]: the JSON-shaped value that crosses the bridge.
//!
//! Every request payload, every response payload and every engine value
//! (after the schema mapper is done with it) is a `StructuredValue`. It
//! mirrors JSON's value model with one difference from `serde_json::Value`
//! in its default configuration: objects keep their insertion order. Struct
//! fields read out of the engine come back in declaration order, which
//! keeps diffs between two reads deterministic.

use std::fmt;

use indexmap::IndexMap;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Number;

// ---------------------------------------------------------------------------
// StructuredValue
// ---------------------------------------------------------------------------

/// A tagged union over the JSON value model.
///
/// `Number` reuses `serde_json::Number`, which stores integers and floats
/// without loss and never holds NaN or infinity.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StructuredValue {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<StructuredValue>),
    Object(Map),
}

impl StructuredValue {
    /// Builds a number from a float. Returns `None` for NaN and infinity,
    /// which have no JSON representation.
    pub fn from_f64(value: f64) -> Option<Self> {
        Number::from_f64(value).map(Self::Number)
    }

    /// Returns `true` for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as an `i64` if it is an integer that fits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// Returns the value as a `u64` if it is a non-negative integer.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    /// Returns any number (integer or float) as an `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<StructuredValue>> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up `key` if this value is an object.
    pub fn get(&self, key: &str) -> Option<&StructuredValue> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// The JSON type name of this value, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(n) if n.is_f64() => "number",
            Self::Number(_) => "integer",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }
}

/// Prints the value as compact JSON.
impl fmt::Display for StructuredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

// -- Conversions --------------------------------------------------------

impl From<bool> for StructuredValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for StructuredValue {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<i64> for StructuredValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<u32> for StructuredValue {
    fn from(value: u32) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for StructuredValue {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<usize> for StructuredValue {
    fn from(value: usize) -> Self {
        Self::Number((value as u64).into())
    }
}

/// Non-finite floats become `Null`. Use [`StructuredValue::from_f64`] to
/// detect them instead.
impl From<f64> for StructuredValue {
    fn from(value: f64) -> Self {
        Self::from_f64(value).unwrap_or(Self::Null)
    }
}

impl From<&str> for StructuredValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for StructuredValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Map> for StructuredValue {
    fn from(value: Map) -> Self {
        Self::Object(value)
    }
}

impl<T: Into<StructuredValue>> From<Vec<T>> for StructuredValue {
    fn from(value: Vec<T>) -> Self {
        Self::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<StructuredValue>> From<Option<T>> for StructuredValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<serde_json::Value> for StructuredValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s),
            Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            Value::Object(map) => Self::Object(
                map.into_iter().map(|(k, v)| (k, Self::from(v))).collect(),
            ),
        }
    }
}

impl From<StructuredValue> for serde_json::Value {
    fn from(value: StructuredValue) -> Self {
        use serde_json::Value;
        match value {
            StructuredValue::Null => Value::Null,
            StructuredValue::Bool(b) => Value::Bool(b),
            StructuredValue::Number(n) => Value::Number(n),
            StructuredValue::String(s) => Value::String(s),
            StructuredValue::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            StructuredValue::Object(map) => Value::Object(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}

// -- Serde --------------------------------------------------------------

impl Serialize for StructuredValue {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => n.serialize(serializer),
            Self::String(s) => serializer.serialize_str(s),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object(map) => map.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for StructuredValue {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = StructuredValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(StructuredValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(StructuredValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> Result<Self::Value, D::Error> {
        Deserialize::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(StructuredValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(StructuredValue::Number(v.into()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(StructuredValue::Number(v.into()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        StructuredValue::from_f64(v)
            .ok_or_else(|| E::custom("non-finite number"))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(StructuredValue::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(
        self,
        v: String,
    ) -> Result<Self::Value, E> {
        Ok(StructuredValue::String(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(
        self,
        mut seq: A,
    ) -> Result<Self::Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(StructuredValue::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(
        self,
        mut access: A,
    ) -> Result<Self::Value, A::Error> {
        let mut map = Map::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) =
            access.next_entry::<String, StructuredValue>()?
        {
            map.insert(key, value);
        }
        Ok(StructuredValue::Object(map))
    }
}

// ---------------------------------------------------------------------------
// Map
// ---------------------------------------------------------------------------

/// An insertion-ordered string-keyed map, backed by [`IndexMap`].
///
/// Lookups and inserts are O(1), so decoding a large client object costs
/// time linear in its size.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Map {
    entries: IndexMap<String, StructuredValue>,
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity),
        }
    }

    /// Inserts `value` under `key`. An existing key keeps its position and
    /// the previous value is returned.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<StructuredValue>,
    ) -> Option<StructuredValue> {
        self.entries.insert(key.into(), value.into())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(
        mut self,
        key: impl Into<String>,
        value: impl Into<StructuredValue>,
    ) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&StructuredValue> {
        self.entries.get(key)
    }

    /// Removes `key`, preserving the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<StructuredValue> {
        self.entries.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StructuredValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, StructuredValue)> for Map {
    fn from_iter<I: IntoIterator<Item = (String, StructuredValue)>>(
        iter: I,
    ) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Map {
    type Item = (String, StructuredValue);
    type IntoIter = indexmap::map::IntoIter<String, StructuredValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for Map {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut out = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            out.serialize_entry(k, v)?;
        }
        out.end()
    }
}

impl<'de> Deserialize<'de> for Map {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        match StructuredValue::deserialize(deserializer)? {
            StructuredValue::Object(map) => Ok(map),
            other => Err(de::Error::custom(format!(
                "expected object, found {}",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_object_preserves_key_order() {
        let value: StructuredValue =
            serde_json::from_str(r#"{"zeta":1,"alpha":2,"mid":3}"#).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_serialize_object_keeps_insertion_order() {
        let map = Map::new().with("b", 1).with("a", true);
        let text = serde_json::to_string(&StructuredValue::from(map)).unwrap();
        assert_eq!(text, r#"{"b":1,"a":true}"#);
    }

    #[test]
    fn test_insert_existing_key_replaces_in_place() {
        let mut map = Map::new().with("x", 1).with("y", 2);
        let old = map.insert("x", "new");
        assert_eq!(old, Some(StructuredValue::from(1)));
        let keys: Vec<&str> = map.keys().collect();
        assert_eq!(keys, vec!["x", "y"]);
        assert_eq!(map.get("x").and_then(|v| v.as_str()), Some("new"));
    }

    #[test]
    fn test_remove_preserves_remaining_order() {
        let mut map = Map::new().with("a", 1).with("b", 2).with("c", 3);
        assert!(map.remove("b").is_some());
        let keys: Vec<&str> = map.keys().collect();
        assert_eq!(keys, vec!["a", "c"]);
        assert!(map.remove("missing").is_none());
    }

    #[test]
    fn test_deserialize_large_object_keeps_every_key_in_order() {
        let body: Vec<String> =
            (0..50_000).map(|i| format!(r#""k{i}":{i}"#)).collect();
        let text = format!("{{{}}}", body.join(","));
        let value: StructuredValue = serde_json::from_str(&text).unwrap();
        let map = value.as_object().unwrap();
        assert_eq!(map.len(), 50_000);
        assert_eq!(map.keys().next(), Some("k0"));
        assert_eq!(map.keys().last(), Some("k49999"));
        assert_eq!(map.get("k31337").and_then(|v| v.as_i64()), Some(31337));
    }

    #[test]
    fn test_duplicate_keys_keep_first_position_last_value() {
        let value: StructuredValue =
            serde_json::from_str(r#"{"a":1,"b":2,"a":3}"#).unwrap();
        let map = value.as_object().unwrap();
        let keys: Vec<&str> = map.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(map.get("a").and_then(|v| v.as_i64()), Some(3));
    }

    #[test]
    fn test_from_f64_non_finite_returns_none() {
        assert!(StructuredValue::from_f64(f64::NAN).is_none());
        assert!(StructuredValue::from_f64(f64::INFINITY).is_none());
        assert_eq!(StructuredValue::from(f64::NAN), StructuredValue::Null);
    }

    #[test]
    fn test_type_name_distinguishes_integer_and_float() {
        assert_eq!(StructuredValue::from(3).type_name(), "integer");
        assert_eq!(StructuredValue::from(3.5).type_name(), "number");
        assert_eq!(StructuredValue::Null.type_name(), "null");
    }

    #[test]
    fn test_serde_json_value_conversion_keeps_nested_data() {
        let json = serde_json::json!({"tags": ["A.B", "C"], "n": 1.5});
        let value = StructuredValue::from(json.clone());
        assert_eq!(
            value.get("tags").and_then(|t| t.as_array()).map(Vec::len),
            Some(2)
        );
        assert_eq!(serde_json::Value::from(value), json);
    }

    #[test]
    fn test_display_prints_compact_json() {
        let value = StructuredValue::from(vec!["a", "b"]);
        assert_eq!(value.to_string(), r#"["a","b"]"#);
    }
}
