//! # Message payloads.
//!
//! [`Payload`] is the closed set of values that may cross the bus:
//! strings, integers, floats, booleans, and nested lists/maps of those.
//! JSON `null` and non-finite floats are rejected at the codec boundary
//! instead of being coerced.
//!
//! [`Primitive`] is the flat subset used for task launch data, which the
//! service facility passes to the worker as a key/value bundle.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};

use crate::error::CodecError;

/// JSON-compatible payload carried by a [`MessageEnvelope`](crate::MessageEnvelope).
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Payload>),
    Map(BTreeMap<String, Payload>),
}

impl Default for Payload {
    /// The empty map, sent when an event carries no data.
    fn default() -> Self {
        Payload::Map(BTreeMap::new())
    }
}

impl Payload {
    /// Returns the empty map payload.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a map payload from key/value pairs.
    ///
    /// ```
    /// use taskhost::Payload;
    ///
    /// let p = Payload::map([("seq", Payload::from(1)), ("tag", Payload::from("a"))]);
    /// assert_eq!(p.get("seq").and_then(Payload::as_i64), Some(1));
    /// ```
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Payload>,
        I: IntoIterator<Item = (K, V)>,
    {
        Payload::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Looks up a key if this payload is a map.
    pub fn get(&self, key: &str) -> Option<&Payload> {
        match self {
            Payload::Map(m) => m.get(key),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Payload::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Payload::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Payload::Float(n) => Some(*n),
            Payload::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Converts into a JSON value, rejecting non-finite floats.
    pub(crate) fn to_json(&self) -> Result<Value, CodecError> {
        Ok(match self {
            Payload::Bool(b) => Value::Bool(*b),
            Payload::Int(n) => Value::Number(Number::from(*n)),
            Payload::Float(f) => Value::Number(Number::from_f64(*f).ok_or(CodecError::NonFinite)?),
            Payload::Str(s) => Value::String(s.clone()),
            Payload::List(items) => Value::Array(
                items
                    .iter()
                    .map(Payload::to_json)
                    .collect::<Result<_, _>>()?,
            ),
            Payload::Map(entries) => {
                let mut out = Map::with_capacity(entries.len());
                for (k, v) in entries {
                    out.insert(k.clone(), v.to_json()?);
                }
                Value::Object(out)
            }
        })
    }

    /// Validates a decoded JSON value against the payload union.
    pub(crate) fn from_json(value: Value) -> Result<Self, CodecError> {
        Ok(match value {
            Value::Null => return Err(CodecError::UnsupportedShape { what: "null" }),
            Value::Bool(b) => Payload::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Payload::Int(i),
                None if n.is_u64() => {
                    return Err(CodecError::UnsupportedShape {
                        what: "u64 out of range",
                    });
                }
                None => Payload::Float(n.as_f64().ok_or(CodecError::NonFinite)?),
            },
            Value::String(s) => Payload::Str(s),
            Value::Array(items) => Payload::List(
                items
                    .into_iter()
                    .map(Payload::from_json)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(entries) => {
                let mut out = BTreeMap::new();
                for (k, v) in entries {
                    out.insert(k, Payload::from_json(v)?);
                }
                Payload::Map(out)
            }
        })
    }
}

impl From<bool> for Payload {
    fn from(v: bool) -> Self {
        Payload::Bool(v)
    }
}

impl From<i64> for Payload {
    fn from(v: i64) -> Self {
        Payload::Int(v)
    }
}

impl From<i32> for Payload {
    fn from(v: i32) -> Self {
        Payload::Int(i64::from(v))
    }
}

impl From<u32> for Payload {
    fn from(v: u32) -> Self {
        Payload::Int(i64::from(v))
    }
}

impl From<f64> for Payload {
    fn from(v: f64) -> Self {
        Payload::Float(v)
    }
}

impl From<&str> for Payload {
    fn from(v: &str) -> Self {
        Payload::Str(v.to_string())
    }
}

impl From<String> for Payload {
    fn from(v: String) -> Self {
        Payload::Str(v)
    }
}

impl From<Vec<Payload>> for Payload {
    fn from(v: Vec<Payload>) -> Self {
        Payload::List(v)
    }
}

impl From<BTreeMap<String, Payload>> for Payload {
    fn from(v: BTreeMap<String, Payload>) -> Self {
        Payload::Map(v)
    }
}

/// Flat value allowed in task launch data.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Primitive {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Primitive::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer value; floats are not truncated.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Primitive::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric value, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Primitive::Int(n) => Some(*n as f64),
            Primitive::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Primitive::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Primitive> for Payload {
    fn from(p: Primitive) -> Self {
        match p {
            Primitive::Bool(b) => Payload::Bool(b),
            Primitive::Int(n) => Payload::Int(n),
            Primitive::Float(f) => Payload::Float(f),
            Primitive::Str(s) => Payload::Str(s),
        }
    }
}

impl From<bool> for Primitive {
    fn from(v: bool) -> Self {
        Primitive::Bool(v)
    }
}

impl From<i64> for Primitive {
    fn from(v: i64) -> Self {
        Primitive::Int(v)
    }
}

impl From<i32> for Primitive {
    fn from(v: i32) -> Self {
        Primitive::Int(i64::from(v))
    }
}

impl From<f64> for Primitive {
    fn from(v: f64) -> Self {
        Primitive::Float(v)
    }
}

impl From<&str> for Primitive {
    fn from(v: &str) -> Self {
        Primitive::Str(v.to_string())
    }
}

impl From<String> for Primitive {
    fn from(v: String) -> Self {
        Primitive::Str(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_is_rejected_at_any_depth() {
        assert!(Payload::from_json(json!(null)).is_err());
        assert!(Payload::from_json(json!({"a": [1, null]})).is_err());
    }

    #[test]
    fn test_integers_stay_integers() {
        let p = Payload::from_json(json!({"seq": 1, "ratio": 0.5})).unwrap();
        assert_eq!(p.get("seq"), Some(&Payload::Int(1)));
        assert_eq!(p.get("ratio"), Some(&Payload::Float(0.5)));
    }

    #[test]
    fn test_non_finite_float_cannot_encode() {
        let err = Payload::Float(f64::NAN).to_json().unwrap_err();
        assert_eq!(err.as_label(), "codec_non_finite");
    }

    #[test]
    fn test_nested_map_to_json() {
        let p = Payload::map([
            ("list", Payload::from(vec![Payload::from(true), Payload::from("x")])),
            ("n", Payload::from(3)),
        ]);
        assert_eq!(p.to_json().unwrap(), json!({"list": [true, "x"], "n": 3}));
    }
}
