use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The literal tag used to encode [`Value::Unset`] in the manifest JSON, for compatibility with
/// manifests written by earlier versions of the pipeline.
pub const NOTSET: &str = "NOTSET";

/// A value carried by a [`ValueConnector`](crate::connector::ConnectorKind::Value).
///
/// `Unset` is distinct from e.g. `Str(String::new())`: it means "no value has ever been
/// assigned", not "assigned the empty string". Only `Unset -> set` and `set -> set` transitions
/// occur; nothing ever clears a value back to `Unset`.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
  Unset,
  Str(String),
  Int(i64),
  Float(f64),
  Bool(bool),
}

impl Value {
  pub fn is_unset(&self) -> bool {
    matches!(self, Value::Unset)
  }
}

impl Default for Value {
  fn default() -> Self { Value::Unset }
}

impl From<String> for Value {
  fn from(s: String) -> Self { Value::Str(s) }
}
impl From<&str> for Value {
  fn from(s: &str) -> Self { Value::Str(s.to_string()) }
}
impl From<i64> for Value {
  fn from(i: i64) -> Self { Value::Int(i) }
}
impl From<f64> for Value {
  fn from(f: f64) -> Self { Value::Float(f) }
}
impl From<bool> for Value {
  fn from(b: bool) -> Self { Value::Bool(b) }
}

impl Serialize for Value {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      Value::Unset => serializer.serialize_str(NOTSET),
      Value::Str(s) => serializer.serialize_str(s),
      Value::Int(i) => serializer.serialize_i64(*i),
      Value::Float(f) => serializer.serialize_f64(*f),
      Value::Bool(b) => serializer.serialize_bool(*b),
    }
  }
}

struct ValueVisitor;
impl<'de> Visitor<'de> for ValueVisitor {
  type Value = Value;

  fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.write_str("a string, integer, float, bool, or the \"NOTSET\" sentinel")
  }

  fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
    if v == NOTSET {
      Ok(Value::Unset)
    } else {
      Ok(Value::Str(v.to_string()))
    }
  }
  fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
    if v == NOTSET {
      Ok(Value::Unset)
    } else {
      Ok(Value::Str(v))
    }
  }
  fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> { Ok(Value::Int(v)) }
  fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> { Ok(Value::Int(v as i64)) }
  fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> { Ok(Value::Float(v)) }
  fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> { Ok(Value::Bool(v)) }
  fn visit_none<E: de::Error>(self) -> Result<Value, E> { Ok(Value::Unset) }
  fn visit_unit<E: de::Error>(self) -> Result<Value, E> { Ok(Value::Unset) }
}

impl<'de> Deserialize<'de> for Value {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
    deserializer.deserialize_any(ValueVisitor)
  }
}
