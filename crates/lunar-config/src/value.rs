//! Slot values with an explicit "not yet set" state.
//!
//! On the wire an unset slot is the string `":undef:"`. A missing `value`
//! field in a document also decodes as [`InputValue::Undefined`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Wire marker for an unset slot.
pub const UNDEFINED: &str = ":undef:";

/// The value held by an input or output slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum InputValue {
  #[default]
  Undefined,
  Value(Value),
}

impl InputValue {
  pub fn is_undefined(&self) -> bool {
    matches!(self, InputValue::Undefined)
  }

  /// The concrete value, if one is set.
  pub fn as_value(&self) -> Option<&Value> {
    match self {
      InputValue::Undefined => None,
      InputValue::Value(v) => Some(v),
    }
  }

  /// The concrete value, with `Undefined` mapped to `null`.
  pub fn or_null(&self) -> Value {
    self.as_value().cloned().unwrap_or(Value::Null)
  }

  /// The wire representation (`":undef:"` for unset slots).
  pub fn to_wire(&self) -> Value {
    match self {
      InputValue::Undefined => Value::String(UNDEFINED.to_string()),
      InputValue::Value(v) => v.clone(),
    }
  }
}

impl From<Value> for InputValue {
  fn from(value: Value) -> Self {
    match value {
      Value::String(s) if s == UNDEFINED => InputValue::Undefined,
      other => InputValue::Value(other),
    }
  }
}

impl Serialize for InputValue {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      InputValue::Undefined => serializer.serialize_str(UNDEFINED),
      InputValue::Value(v) => v.serialize(serializer),
    }
  }
}

impl<'de> Deserialize<'de> for InputValue {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    Value::deserialize(deserializer).map(InputValue::from)
  }
}
