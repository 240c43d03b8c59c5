//! Component input and output slots.
//!
//! Slot values are plain JSON, coerced to the declared [`DataType`] when a slot
//! is validated:
//!
//! - `"42"` for an `INT` input becomes `42`
//! - `"{\"a\": 1}"` for a `JSON` input becomes `{"a": 1}`
//! - `"/data/report.pdf"` for a `FILE` input becomes `{"path": "/data/report.pdf", "name": "report.pdf"}`
//! - `7` for a `LIST` input becomes `[7]`
//! - an unset `LIST` or `STREAM` input becomes `[]`

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::data_type::{DataType, Shape, value_kind};
use crate::error::ConfigError;
use crate::template::render_template;
use crate::value::{InputValue, UNDEFINED};

/// One named input slot on a component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentInput {
  pub key: String,
  pub data_type: DataType,
  #[serde(default)]
  pub value: InputValue,
  /// Qualified `"<input_key>.<var>"` names mapped to their values.
  #[serde(default)]
  pub template_variables: Map<String, Value>,
  /// Component this input belongs to. Used by sub-workflow input overrides.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub component_id: Option<String>,
}

impl ComponentInput {
  pub fn new(key: impl Into<String>, data_type: DataType) -> Self {
    Self {
      key: key.into(),
      data_type,
      value: InputValue::Undefined,
      template_variables: Map::new(),
      component_id: None,
    }
  }

  pub fn with_value(mut self, value: Value) -> Self {
    self.value = InputValue::from(value);
    self
  }

  pub fn with_template_variable(mut self, name: impl Into<String>, value: Value) -> Self {
    self.template_variables.insert(name.into(), value);
    self
  }

  /// Coerce the value to the declared type and check template variables.
  pub fn validated(mut self) -> Result<Self, ConfigError> {
    self.value = coerce_value(self.data_type, std::mem::take(&mut self.value))?;
    self.validate_template_variables()?;
    Ok(self)
  }

  fn validate_template_variables(&mut self) -> Result<(), ConfigError> {
    if !self.data_type.is_templated()
      || self.template_variables.is_empty()
      || is_empty_value(&self.value)
    {
      return Ok(());
    }

    if self.data_type == DataType::Code {
      for value in self.template_variables.values_mut() {
        if !value.is_string() {
          *value = Value::String(value.to_string());
        }
      }
      return Ok(());
    }

    let mut parents: Vec<String> = Vec::new();
    for name in self.template_variables.keys() {
      let Some((parent, _)) = name.split_once('.') else {
        return Err(ConfigError::TemplateVariableName {
          keys: self.template_variables.keys().cloned().collect(),
        });
      };
      if !parents.iter().any(|p| p == parent) {
        parents.push(parent.to_string());
      }
    }

    if parents.len() != 1 || parents[0] != self.key {
      return Err(ConfigError::TemplateVariableGrouping {
        parents,
        expected: self.key.clone(),
      });
    }

    Ok(())
  }

  /// Flatten template variables into the final value.
  ///
  /// Only TEMPLATE and CODE inputs with at least one variable are rendered;
  /// every other input returns its value unchanged.
  pub fn resolve_template_variables(&self) -> Result<InputValue, ConfigError> {
    if !self.data_type.renders_template() || self.template_variables.is_empty() {
      return Ok(self.value.clone());
    }

    let mut variables = Map::new();
    for (name, value) in &self.template_variables {
      let (parent, var) = name.split_once('.').unwrap_or((name.as_str(), ""));
      let bare = if var.is_empty() { parent } else { var };
      variables.insert(bare.to_string(), value.clone());
    }

    let template = match &self.value {
      InputValue::Undefined => UNDEFINED.to_string(),
      InputValue::Value(Value::String(s)) => s.clone(),
      InputValue::Value(other) => other.to_string(),
    };

    render_template(&self.key, &template, &variables).map(|s| InputValue::Value(Value::String(s)))
  }

  /// Bind an upstream value to one of this input's template variables.
  ///
  /// A bare variable name is qualified with this input's key.
  pub fn bind_template_variable(
    &mut self,
    template_key: &str,
    value: Value,
  ) -> Result<(), ConfigError> {
    let qualified = match template_key.split_once('.') {
      None => format!("{}.{}", self.key, template_key),
      Some((parent, _)) if parent != self.key => {
        return Err(ConfigError::TemplateParentMismatch {
          expected: self.key.clone(),
          actual: parent.to_string(),
        });
      }
      Some(_) => template_key.to_string(),
    };
    self.template_variables.insert(qualified, value);
    Ok(())
  }

  /// Add a producer's value to an AGGREGATED input, keyed by producer label.
  pub fn aggregate(&mut self, producer_label: &str, value: Value) {
    let mut entries = match std::mem::take(&mut self.value) {
      InputValue::Value(Value::Object(map)) => map,
      _ => Map::new(),
    };
    entries.insert(producer_label.to_string(), value);
    self.value = InputValue::Value(Value::Object(entries));
  }

  /// Hex sha256 over key, data type and value.
  ///
  /// An unset value contributes a fresh random id, so unset inputs never
  /// share a hash.
  pub fn content_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.key.as_bytes());
    hasher.update([0]);
    hasher.update(self.data_type.as_str().as_bytes());
    hasher.update([0]);
    match &self.value {
      InputValue::Undefined => hasher.update(Uuid::new_v4().as_bytes()),
      InputValue::Value(value) => hasher.update(value.to_string().as_bytes()),
    }
    format!("{:x}", hasher.finalize())
  }
}

impl PartialEq for ComponentInput {
  /// Unset values never compare equal, so two pending inputs are never merged.
  fn eq(&self, other: &Self) -> bool {
    let values_match = match (&self.value, &other.value) {
      (InputValue::Value(a), InputValue::Value(b)) => a == b,
      _ => false,
    };
    self.key == other.key && self.data_type == other.data_type && values_match
  }
}

/// The single output slot of a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentOutput {
  pub data_type: DataType,
  #[serde(default)]
  pub value: InputValue,
}

impl ComponentOutput {
  pub fn new(data_type: DataType) -> Self {
    Self {
      data_type,
      value: InputValue::Undefined,
    }
  }

  /// Check the value against the declared type.
  pub fn validated(self) -> Result<Self, ConfigError> {
    let Some(value) = self.value.as_value() else {
      return Ok(self);
    };
    let shape = self.data_type.expected_shape();
    if value.is_null()
      || matches!(shape, Shape::Any | Shape::Stream)
      || shape.matches(value)
      || first_element_matches(shape, value)
    {
      return Ok(self);
    }
    Err(ConfigError::TypeMismatch {
      value: value.to_string(),
      data_type: self.data_type,
      actual: value_kind(value),
    })
  }

  /// Replace the value, checking it against the declared type.
  pub fn set_value(&mut self, value: Value) -> Result<(), ConfigError> {
    let candidate = ComponentOutput {
      data_type: self.data_type,
      value: InputValue::Value(value),
    }
    .validated()?;
    self.value = candidate.value;
    Ok(())
  }
}

/// Coerce a slot value to the shape its data type expects.
pub fn coerce_value(data_type: DataType, value: InputValue) -> Result<InputValue, ConfigError> {
  if data_type == DataType::Any {
    return Ok(value);
  }

  let value = match value {
    InputValue::Undefined if data_type.is_list_like() => {
      return Ok(InputValue::Value(Value::Array(Vec::new())));
    }
    InputValue::Undefined => return Ok(InputValue::Undefined),
    InputValue::Value(v) => v,
  };

  let shape = data_type.expected_shape();
  if value.is_null() || shape.matches(&value) || first_element_matches(shape, &value) {
    return Ok(InputValue::Value(value));
  }

  let coerced = match (data_type, value) {
    (DataType::File, Value::String(path)) => file_from_path(&path),
    (DataType::Int, Value::String(s)) => {
      s.trim()
        .parse::<i64>()
        .map(Value::from)
        .map_err(|e| ConfigError::Cast {
          value: s.clone(),
          data_type,
          message: e.to_string(),
        })?
    }
    (DataType::Float, Value::String(s)) => {
      let parsed = s.trim().parse::<f64>().map_err(|e| ConfigError::Cast {
        value: s.clone(),
        data_type,
        message: e.to_string(),
      })?;
      serde_json::Number::from_f64(parsed)
        .map(Value::Number)
        .ok_or_else(|| ConfigError::Cast {
          value: s.clone(),
          data_type,
          message: "not a finite number".to_string(),
        })?
    }
    (dt, v) if dt.is_list_like() && !is_iterable(&v) => Value::Array(vec![v]),
    (DataType::Json, Value::String(s)) => {
      serde_json::from_str(&s).map_err(|e| ConfigError::Cast {
        value: s.clone(),
        data_type,
        message: e.to_string(),
      })?
    }
    (DataType::Aggregated, _) => Value::Object(Map::new()),
    (dt, v) => {
      return Err(ConfigError::TypeMismatch {
        value: v.to_string(),
        data_type: dt,
        actual: value_kind(&v),
      });
    }
  };

  Ok(InputValue::Value(coerced))
}

/// True when `value` is a non-empty list whose first element has `shape`.
pub fn first_element_matches(shape: Shape, value: &Value) -> bool {
  value
    .as_array()
    .and_then(|items| items.first())
    .is_some_and(|first| shape.matches(first))
}

fn is_iterable(value: &Value) -> bool {
  matches!(value, Value::String(_) | Value::Array(_) | Value::Object(_))
}

fn is_empty_value(value: &InputValue) -> bool {
  match value {
    InputValue::Undefined | InputValue::Value(Value::Null) => true,
    InputValue::Value(Value::String(s)) => s.is_empty(),
    InputValue::Value(Value::Array(a)) => a.is_empty(),
    InputValue::Value(Value::Object(o)) => o.is_empty(),
    InputValue::Value(_) => false,
  }
}

fn file_from_path(path: &str) -> Value {
  let name = Path::new(path)
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| path.to_string());
  serde_json::json!({ "path": path, "name": name })
}
