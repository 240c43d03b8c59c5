use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::data_type::DataType;
use crate::error::ConfigError;
use crate::input::{ComponentInput, ComponentOutput};

pub const DEFAULT_GROUP: &str = "UNCLASSIFIED";
pub const DEFAULT_COMPONENT_TIMEOUT: u64 = 600;

/// Canvas position of a component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
  #[serde(default)]
  pub x: f64,
  #[serde(default)]
  pub y: f64,
}

/// A component instance inside a workflow.
///
/// Loading is lenient: inputs that fail validation are dropped and an invalid
/// output is replaced with `ANY`/`null`. Every such problem is recorded in
/// `invalid_errors` instead of failing the whole document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawComponent")]
pub struct ComponentModel {
  pub id: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub workflow_id: Option<String>,
  pub name: String,
  pub class_name: String,
  pub description: String,
  pub group: String,
  pub inputs: Vec<ComponentInput>,
  pub output: ComponentOutput,
  /// Unique within the owning workflow.
  pub label: String,
  pub configuration: Map<String, Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
  pub is_custom: bool,
  pub is_terminal: bool,
  pub position: Position,
  /// Seconds.
  pub timeout: u64,
  /// Literal Python source for scripted components.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub component_code: Option<String>,
  pub component_code_requirements: Vec<String>,
  pub invalid_errors: Vec<String>,
}

impl ComponentModel {
  pub fn new(
    name: impl Into<String>,
    class_name: impl Into<String>,
    inputs: Vec<ComponentInput>,
    output: ComponentOutput,
  ) -> Self {
    let id = uuid::Uuid::new_v4().to_string();
    let class_name = class_name.into();
    Self {
      label: format!("{}_{}", class_name, id),
      id,
      workflow_id: None,
      name: name.into(),
      class_name,
      description: String::new(),
      group: DEFAULT_GROUP.to_string(),
      inputs,
      output,
      configuration: Map::new(),
      version: None,
      is_custom: false,
      is_terminal: false,
      position: Position::default(),
      timeout: DEFAULT_COMPONENT_TIMEOUT,
      component_code: None,
      component_code_requirements: Vec::new(),
      invalid_errors: Vec::new(),
    }
  }

  pub fn with_label(mut self, label: impl Into<String>) -> Self {
    self.label = label.into();
    self
  }

  pub fn with_configuration(mut self, key: impl Into<String>, value: Value) -> Self {
    self.configuration.insert(key.into(), value);
    self
  }

  /// Parse a component document, recovering from invalid inputs and output.
  pub fn from_value(value: Value) -> Result<Self, ConfigError> {
    let raw: RawComponent = serde_json::from_value(value)?;
    Self::try_from(raw)
  }

  pub fn get_input(&self, key: &str) -> Option<&ComponentInput> {
    self.inputs.iter().find(|input| input.key == key)
  }

  pub fn get_input_mut(&mut self, key: &str) -> Option<&mut ComponentInput> {
    self.inputs.iter_mut().find(|input| input.key == key)
  }

  /// Like [`get_input`](Self::get_input), but missing keys are an error.
  pub fn require_input(&self, key: &str) -> Result<&ComponentInput, ConfigError> {
    self.get_input(key).ok_or_else(|| ConfigError::InputNotFound {
      key: key.to_string(),
      label: self.label.clone(),
    })
  }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawComponent {
  #[serde(default)]
  id: Option<String>,
  #[serde(default)]
  workflow_id: Option<String>,
  name: String,
  class_name: String,
  description: String,
  #[serde(default)]
  group: Option<String>,
  inputs: Value,
  output: Value,
  #[serde(default)]
  label: Option<String>,
  #[serde(default)]
  configuration: Map<String, Value>,
  #[serde(default)]
  version: Option<String>,
  #[serde(default)]
  is_custom: bool,
  #[serde(default)]
  is_terminal: bool,
  #[serde(default)]
  position: Position,
  #[serde(default)]
  timeout: Option<u64>,
  #[serde(default)]
  component_code: Option<String>,
  #[serde(default)]
  component_code_requirements: Vec<String>,
  #[serde(default)]
  invalid_errors: Vec<String>,
}

impl TryFrom<RawComponent> for ComponentModel {
  type Error = ConfigError;

  fn try_from(raw: RawComponent) -> Result<Self, Self::Error> {
    let mut invalid_errors = Vec::new();

    let raw_inputs = match raw.inputs {
      Value::Array(items) => items,
      single => vec![single],
    };
    let mut inputs = Vec::with_capacity(raw_inputs.len());
    for raw_input in raw_inputs {
      let parsed = serde_json::from_value::<ComponentInput>(raw_input)
        .map_err(ConfigError::from)
        .and_then(ComponentInput::validated);
      match parsed {
        Ok(input) => inputs.push(input),
        Err(e) => invalid_errors.push(e.to_string()),
      }
    }

    let output = serde_json::from_value::<ComponentOutput>(raw.output)
      .map_err(ConfigError::from)
      .and_then(ComponentOutput::validated)
      .unwrap_or_else(|e| {
        invalid_errors.push(e.to_string());
        ComponentOutput {
          data_type: DataType::Any,
          value: Value::Null.into(),
        }
      });

    invalid_errors.extend(raw.invalid_errors);

    let id = raw.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let label = raw
      .label
      .unwrap_or_else(|| format!("{}_{}", raw.class_name, id));

    Ok(Self {
      id,
      workflow_id: raw.workflow_id,
      name: raw.name,
      class_name: raw.class_name,
      description: raw.description,
      group: raw.group.unwrap_or_else(|| DEFAULT_GROUP.to_string()),
      inputs,
      output,
      label,
      configuration: raw.configuration,
      version: raw.version,
      is_custom: raw.is_custom,
      is_terminal: raw.is_terminal,
      position: raw.position,
      timeout: raw.timeout.unwrap_or(DEFAULT_COMPONENT_TIMEOUT),
      component_code: raw.component_code,
      component_code_requirements: raw.component_code_requirements,
      invalid_errors,
    })
  }
}
