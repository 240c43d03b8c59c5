use lunar_config::DataType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How an input reacts to a list value at run time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingPolicy {
  /// Map over lists whose first element has the declared shape, unless the
  /// declared type is LIST.
  #[default]
  Inferred,
  /// Never mapped.
  Scalar,
  /// Mapped whenever the value is a list.
  RepeatableScalar,
  /// Takes the whole list. Never mapped.
  List,
}

/// One expected input of a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputContract {
  pub key: String,
  pub data_type: DataType,
  #[serde(default)]
  pub mapping: MappingPolicy,
}

impl InputContract {
  pub fn new(key: impl Into<String>, data_type: DataType) -> Self {
    Self {
      key: key.into(),
      data_type,
      mapping: MappingPolicy::Inferred,
    }
  }

  pub fn with_mapping(mut self, mapping: MappingPolicy) -> Self {
    self.mapping = mapping;
    self
  }
}

/// Metadata describing a component class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentManifest {
  /// Class name used by component documents, e.g. "TextInput"
  pub class_name: String,

  /// Display name
  pub name: String,

  #[serde(default)]
  pub description: String,

  #[serde(default = "default_group")]
  pub group: String,

  /// Expected inputs, in declaration order
  #[serde(default)]
  pub inputs: Vec<InputContract>,

  pub output: DataType,

  /// Default configuration, merged under each instance's configuration
  #[serde(default)]
  pub configuration: Map<String, Value>,

  /// pip requirement lines, e.g. "requests>=2"
  #[serde(default)]
  pub requirements: Vec<String>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
}

fn default_group() -> String {
  lunar_config::DEFAULT_GROUP.to_string()
}

impl ComponentManifest {
  pub fn new(class_name: impl Into<String>, output: DataType) -> Self {
    let class_name = class_name.into();
    Self {
      name: class_name.clone(),
      class_name,
      description: String::new(),
      group: default_group(),
      inputs: Vec::new(),
      output,
      configuration: Map::new(),
      requirements: Vec::new(),
      version: None,
    }
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = description.into();
    self
  }

  pub fn with_group(mut self, group: impl Into<String>) -> Self {
    self.group = group.into();
    self
  }

  pub fn with_input(mut self, input: InputContract) -> Self {
    self.inputs.push(input);
    self
  }

  pub fn with_configuration(mut self, key: impl Into<String>, value: Value) -> Self {
    self.configuration.insert(key.into(), value);
    self
  }

  pub fn with_requirement(mut self, requirement: impl Into<String>) -> Self {
    self.requirements.push(requirement.into());
    self
  }

  pub fn input(&self, key: &str) -> Option<&InputContract> {
    self.inputs.iter().find(|i| i.key == key)
  }

  pub fn input_keys(&self) -> impl Iterator<Item = &str> {
    self.inputs.iter().map(|i| i.key.as_str())
  }
}
