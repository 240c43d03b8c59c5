use thiserror::Error;

use crate::data_type::DataType;

/// Errors raised while validating the workflow data model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
  #[error("unknown data type: {0}")]
  UnknownDataType(String),

  #[error("Expected value {value} to have type {data_type} but got {actual}!")]
  TypeMismatch {
    value: String,
    data_type: DataType,
    actual: &'static str,
  },

  #[error("Expected value {value} to have type {data_type} but casting failed with {message}!")]
  Cast {
    value: String,
    data_type: DataType,
    message: String,
  },

  #[error(
    "Expected canonical template variable names (e.g., <input_variable.template_variable>). Got {keys:?}"
  )]
  TemplateVariableName { keys: Vec<String> },

  #[error(
    "Ambiguous template variable grouping: got {parents:?} as parent variables, expected {expected}!"
  )]
  TemplateVariableGrouping {
    parents: Vec<String>,
    expected: String,
  },

  #[error(
    "Something is wrong with the template variables. Expected parent variable {expected}, got {actual}!"
  )]
  TemplateParentMismatch { expected: String, actual: String },

  #[error("failed to render template for input '{key}': {message}")]
  TemplateRender { key: String, message: String },

  #[error("Self dependency are not supported but encountered in {label}!")]
  SelfDependency { label: String },

  #[error("Input {key} not found in component {label}")]
  InputNotFound { key: String, label: String },

  #[error("invalid document: {0}")]
  Document(String),
}

impl From<serde_json::Error> for ConfigError {
  fn from(e: serde_json::Error) -> Self {
    ConfigError::Document(e.to_string())
  }
}
