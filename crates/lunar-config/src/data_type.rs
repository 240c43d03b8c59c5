//! Component I/O data types.
//!
//! Every input and output slot declares a [`DataType`]. Each data type maps to
//! a structural [`Shape`] that runtime JSON values are checked against.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::ConfigError;

/// Declared type of a component input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
  File,
  Datasource,
  Text,
  Csv,
  Int,
  Float,
  Code,
  RCode,
  Embeddings,
  Json,
  Image,
  Report,
  Template,
  List,
  Aggregated,
  PropertySelector,
  PropertyGetter,
  ListIndexGetter,
  Workflow,
  BsgnGraph,
  Cytoscape,
  Password,
  BarChart,
  LineChart,
  Audio,
  Bool,
  Stream,
  Sparql,
  Select,
  Any,
  Null,
}

const ALL: [DataType; 31] = [
  DataType::File,
  DataType::Datasource,
  DataType::Text,
  DataType::Csv,
  DataType::Int,
  DataType::Float,
  DataType::Code,
  DataType::RCode,
  DataType::Embeddings,
  DataType::Json,
  DataType::Image,
  DataType::Report,
  DataType::Template,
  DataType::List,
  DataType::Aggregated,
  DataType::PropertySelector,
  DataType::PropertyGetter,
  DataType::ListIndexGetter,
  DataType::Workflow,
  DataType::BsgnGraph,
  DataType::Cytoscape,
  DataType::Password,
  DataType::BarChart,
  DataType::LineChart,
  DataType::Audio,
  DataType::Bool,
  DataType::Stream,
  DataType::Sparql,
  DataType::Select,
  DataType::Any,
  DataType::Null,
];

/// Structural description of the runtime values a data type accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
  Text,
  Integer,
  Float,
  Boolean,
  List,
  Object,
  /// A file descriptor object (`path`, `name`, ...).
  File,
  /// An `{options, selection}` object.
  Select,
  /// A workflow id or an embedded workflow document.
  Workflow,
  Stream,
  Any,
  Null,
}

impl DataType {
  /// Wire name of the data type.
  pub fn as_str(&self) -> &'static str {
    match self {
      DataType::File => "FILE",
      DataType::Datasource => "DATASOURCE",
      DataType::Text => "TEXT",
      DataType::Csv => "CSV",
      DataType::Int => "INT",
      DataType::Float => "FLOAT",
      DataType::Code => "CODE",
      DataType::RCode => "R_CODE",
      DataType::Embeddings => "EMBEDDINGS",
      DataType::Json => "JSON",
      DataType::Image => "IMAGE",
      DataType::Report => "REPORT",
      DataType::Template => "TEMPLATE",
      DataType::List => "LIST",
      DataType::Aggregated => "AGGREGATED",
      DataType::PropertySelector => "PROPERTY_SELECTOR",
      DataType::PropertyGetter => "PROPERTY_GETTER",
      DataType::ListIndexGetter => "LIST_INDEX_GETTER",
      DataType::Workflow => "WORKFLOW",
      DataType::BsgnGraph => "BSGN_GRAPH",
      DataType::Cytoscape => "CYTOSCAPE",
      DataType::Password => "PASSWORD",
      DataType::BarChart => "BAR_CHART",
      DataType::LineChart => "LINE_CHART",
      DataType::Audio => "AUDIO",
      DataType::Bool => "BOOL",
      DataType::Stream => "STREAM",
      DataType::Sparql => "SPARQL",
      DataType::Select => "SELECT",
      DataType::Any => "ANY",
      DataType::Null => "NULL",
    }
  }

  /// The runtime shape values of this type must have.
  pub fn expected_shape(&self) -> Shape {
    match self {
      DataType::Datasource
      | DataType::Text
      | DataType::Csv
      | DataType::Code
      | DataType::RCode
      | DataType::Image
      | DataType::Report
      | DataType::Template
      | DataType::PropertySelector
      | DataType::PropertyGetter
      | DataType::ListIndexGetter
      | DataType::Password
      | DataType::Audio
      | DataType::Sparql => Shape::Text,
      DataType::Int => Shape::Integer,
      DataType::Float => Shape::Float,
      DataType::Bool => Shape::Boolean,
      DataType::List | DataType::Embeddings => Shape::List,
      DataType::Json
      | DataType::Aggregated
      | DataType::BsgnGraph
      | DataType::Cytoscape
      | DataType::BarChart
      | DataType::LineChart => Shape::Object,
      DataType::File => Shape::File,
      DataType::Select => Shape::Select,
      DataType::Workflow => Shape::Workflow,
      DataType::Stream => Shape::Stream,
      DataType::Any => Shape::Any,
      DataType::Null => Shape::Null,
    }
  }

  /// Whether inputs of this type carry template variables.
  pub fn is_templated(&self) -> bool {
    matches!(
      self,
      DataType::Template | DataType::Code | DataType::RCode | DataType::Sparql
    )
  }

  /// Whether template variables of this type are rendered into the value.
  pub fn renders_template(&self) -> bool {
    matches!(self, DataType::Template | DataType::Code)
  }

  /// LIST and STREAM normalise missing values to an empty list.
  pub fn is_list_like(&self) -> bool {
    matches!(self, DataType::List | DataType::Stream)
  }
}

impl Shape {
  /// Check whether a JSON value has this shape.
  pub fn matches(&self, value: &serde_json::Value) -> bool {
    match self {
      Shape::Text => value.is_string(),
      Shape::Integer => value.is_i64() || value.is_u64(),
      Shape::Float => value.is_number(),
      Shape::Boolean => value.is_boolean(),
      Shape::List => value.is_array(),
      Shape::Object | Shape::File | Shape::Select => value.is_object(),
      Shape::Workflow => value.is_string() || value.is_object(),
      Shape::Stream | Shape::Any => true,
      Shape::Null => value.is_null(),
    }
  }
}

/// Short name of a JSON value's kind, for error messages.
pub fn value_kind(value: &serde_json::Value) -> &'static str {
  match value {
    serde_json::Value::Null => "null",
    serde_json::Value::Bool(_) => "bool",
    serde_json::Value::Number(n) if n.is_f64() => "float",
    serde_json::Value::Number(_) => "int",
    serde_json::Value::String(_) => "string",
    serde_json::Value::Array(_) => "list",
    serde_json::Value::Object(_) => "object",
  }
}

impl fmt::Display for DataType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for DataType {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    ALL
      .iter()
      .copied()
      .find(|dt| dt.as_str().eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| ConfigError::UnknownDataType(s.to_string()))
  }
}

impl Serialize for DataType {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.as_str())
  }
}

impl<'de> Deserialize<'de> for DataType {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(de::Error::custom)
  }
}
