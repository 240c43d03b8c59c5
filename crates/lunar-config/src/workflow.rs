use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::component::{ComponentModel, Position};
use crate::data_type::DataType;
use crate::dependency::ComponentDependency;
use crate::error::ConfigError;
use crate::input::ComponentOutput;

pub const DEFAULT_WORKFLOW_TIMEOUT: u64 = 3600;
pub const ERROR_CLASS_NAME: &str = "Error";

/// A workflow document: components plus the data edges between them.
///
/// Loading never fails on a bad component or dependency. Broken components
/// become `Error` placeholders, broken dependencies are dropped, and every
/// problem lands in `invalid_errors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "Value")]
pub struct WorkflowModel {
  pub id: String,
  pub name: String,
  pub description: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
  pub components: Vec<ComponentModel>,
  pub dependencies: Vec<ComponentDependency>,
  /// Seconds.
  pub timeout: u64,
  pub invalid_errors: Vec<String>,
}

impl WorkflowModel {
  pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      id: uuid::Uuid::new_v4().to_string(),
      name: name.into(),
      description: description.into(),
      version: None,
      components: Vec::new(),
      dependencies: Vec::new(),
      timeout: DEFAULT_WORKFLOW_TIMEOUT,
      invalid_errors: Vec::new(),
    }
  }

  pub fn with_component(mut self, component: ComponentModel) -> Self {
    self.components.push(component);
    self
  }

  pub fn with_dependency(mut self, dependency: ComponentDependency) -> Self {
    self.dependencies.push(dependency);
    self
  }

  /// Load a workflow document, recording recoverable problems.
  pub fn from_value(value: Value) -> Result<Self, ConfigError> {
    let Value::Object(mut doc) = value else {
      return Err(ConfigError::Document(
        "a workflow document must be a JSON object".to_string(),
      ));
    };

    let id = match doc.remove("id") {
      Some(Value::String(id)) => id,
      _ => uuid::Uuid::new_v4().to_string(),
    };
    let name = required_string(&doc, "name")?;
    let description = required_string(&doc, "description")?;
    let version = doc.get("version").and_then(Value::as_str).map(str::to_string);
    let timeout = doc
      .get("timeout")
      .and_then(Value::as_u64)
      .unwrap_or(DEFAULT_WORKFLOW_TIMEOUT);

    let mut invalid_errors = Vec::new();

    let components = match doc.remove("components") {
      None => Vec::new(),
      Some(Value::Array(items)) => load_components(&id, items, &mut invalid_errors),
      Some(_) => {
        invalid_errors
          .push("The 'components' property must be a list of component models".to_string());
        Vec::new()
      }
    };

    let dependencies = match doc.remove("dependencies") {
      None => Vec::new(),
      Some(Value::Array(items)) => items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<ComponentDependency>(item) {
          Ok(dependency) => Some(dependency),
          Err(e) => {
            invalid_errors.push(e.to_string());
            None
          }
        })
        .collect(),
      Some(_) => {
        invalid_errors
          .push("The 'dependencies' property must be a list of component dependencies".to_string());
        Vec::new()
      }
    };

    if let Some(Value::Array(existing)) = doc.remove("invalidErrors") {
      invalid_errors.extend(
        existing
          .into_iter()
          .filter_map(|e| e.as_str().map(str::to_string)),
      );
    }

    Ok(Self {
      id,
      name,
      description,
      version,
      components,
      dependencies,
      timeout,
      invalid_errors,
    })
  }

  pub fn get_component(&self, label: &str) -> Option<&ComponentModel> {
    self.components.iter().find(|c| c.label == label)
  }

  pub fn get_component_mut(&mut self, label: &str) -> Option<&mut ComponentModel> {
    self.components.iter_mut().find(|c| c.label == label)
  }
}

impl TryFrom<Value> for WorkflowModel {
  type Error = ConfigError;

  fn try_from(value: Value) -> Result<Self, Self::Error> {
    Self::from_value(value)
  }
}

fn required_string(doc: &Map<String, Value>, field: &str) -> Result<String, ConfigError> {
  doc
    .get(field)
    .and_then(Value::as_str)
    .map(str::to_string)
    .ok_or_else(|| ConfigError::Document(format!("missing string field '{}'", field)))
}

fn load_components(
  workflow_id: &str,
  items: Vec<Value>,
  invalid_errors: &mut Vec<String>,
) -> Vec<ComponentModel> {
  let mut components = Vec::with_capacity(items.len());
  let mut broken = 0usize;

  for item in items {
    match ComponentModel::from_value(item.clone()) {
      Ok(component) => {
        invalid_errors.extend(component.invalid_errors.iter().cloned());
        components.push(component);
      }
      Err(e) => {
        let message = e.to_string();
        components.push(error_placeholder(workflow_id, &item, broken, &message));
        invalid_errors.push(message);
        broken += 1;
      }
    }
  }

  components
}

/// Stand-in for a component document that could not be parsed.
fn error_placeholder(workflow_id: &str, raw: &Value, index: usize, message: &str) -> ComponentModel {
  let text = |field: &str| raw.get(field).and_then(Value::as_str).map(str::to_string);

  let mut placeholder = ComponentModel::new(
    text("name").unwrap_or_else(|| "Invalid component".to_string()),
    ERROR_CLASS_NAME,
    Vec::new(),
    ComponentOutput::new(DataType::Any),
  );
  placeholder.workflow_id = Some(workflow_id.to_string());
  placeholder.description = text("description")
    .unwrap_or_else(|| "An error occurred while loading this component.".to_string());
  placeholder.label = text("label").unwrap_or_else(|| format!("ERROR-{}", index));
  placeholder.position = raw
    .get("position")
    .and_then(|p| serde_json::from_value::<Position>(p.clone()).ok())
    .unwrap_or_default();
  placeholder.invalid_errors = vec![message.to_string()];
  placeholder
}
