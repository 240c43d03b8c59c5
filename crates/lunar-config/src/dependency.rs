use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A data edge: the output of `source_label` feeds `component_input_key` on
/// `target_label`, optionally as a template variable of that input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawDependency")]
pub struct ComponentDependency {
  pub component_input_key: String,
  pub source_label: String,
  pub target_label: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub template_variable_key: Option<String>,
}

impl ComponentDependency {
  pub fn new(
    source_label: impl Into<String>,
    target_label: impl Into<String>,
    component_input_key: impl Into<String>,
    template_variable_key: Option<String>,
  ) -> Result<Self, ConfigError> {
    let source_label = source_label.into();
    let target_label = target_label.into();
    if source_label == target_label {
      return Err(ConfigError::SelfDependency {
        label: source_label,
      });
    }
    Ok(Self {
      component_input_key: component_input_key.into(),
      source_label,
      target_label,
      template_variable_key,
    })
  }

  /// Key used to bind a stream link: `input_key` or `input_key.template_key`.
  pub fn link_key(&self) -> String {
    match &self.template_variable_key {
      Some(template_key) => format!("{}.{}", self.component_input_key, template_key),
      None => self.component_input_key.clone(),
    }
  }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDependency {
  component_input_key: String,
  source_label: String,
  target_label: String,
  #[serde(default)]
  template_variable_key: Option<String>,
}

impl TryFrom<RawDependency> for ComponentDependency {
  type Error = ConfigError;

  fn try_from(raw: RawDependency) -> Result<Self, Self::Error> {
    Self::new(
      raw.source_label,
      raw.target_label,
      raw.component_input_key,
      raw.template_variable_key,
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_self_dependency_is_rejected() {
    let err = ComponentDependency::new("A", "A", "input", None).unwrap_err();
    assert_eq!(
      err.to_string(),
      "Self dependency are not supported but encountered in A!"
    );

    let decoded = serde_json::from_value::<ComponentDependency>(json!({
      "componentInputKey": "input",
      "sourceLabel": "B",
      "targetLabel": "B"
    }));
    assert!(decoded.is_err());
  }

  #[test]
  fn test_link_key() {
    let plain = ComponentDependency::new("A", "B", "prompt", None).unwrap();
    assert_eq!(plain.link_key(), "prompt");

    let templated = ComponentDependency::new("A", "B", "prompt", Some("name".into())).unwrap();
    assert_eq!(templated.link_key(), "prompt.name");
  }

  #[test]
  fn test_wire_format() {
    let dep = ComponentDependency::new("A", "B", "prompt", Some("name".into())).unwrap();
    let encoded = serde_json::to_value(&dep).unwrap();
    assert_eq!(
      encoded,
      json!({
        "componentInputKey": "prompt",
        "sourceLabel": "A",
        "targetLabel": "B",
        "templateVariableKey": "name"
      })
    );
  }
}
