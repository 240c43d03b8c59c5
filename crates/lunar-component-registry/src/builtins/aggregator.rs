use lunar_config::DataType;
use serde_json::{Map, Value};

use crate::component::{Component, RunContext, RunOutput};
use crate::error::RunError;
use crate::manifest::{ComponentManifest, InputContract, MappingPolicy};
use crate::registry::RegisteredComponent;

/// Returns the `{producer_label: value}` map gathered on its input.
pub struct Aggregator;

impl Component for Aggregator {
  fn run(&self, _ctx: &RunContext, inputs: Map<String, Value>) -> Result<RunOutput, RunError> {
    match inputs.get("inputs") {
      None | Some(Value::Null) => Ok(RunOutput::Value(Value::Object(Map::new()))),
      Some(Value::Object(entries)) => Ok(RunOutput::Value(Value::Object(entries.clone()))),
      Some(other) => Err(RunError::InvalidInput {
        key: "inputs".to_string(),
        message: format!("expected an object, got {}", lunar_config::value_kind(other)),
      }),
    }
  }
}

pub(super) fn registered() -> RegisteredComponent {
  RegisteredComponent::native(
    ComponentManifest::new("Aggregator", DataType::Json)
      .with_description("Collects the outputs of every upstream component by label")
      .with_group("UTILS")
      .with_input(InputContract::new("inputs", DataType::Aggregated).with_mapping(MappingPolicy::Scalar)),
    Aggregator,
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_returns_aggregated_map() {
    let mut inputs = Map::new();
    inputs.insert("inputs".to_string(), json!({"A": 1, "B": "two"}));
    let out = Aggregator
      .run(&RunContext::default(), inputs)
      .unwrap()
      .drain()
      .unwrap();
    assert_eq!(out, json!({"A": 1, "B": "two"}));
  }

  #[test]
  fn test_null_is_empty() {
    let mut inputs = Map::new();
    inputs.insert("inputs".to_string(), Value::Null);
    let out = Aggregator.run(&RunContext::default(), inputs).unwrap().drain().unwrap();
    assert_eq!(out, json!({}));
  }
}
