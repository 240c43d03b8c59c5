use lunar_config::DataType;
use serde_json::{Map, Value};

use crate::component::{Component, RunContext, RunOutput, required};
use crate::error::RunError;
use crate::manifest::{ComponentManifest, InputContract};
use crate::registry::RegisteredComponent;

/// Echoes its `input` text.
pub struct TextInput;

impl Component for TextInput {
  fn run(&self, _ctx: &RunContext, inputs: Map<String, Value>) -> Result<RunOutput, RunError> {
    Ok(RunOutput::Value(required(&inputs, "input")?.clone()))
  }
}

/// Echoes its `input` JSON object.
pub struct JsonInput;

impl Component for JsonInput {
  fn run(&self, _ctx: &RunContext, inputs: Map<String, Value>) -> Result<RunOutput, RunError> {
    let value = required(&inputs, "input")?;
    match value {
      Value::String(raw) => serde_json::from_str(raw)
        .map(RunOutput::Value)
        .map_err(|e| RunError::InvalidInput {
          key: "input".to_string(),
          message: e.to_string(),
        }),
      other => Ok(RunOutput::Value(other.clone())),
    }
  }
}

pub(super) fn text_input() -> RegisteredComponent {
  RegisteredComponent::native(
    ComponentManifest::new("TextInput", DataType::Text)
      .with_description("Outputs the text it is given")
      .with_group("IO")
      .with_input(InputContract::new("input", DataType::Template)),
    TextInput,
  )
}

pub(super) fn json_input() -> RegisteredComponent {
  RegisteredComponent::native(
    ComponentManifest::new("JsonInput", DataType::Json)
      .with_description("Outputs the JSON it is given")
      .with_group("IO")
      .with_input(InputContract::new("input", DataType::Json)),
    JsonInput,
  )
}
