use lunar_config::DataType;
use serde_json::{Map, Value};

use crate::component::{Component, RunContext, RunOutput, ScriptMode, ScriptRequest, required};
use crate::error::RunError;
use crate::manifest::{ComponentManifest, InputContract, MappingPolicy};
use crate::registry::RegisteredComponent;

pub const PYTHON_CODER_CLASS: &str = "PythonCoder";

/// Runs the snippet on its `code` input. The snippet's `result` variable is
/// the output.
pub struct PythonCoder;

impl Component for PythonCoder {
  fn run(&self, ctx: &RunContext, inputs: Map<String, Value>) -> Result<RunOutput, RunError> {
    let source = match required(&inputs, "code")? {
      Value::String(source) => source.clone(),
      other => {
        return Err(RunError::InvalidInput {
          key: "code".to_string(),
          message: format!("expected text, got {}", lunar_config::value_kind(other)),
        });
      }
    };

    let scripts = ctx
      .scripts
      .as_ref()
      .ok_or_else(|| RunError::NoScriptRunner(ctx.label.clone()))?;

    let mut scope = inputs.clone();
    scope.remove("code");
    scripts
      .run_script(ScriptRequest {
        label: &ctx.label,
        source: &source,
        mode: ScriptMode::Snippet,
        inputs: &scope,
        configuration: &ctx.configuration,
      })
      .map(RunOutput::Value)
  }
}

pub(super) fn registered() -> RegisteredComponent {
  RegisteredComponent::native(
    ComponentManifest::new(PYTHON_CODER_CLASS, DataType::Any)
      .with_description("Runs a Python snippet and returns its `result` variable")
      .with_group("CODERS")
      .with_input(InputContract::new("code", DataType::Code).with_mapping(MappingPolicy::Scalar)),
    PythonCoder,
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::component::ScriptRunner;
  use serde_json::json;
  use std::sync::{Arc, Mutex};

  #[derive(Default)]
  struct RecordingRunner {
    seen: Mutex<Vec<(String, ScriptMode)>>,
  }

  impl ScriptRunner for RecordingRunner {
    fn run_script(&self, request: ScriptRequest<'_>) -> Result<Value, RunError> {
      self
        .seen
        .lock()
        .unwrap()
        .push((request.source.to_string(), request.mode));
      Ok(json!("ran"))
    }
  }

  fn code(source: &str) -> Map<String, Value> {
    let mut inputs = Map::new();
    inputs.insert("code".to_string(), json!(source));
    inputs
  }

  #[test]
  fn test_runs_snippet_through_runner() {
    let runner = Arc::new(RecordingRunner::default());
    let ctx = RunContext::new("CODER-0", Map::new()).with_scripts(runner.clone());

    let out = PythonCoder.run(&ctx, code("result = 1 + 1")).unwrap().drain().unwrap();
    assert_eq!(out, json!("ran"));

    let seen = runner.seen.lock().unwrap();
    assert_eq!(seen.as_slice(), &[("result = 1 + 1".to_string(), ScriptMode::Snippet)]);
  }

  #[test]
  fn test_requires_a_runner() {
    let ctx = RunContext::new("CODER-0", Map::new());
    let err = PythonCoder.run(&ctx, code("result = 1")).unwrap_err();
    assert!(matches!(err, RunError::NoScriptRunner(label) if label == "CODER-0"));
  }
}
