use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::RunError;

/// Everything a component sees besides its inputs.
#[derive(Clone, Default)]
pub struct RunContext {
  /// Label of the component instance being run.
  pub label: String,
  /// Resolved configuration (defaults merged, profiles expanded, env substituted).
  pub configuration: Map<String, Value>,
  /// Runs Python source for scripted components.
  pub scripts: Option<Arc<dyn ScriptRunner>>,
}

impl fmt::Debug for RunContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RunContext")
      .field("label", &self.label)
      .field("configuration", &self.configuration)
      .field("scripts", &self.scripts.is_some())
      .finish()
  }
}

impl RunContext {
  pub fn new(label: impl Into<String>, configuration: Map<String, Value>) -> Self {
    Self {
      label: label.into(),
      configuration,
      scripts: None,
    }
  }

  pub fn with_scripts(mut self, scripts: Arc<dyn ScriptRunner>) -> Self {
    self.scripts = Some(scripts);
    self
  }
}

/// A stream of produced items, pulled lazily by the consumer.
pub type ValueStream = Box<dyn Iterator<Item = Result<Value, RunError>> + Send>;

/// What a single `run` produced.
pub enum RunOutput {
  Value(Value),
  Stream(ValueStream),
}

impl RunOutput {
  /// Collect a stream into a list. Plain values are returned unchanged.
  pub fn drain(self) -> Result<Value, RunError> {
    match self {
      RunOutput::Value(value) => Ok(value),
      RunOutput::Stream(items) => items.collect::<Result<Vec<_>, _>>().map(Value::Array),
    }
  }
}

impl fmt::Debug for RunOutput {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RunOutput::Value(v) => f.debug_tuple("Value").field(v).finish(),
      RunOutput::Stream(_) => f.write_str("Stream(..)"),
    }
  }
}

impl From<Value> for RunOutput {
  fn from(value: Value) -> Self {
    RunOutput::Value(value)
  }
}

/// A compiled-in component.
///
/// `run` is called on a blocking thread, once per mapped input tuple.
pub trait Component: Send + Sync {
  fn run(&self, ctx: &RunContext, inputs: Map<String, Value>) -> Result<RunOutput, RunError>;
}

/// How a script's source should be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptMode {
  /// A module defining `run(**inputs)`, or a class with a `run` method.
  Module,
  /// A code snippet. The value of its `result` variable is the output.
  Snippet,
}

impl ScriptMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      ScriptMode::Module => "module",
      ScriptMode::Snippet => "snippet",
    }
  }
}

/// One script execution.
#[derive(Debug, Clone, Copy)]
pub struct ScriptRequest<'a> {
  pub label: &'a str,
  pub source: &'a str,
  pub mode: ScriptMode,
  pub inputs: &'a Map<String, Value>,
  pub configuration: &'a Map<String, Value>,
}

/// Executes Python source outside the engine process.
pub trait ScriptRunner: Send + Sync {
  fn run_script(&self, request: ScriptRequest<'_>) -> Result<Value, RunError>;
}

/// Fetch a required input.
pub fn required<'a>(inputs: &'a Map<String, Value>, key: &str) -> Result<&'a Value, RunError> {
  inputs
    .get(key)
    .ok_or_else(|| RunError::MissingInput(key.to_string()))
}
