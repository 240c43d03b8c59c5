use lunar_config::DataType;
use serde_json::{Map, Value};

use crate::component::{Component, RunContext, RunOutput, required};
use crate::error::RunError;
use crate::manifest::{ComponentManifest, InputContract, MappingPolicy};
use crate::registry::RegisteredComponent;

/// Streams the items of its `input` list one at a time.
pub struct ListStreamer;

impl Component for ListStreamer {
  fn run(&self, _ctx: &RunContext, inputs: Map<String, Value>) -> Result<RunOutput, RunError> {
    let items = match required(&inputs, "input")? {
      Value::Array(items) => items.clone(),
      Value::Null => Vec::new(),
      other => vec![other.clone()],
    };
    Ok(RunOutput::Stream(Box::new(items.into_iter().map(Ok))))
  }
}

/// Passes each streamed item through.
pub struct StreamCollector;

impl Component for StreamCollector {
  fn run(&self, _ctx: &RunContext, inputs: Map<String, Value>) -> Result<RunOutput, RunError> {
    Ok(RunOutput::Value(required(&inputs, "input")?.clone()))
  }
}

pub(super) fn list_streamer() -> RegisteredComponent {
  RegisteredComponent::native(
    ComponentManifest::new("ListStreamer", DataType::Stream)
      .with_description("Streams the items of a list")
      .with_group("UTILS")
      .with_input(InputContract::new("input", DataType::List).with_mapping(MappingPolicy::List)),
    ListStreamer,
  )
}

pub(super) fn stream_collector() -> RegisteredComponent {
  RegisteredComponent::native(
    ComponentManifest::new("StreamCollector", DataType::Text)
      .with_description("Consumes a stream, keeping the latest item")
      .with_group("UTILS")
      .with_input(InputContract::new("input", DataType::Text).with_mapping(MappingPolicy::Scalar)),
    StreamCollector,
  )
}
