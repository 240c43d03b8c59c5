//! Deferred streaming producers.
//!
//! A component whose output is a STREAM and that feeds at least one successor
//! is not executed by the scheduler. It is published as a [`TaskPromise`];
//! every consumer opens its own stream and runs once per item.

use lunar_config::{ComponentModel, InputValue};
use tracing::debug;

use crate::error::ComponentError;
use crate::wiring::update_inputs;
use crate::wrapper::ComponentWrapper;

/// How a stream consumer's per-item results become its single result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamFold {
  /// The last iteration wins.
  #[default]
  KeepLast,
}

/// A streaming producer waiting for its consumers.
#[derive(Debug, Clone)]
pub struct TaskPromise {
  producer: ComponentWrapper,
}

impl TaskPromise {
  pub fn new(producer: ComponentWrapper) -> Self {
    Self { producer }
  }

  pub fn label(&self) -> &str {
    self.producer.label()
  }

  /// The producer as it was published, never executed.
  pub fn model(&self) -> &ComponentModel {
    self.producer.model()
  }

  /// Start a fresh run of the producer.
  pub fn open(&self) -> Result<lunar_component_registry::ValueStream, ComponentError> {
    self.producer.run_stream()
  }
}

/// Split a link key into its input key and optional template key.
pub fn split_link_key(link_key: &str) -> (&str, Option<&str>) {
  match link_key.split_once('.') {
    Some((input_key, template_key)) => (input_key, Some(template_key)),
    None => (link_key, None),
  }
}

/// Drive `consumer` over the zipped item streams of `promises`.
///
/// Streams are pulled one item at a time and zipping stops at the shortest.
/// With no items at all the unexecuted consumer model is returned.
pub fn consume(
  mut consumer: ComponentWrapper,
  promises: &[(String, TaskPromise)],
  fold: StreamFold,
) -> Result<ComponentModel, ComponentError> {
  let mut streams = promises
    .iter()
    .map(|(_, promise)| promise.open())
    .collect::<Result<Vec<_>, _>>()?;

  let mut folded: Option<ComponentModel> = None;
  let mut iterations = 0usize;
  'items: loop {
    let mut items = Vec::with_capacity(streams.len());
    for (stream, (_, promise)) in streams.iter_mut().zip(promises) {
      match stream.next() {
        None => break 'items,
        Some(Err(source)) => {
          return Err(ComponentError::Run {
            label: promise.label().to_string(),
            source,
          });
        }
        Some(Ok(item)) => items.push(item),
      }
    }

    for (item, (link_key, promise)) in items.into_iter().zip(promises) {
      let mut upstream = promise.model().clone();
      upstream.output.value = InputValue::Value(item);
      let (input_key, template_key) = split_link_key(link_key);
      update_inputs(
        consumer.model_mut(),
        &upstream,
        promise.label(),
        input_key,
        template_key,
      )?;
    }

    let result = consumer.run_in_workflow()?;
    iterations += 1;
    folded = match fold {
      StreamFold::KeepLast => Some(result),
    };
  }

  debug!(label = %consumer.label(), iterations, "stream_consumed");
  Ok(folded.unwrap_or_else(|| consumer.into_model()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_split_link_key() {
    assert_eq!(split_link_key("input"), ("input", None));
    assert_eq!(split_link_key("input.name"), ("input", Some("name")));
  }
}
