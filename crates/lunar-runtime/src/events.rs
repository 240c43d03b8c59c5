//! Execution events and notifiers.
//!
//! The scheduler emits one event per state change of a component, letting
//! callers stream progress to a UI or persist it.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted while a workflow runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
  WorkflowStarted {
    execution_id: String,
    workflow_id: String,
  },

  /// A component was handed to the executor.
  ComponentStarted { execution_id: String, label: String },

  /// A component's result was served from the result cache.
  ComponentCached { execution_id: String, label: String },

  /// A streaming producer was published for its consumers instead of running.
  ComponentDeferred { execution_id: String, label: String },

  ComponentCompleted {
    execution_id: String,
    label: String,
    output: serde_json::Value,
  },

  ComponentFailed {
    execution_id: String,
    label: String,
    error: String,
  },

  /// Every component has a result.
  WorkflowCompleted { execution_id: String, failed: usize },
}

/// Receives execution events.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // the receiver may be gone
    let _ = self.sender.send(event);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_channel_notifier_forwards() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let notifier = ChannelNotifier::new(tx);
    notifier.notify(ExecutionEvent::ComponentStarted {
      execution_id: "e".to_string(),
      label: "A".to_string(),
    });
    drop(notifier);

    assert_eq!(
      rx.try_recv().unwrap(),
      ExecutionEvent::ComponentStarted {
        execution_id: "e".to_string(),
        label: "A".to_string(),
      }
    );
    assert!(rx.try_recv().is_err());
  }

  #[test]
  fn test_event_wire_form() {
    let event = ExecutionEvent::ComponentFailed {
      execution_id: "e".to_string(),
      label: "B".to_string(),
      error: "boom".to_string(),
    };
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["event"], "component_failed");
    assert_eq!(value["label"], "B");
  }

  #[test]
  fn test_send_after_receiver_dropped() {
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    ChannelNotifier::new(tx).notify(ExecutionEvent::WorkflowCompleted {
      execution_id: "e".to_string(),
      failed: 0,
    });
  }
}
