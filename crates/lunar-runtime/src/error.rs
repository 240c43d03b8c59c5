//! Runtime error types.

use lunar_component_registry::{RegistryError, RunError};
use lunar_config::ConfigError;

use crate::profiles::ProfileError;

pub const UPSTREAM_FAILED: &str =
  "Run upstream components first or see their return errors for details!";

/// Errors that fail a single component. They are stored as that component's
/// result; the rest of the workflow keeps running.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
  /// The class name resolves to nothing in the registry.
  #[error("Component not found: {class_name}. Known components: {known}")]
  NotFound { class_name: String, known: String },

  /// The document lacks inputs the implementation requires.
  #[error("Component {label} received invalid inputs. Expected {expected:?} got {actual:?}!")]
  MissingInputs {
    label: String,
    expected: Vec<String>,
    actual: Vec<String>,
  },

  /// An input the implementation does not declare.
  #[error("Unexpected input. Full error message: '{key}'!")]
  UnexpectedInput { key: String },

  /// An `$LUNARENV::` placeholder names an unset variable.
  #[error("Expected environment variable {variable}! Please set it in the environment.")]
  MissingEnvironment { variable: String },

  /// A predecessor failed or never produced a result.
  #[error("Run upstream components first or see their return errors for details!")]
  Upstream,

  /// Scripted source needs a script runner and none was configured.
  #[error("Component {label} runs Python source but no script runner is configured")]
  NoScriptRunner { label: String },

  #[error("{label}: {source}")]
  Run {
    label: String,
    #[source]
    source: RunError,
  },

  #[error("Component {label} timed out after {seconds}s")]
  Timeout { label: String, seconds: u64 },

  /// The workflow deadline passed before the component finished.
  #[error("Workflow {name} timed out after {seconds}s")]
  WorkflowTimeout { name: String, seconds: u64 },

  /// The blocking task running the component panicked or was cancelled.
  #[error("Component {label} aborted: {message}")]
  Aborted { label: String, message: String },

  #[error("Empty workflow!")]
  EmptyWorkflow,

  #[error("Sub-workflow {label} has no `workflow` input")]
  MissingWorkflow { label: String },

  #[error("Sub-workflow {label} must have exactly one output component, found {sinks:?}")]
  MultipleOutputs { label: String, sinks: Vec<String> },

  /// The first error of the embedded workflow.
  #[error("{message}")]
  SubworkflowFailed { label: String, message: String },

  #[error("Sub-workflow {label} finished without a terminal result")]
  SubworkflowNoOutput { label: String },

  #[error("Sub-workflow components cannot run outside a workflow scheduler")]
  SubworkflowOutsideScheduler,

  /// Left in the worklist when no remaining component could make progress.
  #[error("Component {label} cannot run: its dependencies form a cycle!")]
  Unschedulable { label: String },

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Registry(#[from] RegistryError),

  #[error(transparent)]
  Profile(#[from] ProfileError),
}
