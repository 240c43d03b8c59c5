use lunar_config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(
    "Either the source or the target of dependency {source_label} -> {target_label} ({input_key}) not found in the components!"
  )]
  DanglingDependency {
    source_label: String,
    target_label: String,
    input_key: String,
  },

  #[error("Cycles encountered in workflow {name}!")]
  Cycle { name: String },

  #[error("component not found: {0}")]
  ComponentNotFound(String),

  #[error("workflow {name} is invalid: {}", errors.join("; "))]
  Invalid { name: String, errors: Vec<String> },
}
