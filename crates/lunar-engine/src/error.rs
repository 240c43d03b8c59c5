use std::path::PathBuf;

use lunar_component_registry::RegistryError;
use lunar_config::ConfigError;
use lunar_isolation::IsolationError;
use lunar_runtime::ProfileError;
use thiserror::Error;

/// Failures of a whole run. Component failures are not errors here; they
/// come back as entries of the result set.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error("could not determine the home directory, set LUNAR_DATA_DIR")]
  NoHomeDir,

  #[error("invalid value for {variable}: {message}")]
  InvalidSetting { variable: String, message: String },

  #[error("Workflow file {path} not found!")]
  NotFound { path: PathBuf },

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("{path} is not valid JSON: {source}")]
  Json {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("run was cancelled")]
  Cancelled,

  #[error("Failed to locate component package for {class_name}")]
  UnknownPackage { class_name: String },

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Registry(#[from] RegistryError),

  #[error(transparent)]
  Profile(#[from] ProfileError),

  #[error(transparent)]
  Isolation(#[from] IsolationError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}
