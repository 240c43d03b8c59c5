use thiserror::Error;

/// Errors that can occur when looking components up.
#[derive(Debug, Error)]
pub enum RegistryError {
  /// Component not found in the registry.
  #[error("component not found: {class_name}")]
  NotFound { class_name: String },

  /// IO error when reading component files.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// Failed to parse manifest JSON.
  #[error("invalid manifest: {0}")]
  InvalidManifest(#[from] serde_json::Error),

  /// Two components claim the same class name.
  #[error("component already registered: {class_name}")]
  AlreadyRegistered { class_name: String },
}

/// Errors returned by a component's `run`.
#[derive(Debug, Error)]
pub enum RunError {
  #[error("missing input '{0}'")]
  MissingInput(String),

  #[error("invalid value for input '{key}': {message}")]
  InvalidInput { key: String, message: String },

  #[error("no script runner available for {0}")]
  NoScriptRunner(String),

  #[error("script failed: {0}")]
  Script(String),

  #[error("{0}")]
  Failed(String),
}
