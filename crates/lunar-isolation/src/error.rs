use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IsolationError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("virtual environment at {path} is unusable: {message}")]
  Venv { path: PathBuf, message: String },

  #[error("Failed to parse requirement '{line}': {message}")]
  Requirement { line: String, message: String },

  #[error("Failed to parse cached requirements from {path}: {message}")]
  Cache { path: PathBuf, message: String },

  #[error("{program} exited with status {code:?}{detail}")]
  Process {
    program: String,
    code: Option<i32>,
    /// Empty, or "; " followed by an exit diagnostic.
    detail: String,
  },

  #[error("failed to start {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("Something went wrong while running flow. See server logs for details.")]
  MissingSentinel,

  #[error("Failed to parse result as JSON! Details: {0}")]
  Output(#[from] serde_json::Error),

  #[error("run exceeded its timeout of {seconds}s")]
  Timeout { seconds: u64 },

  #[error("run was cancelled")]
  Cancelled,
}
