//! Python virtual environments and engine subprocesses.
//!
//! Isolated runs happen in three steps: [`Venv::ensure`] creates or reuses
//! the environment, [`Venv::install_requirements`] installs what the
//! `packages.pip` cache does not cover yet, and [`run_isolated`] launches the
//! engine inside it and parses the framed result line from its stdout.

mod config;
mod diagnostics;
mod env;
mod error;
mod launch;
mod requirements;
mod script;
mod sentinel;
mod venv;

pub use config::IsolationConfig;
pub use diagnostics::{describe_exit, exit_code, exit_diagnostic};
pub use env::{PATH_SEPARATOR, USER_ID_VAR, child_env, load_env_file, python_path};
pub use error::IsolationError;
pub use launch::run_isolated;
pub use requirements::{
  CACHE_FILE, InstallPlan, Requirement, RequirementCache, normalise_name, parse_requirements,
  plan_install,
};
pub use script::PythonScriptRunner;
pub use sentinel::{
  COMPONENT_OUTPUT_END, COMPONENT_OUTPUT_START, Frame, WORKFLOW_OUTPUT_END, WORKFLOW_OUTPUT_START,
  compose, extract, parse_results,
};
pub use venv::Venv;
