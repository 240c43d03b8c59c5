use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use lunar_config::DEFAULT_WORKFLOW_TIMEOUT;
use lunar_isolation::{IsolationConfig, normalise_name};
use lunar_runtime::PROFILES_FILE;

use crate::error::EngineError;

pub const DATA_DIR_NAME: &str = ".lunar";
pub const DEFAULT_VENV: &str = "default";

/// Engine settings.
///
/// Defaults live under the data directory (`~/.lunar`); every field can be
/// overridden through a `LUNAR_*` environment variable, and the CLI applies
/// its flags on top of that.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  pub data_dir: PathBuf,
  /// Parent directory of per-workflow virtual environments.
  pub venv_root: PathBuf,
  /// Venv used by isolated runs when none is given.
  pub default_venv: PathBuf,
  /// Scripted components, one directory each.
  pub components_dir: PathBuf,
  pub profiles_path: PathBuf,
  /// Interpreter that creates new virtual environments.
  pub python: PathBuf,
  /// Executable launched inside a venv for isolated runs.
  pub engine: PathBuf,
  pub env_file: Option<PathBuf>,
  pub user_id: Option<String>,
  /// Requirement names never installed into a venv (already normalised).
  pub frozen_requirements: HashSet<String>,
  pub core_locations: Vec<PathBuf>,
  /// Seconds an isolated run may take.
  pub timeout: u64,
}

impl EngineConfig {
  /// Defaults rooted at `data_dir`.
  pub fn new(data_dir: impl Into<PathBuf>) -> Self {
    let data_dir = data_dir.into();
    let venv_root = data_dir.join("venvs");
    Self {
      default_venv: venv_root.join(DEFAULT_VENV),
      venv_root,
      components_dir: data_dir.join("components"),
      profiles_path: data_dir.join(PROFILES_FILE),
      env_file: None,
      python: PathBuf::from("python3"),
      engine: PathBuf::from("lunar"),
      user_id: None,
      frozen_requirements: HashSet::new(),
      core_locations: Vec::new(),
      timeout: DEFAULT_WORKFLOW_TIMEOUT,
      data_dir,
    }
  }

  /// Defaults plus overrides from the process environment.
  pub fn from_env() -> Result<Self, EngineError> {
    Self::from_lookup(|name| std::env::var(name).ok())
  }

  /// Defaults plus overrides read through `lookup`.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EngineError> {
    let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    let data_dir = match var("LUNAR_DATA_DIR") {
      Some(dir) => PathBuf::from(dir),
      None => dirs::home_dir()
        .ok_or(EngineError::NoHomeDir)?
        .join(DATA_DIR_NAME),
    };
    let mut config = Self::new(data_dir);

    if let Some(root) = var("LUNAR_VENV_ROOT") {
      config.venv_root = PathBuf::from(root);
      config.default_venv = config.venv_root.join(DEFAULT_VENV);
    }
    if let Some(venv) = var("LUNAR_VENV") {
      config.default_venv = PathBuf::from(venv);
    }
    if let Some(dir) = var("LUNAR_COMPONENTS_DIR") {
      config.components_dir = PathBuf::from(dir);
    }
    if let Some(path) = var("LUNAR_PROFILES") {
      config.profiles_path = PathBuf::from(path);
    }
    if let Some(python) = var("LUNAR_PYTHON") {
      config.python = PathBuf::from(python);
    }
    if let Some(engine) = var("LUNAR_ENGINE") {
      config.engine = PathBuf::from(engine);
    }
    if let Some(path) = var("LUNAR_ENV_FILE") {
      config.env_file = Some(PathBuf::from(path));
    }
    config.user_id = var("LUNAR_USERID");
    if let Some(names) = var("LUNAR_FROZEN_REQUIREMENTS") {
      config.frozen_requirements = names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(normalise_name)
        .collect();
    }
    if let Some(paths) = var("LUNAR_CORE_LOCATIONS") {
      config.core_locations = std::env::split_paths(&paths).collect();
    }
    if let Some(timeout) = var("LUNAR_TIMEOUT") {
      config.timeout = timeout
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| EngineError::InvalidSetting {
          variable: "LUNAR_TIMEOUT".to_string(),
          message: e.to_string(),
        })?;
    }

    Ok(config)
  }

  /// The subset the isolation layer works with.
  pub fn isolation_config(&self) -> IsolationConfig {
    IsolationConfig {
      python: self.python.clone(),
      engine: self.engine.clone(),
      components_path: Some(self.components_dir.clone()).filter(|dir| dir.is_dir()),
      core_locations: self.core_locations.clone(),
      frozen_requirements: self.frozen_requirements.clone(),
      env_file: self.env_file.clone(),
      user_id: self.user_id.clone(),
      timeout: Duration::from_secs(self.timeout),
    }
  }
}
