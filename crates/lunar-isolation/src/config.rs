use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Settings the isolation layer needs to build and launch into a venv.
#[derive(Debug, Clone)]
pub struct IsolationConfig {
  /// Interpreter used to create new virtual environments.
  pub python: PathBuf,
  /// Engine executable launched inside the venv.
  pub engine: PathBuf,
  /// Bundled component sources, added to PYTHONPATH.
  pub components_path: Option<PathBuf>,
  /// Core package locations, first on PYTHONPATH.
  pub core_locations: Vec<PathBuf>,
  /// Normalised requirement names that must never be installed into a venv.
  pub frozen_requirements: HashSet<String>,
  /// Extra environment for the child, in dotenv format.
  pub env_file: Option<PathBuf>,
  /// Exported to the child as `LUNAR_USERID`.
  pub user_id: Option<String>,
  /// Upper bound for an isolated run.
  pub timeout: Duration,
}

impl Default for IsolationConfig {
  fn default() -> Self {
    Self {
      python: PathBuf::from("python3"),
      engine: PathBuf::from("lunar"),
      components_path: None,
      core_locations: Vec::new(),
      frozen_requirements: HashSet::new(),
      env_file: None,
      user_id: None,
      timeout: Duration::from_secs(lunar_config::DEFAULT_WORKFLOW_TIMEOUT),
    }
  }
}

impl IsolationConfig {
  /// A copy whose timeout is at most `seconds`. Zero leaves it unchanged.
  pub fn bounded_by(&self, seconds: u64) -> Self {
    let mut config = self.clone();
    if seconds > 0 {
      config.timeout = config.timeout.min(Duration::from_secs(seconds));
    }
    config
  }
}
