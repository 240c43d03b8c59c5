use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::IsolationConfig;
use crate::venv::Venv;

#[cfg(windows)]
pub const PATH_SEPARATOR: char = ';';
#[cfg(not(windows))]
pub const PATH_SEPARATOR: char = ':';

pub const USER_ID_VAR: &str = "LUNAR_USERID";

/// PYTHONPATH for a child: core locations, bundled components, venv
/// site-packages, then whatever was inherited.
pub fn python_path(
  core_locations: &[PathBuf],
  components_path: Option<&Path>,
  site_packages: Option<&Path>,
  inherited: Option<&str>,
) -> String {
  let mut parts: Vec<String> = core_locations
    .iter()
    .map(|p| p.display().to_string())
    .collect();
  parts.extend(components_path.map(|p| p.display().to_string()));
  parts.extend(site_packages.map(|p| p.display().to_string()));
  parts.push(inherited.unwrap_or_default().to_string());

  let separator = PATH_SEPARATOR.to_string();
  parts
    .join(separator.as_str())
    .trim_end_matches(PATH_SEPARATOR)
    .to_string()
}

/// Values from a dotenv file. A missing or malformed file only warns.
pub fn load_env_file(path: &Path) -> HashMap<String, String> {
  let mut values = HashMap::new();
  if !path.is_file() {
    warn!(path = %path.display(), "Environment file not found! Environment will be incomplete.");
    return values;
  }

  match dotenvy::from_path_iter(path) {
    Ok(items) => {
      for item in items {
        match item {
          Ok((key, value)) => {
            values.insert(key, value);
          }
          Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to parse environment file! Environment will be incomplete.");
            break;
          }
        }
      }
    }
    Err(e) => {
      warn!(path = %path.display(), error = %e, "Failed to parse environment file! Environment will be incomplete.");
    }
  }
  values
}

/// Full environment for a process running inside `venv`.
pub fn child_env(config: &IsolationConfig, venv: &Venv) -> HashMap<String, String> {
  let mut env: HashMap<String, String> = std::env::vars().collect();

  if let Some(path) = &config.env_file {
    env.extend(load_env_file(path));
  }
  if let Some(user_id) = &config.user_id {
    env.insert(USER_ID_VAR.to_string(), user_id.clone());
  }

  let site_packages = venv.site_packages();
  let inherited = env.get("PYTHONPATH").cloned();
  env.insert(
    "PYTHONPATH".to_string(),
    python_path(
      &config.core_locations,
      config.components_path.as_deref(),
      site_packages.as_deref(),
      inherited.as_deref(),
    ),
  );
  env
}
