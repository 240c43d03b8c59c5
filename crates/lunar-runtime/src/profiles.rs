//! Datasource and LLM connection profiles, and user file lookup.
//!
//! Components reference a profile by id through the reserved `datasource` and
//! `llm` configuration keys. The wrapper swaps the reference for the profile's
//! connection attributes before the component runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

pub const PROFILES_FILE: &str = "profiles.json";

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
  #[error("No {kind} profile with id {id}!")]
  Unknown { kind: ProfileKind, id: String },

  #[error("File {path} not found!")]
  FileNotFound { path: String },

  #[error("Failed to read profiles from {path}: {message}")]
  Load { path: PathBuf, message: String },
}

/// The reserved configuration keys that reference a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileKind {
  Datasource,
  Llm,
}

impl ProfileKind {
  pub const ALL: [ProfileKind; 2] = [ProfileKind::Datasource, ProfileKind::Llm];

  /// The configuration key holding the profile id.
  pub fn config_key(&self) -> &'static str {
    match self {
      ProfileKind::Datasource => "datasource",
      ProfileKind::Llm => "llm",
    }
  }
}

impl std::fmt::Display for ProfileKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.config_key())
  }
}

/// A stored connection profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default, rename = "type")]
  pub profile_type: String,
  #[serde(default)]
  pub connection_attributes: Map<String, Value>,
}

impl Profile {
  pub fn new(id: impl Into<String>, connection_attributes: Map<String, Value>) -> Self {
    Self {
      id: id.into(),
      name: String::new(),
      profile_type: String::new(),
      connection_attributes,
    }
  }
}

/// Source of profiles and user files for component runs.
pub trait ProfileStore: Send + Sync {
  fn profile(&self, kind: ProfileKind, id: &str) -> Result<Option<Profile>, ProfileError>;

  /// Turn a path into a FILE value (`{"path", "name", "type", "size"}`).
  fn resolve_file(&self, path: &str) -> Result<Value, ProfileError>;
}

#[derive(Debug, Default, Deserialize)]
struct ProfilesDocument {
  #[serde(default)]
  datasources: Vec<Profile>,
  #[serde(default)]
  llms: Vec<Profile>,
}

/// Profiles held in memory, optionally loaded from a `profiles.json` of the
/// shape `{"datasources": [...], "llms": [...]}`.
#[derive(Debug, Clone, Default)]
pub struct JsonProfileStore {
  profiles: HashMap<(ProfileKind, String), Profile>,
  files_root: Option<PathBuf>,
}

impl JsonProfileStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Load profiles from `path`. A missing file is an empty store.
  pub fn open(path: &Path) -> Result<Self, ProfileError> {
    let load_error = |message: String| ProfileError::Load {
      path: path.to_path_buf(),
      message,
    };

    let document: ProfilesDocument = match std::fs::read_to_string(path) {
      Ok(content) => serde_json::from_str(&content).map_err(|e| load_error(e.to_string()))?,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "profiles_missing");
        ProfilesDocument::default()
      }
      Err(e) => return Err(load_error(e.to_string())),
    };

    let mut store = Self::new();
    for profile in document.datasources {
      store = store.with_profile(ProfileKind::Datasource, profile);
    }
    for profile in document.llms {
      store = store.with_profile(ProfileKind::Llm, profile);
    }
    Ok(store)
  }

  pub fn with_profile(mut self, kind: ProfileKind, profile: Profile) -> Self {
    self.profiles.insert((kind, profile.id.clone()), profile);
    self
  }

  /// Relative file paths are resolved against this directory.
  pub fn with_files_root(mut self, root: impl Into<PathBuf>) -> Self {
    self.files_root = Some(root.into());
    self
  }

  pub fn len(&self) -> usize {
    self.profiles.len()
  }

  pub fn is_empty(&self) -> bool {
    self.profiles.is_empty()
  }
}

impl ProfileStore for JsonProfileStore {
  fn profile(&self, kind: ProfileKind, id: &str) -> Result<Option<Profile>, ProfileError> {
    Ok(self.profiles.get(&(kind, id.to_string())).cloned())
  }

  fn resolve_file(&self, path: &str) -> Result<Value, ProfileError> {
    let candidate = Path::new(path);
    let resolved = match &self.files_root {
      Some(root) if candidate.is_relative() => root.join(candidate),
      _ => candidate.to_path_buf(),
    };

    let metadata = std::fs::metadata(&resolved).map_err(|_| ProfileError::FileNotFound {
      path: path.to_string(),
    })?;
    if !metadata.is_file() {
      return Err(ProfileError::FileNotFound {
        path: path.to_string(),
      });
    }

    let name = resolved
      .file_name()
      .map(|n| n.to_string_lossy().into_owned());
    let extension = resolved
      .extension()
      .map(|e| e.to_string_lossy().into_owned());
    Ok(json!({
      "path": resolved.display().to_string(),
      "name": name,
      "type": extension,
      "size": metadata.len(),
    }))
  }
}
