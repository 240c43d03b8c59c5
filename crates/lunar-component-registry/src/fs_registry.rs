use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::warn;

use crate::error::RegistryError;
use crate::manifest::ComponentManifest;
use crate::registry::{ComponentKind, ComponentRegistry, RegisteredComponent};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const SOURCE_FILE: &str = "component.py";

/// Filesystem-based registry of scripted components.
///
/// Components are stored in a directory structure:
/// ```text
/// {root}/
/// └── summarizer/
///     ├── manifest.json
///     └── component.py
/// ```
pub struct FsComponentRegistry {
  root: PathBuf,
}

impl FsComponentRegistry {
  /// Create a new filesystem registry at the given root path.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// Get the root directory of the registry.
  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Read the manifest from a component directory.
  async fn read_manifest(&self, component_dir: &Path) -> Result<ComponentManifest, RegistryError> {
    let content = fs::read_to_string(component_dir.join(MANIFEST_FILE)).await?;
    let manifest: ComponentManifest = serde_json::from_str(&content)?;
    Ok(manifest)
  }

  /// Build a RegisteredComponent from a component directory.
  async fn load_component(
    &self,
    component_dir: PathBuf,
    manifest: ComponentManifest,
  ) -> Result<RegisteredComponent, RegistryError> {
    let source = fs::read_to_string(component_dir.join(SOURCE_FILE)).await?;
    Ok(RegisteredComponent {
      manifest,
      kind: ComponentKind::Scripted { source },
      module_path: Some(component_dir),
    })
  }

  /// Every component directory with a readable manifest.
  async fn scan(&self) -> Result<Vec<(PathBuf, ComponentManifest)>, RegistryError> {
    let mut found = Vec::new();

    if !self.root.exists() {
      return Ok(found);
    }

    let mut entries = fs::read_dir(&self.root).await?;
    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      if !path.is_dir() {
        continue;
      }
      match self.read_manifest(&path).await {
        Ok(manifest) => found.push((path, manifest)),
        Err(e) => warn!(path = %path.display(), error = %e, "component_manifest_skipped"),
      }
    }

    found.sort_by(|a, b| a.1.class_name.cmp(&b.1.class_name));
    Ok(found)
  }
}

#[async_trait]
impl ComponentRegistry for FsComponentRegistry {
  async fn get(&self, class_name: &str) -> Result<Option<RegisteredComponent>, RegistryError> {
    for (path, manifest) in self.scan().await? {
      if manifest.class_name == class_name {
        return Ok(Some(self.load_component(path, manifest).await?));
      }
    }
    Ok(None)
  }

  async fn list(&self) -> Result<Vec<ComponentManifest>, RegistryError> {
    Ok(self.scan().await?.into_iter().map(|(_, m)| m).collect())
  }
}
