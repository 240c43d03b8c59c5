use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::component::Component;
use crate::error::RegistryError;
use crate::manifest::ComponentManifest;

/// How a component class is executed.
#[derive(Clone)]
pub enum ComponentKind {
  /// Compiled into the engine.
  Native(Arc<dyn Component>),
  /// Python source, run through a script runner.
  Scripted { source: String },
  /// Runs an embedded workflow.
  Subworkflow,
}

impl fmt::Debug for ComponentKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ComponentKind::Native(_) => f.write_str("Native"),
      ComponentKind::Scripted { source } => f
        .debug_struct("Scripted")
        .field("bytes", &source.len())
        .finish(),
      ComponentKind::Subworkflow => f.write_str("Subworkflow"),
    }
  }
}

/// A resolved component class ready for use.
#[derive(Debug, Clone)]
pub struct RegisteredComponent {
  /// The component manifest.
  pub manifest: ComponentManifest,

  pub kind: ComponentKind,

  /// Directory the component was loaded from, for filesystem components.
  pub module_path: Option<PathBuf>,
}

impl RegisteredComponent {
  pub fn native(manifest: ComponentManifest, component: impl Component + 'static) -> Self {
    Self {
      manifest,
      kind: ComponentKind::Native(Arc::new(component)),
      module_path: None,
    }
  }

  pub fn scripted(manifest: ComponentManifest, source: impl Into<String>) -> Self {
    Self {
      manifest,
      kind: ComponentKind::Scripted {
        source: source.into(),
      },
      module_path: None,
    }
  }

  pub fn class_name(&self) -> &str {
    &self.manifest.class_name
  }

  pub fn is_subworkflow(&self) -> bool {
    matches!(self.kind, ComponentKind::Subworkflow)
  }
}

/// Lookup of component classes by class name.
#[async_trait]
pub trait ComponentRegistry: Send + Sync {
  /// Get a component class by its class name.
  async fn get(&self, class_name: &str) -> Result<Option<RegisteredComponent>, RegistryError>;

  /// List all known component classes.
  async fn list(&self) -> Result<Vec<ComponentManifest>, RegistryError>;

  /// Known class names, sorted.
  async fn class_names(&self) -> Result<Vec<String>, RegistryError> {
    let mut names: Vec<String> = self
      .list()
      .await?
      .into_iter()
      .map(|m| m.class_name)
      .collect();
    names.sort();
    names.dedup();
    Ok(names)
  }
}

/// Registry held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
  components: HashMap<String, RegisteredComponent>,
}

impl InMemoryRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry pre-populated with the builtin components.
  pub fn with_builtins() -> Self {
    let mut registry = Self::new();
    for component in crate::builtins::builtin_components() {
      registry.components.insert(component.class_name().to_string(), component);
    }
    registry
  }

  pub fn register(&mut self, component: RegisteredComponent) -> Result<(), RegistryError> {
    let class_name = component.class_name().to_string();
    if self.components.contains_key(&class_name) {
      return Err(RegistryError::AlreadyRegistered { class_name });
    }
    self.components.insert(class_name, component);
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.components.len()
  }

  pub fn is_empty(&self) -> bool {
    self.components.is_empty()
  }
}

#[async_trait]
impl ComponentRegistry for InMemoryRegistry {
  async fn get(&self, class_name: &str) -> Result<Option<RegisteredComponent>, RegistryError> {
    Ok(self.components.get(class_name).cloned())
  }

  async fn list(&self) -> Result<Vec<ComponentManifest>, RegistryError> {
    Ok(self.components.values().map(|c| c.manifest.clone()).collect())
  }
}

/// Registries consulted in order. The first match wins.
#[derive(Clone, Default)]
pub struct LayeredRegistry {
  layers: Vec<Arc<dyn ComponentRegistry>>,
}

impl LayeredRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_layer(mut self, registry: Arc<dyn ComponentRegistry>) -> Self {
    self.layers.push(registry);
    self
  }
}

#[async_trait]
impl ComponentRegistry for LayeredRegistry {
  async fn get(&self, class_name: &str) -> Result<Option<RegisteredComponent>, RegistryError> {
    for layer in &self.layers {
      if let Some(found) = layer.get(class_name).await? {
        return Ok(Some(found));
      }
    }
    Ok(None)
  }

  async fn list(&self) -> Result<Vec<ComponentManifest>, RegistryError> {
    let mut manifests = Vec::new();
    for layer in &self.layers {
      manifests.extend(layer.list().await?);
    }
    Ok(manifests)
  }
}
