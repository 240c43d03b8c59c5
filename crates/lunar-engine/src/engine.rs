use std::path::{Path, PathBuf};
use std::sync::Arc;

use lunar_component_registry::{
  ComponentRegistry, FsComponentRegistry, InMemoryRegistry, LayeredRegistry, ScriptRunner,
};
use lunar_config::{ComponentModel, ResultSet, WorkflowModel};
use lunar_isolation::{Frame, PythonScriptRunner, Venv, compose};
use lunar_runtime::{ExecutionNotifier, JsonProfileStore, ProfileStore, Scheduler};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::executor::{Executor, InProcessExecutor, IsolatedExecutor};

/// What a document on disk describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunTarget {
  Workflow,
  Component,
}

impl RunTarget {
  pub fn frame(&self) -> Frame {
    match self {
      RunTarget::Workflow => Frame::Workflow,
      RunTarget::Component => Frame::Component,
    }
  }
}

/// Entry point for running workflow and component documents.
///
/// Builtin components are always available; scripted components are looked
/// up in the configured components directory.
pub struct Engine {
  config: EngineConfig,
  registry: Arc<dyn ComponentRegistry>,
  scheduler: Scheduler,
}

impl Engine {
  pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
    let registry: Arc<dyn ComponentRegistry> = Arc::new(
      LayeredRegistry::new()
        .with_layer(Arc::new(InMemoryRegistry::with_builtins()))
        .with_layer(Arc::new(FsComponentRegistry::new(&config.components_dir))),
    );
    let profiles: Arc<dyn ProfileStore> = Arc::new(
      JsonProfileStore::open(&config.profiles_path)?.with_files_root(config.data_dir.join("files")),
    );
    let scripts = Arc::new(PythonScriptRunner::new(&config.python));

    let scheduler = Scheduler::new(registry.clone())
      .with_profiles(profiles)
      .with_scripts(scripts);
    Ok(Self {
      config,
      registry,
      scheduler,
    })
  }

  /// An engine over an explicit registry and scheduler.
  pub fn with_scheduler(config: EngineConfig, scheduler: Scheduler) -> Self {
    Self {
      config,
      registry: scheduler.registry().clone(),
      scheduler,
    }
  }

  pub fn with_scripts(mut self, scripts: Arc<dyn ScriptRunner>) -> Self {
    self.scheduler = self.scheduler.with_scripts(scripts);
    self
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.scheduler = self.scheduler.with_notifier(notifier);
    self
  }

  /// Run Python through the interpreter of an existing venv. This is how
  /// the engine behaves when launched by an isolated run.
  pub fn inside_venv(self, venv: &Path) -> Result<Self, EngineError> {
    let venv = Venv::open(venv)?;
    let runner = PythonScriptRunner::from_venv(&self.config.isolation_config(), &venv);
    Ok(self.with_scripts(Arc::new(runner)))
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn registry(&self) -> &Arc<dyn ComponentRegistry> {
    &self.registry
  }

  pub fn in_process(&self) -> InProcessExecutor {
    InProcessExecutor::new(self.scheduler.clone())
  }

  /// An executor launching into `venv`, or the configured default venv.
  pub fn isolated(&self, venv: Option<PathBuf>) -> IsolatedExecutor {
    IsolatedExecutor::new(
      self.config.isolation_config(),
      self.registry.clone(),
      venv.unwrap_or_else(|| self.config.default_venv.clone()),
    )
  }

  /// Load the document at `path` and run it.
  #[instrument(name = "engine_run", skip(self, executor, cancel), fields(path = %path.display()))]
  pub async fn run_file(
    &self,
    path: &Path,
    target: RunTarget,
    executor: &dyn Executor,
    cancel: CancellationToken,
  ) -> Result<ResultSet, EngineError> {
    let results = match target {
      RunTarget::Workflow => {
        let workflow = load_workflow(path).await?;
        info!(workflow_id = %workflow.id, components = workflow.components.len(), "workflow_loaded");
        executor.run_workflow(workflow, cancel).await?
      }
      RunTarget::Component => {
        let component = load_component(path).await?;
        info!(label = %component.label, class_name = %component.class_name, "component_loaded");
        executor.run_component(component, cancel).await?
      }
    };
    Ok(results)
  }
}

pub async fn load_workflow(path: &Path) -> Result<WorkflowModel, EngineError> {
  Ok(WorkflowModel::from_value(read_document(path).await?)?)
}

pub async fn load_component(path: &Path) -> Result<ComponentModel, EngineError> {
  Ok(ComponentModel::from_value(read_document(path).await?)?)
}

/// The single framed stdout line reporting `results`.
pub fn compose_output(target: RunTarget, results: &ResultSet) -> Result<String, EngineError> {
  Ok(compose(target.frame(), results)?)
}

async fn read_document(path: &Path) -> Result<Value, EngineError> {
  if !path.is_file() {
    return Err(EngineError::NotFound {
      path: path.to_path_buf(),
    });
  }
  let content = tokio::fs::read_to_string(path)
    .await
    .map_err(|source| EngineError::Read {
      path: path.to_path_buf(),
      source,
    })?;
  serde_json::from_str(&content).map_err(|source| EngineError::Json {
    path: path.to_path_buf(),
    source,
  })
}
