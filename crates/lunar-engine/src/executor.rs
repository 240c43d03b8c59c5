//! Where a run happens.
//!
//! [`InProcessExecutor`] drives the scheduler in this process.
//! [`IsolatedExecutor`] prepares a virtual environment, installs what the
//! run needs and launches the engine inside it, reading the results back
//! from the child's framed stdout line.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use lunar_component_registry::ComponentRegistry;
use lunar_config::{ComponentModel, ResultSet, WorkflowModel};
use lunar_isolation::{Frame, IsolationConfig, Venv, run_isolated};
use lunar_runtime::Scheduler;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::dependencies::collect_requirements;
use crate::error::EngineError;

/// Runs workflows and standalone components.
#[async_trait]
pub trait Executor: Send + Sync {
  async fn run_workflow(
    &self,
    workflow: WorkflowModel,
    cancel: CancellationToken,
  ) -> Result<ResultSet, EngineError>;

  async fn run_component(
    &self,
    component: ComponentModel,
    cancel: CancellationToken,
  ) -> Result<ResultSet, EngineError>;
}

pub struct InProcessExecutor {
  scheduler: Scheduler,
}

impl InProcessExecutor {
  pub fn new(scheduler: Scheduler) -> Self {
    Self { scheduler }
  }

  pub fn scheduler(&self) -> &Scheduler {
    &self.scheduler
  }
}

#[async_trait]
impl Executor for InProcessExecutor {
  async fn run_workflow(
    &self,
    workflow: WorkflowModel,
    cancel: CancellationToken,
  ) -> Result<ResultSet, EngineError> {
    tokio::select! {
      results = self.scheduler.run(workflow) => Ok(results),
      _ = cancel.cancelled() => Err(EngineError::Cancelled),
    }
  }

  async fn run_component(
    &self,
    component: ComponentModel,
    cancel: CancellationToken,
  ) -> Result<ResultSet, EngineError> {
    tokio::select! {
      results = self.scheduler.run_component(component) => Ok(results),
      _ = cancel.cancelled() => Err(EngineError::Cancelled),
    }
  }
}

pub struct IsolatedExecutor {
  config: IsolationConfig,
  registry: Arc<dyn ComponentRegistry>,
  venv: PathBuf,
}

impl IsolatedExecutor {
  pub fn new(config: IsolationConfig, registry: Arc<dyn ComponentRegistry>, venv: impl Into<PathBuf>) -> Self {
    Self {
      config,
      registry,
      venv: venv.into(),
    }
  }

  pub fn venv(&self) -> &std::path::Path {
    &self.venv
  }

  /// Launch `document` in the venv. The child is killed after `timeout`
  /// seconds or the configured limit, whichever comes first.
  #[instrument(name = "isolated_launch", skip_all, fields(venv = %self.venv.display(), frame = ?frame, timeout))]
  async fn launch<T: Serialize + Sync>(
    &self,
    document: &T,
    components: &[ComponentModel],
    frame: Frame,
    timeout: u64,
    cancel: CancellationToken,
  ) -> Result<ResultSet, EngineError> {
    let venv = Venv::ensure(&self.venv, &self.config.python).await?;
    let requirements = collect_requirements(components, self.registry.as_ref()).await?;
    let installed = venv
      .install_requirements(&requirements, &self.config.frozen_requirements)
      .await?;
    info!(requested = requirements.len(), installed = installed.len(), "venv_ready");

    let file = tempfile::Builder::new()
      .prefix("lunar-")
      .suffix(".json")
      .tempfile()?;
    let content = serde_json::to_vec(document).map_err(|source| EngineError::Json {
      path: file.path().to_path_buf(),
      source,
    })?;
    tokio::fs::write(file.path(), content).await?;

    let config = self.config.bounded_by(timeout);
    let results = run_isolated(&config, &venv, file.path(), frame, cancel).await?;
    Ok(results)
  }
}

#[async_trait]
impl Executor for IsolatedExecutor {
  async fn run_workflow(
    &self,
    workflow: WorkflowModel,
    cancel: CancellationToken,
  ) -> Result<ResultSet, EngineError> {
    self
      .launch(
        &workflow,
        &workflow.components,
        Frame::Workflow,
        workflow.timeout,
        cancel,
      )
      .await
  }

  async fn run_component(
    &self,
    component: ComponentModel,
    cancel: CancellationToken,
  ) -> Result<ResultSet, EngineError> {
    self
      .launch(
        &component,
        std::slice::from_ref(&component),
        Frame::Component,
        component.timeout,
        cancel,
      )
      .await
  }
}
