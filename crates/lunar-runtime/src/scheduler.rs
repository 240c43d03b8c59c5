//! DAG scheduler.
//!
//! Components are visited from a FIFO worklist in display order. A component
//! whose predecessors have not been scheduled yet goes back to the end of the
//! list. Once scheduled, every component owns a shared future resolving to
//! its executed model or an error message, and successors await those futures
//! to wire their inputs. Executions run on tokio's blocking pool, so
//! independent branches run in parallel while the worklist loop stays
//! sequential.
//!
//! Failures never abort the run: a failed component's successors fail
//! without running and every label ends up with an [`Outcome`]. Once the
//! workflow's `timeout` passes, every unfinished component fails with
//! [`ComponentError::WorkflowTimeout`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use lunar_component_registry::{ComponentRegistry, ScriptRunner};
use lunar_config::{ComponentModel, ConfigError, DataType, Outcome, ResultSet, WorkflowModel};
use lunar_workflow::{Dag, WorkflowGraph};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::cache::ResultCache;
use crate::error::ComponentError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::profiles::{JsonProfileStore, ProfileStore};
use crate::promise::{StreamFold, TaskPromise, consume};
use crate::wiring::update_inputs;
use crate::wrapper::ComponentWrapper;

/// An executed model, or the message of the error that stopped it.
pub type NodeOutcome = Result<ComponentModel, String>;

type NodeFuture = Shared<BoxFuture<'static, NodeOutcome>>;

/// When a workflow run gives up waiting on its components.
struct Deadline {
  at: Option<Instant>,
  expired: String,
}

impl Deadline {
  /// A zero workflow timeout never expires.
  fn new(workflow: &WorkflowModel) -> Self {
    let at = (workflow.timeout > 0).then(|| Instant::now() + Duration::from_secs(workflow.timeout));
    let expired = ComponentError::WorkflowTimeout {
      name: workflow.name.clone(),
      seconds: workflow.timeout,
    }
    .to_string();
    Self { at, expired }
  }

  async fn settle(&self, future: NodeFuture) -> NodeOutcome {
    match self.at {
      Some(at) => tokio::time::timeout_at(at, future)
        .await
        .unwrap_or_else(|_| Err(self.expired.clone())),
      None => future.await,
    }
  }
}

enum Slot {
  Running(NodeFuture),
  Promise(TaskPromise),
}

/// Runs workflows against a component registry.
///
/// Cheap to clone; clones share the result cache and notifier.
#[derive(Clone)]
pub struct Scheduler {
  registry: Arc<dyn ComponentRegistry>,
  profiles: Arc<dyn ProfileStore>,
  scripts: Option<Arc<dyn ScriptRunner>>,
  notifier: Arc<dyn ExecutionNotifier>,
  cache: ResultCache,
  stream_fold: StreamFold,
}

impl Scheduler {
  pub fn new(registry: Arc<dyn ComponentRegistry>) -> Self {
    Self {
      registry,
      profiles: Arc::new(JsonProfileStore::new()),
      scripts: None,
      notifier: Arc::new(NoopNotifier),
      cache: ResultCache::new(),
      stream_fold: StreamFold::default(),
    }
  }

  pub fn with_profiles(mut self, profiles: Arc<dyn ProfileStore>) -> Self {
    self.profiles = profiles;
    self
  }

  pub fn with_scripts(mut self, scripts: Arc<dyn ScriptRunner>) -> Self {
    self.scripts = Some(scripts);
    self
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn with_cache(mut self, cache: ResultCache) -> Self {
    self.cache = cache;
    self
  }

  pub fn with_stream_fold(mut self, fold: StreamFold) -> Self {
    self.stream_fold = fold;
    self
  }

  pub fn registry(&self) -> &Arc<dyn ComponentRegistry> {
    &self.registry
  }

  pub fn cache(&self) -> &ResultCache {
    &self.cache
  }

  /// Run every component of `workflow`. Always completes with one outcome
  /// per component label.
  pub fn run(&self, workflow: WorkflowModel) -> BoxFuture<'static, ResultSet> {
    let scheduler = self.clone();
    async move { scheduler.execute(workflow).await }.boxed()
  }

  /// Run a single component outside any workflow.
  ///
  /// A sub-workflow component yields its embedded workflow's terminal
  /// output. Errors are reported under the component's label.
  #[instrument(name = "component_standalone", skip_all, fields(label = %model.label))]
  pub async fn run_component(&self, model: ComponentModel) -> ResultSet {
    let label = model.label.clone();
    let outcome = async {
      let wrapper = self.wrap(model).await?;
      if wrapper.is_subworkflow() {
        return self.clone().run_subworkflow(wrapper).await;
      }
      let seconds = wrapper.model().timeout;
      let mut wrapper = wrapper;
      let task = tokio::task::spawn_blocking(move || wrapper.run_in_workflow());
      bounded(&label, seconds, task).await
    }
    .await;

    let mut results = ResultSet::new();
    match outcome {
      Ok(model) => results.insert(label, Outcome::Completed(Box::new(model))),
      Err(e) => {
        warn!(label = %label, error = %e, "component_failed");
        results.insert(label, Outcome::Failed(e.to_string()));
      }
    }
    results
  }

  #[instrument(
    name = "workflow_run",
    skip_all,
    fields(workflow_id = %workflow.id, name = %workflow.name)
  )]
  async fn execute(self, mut workflow: WorkflowModel) -> ResultSet {
    let execution_id = uuid::Uuid::new_v4().to_string();
    let deadline = Deadline::new(&workflow);
    workflow.validate();
    for error in &workflow.invalid_errors {
      warn!(error = %error, "workflow_invalid");
    }

    info!(
      execution_id = %execution_id,
      components = workflow.components.len(),
      "workflow_started"
    );
    self.notifier.notify(ExecutionEvent::WorkflowStarted {
      execution_id: execution_id.clone(),
      workflow_id: workflow.id.clone(),
    });

    let dag = workflow.get_dag();
    let mut order: Vec<String> = workflow
      .components_ordered()
      .into_iter()
      .map(|c| c.label.clone())
      .collect();
    for component in &workflow.components {
      if !order.contains(&component.label) {
        order.push(component.label.clone());
      }
    }
    let models: HashMap<String, ComponentModel> = workflow
      .components
      .into_iter()
      .map(|c| (c.label.clone(), c))
      .collect();

    let mut worklist: VecDeque<String> = order.iter().cloned().collect();
    let mut slots: HashMap<String, Slot> = HashMap::new();
    let mut idle = 0usize;

    while let Some(label) = worklist.pop_front() {
      let waiting = dag
        .predecessors(&label)
        .into_iter()
        .any(|p| models.contains_key(p) && !slots.contains_key(p));
      if waiting {
        worklist.push_back(label);
        idle += 1;
        if idle >= worklist.len() {
          // a full pass without progress: only cycles remain
          for label in worklist.drain(..) {
            let error = ComponentError::Unschedulable {
              label: label.clone(),
            };
            let slot = self.failed(&execution_id, &label, error);
            slots.insert(label, slot);
          }
        }
        continue;
      }
      idle = 0;

      let Some(model) = models.get(&label).cloned() else {
        continue;
      };
      let slot = self
        .schedule(&execution_id, &label, model, &dag, &slots, &deadline)
        .await;
      slots.insert(label, slot);
    }

    let mut results = ResultSet::new();
    let mut failed = 0usize;
    for label in order {
      let outcome = match slots.remove(&label) {
        Some(Slot::Promise(promise)) => Ok(promise.model().clone()),
        Some(Slot::Running(future)) => deadline.settle(future).await,
        None => Err(ComponentError::Upstream.to_string()),
      };
      match outcome {
        Ok(model) => results.insert(label, Outcome::Completed(Box::new(model))),
        Err(message) => {
          failed += 1;
          results.insert(label, Outcome::Failed(message));
        }
      }
    }

    info!(execution_id = %execution_id, failed, "workflow_completed");
    self.notifier.notify(ExecutionEvent::WorkflowCompleted {
      execution_id,
      failed,
    });
    results
  }

  /// Wire a ready component's inputs and start it.
  async fn schedule(
    &self,
    execution_id: &str,
    label: &str,
    mut model: ComponentModel,
    dag: &Dag,
    slots: &HashMap<String, Slot>,
    deadline: &Deadline,
  ) -> Slot {
    let mut promises: Vec<(String, TaskPromise)> = Vec::new();
    for edge in dag.in_edges(label) {
      match slots.get(&edge.source) {
        Some(Slot::Promise(promise)) => promises.push((edge.link_key(), promise.clone())),
        Some(Slot::Running(future)) => match deadline.settle(future.clone()).await {
          Ok(upstream) => {
            if let Err(e) = update_inputs(
              &mut model,
              &upstream,
              &edge.source,
              &edge.input_key,
              edge.template_key.as_deref(),
            ) {
              return self.failed(execution_id, label, e.into());
            }
          }
          Err(_) => return self.failed(execution_id, label, ComponentError::Upstream),
        },
        None => return self.failed(execution_id, label, ComponentError::Upstream),
      }
    }

    let wrapper = match self.wrap(model).await {
      Ok(wrapper) => wrapper,
      Err(e) => return self.failed(execution_id, label, e),
    };

    if wrapper.is_subworkflow() {
      let scheduler = self.clone();
      return self.track(execution_id, label, scheduler.run_subworkflow(wrapper));
    }

    if !promises.is_empty() {
      let fold = self.stream_fold;
      let seconds = wrapper.model().timeout;
      let owned_label = label.to_string();
      let run = async move {
        let task = tokio::task::spawn_blocking(move || consume(wrapper, &promises, fold));
        bounded(&owned_label, seconds, task).await
      };
      return self.track(execution_id, label, run);
    }

    if wrapper.model().output.data_type == DataType::Stream && dag.out_degree(label) > 0 {
      info!(label, "component_deferred");
      self.notifier.notify(ExecutionEvent::ComponentDeferred {
        execution_id: execution_id.to_string(),
        label: label.to_string(),
      });
      return Slot::Promise(TaskPromise::new(wrapper));
    }

    self.spawn_ordinary(execution_id, wrapper)
  }

  async fn wrap(&self, model: ComponentModel) -> Result<ComponentWrapper, ComponentError> {
    let wrapper = ComponentWrapper::new(model, self.registry.as_ref(), self.profiles.clone()).await?;
    Ok(match &self.scripts {
      Some(scripts) => wrapper.with_scripts(scripts.clone()),
      None => wrapper,
    })
  }

  /// Run through the result cache on the blocking pool.
  fn spawn_ordinary(&self, execution_id: &str, mut wrapper: ComponentWrapper) -> Slot {
    let label = wrapper.label().to_string();
    let key = wrapper.cache_key();

    if !wrapper.disable_cache()
      && let Some(cached) = self.cache.get(&key)
    {
      info!(label = %label, "component_cached");
      self.notifier.notify(ExecutionEvent::ComponentCached {
        execution_id: execution_id.to_string(),
        label,
      });
      return Slot::Running(futures::future::ready(Ok(cached)).boxed().shared());
    }

    let cache = self.cache.clone();
    let seconds = wrapper.model().timeout;
    let owned_label = label.clone();
    let run = async move {
      let task = tokio::task::spawn_blocking(move || wrapper.run_in_workflow());
      let model = bounded(&owned_label, seconds, task).await?;
      cache.insert(key, model.clone());
      Ok(model)
    };
    self.track(execution_id, &label, run)
  }

  /// Spawn `run` and report how it ends.
  fn track(
    &self,
    execution_id: &str,
    label: &str,
    run: impl Future<Output = Result<ComponentModel, ComponentError>> + Send + 'static,
  ) -> Slot {
    info!(label, "component_started");
    self.notifier.notify(ExecutionEvent::ComponentStarted {
      execution_id: execution_id.to_string(),
      label: label.to_string(),
    });

    let notifier = self.notifier.clone();
    let execution_id = execution_id.to_string();
    let owned_label = label.to_string();
    let handle = tokio::spawn(async move {
      match run.await {
        Ok(model) => {
          info!(label = %owned_label, "component_completed");
          notifier.notify(ExecutionEvent::ComponentCompleted {
            execution_id,
            label: owned_label,
            output: model.output.value.or_null(),
          });
          Ok(model)
        }
        Err(e) => {
          let message = e.to_string();
          warn!(label = %owned_label, error = %message, "component_failed");
          notifier.notify(ExecutionEvent::ComponentFailed {
            execution_id,
            label: owned_label,
            error: message.clone(),
          });
          Err(message)
        }
      }
    });

    let label = label.to_string();
    Slot::Running(
      async move {
        handle.await.unwrap_or_else(|e| {
          Err(
            ComponentError::Aborted {
              label,
              message: e.to_string(),
            }
            .to_string(),
          )
        })
      }
      .boxed()
      .shared(),
    )
  }

  fn failed(&self, execution_id: &str, label: &str, error: ComponentError) -> Slot {
    let message = error.to_string();
    warn!(label, error = %message, "component_failed");
    self.notifier.notify(ExecutionEvent::ComponentFailed {
      execution_id: execution_id.to_string(),
      label: label.to_string(),
      error: message.clone(),
    });
    Slot::Running(futures::future::ready(Err(message)).boxed().shared())
  }

  /// Run the workflow embedded in a sub-workflow component.
  #[instrument(name = "subworkflow_run", skip_all, fields(label = %wrapper.label()))]
  async fn run_subworkflow(self, wrapper: ComponentWrapper) -> Result<ComponentModel, ComponentError> {
    let mut outer = wrapper.into_model();
    let label = outer.label.clone();

    let document = outer
      .inputs
      .iter()
      .find(|input| input.key.eq_ignore_ascii_case("workflow"))
      .ok_or_else(|| ComponentError::MissingWorkflow {
        label: label.clone(),
      })?
      .value
      .or_null();
    let document = match document {
      Value::String(text) if text.trim().is_empty() => Value::Null,
      Value::String(text) => serde_json::from_str(&text).map_err(ConfigError::from)?,
      other => other,
    };
    if document.is_null() {
      return Err(ComponentError::EmptyWorkflow);
    }

    let mut inner = WorkflowModel::from_value(document)?;
    if inner.components.is_empty() {
      return Err(ComponentError::EmptyWorkflow);
    }

    for input in &outer.inputs {
      if input.key.eq_ignore_ascii_case("workflow") {
        continue;
      }
      let Some(component_id) = &input.component_id else {
        continue;
      };
      if let Some(target) = inner.components.iter_mut().find(|c| &c.id == component_id)
        && let Some(slot) = target.get_input_mut(&input.key)
      {
        slot.value = input.value.clone();
        if !input.template_variables.is_empty() {
          slot.template_variables = input.template_variables.clone();
        }
      }
    }

    // outputs are dependency targets that never feed anything; unlinked
    // components do not count
    let sources: HashSet<&str> = inner
      .dependencies
      .iter()
      .map(|dep| dep.source_label.as_str())
      .collect();
    let mut sinks: Vec<String> = Vec::new();
    for dep in &inner.dependencies {
      if !sources.contains(dep.target_label.as_str()) && !sinks.contains(&dep.target_label) {
        sinks.push(dep.target_label.clone());
      }
    }
    if sinks.len() > 1 {
      return Err(ComponentError::MultipleOutputs { label, sinks });
    }

    let results = self.run(inner).await;
    let mut first_error: Option<String> = None;
    for (_, outcome) in results.iter() {
      match outcome {
        Outcome::Completed(model) if model.is_terminal => {
          outer.output.set_value(model.output.value.or_null())?;
          return Ok(outer);
        }
        Outcome::Failed(message) if first_error.is_none() => {
          first_error = Some(message.clone());
        }
        _ => {}
      }
    }

    Err(match first_error {
      Some(message) => ComponentError::SubworkflowFailed { label, message },
      None => ComponentError::SubworkflowNoOutput { label },
    })
  }
}

/// Await a blocking execution, bounded by `seconds` (0 means unbounded).
///
/// On expiry the blocking task is detached and keeps running.
async fn bounded(
  label: &str,
  seconds: u64,
  task: JoinHandle<Result<ComponentModel, ComponentError>>,
) -> Result<ComponentModel, ComponentError> {
  let joined = if seconds == 0 {
    task.await
  } else {
    match tokio::time::timeout(Duration::from_secs(seconds), task).await {
      Ok(joined) => joined,
      Err(_) => {
        return Err(ComponentError::Timeout {
          label: label.to_string(),
          seconds,
        });
      }
    }
  };
  joined.map_err(|e| ComponentError::Aborted {
    label: label.to_string(),
    message: e.to_string(),
  })?
}
