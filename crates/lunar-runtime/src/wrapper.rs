//! The component wrapper.
//!
//! A [`ComponentWrapper`] pairs a component document with the implementation
//! its class name resolves to. Construction settles the configuration
//! (defaults, profiles, `force_run`, environment placeholders); running
//! resolves input values and fans out over mapped inputs.

use std::fmt;
use std::sync::Arc;

use lunar_component_registry::{
  ComponentKind, ComponentManifest, ComponentRegistry, InputContract, MappingPolicy, RunContext,
  RunError, RunOutput, ScriptMode, ScriptRequest, ScriptRunner, ValueStream,
};
use lunar_config::{ComponentModel, DataType, InputValue, first_element_matches};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use crate::env::substitute_env;
use crate::error::ComponentError;
use crate::profiles::{ProfileError, ProfileKind, ProfileStore};

pub const FORCE_RUN: &str = "force_run";

/// A component document bound to its implementation.
#[derive(Clone)]
pub struct ComponentWrapper {
  model: ComponentModel,
  manifest: ComponentManifest,
  kind: ComponentKind,
  /// Resolved configuration handed to the implementation (no `force_run`).
  configuration: Map<String, Value>,
  force_run: Value,
  disable_cache: bool,
  profiles: Arc<dyn ProfileStore>,
  scripts: Option<Arc<dyn ScriptRunner>>,
}

impl fmt::Debug for ComponentWrapper {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ComponentWrapper")
      .field("label", &self.model.label)
      .field("class_name", &self.model.class_name)
      .field("kind", &self.kind)
      .field("disable_cache", &self.disable_cache)
      .finish()
  }
}

impl ComponentWrapper {
  #[instrument(
    name = "component_wrap",
    skip_all,
    fields(label = %model.label, class_name = %model.class_name)
  )]
  pub async fn new(
    mut model: ComponentModel,
    registry: &dyn ComponentRegistry,
    profiles: Arc<dyn ProfileStore>,
  ) -> Result<Self, ComponentError> {
    let (manifest, kind) = resolve_class(&model, registry).await?;

    if !matches!(kind, ComponentKind::Subworkflow) {
      let actual: Vec<String> = model.inputs.iter().map(|i| i.key.clone()).collect();
      let expected: Vec<String> = manifest.input_keys().map(str::to_string).collect();
      if !expected.iter().all(|key| actual.contains(key)) {
        return Err(ComponentError::MissingInputs {
          label: model.label.clone(),
          expected,
          actual,
        });
      }
    }

    let mut configuration = manifest.configuration.clone();
    for (key, value) in std::mem::take(&mut model.configuration) {
      configuration.insert(key, value);
    }
    expand_profiles(&mut configuration, profiles.as_ref())?;

    let force_run = configuration.remove(FORCE_RUN).unwrap_or(Value::Bool(false));
    let disable_cache = parse_flag(&force_run);
    substitute_env(&mut configuration)?;

    model.configuration = configuration.clone();
    model
      .configuration
      .insert(FORCE_RUN.to_string(), force_run.clone());

    debug!(disable_cache, "component_wrapped");
    Ok(Self {
      model,
      manifest,
      kind,
      configuration,
      force_run,
      disable_cache,
      profiles,
      scripts: None,
    })
  }

  pub fn with_scripts(mut self, scripts: Arc<dyn ScriptRunner>) -> Self {
    self.scripts = Some(scripts);
    self
  }

  pub fn label(&self) -> &str {
    &self.model.label
  }

  pub fn model(&self) -> &ComponentModel {
    &self.model
  }

  pub fn model_mut(&mut self) -> &mut ComponentModel {
    &mut self.model
  }

  pub fn into_model(self) -> ComponentModel {
    self.model
  }

  pub fn manifest(&self) -> &ComponentManifest {
    &self.manifest
  }

  pub fn kind(&self) -> &ComponentKind {
    &self.kind
  }

  pub fn is_subworkflow(&self) -> bool {
    matches!(self.kind, ComponentKind::Subworkflow)
  }

  /// The configuration the implementation sees.
  pub fn configuration(&self) -> &Map<String, Value> {
    &self.configuration
  }

  /// `force_run` was set: skip cached results.
  pub fn disable_cache(&self) -> bool {
    self.disable_cache
  }

  /// Key over label, class, input content hashes and configuration. Unset
  /// inputs make the key unique to this call.
  pub fn cache_key(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.model.label.as_bytes());
    hasher.update([0]);
    hasher.update(self.model.class_name.as_bytes());
    hasher.update([0]);
    for input in &self.model.inputs {
      hasher.update(input.content_hash().as_bytes());
      hasher.update([0]);
    }
    hasher.update(serde_json::to_string(&self.configuration).unwrap_or_default());
    format!("{:x}", hasher.finalize())
  }

  /// Run with the current inputs and store the output in the model.
  ///
  /// Inputs mapped by their contract run the implementation once per zipped
  /// tuple; the output is then the list of per-tuple results.
  #[instrument(name = "component_run", skip(self), fields(label = %self.model.label))]
  pub fn run_in_workflow(&mut self) -> Result<ComponentModel, ComponentError> {
    let inputs = self.prepare_inputs()?;
    let mapped = self.mapped_inputs(&inputs)?;

    let output = if mapped.is_empty() {
      self.invoke_drained(inputs)?
    } else {
      let rounds = mapped.iter().map(|(_, items)| items.len()).min().unwrap_or(0);
      debug!(rounds, mapped = ?mapped.iter().map(|(k, _)| k).collect::<Vec<_>>(), "component_mapping");
      let mut results = Vec::with_capacity(rounds);
      for round in 0..rounds {
        let mut args = inputs.clone();
        for (key, items) in &mapped {
          args.insert(key.clone(), items[round].clone());
        }
        results.push(self.invoke_drained(args)?);
      }
      Value::Array(results)
    };

    self.model.output.set_value(output)?;
    self
      .model
      .configuration
      .insert(FORCE_RUN.to_string(), self.force_run.clone());
    Ok(self.model.clone())
  }

  /// Run once and hand back the produced items without collecting them.
  ///
  /// A plain list output streams its elements; any other value is a single
  /// item.
  pub fn run_stream(&self) -> Result<ValueStream, ComponentError> {
    let inputs = self.prepare_inputs()?;
    self.mapped_inputs(&inputs)?;
    match self.invoke(inputs)? {
      RunOutput::Stream(items) => Ok(items),
      RunOutput::Value(Value::Array(items)) => Ok(Box::new(items.into_iter().map(Ok))),
      RunOutput::Value(value) => Ok(Box::new(std::iter::once(Ok(value)))),
    }
  }

  /// Input values as the implementation receives them.
  fn prepare_inputs(&self) -> Result<Map<String, Value>, ComponentError> {
    let mut values = Map::new();
    for input in &self.model.inputs {
      let mut input = input.clone();
      if input.data_type == DataType::File
        && let InputValue::Value(Value::String(path)) = &input.value
      {
        input.value = InputValue::Value(self.profiles.resolve_file(path)?);
      }
      let value = input.resolve_template_variables()?.or_null();
      values.insert(input.key.clone(), value);
    }
    substitute_env(&mut values)?;
    Ok(values)
  }

  /// Inputs that fan out, with their items.
  fn mapped_inputs(
    &self,
    inputs: &Map<String, Value>,
  ) -> Result<Vec<(String, Vec<Value>)>, ComponentError> {
    let mut mapped = Vec::new();
    for (key, value) in inputs {
      let contract = self
        .manifest
        .input(key)
        .ok_or_else(|| ComponentError::UnexpectedInput { key: key.clone() })?;
      if is_mapped(contract, value)
        && let Value::Array(items) = value
      {
        mapped.push((key.clone(), items.clone()));
      }
    }
    Ok(mapped)
  }

  fn context(&self) -> RunContext {
    let ctx = RunContext::new(self.model.label.clone(), self.configuration.clone());
    match &self.scripts {
      Some(scripts) => ctx.with_scripts(scripts.clone()),
      None => ctx,
    }
  }

  fn invoke(&self, args: Map<String, Value>) -> Result<RunOutput, ComponentError> {
    let ctx = self.context();
    let wrap = |source: RunError| ComponentError::Run {
      label: self.model.label.clone(),
      source,
    };

    match &self.kind {
      ComponentKind::Native(component) => component.run(&ctx, args).map_err(wrap),
      ComponentKind::Scripted { source } => {
        let scripts = self
          .scripts
          .as_ref()
          .ok_or_else(|| ComponentError::NoScriptRunner {
            label: self.model.label.clone(),
          })?;
        scripts
          .run_script(ScriptRequest {
            label: &self.model.label,
            source,
            mode: ScriptMode::Module,
            inputs: &args,
            configuration: &self.configuration,
          })
          .map(RunOutput::Value)
          .map_err(wrap)
      }
      ComponentKind::Subworkflow => Err(ComponentError::SubworkflowOutsideScheduler),
    }
  }

  fn invoke_drained(&self, args: Map<String, Value>) -> Result<Value, ComponentError> {
    self
      .invoke(args)?
      .drain()
      .map_err(|source| ComponentError::Run {
        label: self.model.label.clone(),
        source,
      })
  }
}

/// Find the implementation for a model. Literal `componentCode` wins over the
/// registry.
async fn resolve_class(
  model: &ComponentModel,
  registry: &dyn ComponentRegistry,
) -> Result<(ComponentManifest, ComponentKind), ComponentError> {
  if let Some(source) = model.component_code.as_ref().filter(|s| !s.trim().is_empty()) {
    let mut manifest = ComponentManifest::new(model.class_name.clone(), model.output.data_type);
    for input in &model.inputs {
      manifest = manifest.with_input(InputContract::new(input.key.clone(), input.data_type));
    }
    for requirement in &model.component_code_requirements {
      manifest = manifest.with_requirement(requirement.clone());
    }
    return Ok((
      manifest,
      ComponentKind::Scripted {
        source: source.clone(),
      },
    ));
  }

  match registry.get(&model.class_name).await? {
    Some(registered) => Ok((registered.manifest, registered.kind)),
    None => {
      let known = registry.class_names().await?.join(", ");
      Err(ComponentError::NotFound {
        class_name: model.class_name.clone(),
        known,
      })
    }
  }
}

/// Swap `datasource` / `llm` profile references for their connection
/// attributes.
fn expand_profiles(
  configuration: &mut Map<String, Value>,
  profiles: &dyn ProfileStore,
) -> Result<(), ComponentError> {
  for kind in ProfileKind::ALL {
    let Some(reference) = configuration.remove(kind.config_key()) else {
      continue;
    };
    let attributes = match reference {
      Value::Null => continue,
      Value::String(id) if id.trim().is_empty() => continue,
      Value::String(id) => {
        profiles
          .profile(kind, &id)?
          .ok_or(ProfileError::Unknown { kind, id })?
          .connection_attributes
      }
      Value::Object(inline) => inline,
      other => {
        warn!(kind = %kind, value = %other, "profile_reference_ignored");
        continue;
      }
    };
    for (key, value) in attributes {
      configuration.insert(key, value);
    }
  }
  Ok(())
}

/// Whether a mapping contract fans out over `value`.
pub fn is_mapped(contract: &InputContract, value: &Value) -> bool {
  match contract.mapping {
    MappingPolicy::List | MappingPolicy::Scalar => false,
    MappingPolicy::RepeatableScalar => value.is_array(),
    MappingPolicy::Inferred => {
      contract.data_type != DataType::List
        && first_element_matches(contract.data_type.expected_shape(), value)
    }
  }
}

/// Interpret a `force_run` value. Strings accept the usual yes/no spellings.
pub fn parse_flag(value: &Value) -> bool {
  match value {
    Value::Bool(flag) => *flag,
    Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
    Value::String(s) => matches!(
      s.trim().to_ascii_lowercase().as_str(),
      "true" | "t" | "yes" | "y" | "on" | "1"
    ),
    _ => false,
  }
}
