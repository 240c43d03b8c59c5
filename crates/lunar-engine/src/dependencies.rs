//! Python requirements of a run.
//!
//! An isolated run installs, into its venv, the requirements of every
//! component class it uses, the `componentCodeRequirements` of components
//! carrying their own code, and the top-level modules imported by
//! `PythonCoder` snippets. Embedded sub-workflows are walked as well.

use std::collections::VecDeque;

use lunar_component_registry::{ComponentRegistry, PYTHON_CODER_CLASS, SUBWORKFLOW_CLASS};
use lunar_config::{ComponentModel, DataType, WorkflowModel};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::EngineError;

static IMPORT: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^\s*import\s+([^#]+)").expect("static regex"));
static FROM_IMPORT: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^\s*from\s+([A-Za-z_][\w.]*)\s+import\b").expect("static regex"));

/// Modules shipped with the interpreter.
const STDLIB_MODULES: &[&str] = &[
  "abc", "argparse", "array", "ast", "asyncio", "base64", "bisect", "calendar", "collections",
  "contextlib", "copy", "csv", "dataclasses", "datetime", "decimal", "enum", "functools", "glob",
  "gzip", "hashlib", "heapq", "html", "http", "io", "itertools", "json", "logging", "math",
  "operator", "os", "pathlib", "pickle", "platform", "pprint", "queue", "random", "re", "shutil",
  "socket", "sqlite3", "statistics", "string", "struct", "subprocess", "sys", "tempfile",
  "textwrap", "threading", "time", "traceback", "typing", "unicodedata", "urllib", "uuid",
  "warnings", "xml", "zipfile", "zlib",
];

/// Top-level third-party modules imported by `source`, in first-seen order.
///
/// Relative imports and standard library modules are skipped.
pub fn python_imports(source: &str) -> Vec<String> {
  let mut modules: Vec<String> = Vec::new();
  for line in source.lines() {
    let names: Vec<&str> = if let Some(captures) = FROM_IMPORT.captures(line) {
      captures.get(1).map(|m| vec![m.as_str()]).unwrap_or_default()
    } else if let Some(captures) = IMPORT.captures(line) {
      captures
        .get(1)
        .map(|m| {
          m.as_str()
            .split(',')
            .filter_map(|part| part.split_whitespace().next())
            .collect()
        })
        .unwrap_or_default()
    } else {
      continue;
    };

    for name in names {
      let (top, _) = name.split_once('.').unwrap_or((name, ""));
      let valid = top
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_');
      if valid && !STDLIB_MODULES.contains(&top) && !modules.iter().any(|m| m == top) {
        modules.push(top.to_string());
      }
    }
  }
  modules
}

/// Every requirement line a run of `components` needs, deduplicated.
#[instrument(name = "collect_requirements", skip_all, fields(components = components.len()))]
pub async fn collect_requirements(
  components: &[ComponentModel],
  registry: &dyn ComponentRegistry,
) -> Result<Vec<String>, EngineError> {
  let mut requirements: Vec<String> = Vec::new();

  for component in flatten(components) {
    if component.component_code.is_some() {
      extend_unique(&mut requirements, component.component_code_requirements.iter().cloned());
      continue;
    }

    let registered = registry
      .get(&component.class_name)
      .await?
      .ok_or_else(|| EngineError::UnknownPackage {
        class_name: component.class_name.clone(),
      })?;
    extend_unique(&mut requirements, registered.manifest.requirements.iter().cloned());
    extend_unique(&mut requirements, component.component_code_requirements.iter().cloned());

    if component.class_name == PYTHON_CODER_CLASS {
      for input in component.inputs.iter().filter(|i| i.data_type == DataType::Code) {
        if let Some(Value::String(code)) = input.value.as_value() {
          extend_unique(&mut requirements, python_imports(code));
        }
      }
    }
  }

  debug!(requirements = ?requirements, "requirements_collected");
  Ok(requirements)
}

/// `components` plus the components of every embedded sub-workflow.
fn flatten(components: &[ComponentModel]) -> Vec<ComponentModel> {
  let mut pending: VecDeque<ComponentModel> = components.iter().cloned().collect();
  let mut flat = Vec::new();
  while let Some(component) = pending.pop_front() {
    if component.class_name == SUBWORKFLOW_CLASS
      && let Some(inner) = embedded_workflow(&component)
    {
      pending.extend(inner.components);
    }
    flat.push(component);
  }
  flat
}

fn embedded_workflow(component: &ComponentModel) -> Option<WorkflowModel> {
  let input = component
    .inputs
    .iter()
    .find(|input| input.key.eq_ignore_ascii_case("workflow"))?;
  let document = match input.value.as_value()? {
    Value::String(text) => serde_json::from_str(text).ok()?,
    other => other.clone(),
  };
  WorkflowModel::from_value(document).ok()
}

fn extend_unique(target: &mut Vec<String>, items: impl IntoIterator<Item = String>) {
  for item in items {
    if !target.contains(&item) {
      target.push(item);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use lunar_component_registry::{ComponentManifest, InMemoryRegistry, RegisteredComponent};
  use lunar_config::{ComponentInput, ComponentOutput};
  use serde_json::json;

  #[test]
  fn test_python_imports() {
    let source = "import os\nimport pandas as pd, numpy\nfrom sklearn.linear_model import X\n\
                  from . import local\nfrom .sibling import y\n  import requests.adapters  # http\n\
                  import pandas\nresult = 1\n";
    assert_eq!(python_imports(source), vec!["pandas", "numpy", "sklearn", "requests"]);
  }

  fn registry() -> InMemoryRegistry {
    let mut registry = InMemoryRegistry::with_builtins();
    registry
      .register(RegisteredComponent::scripted(
        ComponentManifest::new("Scraper", DataType::Text)
          .with_requirement("requests>=2")
          .with_requirement("beautifulsoup4"),
        "def run(): pass",
      ))
      .unwrap();
    registry
  }

  fn component(class_name: &str, inputs: Vec<ComponentInput>) -> ComponentModel {
    ComponentModel::new(class_name, class_name, inputs, ComponentOutput::new(DataType::Any))
  }

  #[tokio::test]
  async fn test_collects_registry_code_and_import_requirements() {
    let coder = component(
      "PythonCoder",
      vec![ComponentInput::new("code", DataType::Code).with_value(json!("import numpy\nresult = 1"))],
    );
    let mut custom = component("Custom", vec![]);
    custom.component_code = Some("def run(): pass".to_string());
    custom.component_code_requirements = vec!["pyyaml".to_string(), "requests>=2".to_string()];

    let requirements = collect_requirements(
      &[component("Scraper", vec![]), coder, custom, component("Scraper", vec![])],
      &registry(),
    )
    .await
    .unwrap();
    assert_eq!(requirements, vec!["requests>=2", "beautifulsoup4", "numpy", "pyyaml"]);
  }

  #[tokio::test]
  async fn test_walks_embedded_workflows() {
    let inner = WorkflowModel::new("inner", "").with_component(component("Scraper", vec![]));
    let outer = component(
      "Subworkflow",
      vec![
        ComponentInput::new("workflow", DataType::Workflow)
          .with_value(json!(serde_json::to_string(&inner).unwrap())),
      ],
    );
    let requirements = collect_requirements(&[outer], &registry()).await.unwrap();
    assert_eq!(requirements, vec!["requests>=2", "beautifulsoup4"]);
  }

  #[tokio::test]
  async fn test_unknown_class() {
    let err = collect_requirements(&[component("Mystery", vec![])], &registry())
      .await
      .unwrap_err();
    assert_eq!(err.to_string(), "Failed to locate component package for Mystery");
  }
}
