use std::collections::{HashMap, HashSet};

use lunar_config::{ComponentModel, WorkflowModel};
use serde_json::Value;
use tracing::warn;

use crate::error::WorkflowError;
use crate::graph::Dag;

/// Graph operations over a [`WorkflowModel`].
pub trait WorkflowGraph {
  /// Multigraph with one edge per dependency.
  fn get_dag(&self) -> Dag;

  /// Run the structural checks, adding new problems to `invalid_errors` and
  /// recomputing `is_terminal` on every component. Repeated passes leave
  /// `invalid_errors` unchanged.
  fn validate(&mut self);

  /// Structural errors as values, without touching the model.
  fn structural_errors(&self) -> Vec<WorkflowError>;

  /// Fail with the first structural error, if any.
  fn ensure_valid(&self) -> Result<(), WorkflowError>;

  /// Labels grouped into breadth-first layers from the roots.
  fn bfs_layers_labels(&self) -> Vec<Vec<String>>;

  /// Components flattened from the BFS layers. Display order only.
  fn components_ordered(&self) -> Vec<&ComponentModel>;

  fn label2component(&self) -> HashMap<&str, &ComponentModel>;
}

impl WorkflowGraph for WorkflowModel {
  fn get_dag(&self) -> Dag {
    Dag::new(
      self.components.iter().map(|c| c.label.as_str()),
      &self.dependencies,
    )
  }

  fn validate(&mut self) {
    for error in self.structural_errors() {
      let message = error.to_string();
      if self.invalid_errors.contains(&message) {
        continue;
      }
      warn!(workflow_id = %self.id, error = %message, "workflow_invalid");
      self.invalid_errors.push(message);
    }

    let dag = self.get_dag();
    for component in &mut self.components {
      component.is_terminal = dag.out_degree(&component.label) == 0;
    }
  }

  fn structural_errors(&self) -> Vec<WorkflowError> {
    let labels: HashSet<&str> = self.components.iter().map(|c| c.label.as_str()).collect();
    let mut errors: Vec<WorkflowError> = self
      .dependencies
      .iter()
      .filter(|dep| {
        !labels.contains(dep.source_label.as_str()) || !labels.contains(dep.target_label.as_str())
      })
      .map(|dep| WorkflowError::DanglingDependency {
        source_label: dep.source_label.clone(),
        target_label: dep.target_label.clone(),
        input_key: dep.component_input_key.clone(),
      })
      .collect();

    if !self.get_dag().is_acyclic() {
      errors.push(WorkflowError::Cycle {
        name: self.name.clone(),
      });
    }

    errors
  }

  fn ensure_valid(&self) -> Result<(), WorkflowError> {
    match self.structural_errors().into_iter().next() {
      Some(error) => Err(error),
      None => Ok(()),
    }
  }

  fn bfs_layers_labels(&self) -> Vec<Vec<String>> {
    self.get_dag().bfs_layers()
  }

  fn components_ordered(&self) -> Vec<&ComponentModel> {
    let by_label = self.label2component();
    self
      .bfs_layers_labels()
      .iter()
      .flatten()
      .filter_map(|label| by_label.get(label.as_str()).copied())
      .collect()
  }

  fn label2component(&self) -> HashMap<&str, &ComponentModel> {
    self
      .components
      .iter()
      .map(|c| (c.label.as_str(), c))
      .collect()
  }
}

/// Load a workflow document and run the structural validation pass.
///
/// Only a document that is not a workflow at all is an error; everything else
/// is recorded in `invalid_errors`.
pub fn parse_workflow(value: Value) -> Result<WorkflowModel, WorkflowError> {
  let mut workflow = WorkflowModel::from_value(value)?;
  workflow.validate();
  Ok(workflow)
}
