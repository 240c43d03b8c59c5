use lunar_config::DataType;

use crate::manifest::{ComponentManifest, InputContract, MappingPolicy};
use crate::registry::{ComponentKind, RegisteredComponent};

pub const SUBWORKFLOW_CLASS: &str = "Subworkflow";

/// Runs the workflow on its `workflow` input. Other inputs carrying a
/// `component_id` override inputs of the embedded workflow.
pub(super) fn registered() -> RegisteredComponent {
  RegisteredComponent {
    manifest: ComponentManifest::new(SUBWORKFLOW_CLASS, DataType::Any)
      .with_description("Runs another workflow as a single component")
      .with_group("WORKFLOWS")
      .with_input(InputContract::new("workflow", DataType::Workflow).with_mapping(MappingPolicy::Scalar)),
    kind: ComponentKind::Subworkflow,
    module_path: None,
  }
}
