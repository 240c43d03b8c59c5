//! Lunar Component Registry
//!
//! The [`Component`] contract, component class descriptors and the registries
//! that resolve a class name to an implementation.

pub mod builtins;
mod component;
mod error;
mod fs_registry;
mod manifest;
mod registry;

pub use builtins::{PYTHON_CODER_CLASS, SUBWORKFLOW_CLASS, builtin_components};
pub use component::{
  Component, RunContext, RunOutput, ScriptMode, ScriptRequest, ScriptRunner, ValueStream, required,
};
pub use error::{RegistryError, RunError};
pub use fs_registry::{FsComponentRegistry, MANIFEST_FILE, SOURCE_FILE};
pub use manifest::{ComponentManifest, InputContract, MappingPolicy};
pub use registry::{
  ComponentKind, ComponentRegistry, InMemoryRegistry, LayeredRegistry, RegisteredComponent,
};
