//! Lunar Config
//!
//! Serializable data model for Lunar workflows: data types, component input and
//! output slots, component instances, dependencies and workflow documents.
//!
//! Documents are camelCase JSON. Loading is recoverable: broken components,
//! inputs and dependencies are recorded in `invalid_errors` rather than failing
//! the whole workflow, so an editor can still show what was saved.

mod component;
mod data_type;
mod dependency;
mod error;
mod input;
mod outcome;
mod template;
mod value;
mod workflow;

pub use component::{ComponentModel, DEFAULT_COMPONENT_TIMEOUT, DEFAULT_GROUP, Position};
pub use data_type::{DataType, Shape, value_kind};
pub use dependency::ComponentDependency;
pub use error::ConfigError;
pub use input::{ComponentInput, ComponentOutput, coerce_value, first_element_matches};
pub use outcome::{Outcome, ResultSet};
pub use template::{render_template, to_jinja_template};
pub use value::{InputValue, UNDEFINED};
pub use workflow::{DEFAULT_WORKFLOW_TIMEOUT, ERROR_CLASS_NAME, WorkflowModel};
