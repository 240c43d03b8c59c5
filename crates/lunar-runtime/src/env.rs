//! `$LUNARENV::NAME` placeholders in configuration and input values.

use serde_json::{Map, Value};

use crate::error::ComponentError;

pub const ENVIRONMENT_PREFIX: &str = "$LUNARENV::";

/// Replace placeholder values with the named variable from the process
/// environment.
pub fn substitute_env(values: &mut Map<String, Value>) -> Result<(), ComponentError> {
  substitute_env_with(values, |name| std::env::var(name).ok())
}

/// Replace placeholder values using `lookup`. Only top-level string values
/// are considered. An unset variable fails the whole substitution.
pub fn substitute_env_with(
  values: &mut Map<String, Value>,
  lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ComponentError> {
  for value in values.values_mut() {
    let Value::String(text) = value else {
      continue;
    };
    let Some(variable) = text.strip_prefix(ENVIRONMENT_PREFIX) else {
      continue;
    };
    let variable = variable.trim();
    let resolved = lookup(variable).ok_or_else(|| ComponentError::MissingEnvironment {
      variable: variable.to_string(),
    })?;
    *value = Value::String(resolved);
  }
  Ok(())
}
