//! Template variable rendering.
//!
//! Template inputs use single-brace placeholders (`"Hello, {name}!"`). Before
//! rendering, each known variable is rewritten to minijinja syntax
//! (`{{name}}`) so braces that are not template variables stay untouched.

use minijinja::{Environment, Value};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ConfigError;

static JINJA_EXPRESSION: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"\{\{\s*(.*?)\s*\}\}").expect("static regex"));

/// Rewrite `{var}` placeholders for the given variables into `{{var}}`.
///
/// Whitespace inside `{{ ... }}` is normalised afterwards.
pub fn to_jinja_template(template: &str, variables: &[&str]) -> String {
  let mut rewritten = template.to_string();
  for variable in variables {
    let placeholder = format!("{{{}}}", variable);
    let expression = format!("{{{{{}}}}}", variable);
    rewritten = rewritten.replace(&placeholder, &expression);
  }

  JINJA_EXPRESSION
    .replace_all(&rewritten, "{{$1}}")
    .into_owned()
}

/// Render a single-brace template against a variable mapping.
pub fn render_template(
  input_key: &str,
  template: &str,
  variables: &serde_json::Map<String, serde_json::Value>,
) -> Result<String, ConfigError> {
  let names: Vec<&str> = variables.keys().map(String::as_str).collect();
  let jinja_template = to_jinja_template(template, &names);

  let env = Environment::new();
  env
    .render_str(&jinja_template, Value::from_serialize(variables))
    .map_err(|e| ConfigError::TemplateRender {
      key: input_key.to_string(),
      message: e.to_string(),
    })
}
