use lunar_config::{ComponentModel, ConfigError, DataType, InputValue};

/// Copy `upstream`'s output into `current`'s input `input_key`.
///
/// - with a `template_key`, the output is bound as that template variable
/// - AGGREGATED inputs collect outputs keyed by producer label
/// - anything else is overwritten
///
/// Nothing happens when `current` has no such input.
pub fn update_inputs(
  current: &mut ComponentModel,
  upstream: &ComponentModel,
  upstream_label: &str,
  input_key: &str,
  template_key: Option<&str>,
) -> Result<(), ConfigError> {
  let Some(input) = current.get_input_mut(input_key) else {
    return Ok(());
  };
  let value = upstream.output.value.or_null();

  match template_key {
    Some(template_key) => input.bind_template_variable(template_key, value)?,
    None if input.data_type == DataType::Aggregated => input.aggregate(upstream_label, value),
    None => input.value = InputValue::Value(value),
  }
  Ok(())
}
