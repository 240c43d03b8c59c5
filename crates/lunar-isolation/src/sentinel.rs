//! Framing of the single result line an engine process prints on stdout.

use lunar_config::ResultSet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::IsolationError;

pub const WORKFLOW_OUTPUT_START: &str = "<WORKFLOW OUTPUT START>";
pub const WORKFLOW_OUTPUT_END: &str = "<WORKFLOW OUTPUT END>";
pub const COMPONENT_OUTPUT_START: &str = "<COMPONENT OUTPUT START>";
pub const COMPONENT_OUTPUT_END: &str = "<COMPONENT OUTPUT END>";

static WORKFLOW_FRAME: Lazy<Regex> =
  Lazy::new(|| Regex::new("<WORKFLOW OUTPUT START>(.*)<WORKFLOW OUTPUT END>").expect("static regex"));
static COMPONENT_FRAME: Lazy<Regex> = Lazy::new(|| {
  Regex::new("<COMPONENT OUTPUT START>(.*)<COMPONENT OUTPUT END>").expect("static regex")
});

/// Which sentinel pair frames the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
  Workflow,
  Component,
}

impl Frame {
  pub fn start(&self) -> &'static str {
    match self {
      Frame::Workflow => WORKFLOW_OUTPUT_START,
      Frame::Component => COMPONENT_OUTPUT_START,
    }
  }

  pub fn end(&self) -> &'static str {
    match self {
      Frame::Workflow => WORKFLOW_OUTPUT_END,
      Frame::Component => COMPONENT_OUTPUT_END,
    }
  }

  fn pattern(&self) -> &'static Regex {
    match self {
      Frame::Workflow => &WORKFLOW_FRAME,
      Frame::Component => &COMPONENT_FRAME,
    }
  }
}

/// Serialize `payload` onto one framed line.
pub fn compose<T: Serialize>(frame: Frame, payload: &T) -> Result<String, IsolationError> {
  let json = serde_json::to_string(payload)?;
  Ok(format!("{}{}{}", frame.start(), json, frame.end()))
}

/// The payload of the first line carrying both sentinels.
pub fn extract<S: AsRef<str>>(frame: Frame, lines: &[S]) -> Option<String> {
  lines
    .iter()
    .map(AsRef::as_ref)
    .filter(|line| line.contains(frame.start()) && line.contains(frame.end()))
    .find_map(|line| {
      frame
        .pattern()
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
    })
}

/// Parse a captured stdout into per-label results.
pub fn parse_results<S: AsRef<str>>(frame: Frame, lines: &[S]) -> Result<ResultSet, IsolationError> {
  let payload = extract(frame, lines).ok_or(IsolationError::MissingSentinel)?;
  let value: serde_json::Value = serde_json::from_str(&payload)?;
  ResultSet::from_wire(value).ok_or(IsolationError::MissingSentinel)
}
