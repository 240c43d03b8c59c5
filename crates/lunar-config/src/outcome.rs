//! Per-label run results.
//!
//! On the wire a result set is a JSON object mapping each component label to
//! either the executed component document or an error string.

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::component::ComponentModel;

/// The result of one component.
#[derive(Debug, Clone)]
pub enum Outcome {
  Completed(Box<ComponentModel>),
  Failed(String),
}

impl Outcome {
  pub fn component(&self) -> Option<&ComponentModel> {
    match self {
      Outcome::Completed(model) => Some(model),
      Outcome::Failed(_) => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      Outcome::Completed(_) => None,
      Outcome::Failed(message) => Some(message),
    }
  }

  /// Interpret one wire entry. Anything that is not a component document is
  /// kept as an error string.
  pub fn from_wire(value: Value) -> Self {
    match value {
      Value::String(message) => Outcome::Failed(message),
      Value::Object(_) => match ComponentModel::from_value(value.clone()) {
        Ok(model) => Outcome::Completed(Box::new(model)),
        Err(_) => Outcome::Failed(value.to_string()),
      },
      other => Outcome::Failed(other.to_string()),
    }
  }
}

impl Serialize for Outcome {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      Outcome::Completed(model) => model.serialize(serializer),
      Outcome::Failed(message) => serializer.serialize_str(message),
    }
  }
}

/// Ordered `label -> Outcome` results of a run.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
  entries: Vec<(String, Outcome)>,
}

impl ResultSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert or replace the outcome for `label`, keeping first-insert order.
  pub fn insert(&mut self, label: impl Into<String>, outcome: Outcome) {
    let label = label.into();
    match self.entries.iter_mut().find(|(l, _)| *l == label) {
      Some(entry) => entry.1 = outcome,
      None => self.entries.push((label, outcome)),
    }
  }

  pub fn get(&self, label: &str) -> Option<&Outcome> {
    self
      .entries
      .iter()
      .find(|(l, _)| l == label)
      .map(|(_, outcome)| outcome)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &Outcome)> {
    self.entries.iter().map(|(l, o)| (l.as_str(), o))
  }

  pub fn labels(&self) -> impl Iterator<Item = &str> {
    self.entries.iter().map(|(l, _)| l.as_str())
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Parse a wire result object.
  pub fn from_wire(value: Value) -> Option<Self> {
    let Value::Object(map) = value else {
      return None;
    };
    let mut results = Self::new();
    for (label, entry) in map {
      results.insert(label, Outcome::from_wire(entry));
    }
    Some(results)
  }
}

impl IntoIterator for ResultSet {
  type Item = (String, Outcome);
  type IntoIter = std::vec::IntoIter<(String, Outcome)>;

  fn into_iter(self) -> Self::IntoIter {
    self.entries.into_iter()
  }
}

impl FromIterator<(String, Outcome)> for ResultSet {
  fn from_iter<T: IntoIterator<Item = (String, Outcome)>>(iter: T) -> Self {
    let mut results = Self::new();
    for (label, outcome) in iter {
      results.insert(label, outcome);
    }
    results
  }
}

impl Serialize for ResultSet {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(self.entries.len()))?;
    for (label, outcome) in &self.entries {
      map.serialize_entry(label, outcome)?;
    }
    map.end()
  }
}

impl<'de> Deserialize<'de> for ResultSet {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let value = Value::deserialize(deserializer)?;
    ResultSet::from_wire(value)
      .ok_or_else(|| serde::de::Error::custom("a result set must be a JSON object"))
  }
}
