//! pip requirement lines and the per-venv install cache.
//!
//! The cache (`packages.pip` in the venv root) holds one requirement line per
//! installed package. A requested requirement is skipped when the cache
//! already has the package and the request either carries no version
//! specifier or is the identical line.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::fs;
use tracing::warn;

use crate::error::IsolationError;

pub const CACHE_FILE: &str = "packages.pip";

static REQUIREMENT: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"^([A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)\s*(\[[^\]]*\])?\s*([^;]*?)\s*(;.*)?$")
    .expect("static regex")
});

static SPECIFIER: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^(===|==|~=|!=|<=|>=|<|>)\s*[A-Za-z0-9.*+!_-]+$").expect("static regex"));

static NAME_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-_.]+").expect("static regex"));

/// One parsed requirement line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
  /// Normalised project name (lower case, separators collapsed to `-`).
  pub name: String,
  /// Version specifiers or a direct reference (`@ url`), if any.
  pub specs: Vec<String>,
  /// The trimmed source line.
  pub line: String,
}

impl Requirement {
  pub fn parse(line: &str) -> Result<Self, IsolationError> {
    let line = strip_comment(line).trim().to_string();
    let invalid = |message: &str| IsolationError::Requirement {
      line: line.clone(),
      message: message.to_string(),
    };

    if line.is_empty() {
      return Err(invalid("empty requirement"));
    }
    if line.starts_with('-') {
      return Err(invalid("pip options are not supported"));
    }

    let captures = REQUIREMENT
      .captures(&line)
      .ok_or_else(|| invalid("expected a project name"))?;
    let name = normalise_name(&captures[1]);
    let raw_specs = captures.get(3).map_or("", |m| m.as_str()).trim();

    let specs = if raw_specs.is_empty() {
      Vec::new()
    } else if raw_specs.starts_with('@') {
      vec![raw_specs.to_string()]
    } else {
      let specs: Vec<String> = raw_specs
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .map(|s| s.trim().to_string())
        .collect();
      if let Some(bad) = specs.iter().find(|s| !SPECIFIER.is_match(s)) {
        return Err(invalid(&format!("invalid version specifier '{}'", bad)));
      }
      specs
    };

    Ok(Self { name, specs, line })
  }

  pub fn has_specs(&self) -> bool {
    !self.specs.is_empty()
  }
}

/// PEP 503 name normalisation.
pub fn normalise_name(name: &str) -> String {
  NAME_SEPARATORS
    .replace_all(&name.to_lowercase(), "-")
    .into_owned()
}

fn strip_comment(line: &str) -> &str {
  match line.find(" #").or_else(|| line.starts_with('#').then_some(0)) {
    Some(index) => &line[..index],
    None => line,
  }
}

/// Parse requirement lines, skipping blanks and comments.
pub fn parse_requirements<'a>(
  lines: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<Requirement>, IsolationError> {
  lines
    .into_iter()
    .filter(|l| !strip_comment(l).trim().is_empty())
    .map(Requirement::parse)
    .collect()
}

/// What an install call has to do.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstallPlan {
  /// Lines to hand to pip.
  pub to_install: Vec<String>,
  /// The cache contents once the install succeeded.
  pub merged: Vec<Requirement>,
}

/// Compare requested requirements against the cache.
pub fn plan_install(
  requested: &[Requirement],
  cached: &[Requirement],
  frozen: &HashSet<String>,
) -> InstallPlan {
  let mut merged: Vec<Requirement> = cached.to_vec();
  let mut to_install: Vec<String> = Vec::new();

  for req in requested {
    if frozen.contains(&req.name) {
      warn!(
        requirement = %req.name,
        "Installation is not allowed due to potential clashes with core functionalities"
      );
      continue;
    }

    let existing = merged.iter().position(|c| c.name == req.name);
    if let Some(index) = existing
      && (!req.has_specs() || merged[index].line == req.line)
    {
      continue;
    }

    if !to_install.contains(&req.line) {
      to_install.push(req.line.clone());
    }
    match existing {
      Some(index) => merged[index] = req.clone(),
      None => merged.push(req.clone()),
    }
  }

  InstallPlan { to_install, merged }
}

/// The `packages.pip` cache of one venv.
#[derive(Debug, Clone)]
pub struct RequirementCache {
  path: PathBuf,
}

impl RequirementCache {
  pub fn new(venv_root: &Path) -> Self {
    Self {
      path: venv_root.join(CACHE_FILE),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Cached requirements. A missing file is an empty cache.
  pub async fn load(&self) -> Result<Vec<Requirement>, IsolationError> {
    let content = match fs::read_to_string(&self.path).await {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(e.into()),
    };
    parse_requirements(content.lines()).map_err(|e| IsolationError::Cache {
      path: self.path.clone(),
      message: e.to_string(),
    })
  }

  pub async fn store(&self, requirements: &[Requirement]) -> Result<(), IsolationError> {
    let mut content = String::new();
    for req in requirements {
      content.push_str(&req.line);
      content.push('\n');
    }
    fs::write(&self.path, content).await?;
    Ok(())
  }
}
