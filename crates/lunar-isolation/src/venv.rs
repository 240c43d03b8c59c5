use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::diagnostics::describe_exit;
use crate::error::IsolationError;
use crate::requirements::{RequirementCache, parse_requirements, plan_install};

/// A Python virtual environment on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Venv {
  root: PathBuf,
  bin_dir: PathBuf,
  python: PathBuf,
}

impl Venv {
  /// Create the venv if the directory is absent or empty, otherwise reuse it.
  #[instrument(name = "venv_ensure", skip_all, fields(path = %root.as_ref().display()))]
  pub async fn ensure(root: impl AsRef<Path>, python: &Path) -> Result<Self, IsolationError> {
    let root = std::path::absolute(root.as_ref())?;

    if is_missing_or_empty(&root)? {
      info!(path = %root.display(), "venv_create");
      run_quiet(
        Command::new(python)
          .args(["-m", "venv", "--symlinks"])
          .arg(&root),
        python,
      )
      .await?;

      let venv = Self::open(&root)?;
      run_quiet(
        Command::new(&venv.python).args(["-Im", "pip", "install", "--upgrade", "pip"]),
        &venv.python,
      )
      .await?;
      return Ok(venv);
    }

    Self::open(&root)
  }

  /// Open an existing venv without creating anything.
  pub fn open(root: &Path) -> Result<Self, IsolationError> {
    let bin_dir = ["bin", "Scripts"]
      .iter()
      .map(|dir| root.join(dir))
      .find(|dir| dir.is_dir())
      .ok_or_else(|| IsolationError::Venv {
        path: root.to_path_buf(),
        message: "neither bin/ nor Scripts/ exists".to_string(),
      })?;

    let python = ["python", "python.exe", "python3"]
      .iter()
      .map(|exe| bin_dir.join(exe))
      .find(|exe| exe.exists())
      .ok_or_else(|| IsolationError::Venv {
        path: root.to_path_buf(),
        message: "no python interpreter found".to_string(),
      })?;

    Ok(Self {
      root: root.to_path_buf(),
      bin_dir,
      python,
    })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn bin_dir(&self) -> &Path {
    &self.bin_dir
  }

  pub fn python(&self) -> &Path {
    &self.python
  }

  /// `lib/python*/site-packages` on unix, `Lib/site-packages` on Windows.
  pub fn site_packages(&self) -> Option<PathBuf> {
    let windows = self.root.join("Lib").join("site-packages");
    if windows.is_dir() {
      return Some(windows);
    }

    let mut candidates: Vec<PathBuf> = std::fs::read_dir(self.root.join("lib"))
      .ok()?
      .filter_map(|entry| entry.ok())
      .map(|entry| entry.path())
      .filter(|path| {
        path
          .file_name()
          .and_then(|n| n.to_str())
          .is_some_and(|n| n.starts_with("python"))
      })
      .map(|path| path.join("site-packages"))
      .filter(|path| path.is_dir())
      .collect();
    candidates.sort();
    candidates.pop()
  }

  /// Install whatever the `packages.pip` cache does not already cover.
  ///
  /// Returns the requirement lines handed to pip (empty when nothing ran).
  #[instrument(name = "venv_install", skip(self, requested, frozen), fields(path = %self.root.display()))]
  pub async fn install_requirements(
    &self,
    requested: &[String],
    frozen: &HashSet<String>,
  ) -> Result<Vec<String>, IsolationError> {
    let requested = parse_requirements(requested.iter().map(String::as_str))?;
    let cache = RequirementCache::new(&self.root);
    let plan = plan_install(&requested, &cache.load().await?, frozen);

    if plan.to_install.is_empty() {
      debug!("requirements_cached");
      return Ok(Vec::new());
    }

    info!(packages = ?plan.to_install, "requirements_install");
    run_quiet(
      Command::new(&self.python)
        .args([
          "-m",
          "pip",
          "install",
          "--require-virtualenv",
          "--isolated",
          "--no-cache-dir",
          "--timeout=180",
          "--disable-pip-version-check",
          "--no-input",
        ])
        .args(&plan.to_install)
        .current_dir(&self.root),
      &self.python,
    )
    .await?;

    cache.store(&plan.merged).await?;
    info!(packages = ?plan.to_install, "requirements_installed");
    Ok(plan.to_install)
  }
}

fn is_missing_or_empty(root: &Path) -> Result<bool, IsolationError> {
  if !root.is_dir() {
    return Ok(true);
  }
  Ok(std::fs::read_dir(root)?.next().is_none())
}

/// Run a command to completion, keeping its output off our stdout.
async fn run_quiet(command: &mut Command, program: &Path) -> Result<(), IsolationError> {
  let output = command
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .output()
    .await
    .map_err(|source| IsolationError::Spawn {
      program: program.display().to_string(),
      source,
    })?;

  if output.status.success() {
    return Ok(());
  }

  debug!(
    stdout = %String::from_utf8_lossy(&output.stdout),
    stderr = %String::from_utf8_lossy(&output.stderr),
    "command_output"
  );
  Err(describe_exit(program, &output.status))
}
