use std::path::Path;
use std::process::{ExitStatus, Stdio};

use lunar_config::ResultSet;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::IsolationConfig;
use crate::diagnostics::{exit_code, exit_diagnostic};
use crate::env::child_env;
use crate::error::IsolationError;
use crate::sentinel::{Frame, parse_results};
use crate::venv::Venv;

enum Ending {
  Exited(std::io::Result<ExitStatus>),
  Cancelled,
  TimedOut,
}

/// Run the engine on `document` inside `venv` and parse its framed results.
///
/// The child runs with the venv as working directory and inherits stderr.
/// It is killed when `cancel` fires or the configured timeout expires.
#[instrument(
  name = "isolated_run",
  skip(config, venv, cancel),
  fields(venv = %venv.root().display(), document = %document.display())
)]
pub async fn run_isolated(
  config: &IsolationConfig,
  venv: &Venv,
  document: &Path,
  frame: Frame,
  cancel: CancellationToken,
) -> Result<ResultSet, IsolationError> {
  let mut command = Command::new(&config.engine);
  command
    .arg(document)
    .arg("--venv")
    .arg(venv.root());
  if frame == Frame::Component {
    command.arg("--component");
  }

  let mut child = command
    .current_dir(venv.root())
    .env_clear()
    .envs(child_env(config, venv))
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::inherit())
    .kill_on_drop(true)
    .spawn()
    .map_err(|source| IsolationError::Spawn {
      program: config.engine.display().to_string(),
      source,
    })?;
  info!(pid = ?child.id(), "isolated_run_started");

  let stdout = child.stdout.take().ok_or_else(|| {
    IsolationError::Io(std::io::Error::other("child stdout was not captured"))
  })?;
  let reader = tokio::spawn(async move {
    let mut lines = BufReader::new(stdout).lines();
    let mut captured = Vec::new();
    while let Ok(Some(line)) = lines.next_line().await {
      debug!(line = %line, "child_stdout");
      captured.push(line);
    }
    captured
  });

  let ending = tokio::select! {
    status = child.wait() => Ending::Exited(status),
    _ = cancel.cancelled() => Ending::Cancelled,
    _ = tokio::time::sleep(config.timeout) => Ending::TimedOut,
  };

  let status = match ending {
    Ending::Exited(status) => status?,
    Ending::Cancelled => {
      warn!("isolated_run_cancelled");
      terminate(&mut child).await;
      reader.abort();
      return Err(IsolationError::Cancelled);
    }
    Ending::TimedOut => {
      warn!(seconds = config.timeout.as_secs(), "isolated_run_timed_out");
      terminate(&mut child).await;
      reader.abort();
      return Err(IsolationError::Timeout {
        seconds: config.timeout.as_secs(),
      });
    }
  };

  let lines = reader.await.map_err(std::io::Error::other)?;
  match exit_code(&status) {
    Some(0) => info!("isolated_run_finished"),
    code => {
      let diagnostic = code.and_then(exit_diagnostic).unwrap_or_default();
      warn!(code = ?code, diagnostic, "isolated_run_failed");
    }
  }

  parse_results(frame, &lines)
}

async fn terminate(child: &mut tokio::process::Child) {
  if let Err(e) = child.kill().await {
    warn!(error = %e, "child_kill_failed");
  }
}

#[cfg(all(test, unix))]
mod tests {
  use super::*;
  use std::os::unix::fs::PermissionsExt;
  use std::path::PathBuf;
  use std::time::Duration;

  fn executable(path: &Path, body: &str) {
    std::fs::write(path, format!("#!/bin/sh\n{}", body)).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
  }

  fn fake_venv(dir: &Path) -> Venv {
    let root = dir.join("venv");
    std::fs::create_dir_all(root.join("bin")).unwrap();
    executable(&root.join("bin").join("python"), "exit 0\n");
    Venv::open(&root).unwrap()
  }

  fn config_with_engine(dir: &Path, body: &str) -> IsolationConfig {
    let engine: PathBuf = dir.join("engine");
    executable(&engine, body);
    IsolationConfig {
      engine,
      ..Default::default()
    }
  }

  #[tokio::test]
  async fn test_results_come_from_the_framed_line() {
    let temp = tempfile::tempdir().unwrap();
    let venv = fake_venv(temp.path());
    let args = temp.path().join("args.txt");
    let config = config_with_engine(
      temp.path(),
      &format!(
        "echo \"$*\" > \"{}\"\npwd >> \"{}\"\necho 'loading...'\necho '<WORKFLOW OUTPUT START>{{\"A\": \"boom\"}}<WORKFLOW OUTPUT END>'\n",
        args.display(),
        args.display()
      ),
    );

    let results = run_isolated(
      &config,
      &venv,
      Path::new("/tmp/flow.json"),
      Frame::Workflow,
      CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(results.get("A").unwrap().error(), Some("boom"));

    let recorded = std::fs::read_to_string(&args).unwrap();
    let mut recorded = recorded.lines();
    assert_eq!(
      recorded.next().unwrap(),
      format!("/tmp/flow.json --venv {}", venv.root().display())
    );
    assert_eq!(
      std::fs::canonicalize(recorded.next().unwrap()).unwrap(),
      std::fs::canonicalize(venv.root()).unwrap()
    );
  }

  #[tokio::test]
  async fn test_component_flag_and_frame() {
    let temp = tempfile::tempdir().unwrap();
    let venv = fake_venv(temp.path());
    let config = config_with_engine(
      temp.path(),
      "if [ \"$4\" = \"--component\" ]; then\n  echo '<COMPONENT OUTPUT START>{\"C\": \"nope\"}<COMPONENT OUTPUT END>'\nfi\n",
    );

    let results = run_isolated(
      &config,
      &venv,
      Path::new("c.json"),
      Frame::Component,
      CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(results.get("C").unwrap().error(), Some("nope"));
  }

  #[tokio::test]
  async fn test_partial_output_is_a_failure() {
    let temp = tempfile::tempdir().unwrap();
    let venv = fake_venv(temp.path());
    let config = config_with_engine(
      temp.path(),
      "echo '<WORKFLOW OUTPUT START>{\"A\": '\nexit 247\n",
    );

    let err = run_isolated(
      &config,
      &venv,
      Path::new("flow.json"),
      Frame::Workflow,
      CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, IsolationError::MissingSentinel));
  }

  #[tokio::test]
  async fn test_environment_reaches_the_child() {
    let temp = tempfile::tempdir().unwrap();
    let venv = fake_venv(temp.path());
    let env_file = temp.path().join(".env");
    std::fs::write(&env_file, "GREETING=hello\n").unwrap();
    let mut config = config_with_engine(
      temp.path(),
      "printf '<WORKFLOW OUTPUT START>{\"A\": \"%s %s\"}<WORKFLOW OUTPUT END>\\n' \"$GREETING\" \"$LUNAR_USERID\"\n",
    );
    config.env_file = Some(env_file);
    config.user_id = Some("u-1".to_string());

    let results = run_isolated(
      &config,
      &venv,
      Path::new("flow.json"),
      Frame::Workflow,
      CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(results.get("A").unwrap().error(), Some("hello u-1"));
  }

  #[tokio::test]
  async fn test_cancellation_kills_the_child() {
    let temp = tempfile::tempdir().unwrap();
    let venv = fake_venv(temp.path());
    let config = config_with_engine(temp.path(), "sleep 30\n");

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(100)).await;
      trigger.cancel();
    });

    let started = std::time::Instant::now();
    let err = run_isolated(&config, &venv, Path::new("flow.json"), Frame::Workflow, cancel)
      .await
      .unwrap_err();
    assert!(matches!(err, IsolationError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(10));
  }

  #[tokio::test]
  async fn test_timeout_kills_the_child() {
    let temp = tempfile::tempdir().unwrap();
    let venv = fake_venv(temp.path());
    let mut config = config_with_engine(temp.path(), "sleep 30\n");
    config.timeout = Duration::from_millis(200);

    let err = run_isolated(
      &config,
      &venv,
      Path::new("flow.json"),
      Frame::Workflow,
      CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, IsolationError::Timeout { .. }));
  }
}
