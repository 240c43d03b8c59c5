//! Running component Python source inside a venv interpreter.
//!
//! The request travels as JSON on the child's stdin. A small harness executes
//! it and prints one component-framed line holding either `{"value": ...}` or
//! `{"error": "..."}`.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use lunar_component_registry::{RunError, ScriptRequest, ScriptRunner};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::config::IsolationConfig;
use crate::diagnostics::{exit_code, exit_diagnostic};
use crate::env::child_env;
use crate::sentinel::{Frame, extract};
use crate::venv::Venv;

const HARNESS: &str = r#"
import inspect, json, sys

START, END = "<COMPONENT OUTPUT START>", "<COMPONENT OUTPUT END>"

def emit(payload):
    sys.stdout.write(START + json.dumps(payload, default=str) + END + "\n")
    sys.stdout.flush()

request = json.load(sys.stdin)
inputs = request.get("inputs") or {}
configuration = request.get("configuration") or {}
try:
    if request["mode"] == "snippet":
        scope = dict(inputs)
        scope["configuration"] = configuration
        exec(request["source"], scope)
        emit({"value": scope.get("result")})
    else:
        scope = {"__name__": "lunar_component"}
        exec(request["source"], scope)
        target = scope.get("run")
        if not callable(target):
            classes = [
                obj for obj in scope.values()
                if inspect.isclass(obj) and obj.__module__ == "lunar_component" and callable(getattr(obj, "run", None))
            ]
            if not classes:
                raise RuntimeError("component source defines neither run() nor a class with run()")
            instance = classes[-1]()
            instance.configuration = configuration
            target = instance.run
        emit({"value": target(**inputs)})
except Exception as exc:
    emit({"error": "%s: %s" % (type(exc).__name__, exc)})
"#;

/// A [`ScriptRunner`] that spawns a Python interpreter per request.
#[derive(Debug, Clone)]
pub struct PythonScriptRunner {
  python: PathBuf,
  cwd: Option<PathBuf>,
  env: Option<HashMap<String, String>>,
}

impl PythonScriptRunner {
  /// Run with `python` and the current process environment.
  pub fn new(python: impl Into<PathBuf>) -> Self {
    Self {
      python: python.into(),
      cwd: None,
      env: None,
    }
  }

  /// Run with the venv interpreter, the venv as working directory and the
  /// same environment an isolated engine gets.
  pub fn from_venv(config: &IsolationConfig, venv: &Venv) -> Self {
    Self {
      python: venv.python().to_path_buf(),
      cwd: Some(venv.root().to_path_buf()),
      env: Some(child_env(config, venv)),
    }
  }

  pub fn python(&self) -> &std::path::Path {
    &self.python
  }
}

impl ScriptRunner for PythonScriptRunner {
  #[instrument(name = "script_run", skip_all, fields(label = %request.label, mode = request.mode.as_str()))]
  fn run_script(&self, request: ScriptRequest<'_>) -> Result<Value, RunError> {
    let payload = json!({
      "mode": request.mode.as_str(),
      "source": request.source,
      "inputs": request.inputs,
      "configuration": request.configuration,
    });
    let payload = serde_json::to_vec(&payload).map_err(|e| RunError::Script(e.to_string()))?;

    let mut command = Command::new(&self.python);
    command
      .arg("-c")
      .arg(HARNESS)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped());
    if let Some(cwd) = &self.cwd {
      command.current_dir(cwd);
    }
    if let Some(env) = &self.env {
      command.env_clear().envs(env);
    }

    let mut child = command.spawn().map_err(|e| {
      RunError::Script(format!("failed to start {}: {}", self.python.display(), e))
    })?;
    if let Some(mut stdin) = child.stdin.take() {
      stdin
        .write_all(&payload)
        .map_err(|e| RunError::Script(format!("failed to send script request: {}", e)))?;
    }
    let output = child
      .wait_with_output()
      .map_err(|e| RunError::Script(e.to_string()))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    let Some(framed) = extract(Frame::Component, &lines) else {
      let stderr = String::from_utf8_lossy(&output.stderr);
      let code = exit_code(&output.status);
      warn!(code = ?code, stderr = %stderr, "script_without_result");
      let hint = code
        .and_then(exit_diagnostic)
        .map(|d| format!(" {}", d))
        .unwrap_or_default();
      return Err(RunError::Script(format!(
        "interpreter exited with status {:?} without a result.{}",
        code, hint
      )));
    };

    let mut framed: Value =
      serde_json::from_str(&framed).map_err(|e| RunError::Script(e.to_string()))?;
    if let Some(Value::String(message)) = framed.get("error") {
      return Err(RunError::Script(message.clone()));
    }
    debug!("script_finished");
    Ok(framed.get_mut("value").map(Value::take).unwrap_or(Value::Null))
  }
}
