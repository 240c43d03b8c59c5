use std::path::Path;

use lunar_config::{Outcome, ResultSet};
use lunar_engine::{Engine, EngineConfig, EngineError, RunTarget, compose_output, load_workflow};
use lunar_isolation::{Frame, IsolationError, parse_results};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

fn text_component(label: &str, value: &str) -> Value {
  json!({
    "name": label,
    "className": "TextInput",
    "description": "",
    "inputs": [{"key": "input", "dataType": "TEMPLATE", "value": value}],
    "output": {"dataType": "TEXT"},
    "label": label
  })
}

fn greeting_workflow() -> Value {
  json!({
    "id": "wf-1",
    "name": "greeting",
    "description": "",
    "components": [text_component("NAME", "World"), text_component("GREETING", "Hello, {name}!")],
    "dependencies": [{
      "componentInputKey": "input",
      "sourceLabel": "NAME",
      "targetLabel": "GREETING",
      "templateVariableKey": "name"
    }]
  })
}

fn write(dir: &Path, name: &str, document: &Value) -> std::path::PathBuf {
  let path = dir.join(name);
  std::fs::write(&path, serde_json::to_string(document).unwrap()).unwrap();
  path
}

fn output(results: &ResultSet, label: &str) -> Value {
  match results.get(label) {
    Some(Outcome::Completed(model)) => model.output.value.or_null(),
    other => panic!("{label} did not complete: {other:?}"),
  }
}

#[tokio::test]
async fn test_missing_workflow_file() {
  let temp = tempfile::tempdir().unwrap();
  let err = load_workflow(&temp.path().join("absent.json")).await.unwrap_err();
  assert!(matches!(err, EngineError::NotFound { .. }));
  assert!(err.to_string().ends_with("not found!"));
}

#[tokio::test]
async fn test_invalid_json_document() {
  let temp = tempfile::tempdir().unwrap();
  let path = temp.path().join("broken.json");
  std::fs::write(&path, "{not json").unwrap();
  assert!(matches!(
    load_workflow(&path).await.unwrap_err(),
    EngineError::Json { .. }
  ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_runs_workflow_file_in_process() {
  let temp = tempfile::tempdir().unwrap();
  let path = write(temp.path(), "workflow.json", &greeting_workflow());
  let engine = Engine::new(EngineConfig::new(temp.path().join("data"))).unwrap();

  let results = engine
    .run_file(&path, RunTarget::Workflow, &engine.in_process(), CancellationToken::new())
    .await
    .unwrap();
  assert_eq!(output(&results, "GREETING"), json!("Hello, World!"));

  let line = compose_output(RunTarget::Workflow, &results).unwrap();
  assert!(line.starts_with("<WORKFLOW OUTPUT START>"));
  let parsed = parse_results(Frame::Workflow, &[line]).unwrap();
  assert_eq!(parsed.len(), 2);
  assert_eq!(output(&parsed, "NAME"), json!("World"));
  assert_eq!(output(&parsed, "GREETING"), json!("Hello, World!"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_runs_component_file_in_process() {
  let temp = tempfile::tempdir().unwrap();
  let path = write(temp.path(), "component.json", &text_component("SOLO", "alone"));
  let engine = Engine::new(EngineConfig::new(temp.path().join("data"))).unwrap();

  let results = engine
    .run_file(&path, RunTarget::Component, &engine.in_process(), CancellationToken::new())
    .await
    .unwrap();
  assert_eq!(output(&results, "SOLO"), json!("alone"));

  let line = compose_output(RunTarget::Component, &results).unwrap();
  assert!(line.starts_with("<COMPONENT OUTPUT START>"));
  assert!(line.ends_with("<COMPONENT OUTPUT END>"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_class_is_a_component_failure() {
  let temp = tempfile::tempdir().unwrap();
  let mut component = text_component("ODD", "x");
  component["className"] = json!("Unheard");
  let workflow = json!({"name": "odd", "description": "", "components": [component]});
  let path = write(temp.path(), "workflow.json", &workflow);
  let engine = Engine::new(EngineConfig::new(temp.path().join("data"))).unwrap();

  let results = engine
    .run_file(&path, RunTarget::Workflow, &engine.in_process(), CancellationToken::new())
    .await
    .unwrap();
  match results.get("ODD") {
    Some(Outcome::Failed(message)) => assert!(message.starts_with("Component not found: Unheard")),
    other => panic!("expected a failure: {other:?}"),
  }
}

#[tokio::test]
async fn test_isolated_run_needs_known_packages() {
  let temp = tempfile::tempdir().unwrap();
  let mut component = text_component("ODD", "x");
  component["className"] = json!("Unheard");
  let workflow = json!({"name": "odd", "description": "", "components": [component]});
  let path = write(temp.path(), "workflow.json", &workflow);

  let engine = Engine::new(EngineConfig::new(temp.path().join("data"))).unwrap();
  let venv = temp.path().join("venv");
  std::fs::create_dir_all(venv.join("bin")).unwrap();
  std::fs::write(venv.join("bin").join("python"), "").unwrap();

  let err = engine
    .run_file(&path, RunTarget::Workflow, &engine.isolated(Some(venv)), CancellationToken::new())
    .await
    .unwrap_err();
  assert_eq!(err.to_string(), "Failed to locate component package for Unheard");
}

#[cfg(unix)]
mod isolated {
  use super::*;
  use std::os::unix::fs::PermissionsExt;

  fn executable(path: &Path, body: &str) {
    std::fs::write(path, format!("#!/bin/sh\n{}", body)).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
  }

  #[tokio::test]
  async fn test_isolated_run_reads_the_child_frame() {
    let temp = tempfile::tempdir().unwrap();
    let path = write(temp.path(), "workflow.json", &greeting_workflow());

    let venv = temp.path().join("venv");
    std::fs::create_dir_all(venv.join("bin")).unwrap();
    executable(&venv.join("bin").join("python"), "exit 0\n");

    let args = temp.path().join("args.txt");
    let engine_exe = temp.path().join("engine");
    executable(
      &engine_exe,
      &format!(
        "echo \"$*\" > \"{}\"\necho '<WORKFLOW OUTPUT START>{{\"NAME\": \"child says no\"}}<WORKFLOW OUTPUT END>'\n",
        args.display()
      ),
    );

    let mut config = EngineConfig::new(temp.path().join("data"));
    config.engine = engine_exe;
    let engine = Engine::new(config).unwrap();

    let results = engine
      .run_file(&path, RunTarget::Workflow, &engine.isolated(Some(venv.clone())), CancellationToken::new())
      .await
      .unwrap();
    assert_eq!(results.get("NAME").and_then(Outcome::error), Some("child says no"));

    let argv = std::fs::read_to_string(&args).unwrap();
    assert!(argv.contains("--venv"));
    assert!(argv.contains(venv.to_str().unwrap()));
    assert!(!argv.contains("--component"));
  }

  #[tokio::test]
  async fn test_isolated_run_is_bounded_by_the_workflow_timeout() {
    let temp = tempfile::tempdir().unwrap();
    let mut workflow = greeting_workflow();
    workflow["timeout"] = json!(1);
    let path = write(temp.path(), "workflow.json", &workflow);

    let venv = temp.path().join("venv");
    std::fs::create_dir_all(venv.join("bin")).unwrap();
    executable(&venv.join("bin").join("python"), "exit 0\n");
    let engine_exe = temp.path().join("engine");
    executable(&engine_exe, "sleep 30\n");

    let mut config = EngineConfig::new(temp.path().join("data"));
    config.engine = engine_exe;
    let engine = Engine::new(config).unwrap();

    let started = std::time::Instant::now();
    let err = engine
      .run_file(&path, RunTarget::Workflow, &engine.isolated(Some(venv)), CancellationToken::new())
      .await
      .unwrap_err();
    assert!(matches!(
      err,
      EngineError::Isolation(IsolationError::Timeout { seconds: 1 })
    ));
    assert!(started.elapsed() < std::time::Duration::from_secs(20));
  }

  #[tokio::test]
  async fn test_isolated_run_without_frame_fails() {
    let temp = tempfile::tempdir().unwrap();
    let path = write(temp.path(), "component.json", &text_component("SOLO", "alone"));

    let venv = temp.path().join("venv");
    std::fs::create_dir_all(venv.join("bin")).unwrap();
    executable(&venv.join("bin").join("python"), "exit 0\n");
    let engine_exe = temp.path().join("engine");
    executable(&engine_exe, "echo 'crashed before reporting'\nexit 3\n");

    let mut config = EngineConfig::new(temp.path().join("data"));
    config.engine = engine_exe;
    let engine = Engine::new(config).unwrap();

    let err = engine
      .run_file(&path, RunTarget::Component, &engine.isolated(Some(venv)), CancellationToken::new())
      .await
      .unwrap_err();
    assert_eq!(
      err.to_string(),
      "Something went wrong while running flow. See server logs for details."
    );
  }
}
