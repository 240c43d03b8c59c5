use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use lunar_component_registry::{
  Component, ComponentManifest, InMemoryRegistry, InputContract, MappingPolicy, RegisteredComponent,
  RunContext, RunError, RunOutput, required,
};
use lunar_config::{
  ComponentDependency, ComponentInput, ComponentModel, ComponentOutput, DataType, Outcome, ResultSet,
  WorkflowModel,
};
use lunar_runtime::{ChannelNotifier, ExecutionEvent, ResultCache, Scheduler, UPSTREAM_FAILED};
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;

/// Echoes `input` and counts its runs.
struct Counter {
  calls: Arc<AtomicUsize>,
}

impl Component for Counter {
  fn run(&self, _ctx: &RunContext, inputs: Map<String, Value>) -> Result<RunOutput, RunError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    Ok(RunOutput::Value(required(&inputs, "input")?.clone()))
  }
}

struct Fail;

impl Component for Fail {
  fn run(&self, _ctx: &RunContext, _inputs: Map<String, Value>) -> Result<RunOutput, RunError> {
    Err(RunError::Failed("boom".to_string()))
  }
}

struct Sleepy;

impl Component for Sleepy {
  fn run(&self, _ctx: &RunContext, _inputs: Map<String, Value>) -> Result<RunOutput, RunError> {
    std::thread::sleep(Duration::from_secs(2));
    Ok(RunOutput::Value(json!("late")))
  }
}

/// Joins `left` and `right`, counting its runs.
struct Pair {
  calls: Arc<AtomicUsize>,
}

impl Component for Pair {
  fn run(&self, _ctx: &RunContext, inputs: Map<String, Value>) -> Result<RunOutput, RunError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let left = required(&inputs, "left")?.as_str().unwrap_or_default();
    let right = required(&inputs, "right")?.as_str().unwrap_or_default();
    Ok(RunOutput::Value(json!(format!("{left}{right}"))))
  }
}

/// Streams one item, then breaks.
struct Flaky;

impl Component for Flaky {
  fn run(&self, _ctx: &RunContext, _inputs: Map<String, Value>) -> Result<RunOutput, RunError> {
    let items = vec![Ok(json!("a")), Err(RunError::Failed("stream broke".to_string()))];
    Ok(RunOutput::Stream(Box::new(items.into_iter())))
  }
}

fn scheduler(calls: &Arc<AtomicUsize>) -> Scheduler {
  let mut registry = InMemoryRegistry::with_builtins();
  registry
    .register(RegisteredComponent::native(
      ComponentManifest::new("Counter", DataType::Any).with_input(InputContract::new("input", DataType::Text)),
      Counter {
        calls: calls.clone(),
      },
    ))
    .unwrap();
  registry
    .register(RegisteredComponent::native(
      ComponentManifest::new("Fail", DataType::Text),
      Fail,
    ))
    .unwrap();
  registry
    .register(RegisteredComponent::native(
      ComponentManifest::new("Sleepy", DataType::Text),
      Sleepy,
    ))
    .unwrap();
  registry
    .register(RegisteredComponent::native(
      ComponentManifest::new("Pair", DataType::Text)
        .with_input(InputContract::new("left", DataType::Text).with_mapping(MappingPolicy::Scalar))
        .with_input(InputContract::new("right", DataType::Text).with_mapping(MappingPolicy::Scalar)),
      Pair {
        calls: calls.clone(),
      },
    ))
    .unwrap();
  registry
    .register(RegisteredComponent::native(
      ComponentManifest::new("Flaky", DataType::Stream),
      Flaky,
    ))
    .unwrap();
  Scheduler::new(Arc::new(registry))
}

fn text(label: &str, value: Value) -> ComponentModel {
  ComponentModel::new(
    label,
    "TextInput",
    vec![ComponentInput::new("input", DataType::Template).with_value(value)],
    ComponentOutput::new(DataType::Text),
  )
  .with_label(label)
}

fn counter(label: &str, value: Value) -> ComponentModel {
  ComponentModel::new(
    label,
    "Counter",
    vec![ComponentInput::new("input", DataType::Text).with_value(value)],
    ComponentOutput::new(DataType::Any),
  )
  .with_label(label)
}

fn bare(label: &str, class_name: &str) -> ComponentModel {
  ComponentModel::new(label, class_name, vec![], ComponentOutput::new(DataType::Text)).with_label(label)
}

fn streamer(label: &str, items: Value) -> ComponentModel {
  ComponentModel::new(
    label,
    "ListStreamer",
    vec![ComponentInput::new("input", DataType::List).with_value(items)],
    ComponentOutput::new(DataType::Stream),
  )
  .with_label(label)
}

fn collector(label: &str) -> ComponentModel {
  ComponentModel::new(
    label,
    "StreamCollector",
    vec![ComponentInput::new("input", DataType::Text)],
    ComponentOutput::new(DataType::Text),
  )
  .with_label(label)
}

fn edge(source: &str, target: &str, input_key: &str) -> ComponentDependency {
  ComponentDependency::new(source, target, input_key, None).unwrap()
}

fn output(results: &ResultSet, label: &str) -> Value {
  match results.get(label) {
    Some(Outcome::Completed(model)) => model.output.value.or_null(),
    other => panic!("{label} did not complete: {other:?}"),
  }
}

fn error(results: &ResultSet, label: &str) -> String {
  match results.get(label) {
    Some(Outcome::Failed(message)) => message.clone(),
    other => panic!("{label} did not fail: {other:?}"),
  }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_linear_chain() {
  let calls = Arc::new(AtomicUsize::new(0));
  let workflow = WorkflowModel::new("chain", "")
    .with_component(text("A", json!("hello")))
    .with_component(counter("B", json!("placeholder")))
    .with_dependency(edge("A", "B", "input"));

  let results = scheduler(&calls).run(workflow).await;
  assert_eq!(results.len(), 2);
  assert_eq!(output(&results, "A"), json!("hello"));
  assert_eq!(output(&results, "B"), json!("hello"));
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_list_input_fans_out() {
  let calls = Arc::new(AtomicUsize::new(0));
  let workflow = WorkflowModel::new("fan-out", "").with_component(counter("C", json!(["a", "b"])));

  let results = scheduler(&calls).run(workflow).await;
  assert_eq!(output(&results, "C"), json!(["a", "b"]));
  assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_aggregated_fan_in() {
  let calls = Arc::new(AtomicUsize::new(0));
  let aggregator = ComponentModel::new(
    "Agg",
    "Aggregator",
    vec![ComponentInput::new("inputs", DataType::Aggregated)],
    ComponentOutput::new(DataType::Json),
  )
  .with_label("AGG");
  let workflow = WorkflowModel::new("fan-in", "")
    .with_component(text("A", json!("a")))
    .with_component(text("B", json!("b")))
    .with_component(aggregator)
    .with_dependency(edge("A", "AGG", "inputs"))
    .with_dependency(edge("B", "AGG", "inputs"));

  let results = scheduler(&calls).run(workflow).await;
  assert_eq!(output(&results, "AGG"), json!({"A": "a", "B": "b"}));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failure_propagates_downstream() {
  let calls = Arc::new(AtomicUsize::new(0));
  let workflow = WorkflowModel::new("failing", "")
    .with_component(bare("A", "Fail"))
    .with_component(counter("B", json!("x")))
    .with_component(counter("C", json!("y")))
    .with_component(text("D", json!("independent")))
    .with_dependency(edge("A", "B", "input"))
    .with_dependency(edge("B", "C", "input"));

  let results = scheduler(&calls).run(workflow).await;
  assert_eq!(results.len(), 4);
  assert!(error(&results, "A").contains("boom"));
  assert_eq!(error(&results, "B"), UPSTREAM_FAILED);
  assert_eq!(error(&results, "C"), UPSTREAM_FAILED);
  assert_eq!(output(&results, "D"), json!("independent"));
  assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_template_binding() {
  let calls = Arc::new(AtomicUsize::new(0));
  let workflow = WorkflowModel::new("template", "")
    .with_component(text("NAME", json!("World")))
    .with_component(text("GREETING", json!("Hello, {name}!")))
    .with_dependency(ComponentDependency::new("NAME", "GREETING", "input", Some("name".to_string())).unwrap());

  let results = scheduler(&calls).run(workflow).await;
  assert_eq!(output(&results, "GREETING"), json!("Hello, World!"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unset_environment_variable_fails_component() {
  let calls = Arc::new(AtomicUsize::new(0));
  let workflow = WorkflowModel::new("env", "")
    .with_component(text("A", json!("x")).with_configuration("token", json!("$LUNARENV::NONEXISTENT_VAR")));

  let results = scheduler(&calls).run(workflow).await;
  assert!(error(&results, "A").contains("NONEXISTENT_VAR"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_class_fails_component() {
  let calls = Arc::new(AtomicUsize::new(0));
  let workflow = WorkflowModel::new("unknown", "").with_component(bare("A", "DoesNotExist"));

  let results = scheduler(&calls).run(workflow).await;
  let message = error(&results, "A");
  assert!(message.contains("Component not found: DoesNotExist"));
  assert!(message.contains("TextInput"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stream_consumer_keeps_last_item() {
  let calls = Arc::new(AtomicUsize::new(0));
  let streamer = ComponentModel::new(
    "Streamer",
    "ListStreamer",
    vec![ComponentInput::new("input", DataType::List).with_value(json!(["a", "b", "c"]))],
    ComponentOutput::new(DataType::Stream),
  )
  .with_label("STREAM");
  let collector = ComponentModel::new(
    "Collector",
    "StreamCollector",
    vec![ComponentInput::new("input", DataType::Text)],
    ComponentOutput::new(DataType::Text),
  )
  .with_label("COLLECT");
  let workflow = WorkflowModel::new("stream", "")
    .with_component(streamer)
    .with_component(collector)
    .with_dependency(edge("STREAM", "COLLECT", "input"));

  let results = scheduler(&calls).run(workflow).await;
  assert_eq!(output(&results, "COLLECT"), json!("c"));
  match results.get("STREAM") {
    Some(Outcome::Completed(model)) => assert!(model.output.value.is_undefined()),
    other => panic!("producer should be returned unexecuted: {other:?}"),
  }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_subworkflow_returns_terminal_output() {
  let calls = Arc::new(AtomicUsize::new(0));
  let mut inner_text = text("INNER", json!("inner"));
  inner_text.id = "inner-text".to_string();
  let inner = WorkflowModel::new("inner", "").with_component(inner_text);

  let mut override_input = ComponentInput::new("input", DataType::Text).with_value(json!("overridden"));
  override_input.component_id = Some("inner-text".to_string());
  let outer = ComponentModel::new(
    "Sub",
    "Subworkflow",
    vec![
      ComponentInput::new("workflow", DataType::Workflow).with_value(serde_json::to_value(&inner).unwrap()),
      override_input,
    ],
    ComponentOutput::new(DataType::Any),
  )
  .with_label("SUB");
  let workflow = WorkflowModel::new("outer", "")
    .with_component(outer)
    .with_component(counter("AFTER", json!("x")))
    .with_dependency(edge("SUB", "AFTER", "input"));

  let results = scheduler(&calls).run(workflow).await;
  assert_eq!(output(&results, "SUB"), json!("overridden"));
  assert_eq!(output(&results, "AFTER"), json!("overridden"));
}

fn subworkflow(label: &str, inner: &WorkflowModel) -> ComponentModel {
  ComponentModel::new(
    label,
    "Subworkflow",
    vec![ComponentInput::new("workflow", DataType::Workflow).with_value(serde_json::to_value(inner).unwrap())],
    ComponentOutput::new(DataType::Any),
  )
  .with_label(label)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_subworkflow_output_ignores_unlinked_components() {
  let calls = Arc::new(AtomicUsize::new(0));
  let inner = WorkflowModel::new("inner", "")
    .with_component(text("A", json!("a")))
    .with_component(text("B", json!("b")))
    .with_component(text("C", json!("c")))
    .with_dependency(edge("A", "B", "input"));

  let results = scheduler(&calls)
    .run(WorkflowModel::new("outer", "").with_component(subworkflow("SUB", &inner)))
    .await;
  assert!(matches!(results.get("SUB"), Some(Outcome::Completed(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_subworkflow_with_two_outputs_fails() {
  let calls = Arc::new(AtomicUsize::new(0));
  let inner = WorkflowModel::new("inner", "")
    .with_component(text("A", json!("a")))
    .with_component(text("B", json!("b")))
    .with_component(text("C", json!("c")))
    .with_dependency(edge("A", "B", "input"))
    .with_dependency(edge("A", "C", "input"));

  let results = scheduler(&calls)
    .run(WorkflowModel::new("outer", "").with_component(subworkflow("SUB", &inner)))
    .await;
  assert!(error(&results, "SUB").contains("must have exactly one output component"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_empty_subworkflow_fails() {
  let calls = Arc::new(AtomicUsize::new(0));
  let outer = ComponentModel::new(
    "Sub",
    "Subworkflow",
    vec![ComponentInput::new("workflow", DataType::Workflow).with_value(json!(""))],
    ComponentOutput::new(DataType::Any),
  )
  .with_label("SUB");

  let results = scheduler(&calls).run(WorkflowModel::new("outer", "").with_component(outer)).await;
  assert_eq!(error(&results, "SUB"), "Empty workflow!");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_results_are_cached_unless_forced() {
  let calls = Arc::new(AtomicUsize::new(0));
  let scheduler = scheduler(&calls).with_cache(ResultCache::new());
  let workflow = WorkflowModel::new("cached", "").with_component(counter("C", json!("x")));

  scheduler.run(workflow.clone()).await;
  let results = scheduler.run(workflow).await;
  assert_eq!(output(&results, "C"), json!("x"));
  assert_eq!(calls.load(Ordering::SeqCst), 1);
  assert_eq!(scheduler.cache().len(), 1);

  let forced = WorkflowModel::new("forced", "")
    .with_component(counter("C", json!("x")).with_configuration("force_run", json!(true)));
  scheduler.run(forced).await;
  assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cycle_fails_without_blocking_others() {
  let calls = Arc::new(AtomicUsize::new(0));
  let workflow = WorkflowModel::new("cycle", "")
    .with_component(counter("A", json!("a")))
    .with_component(counter("B", json!("b")))
    .with_component(text("C", json!("free")))
    .with_dependency(edge("A", "B", "input"))
    .with_dependency(edge("B", "A", "input"));

  let results = scheduler(&calls).run(workflow).await;
  assert_eq!(results.len(), 3);
  assert!(error(&results, "A").contains("cycle"));
  assert!(error(&results, "B").contains("cycle"));
  assert_eq!(output(&results, "C"), json!("free"));
  assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_component_timeout() {
  let calls = Arc::new(AtomicUsize::new(0));
  let mut sleepy = bare("SLOW", "Sleepy");
  sleepy.timeout = 1;

  let results = scheduler(&calls).run(WorkflowModel::new("slow", "").with_component(sleepy)).await;
  assert!(error(&results, "SLOW").contains("timed out after 1s"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_events_are_reported() {
  let calls = Arc::new(AtomicUsize::new(0));
  let (tx, mut rx) = mpsc::unbounded_channel();
  let scheduler = scheduler(&calls).with_notifier(Arc::new(ChannelNotifier::new(tx)));
  let workflow = WorkflowModel::new("events", "")
    .with_component(text("A", json!("a")))
    .with_component(bare("B", "Fail"));

  scheduler.run(workflow).await;
  drop(scheduler);

  let mut events = Vec::new();
  while let Ok(event) = rx.try_recv() {
    events.push(event);
  }
  assert!(matches!(events.first(), Some(ExecutionEvent::WorkflowStarted { .. })));
  assert!(matches!(
    events.last(),
    Some(ExecutionEvent::WorkflowCompleted { failed: 1, .. })
  ));
  assert!(events.iter().any(|e| matches!(
    e,
    ExecutionEvent::ComponentCompleted { label, output, .. } if label == "A" && output == &json!("a")
  )));
  assert!(events.iter().any(|e| matches!(
    e,
    ExecutionEvent::ComponentFailed { label, .. } if label == "B"
  )));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run_single_component() {
  let calls = Arc::new(AtomicUsize::new(0));
  let scheduler = scheduler(&calls);

  let results = scheduler.run_component(counter("ONE", json!("solo"))).await;
  assert_eq!(output(&results, "ONE"), json!("solo"));

  let results = scheduler.run_component(bare("BAD", "Fail")).await;
  assert!(error(&results, "BAD").contains("boom"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_two_streams_zip_to_the_shorter() {
  let calls = Arc::new(AtomicUsize::new(0));
  let pair = ComponentModel::new(
    "Pair",
    "Pair",
    vec![
      ComponentInput::new("left", DataType::Text),
      ComponentInput::new("right", DataType::Text),
    ],
    ComponentOutput::new(DataType::Text),
  )
  .with_label("PAIR");
  let workflow = WorkflowModel::new("zip", "")
    .with_component(streamer("LEFT", json!(["a", "b", "c"])))
    .with_component(streamer("RIGHT", json!(["x", "y"])))
    .with_component(pair)
    .with_dependency(edge("LEFT", "PAIR", "left"))
    .with_dependency(edge("RIGHT", "PAIR", "right"));

  let results = scheduler(&calls).run(workflow).await;
  assert_eq!(output(&results, "PAIR"), json!("by"));
  assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_broken_stream_fails_consumer() {
  let calls = Arc::new(AtomicUsize::new(0));
  let flaky = ComponentModel::new("Flaky", "Flaky", vec![], ComponentOutput::new(DataType::Stream))
    .with_label("FLAKY");
  let workflow = WorkflowModel::new("broken", "")
    .with_component(flaky)
    .with_component(collector("COLLECT"))
    .with_component(counter("AFTER", json!("x")))
    .with_dependency(edge("FLAKY", "COLLECT", "input"))
    .with_dependency(edge("COLLECT", "AFTER", "input"));

  let results = scheduler(&calls).run(workflow).await;
  let message = error(&results, "COLLECT");
  assert!(message.starts_with("FLAKY"));
  assert!(message.contains("stream broke"));
  assert_eq!(error(&results, "AFTER"), UPSTREAM_FAILED);
  assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stream_consumer_fed_by_a_stream_runs_per_item() {
  let calls = Arc::new(AtomicUsize::new(0));
  let workflow = WorkflowModel::new("chained", "")
    .with_component(streamer("OUTER", json!([["a", "b"], ["c", "d"]])))
    .with_component(streamer("INNER", json!([])))
    .with_component(collector("COLLECT"))
    .with_dependency(edge("OUTER", "INNER", "input"))
    .with_dependency(edge("INNER", "COLLECT", "input"));

  let results = scheduler(&calls).run(workflow).await;
  assert_eq!(output(&results, "INNER"), json!(["c", "d"]));
  assert_eq!(output(&results, "COLLECT"), json!(["c", "d"]));
  match results.get("OUTER") {
    Some(Outcome::Completed(model)) => assert!(model.output.value.is_undefined()),
    other => panic!("producer should be returned unexecuted: {other:?}"),
  }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unset_inputs_are_never_served_from_cache() {
  let calls = Arc::new(AtomicUsize::new(0));
  let scheduler = scheduler(&calls).with_cache(ResultCache::new());
  let unset = ComponentModel::new(
    "C",
    "Counter",
    vec![ComponentInput::new("input", DataType::Text)],
    ComponentOutput::new(DataType::Any),
  )
  .with_label("C");
  let workflow = WorkflowModel::new("unset", "").with_component(unset);

  scheduler.run(workflow.clone()).await;
  scheduler.run(workflow).await;
  assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_workflow_timeout_fails_unfinished_components() {
  let calls = Arc::new(AtomicUsize::new(0));
  let mut sleepy = bare("SLOW", "Sleepy");
  sleepy.timeout = 0;
  let mut workflow = WorkflowModel::new("slow", "")
    .with_component(sleepy)
    .with_component(text("QUICK", json!("done")))
    .with_component(counter("AFTER", json!("x")))
    .with_dependency(edge("SLOW", "AFTER", "input"));
  workflow.timeout = 1;

  let results = scheduler(&calls).run(workflow).await;
  assert_eq!(error(&results, "SLOW"), "Workflow slow timed out after 1s");
  assert_eq!(error(&results, "AFTER"), UPSTREAM_FAILED);
  assert_eq!(output(&results, "QUICK"), json!("done"));
  assert_eq!(calls.load(Ordering::SeqCst), 0);
}
