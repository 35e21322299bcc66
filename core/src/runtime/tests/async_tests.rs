//! Async functions, host futures and promise chaining

use std::time::Duration;

use super::helpers::{error_message, eval_json, run_with};
use crate::runtime::{Context, HostError, Value};
use crate::trace::{Snapshot, Trace};
use serde_json::json;

fn host_context() -> Context {
    Context::new()
        .with(
            "double",
            Value::host_async_fn("double", |args: Vec<Value>| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                let n = args.first().map(|v| v.to_number()).unwrap_or(0.0);
                Ok(Value::from(n * 2.0))
            }),
        )
        .with(
            "fail",
            Value::host_async_fn("fail", |_args: Vec<Value>| async move {
                Err::<Value, HostError>(HostError::from("service unavailable"))
            }),
        )
}

#[tokio::test]
async fn test_async_function_returns_awaitable_value() {
    let source = "async function add(a, b) { return a + b }
const p = add(1, 2)
return [typeof p, await p]";
    assert_eq!(eval_json(source).await, json!(["object", 3]));
}

#[tokio::test]
async fn test_await_host_async_function() {
    let result = run_with("const x = await double(21)\nreturn x + 1", host_context()).await;
    assert_eq!(result.json(), json!(43));
}

#[tokio::test]
async fn test_async_tool_call_records_output() {
    let result = run_with("return await double(4)", host_context()).await;
    assert_eq!(result.json(), json!(8));
    assert_eq!(
        result.trace,
        vec![Trace::ToolCall {
            name: "double".to_string(),
            input: Snapshot::Num(4.0),
            output: Some(Snapshot::Num(8.0)),
            error: None,
        }]
    );
}

#[tokio::test]
async fn test_promise_all_mixes_promises_and_values() {
    let result = run_with("return Promise.all([double(1), double(2), 3])", host_context()).await;
    assert_eq!(result.json(), json!([2, 4, 3]));
}

#[tokio::test]
async fn test_promise_all_with_async_callbacks() {
    let source = "const out = await Promise.all([1, 2, 3].map(async x => (await double(x)) + 1))\nreturn out";
    let result = run_with(source, host_context()).await;
    assert_eq!(result.json(), json!([3, 5, 7]));
}

#[tokio::test]
async fn test_then_chain() {
    assert_eq!(
        eval_json("return Promise.resolve(2).then(x => x * 3).then(x => x + 1)").await,
        json!(7)
    );
}

#[tokio::test]
async fn test_catch_handles_rejection() {
    assert_eq!(
        eval_json("return Promise.reject(new Error('no')).catch(e => e.message)").await,
        json!("no")
    );
}

#[tokio::test]
async fn test_finally_runs_and_passes_value_through() {
    let source = "const log = []
const v = await Promise.resolve(1).finally(() => log.push('f'))
return [v, log]";
    assert_eq!(eval_json(source).await, json!([1, ["f"]]));
}

#[tokio::test]
async fn test_throw_inside_then_becomes_rejection() {
    let source = "return Promise.resolve(1)
  .then(() => { throw new Error('late') })
  .catch(e => 'recovered ' + e.message)";
    assert_eq!(eval_json(source).await, json!("recovered late"));
}

#[tokio::test]
async fn test_rejected_async_function_is_catchable() {
    let source = "async function f() { throw new Error('x') }
try {
  await f()
} catch (e) {
  return 'caught ' + e.message
}";
    assert_eq!(eval_json(source).await, json!("caught x"));
}

#[tokio::test]
async fn test_async_host_failure_is_not_catchable() {
    let source = "try {\n  await fail()\n} catch (e) {\n  return 'caught'\n}";
    let result = run_with(source, host_context()).await;
    let thrown = result.thrown();
    assert!(thrown.from_host);
    assert_eq!(thrown.message(), "service unavailable");
}

#[tokio::test]
async fn test_async_host_failure_is_not_a_rejection() {
    let source = "async function load() { return await fail() }
try {
  await load()
} catch (e) {
  return 'caught'
}";
    let result = run_with(source, host_context()).await;
    assert!(result.thrown().from_host);
}

#[tokio::test]
async fn test_promise_constructor_is_unsupported() {
    assert_eq!(
        error_message("return new Promise(() => {})").await,
        "Promise constructor is not supported"
    );
}
