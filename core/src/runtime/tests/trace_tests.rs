//! Trace entries and line markers produced while a script runs

use super::helpers::{run, run_with};
use crate::runtime::{Context, Value};
use crate::trace::{LineMarker, Snapshot, Trace};
use serde_json::json;

fn comments(trace: &[Trace]) -> Vec<(String, usize)> {
    trace
        .iter()
        .filter_map(|t| match t {
            Trace::Comment { text, line } => Some((text.clone(), *line)),
            _ => None,
        })
        .collect()
}

fn logs(trace: &[Trace]) -> Vec<String> {
    trace
        .iter()
        .filter_map(|t| match t {
            Trace::Log { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

/* ===================== Comments and Logs ===================== */

#[tokio::test]
async fn test_comments_repeat_per_iteration() {
    let source = "// begin
for (let i = 0; i < 2; i++) {
  // step
  i
}";
    let result = run(source).await;
    assert_eq!(
        comments(&result.trace),
        vec![
            ("begin".to_string(), 1),
            ("step".to_string(), 3),
            ("step".to_string(), 3)
        ]
    );
}

#[tokio::test]
async fn test_unreached_comments_are_not_traced() {
    let result = run("if (false) {\n  // never\n  1\n}\n// after").await;
    assert_eq!(comments(&result.trace), vec![("after".to_string(), 5)]);
}

#[tokio::test]
async fn test_console_log_formats_arguments() {
    let source = "console.log('total', 3, { a: [1, 'x'] }, null, undefined)\nconsole.log('done')";
    let result = run(source).await;
    assert_eq!(
        logs(&result.trace),
        vec![
            "total 3 {\"a\":[1,\"x\"]} null undefined".to_string(),
            "done".to_string()
        ]
    );
}

#[tokio::test]
async fn test_console_log_marks_cycles() {
    let result = run("const o = { a: 1 }\no.self = o\nconsole.log(o)").await;
    assert_eq!(logs(&result.trace), vec!["{\"a\":1,\"self\":\"[Circular]\"}".to_string()]);
}

#[tokio::test]
async fn test_other_console_levels_are_not_traced() {
    let result = run("console.warn('careful')\nconsole.error('bad')").await;
    assert!(result.result.is_ok());
    assert!(logs(&result.trace).is_empty());
}

/* ===================== Line Markers ===================== */

#[tokio::test]
async fn test_line_markers_follow_calls_into_functions() {
    let source = "function f() {
  return 1
}
f()";
    let result = run(source).await;
    let call = result.lines.iter().position(|m| *m == LineMarker { line: 4, depth: 0 });
    let body = result.lines.iter().position(|m| *m == LineMarker { line: 2, depth: 1 });
    assert!(call.is_some());
    assert!(body.is_some());
    assert!(call < body);
}

#[tokio::test]
async fn test_line_markers_stop_at_failure() {
    let result = run("const a = 1\nthrow new Error('stop')\nconst b = 2").await;
    assert!(result.result.is_err());
    assert_eq!(result.lines.last().map(|m| m.line), Some(2));
    assert!(!result.lines.iter().any(|m| m.line == 3));
}

/* ===================== Tag Literals ===================== */

#[tokio::test]
async fn test_tag_literal_payload() {
    let source = "const who = 'Ada'
const extra = { tone: 'warm' }
return <Card:Wide title={who} pinned {...extra}>Hi {who}, {missing}</Card:Wide>";
    let result = run(source).await;
    assert_eq!(
        result.json(),
        json!({
            "__jsx": true,
            "type": "CARD:WIDE",
            "props": {"title": "Ada", "pinned": true, "tone": "warm"},
            "children": ["Hi ", "Ada", ", ", "missing"]
        })
    );
}

#[tokio::test]
async fn test_tag_children_drop_empty_values() {
    let source = "const flag = false\nreturn <Note>{flag}{null}{[1, 2]}</Note>";
    let result = run(source).await;
    assert_eq!(result.json()["children"], json!([1, 2]));
}

#[tokio::test]
async fn test_html_in_tag_children_becomes_markdown() {
    let result = run("return <Message>It's a <b>bold</b> move</Message>").await;
    assert_eq!(result.json()["children"], json!(["It's a **bold** move"]));

    let source = "const url = 'https://example.com'
return <Message><p>Visit <a href=\"https://example.com\">our site</a></p><a href={url}>dynamic</a></Message>";
    let result = run(source).await;
    let children = result.json()["children"].clone();
    assert_eq!(children[0], json!("Visit [our site](https://example.com) \n \n"));
    assert_eq!(children[1]["type"], json!("A"));
}

#[tokio::test]
async fn test_yield_falls_back_to_base_component_name() {
    let context = Context::new().with(
        "card",
        Value::host_fn("card", |args: Vec<Value>| {
            let kind = args
                .first()
                .and_then(|p| p.as_object())
                .and_then(|o| o.get_data("type"))
                .map(|t| t.to_display())
                .unwrap_or_default();
            Ok(Value::from(format!("rendered {}", kind)))
        }),
    );
    let result = run_with("return yield <Card:Wide />", context).await;
    assert_eq!(result.json(), json!("rendered CARD:WIDE"));
    assert!(matches!(
        result.trace.as_slice(),
        [Trace::Yield { component, .. }] if component == "CARD:WIDE"
    ));
}

#[tokio::test]
async fn test_yield_without_handler_fails() {
    let result = run("yield <Missing />").await;
    assert_eq!(result.thrown().message(), "No function bound for <MISSING>");
}

/* ===================== Tool Calls ===================== */

#[tokio::test]
async fn test_tool_calls_record_inputs_and_errors() {
    let context = Context::new()
        .with("add", Value::host_fn("add", |args: Vec<Value>| {
            Ok(Value::from(args.iter().map(|a| a.to_number()).sum::<f64>()))
        }))
        .with("boom", Value::host_fn("boom", |_args: Vec<Value>| Err("kaput".into())));
    let result = run_with("add(1, 2)\nboom()", context).await;
    assert!(result.thrown().from_host);
    assert_eq!(
        result.trace,
        vec![
            Trace::ToolCall {
                name: "add".to_string(),
                input: Snapshot::Array(vec![Snapshot::Num(1.0), Snapshot::Num(2.0)]),
                output: Some(Snapshot::Num(3.0)),
                error: None,
            },
            Trace::ToolCall {
                name: "boom".to_string(),
                input: Snapshot::Undefined,
                output: None,
                error: Some("kaput".to_string()),
            },
        ]
    );
}
