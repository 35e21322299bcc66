//! Instrumentation intrinsics and the builtin console

use crate::compiler::ast::Span;
use crate::runtime::control::{EvalResult, RtResult};
use crate::runtime::scope::Env;
use crate::runtime::stdlib::{arg, ConsoleLevel};
use crate::runtime::value::{ObjectRef, Value};
use crate::runtime::vm::VM;
use crate::trace::Trace;

/// Payload object for a tag literal
pub fn make_tag(type_name: &str, props: Value, children: Vec<Value>) -> Value {
    let mut flat = Vec::new();
    for child in children {
        match child {
            Value::Array(items) => flat.extend(items.items().into_iter().filter(renders)),
            other if renders(&other) => flat.push(other),
            _ => {}
        }
    }
    let props = match props {
        Value::Object(_) => props,
        _ => Value::Object(ObjectRef::new()),
    };
    Value::object([
        ("__jsx", Value::Bool(true)),
        ("type", Value::from(type_name)),
        ("props", props),
        ("children", Value::array(flat)),
    ])
}

/// Children that render as nothing are dropped
fn renders(child: &Value) -> bool {
    !matches!(child, Value::Undefined | Value::Null | Value::Bool(_))
}

/// `__tag(type, props, children)`
pub fn tag(args: &[Value]) -> RtResult<Value> {
    let type_name = arg(args, 0).to_display();
    let children = match arg(args, 2) {
        Value::Array(items) => items.items(),
        Value::Undefined => Vec::new(),
        other => vec![other],
    };
    Ok(make_tag(&type_name, arg(args, 1), children))
}

/// One `console.log` argument: strings as-is, everything else as JSON
pub fn format_log_arg(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        Value::Undefined => "undefined".to_string(),
        Value::Function(_) | Value::Promise(_) => value.to_display(),
        other => match other.to_json_marking_cycles() {
            Some(json) => json.to_string(),
            None => other.to_display(),
        },
    }
}

pub fn format_log_message(args: &[Value]) -> String {
    args.iter().map(format_log_arg).collect::<Vec<_>>().join(" ")
}

impl VM {
    /// `__log(fn, ...args)`: record a log entry, then make the original call
    pub(crate) async fn intrinsic_log(&mut self, mut args: Vec<Value>, site: Span, env: &Env) -> EvalResult {
        if args.is_empty() {
            return Ok(Value::Undefined);
        }
        let target = args.remove(0);
        self.hooks.trace.push(Trace::Log {
            message: format_log_message(&args),
        });
        match target {
            Value::Function(_) => self.call_untraced(target, args, site, env).await,
            _ => Ok(Value::Undefined),
        }
    }

    pub(crate) fn console(&self, level: ConsoleLevel, args: &[Value]) {
        if !self.hooks.console_passthrough {
            return;
        }
        let message = format_log_message(args);
        match level {
            ConsoleLevel::Error => tracing::error!(target: "sandscript::console", "{}", message),
            ConsoleLevel::Warn => tracing::warn!(target: "sandscript::console", "{}", message),
            ConsoleLevel::Debug => tracing::debug!(target: "sandscript::console", "{}", message),
            ConsoleLevel::Log | ConsoleLevel::Info => tracing::info!(target: "sandscript::console", "{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tag_payload_shape() {
        let props = Value::object([("label", Value::from("Go"))]);
        let payload = make_tag(
            "BUTTON",
            props,
            vec![
                Value::from("Hi "),
                Value::array(vec![Value::from("a"), Value::Null]),
                Value::Bool(false),
            ],
        );
        assert_eq!(
            payload.to_json(),
            Some(json!({
                "__jsx": true,
                "type": "BUTTON",
                "props": {"label": "Go"},
                "children": ["Hi ", "a"]
            }))
        );
    }

    #[test]
    fn test_log_formatting() {
        let args = vec![
            Value::from("count:"),
            Value::from(3),
            Value::object([("a", Value::from(1))]),
            Value::Undefined,
        ];
        assert_eq!(format_log_message(&args), "count: 3 {\"a\":1} undefined");
    }

    #[test]
    fn test_log_formatting_marks_cycles() {
        let node = Value::object([("name", Value::from("root"))]);
        if let Value::Object(obj) = &node {
            obj.insert("self", node.clone());
        }
        assert_eq!(format_log_arg(&node), "{\"name\":\"root\",\"self\":\"[Circular]\"}");
        assert_eq!(node.to_json(), Some(serde_json::json!({"name": "root", "self": null})));
    }
}
