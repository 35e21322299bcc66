//! `JSON.stringify` and `JSON.parse`

use std::collections::HashSet;

use crate::runtime::control::{RtResult, RuntimeError};
use crate::runtime::stdlib::{arg, date};
use crate::runtime::value::{format_number, ObjectClass, Value};

pub fn stringify(args: &[Value]) -> RtResult<Value> {
    let indent = match arg(args, 2) {
        Value::Num(n) => " ".repeat(n.clamp(0.0, 10.0) as usize),
        Value::Str(s) => s.chars().take(10).collect(),
        _ => String::new(),
    };
    let mut seen = HashSet::new();
    let mut out = String::new();
    if write_value(&arg(args, 0), &indent, 0, &mut seen, &mut out)? {
        Ok(Value::Str(out))
    } else {
        Ok(Value::Undefined)
    }
}

pub fn parse(args: &[Value]) -> RtResult<Value> {
    let text = arg(args, 0).to_display();
    serde_json::from_str::<serde_json::Value>(&text)
        .map(|json| Value::from_json(&json))
        .map_err(|e| RuntimeError::syntax_error(format!("Unexpected token in JSON: {}", e)))
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

fn newline(indent: &str, level: usize, out: &mut String) {
    if !indent.is_empty() {
        out.push('\n');
        out.push_str(&indent.repeat(level));
    }
}

/// Append the JSON text of `value`. Returns false for values JSON skips.
fn write_value(
    value: &Value,
    indent: &str,
    level: usize,
    seen: &mut HashSet<usize>,
    out: &mut String,
) -> RtResult<bool> {
    match value {
        Value::Undefined | Value::Function(_) => return Ok(false),
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Num(n) if n.is_finite() => out.push_str(&format_number(*n)),
        Value::Num(_) => out.push_str("null"),
        Value::Str(s) => out.push_str(&quote(s)),
        Value::Promise(_) => out.push_str("{}"),
        Value::Array(arr) => {
            if !seen.insert(arr.id()) {
                return Err(RuntimeError::type_error("Converting circular structure to JSON"));
            }
            let items = arr.items();
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                newline(indent, level + 1, out);
                if !write_value(item, indent, level + 1, seen, out)? {
                    out.push_str("null");
                }
            }
            if !items.is_empty() {
                newline(indent, level, out);
            }
            out.push(']');
            seen.remove(&arr.id());
        }
        Value::Object(obj) => {
            if let ObjectClass::Date(ms) = obj.class() {
                match date::format_iso(ms) {
                    Some(iso) => out.push_str(&quote(&iso)),
                    None => out.push_str("null"),
                }
                return Ok(true);
            }
            if !seen.insert(obj.id()) {
                return Err(RuntimeError::type_error("Converting circular structure to JSON"));
            }
            out.push('{');
            let mut wrote_any = false;
            for (key, item) in obj.enumerable_data() {
                let mark = out.len();
                if wrote_any {
                    out.push(',');
                }
                newline(indent, level + 1, out);
                out.push_str(&quote(&key));
                out.push(':');
                if !indent.is_empty() {
                    out.push(' ');
                }
                if write_value(&item, indent, level + 1, seen, out)? {
                    wrote_any = true;
                } else {
                    out.truncate(mark);
                }
            }
            if wrote_any {
                newline(indent, level, out);
            }
            out.push('}');
            seen.remove(&obj.id());
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stringify_str(value: Value) -> String {
        stringify(&[value]).unwrap().as_str().unwrap().to_string()
    }

    #[test]
    fn test_stringify_keeps_insertion_order() {
        let v = Value::object([("b", Value::from(1)), ("a", Value::from("x")), ("u", Value::Undefined)]);
        assert_eq!(stringify_str(v), r#"{"b":1,"a":"x"}"#);
    }

    #[test]
    fn test_stringify_indent() {
        let v = Value::object([("a", Value::array(vec![Value::from(1)]))]);
        let out = stringify(&[v, Value::Null, Value::from(2)]).unwrap();
        assert_eq!(out.as_str(), Some("{\n  \"a\": [\n    1\n  ]\n}"));
    }

    #[test]
    fn test_stringify_cycle_fails() {
        let v = Value::object([("a", Value::Null)]);
        v.as_object().unwrap().insert("self", v.clone());
        let err = stringify(&[v]).unwrap_err();
        assert_eq!(err.message, "Converting circular structure to JSON");
    }

    #[test]
    fn test_parse() {
        let v = parse(&[Value::from(r#"{"z":1,"a":[true,null]}"#)]).unwrap();
        assert_eq!(v.as_object().unwrap().keys(), vec!["z", "a"]);
        assert!(parse(&[Value::from("{oops")]).is_err());
    }
}
