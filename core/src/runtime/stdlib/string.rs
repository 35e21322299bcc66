//! String methods
//!
//! Indices are in characters, not bytes.

use crate::runtime::control::{check_string_length, RtResult, RuntimeError};
use crate::runtime::stdlib::{arg, relative_index};
use crate::runtime::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringMethod {
    ToUpperCase,
    ToLowerCase,
    Trim,
    TrimStart,
    TrimEnd,
    Split,
    Includes,
    StartsWith,
    EndsWith,
    IndexOf,
    LastIndexOf,
    Slice,
    Substring,
    Replace,
    ReplaceAll,
    Repeat,
    PadStart,
    PadEnd,
    CharAt,
    At,
    Concat,
}

const METHODS: &[(&str, StringMethod)] = &[
    ("toUpperCase", StringMethod::ToUpperCase),
    ("toLowerCase", StringMethod::ToLowerCase),
    ("trim", StringMethod::Trim),
    ("trimStart", StringMethod::TrimStart),
    ("trimEnd", StringMethod::TrimEnd),
    ("split", StringMethod::Split),
    ("includes", StringMethod::Includes),
    ("startsWith", StringMethod::StartsWith),
    ("endsWith", StringMethod::EndsWith),
    ("indexOf", StringMethod::IndexOf),
    ("lastIndexOf", StringMethod::LastIndexOf),
    ("slice", StringMethod::Slice),
    ("substring", StringMethod::Substring),
    ("replace", StringMethod::Replace),
    ("replaceAll", StringMethod::ReplaceAll),
    ("repeat", StringMethod::Repeat),
    ("padStart", StringMethod::PadStart),
    ("padEnd", StringMethod::PadEnd),
    ("charAt", StringMethod::CharAt),
    ("at", StringMethod::At),
    ("concat", StringMethod::Concat),
];

impl StringMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        METHODS.iter().find(|(n, _)| *n == name).map(|(_, m)| *m)
    }

    pub fn name(&self) -> &'static str {
        METHODS
            .iter()
            .find(|(_, m)| m == self)
            .map(|(n, _)| *n)
            .unwrap_or("")
    }
}

fn char_index_of(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    (from..=haystack.len().saturating_sub(needle.len())).find(|&i| haystack[i..].starts_with(needle))
}

fn pad(s: &str, target: &Value, filler: &Value, at_start: bool) -> RtResult<String> {
    let target = target.to_number();
    let len = s.chars().count();
    let filler = match filler {
        Value::Undefined => " ".to_string(),
        other => other.to_display(),
    };
    if target.is_nan() || target <= len as f64 || filler.is_empty() {
        return Ok(s.to_string());
    }
    check_string_length(target)?;
    let padding: String = filler.chars().cycle().take(target as usize - len).collect();
    check_string_length((s.len() + padding.len()) as f64)?;
    Ok(if at_start {
        format!("{}{}", padding, s)
    } else {
        format!("{}{}", s, padding)
    })
}

pub fn call(method: StringMethod, this: &Value, args: &[Value]) -> RtResult<Value> {
    let s = this.to_display();
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let text = |i: usize| arg(args, i).to_display();

    let value = match method {
        StringMethod::ToUpperCase => Value::Str(s.to_uppercase()),
        StringMethod::ToLowerCase => Value::Str(s.to_lowercase()),
        StringMethod::Trim => Value::Str(s.trim().to_string()),
        StringMethod::TrimStart => Value::Str(s.trim_start().to_string()),
        StringMethod::TrimEnd => Value::Str(s.trim_end().to_string()),
        StringMethod::Split => match arg(args, 0) {
            Value::Undefined => Value::array(vec![Value::Str(s.clone())]),
            sep => {
                let sep = sep.to_display();
                let parts: Vec<Value> = if sep.is_empty() {
                    chars.iter().map(|c| Value::Str(c.to_string())).collect()
                } else {
                    s.split(sep.as_str()).map(Value::from).collect()
                };
                match arg(args, 1) {
                    Value::Undefined => Value::array(parts),
                    limit => Value::array(parts.into_iter().take(limit.to_number().max(0.0) as usize)),
                }
            }
        },
        StringMethod::Includes => Value::Bool(s.contains(text(0).as_str())),
        StringMethod::StartsWith => Value::Bool(s.starts_with(text(0).as_str())),
        StringMethod::EndsWith => Value::Bool(s.ends_with(text(0).as_str())),
        StringMethod::IndexOf => {
            let needle: Vec<char> = text(0).chars().collect();
            let from = relative_index(&arg(args, 1), len, 0);
            Value::Num(char_index_of(&chars, &needle, from).map(|i| i as f64).unwrap_or(-1.0))
        }
        StringMethod::LastIndexOf => {
            let needle: Vec<char> = text(0).chars().collect();
            let found = (0..=len.saturating_sub(needle.len()))
                .rev()
                .find(|&i| chars[i..].starts_with(&needle));
            Value::Num(found.map(|i| i as f64).unwrap_or(-1.0))
        }
        StringMethod::Slice => {
            let start = relative_index(&arg(args, 0), len, 0);
            let end = relative_index(&arg(args, 1), len, len);
            Value::Str(if start < end { chars[start..end].iter().collect() } else { String::new() })
        }
        StringMethod::Substring => {
            let clamp = |v: Value, default: usize| match v {
                Value::Undefined => default,
                other => {
                    let n = other.to_number();
                    if n.is_nan() {
                        0
                    } else {
                        n.clamp(0.0, len as f64) as usize
                    }
                }
            };
            let a = clamp(arg(args, 0), 0);
            let b = clamp(arg(args, 1), len);
            let (start, end) = if a <= b { (a, b) } else { (b, a) };
            Value::Str(chars[start..end].iter().collect())
        }
        StringMethod::Replace => Value::Str(s.replacen(text(0).as_str(), &text(1), 1)),
        StringMethod::ReplaceAll => Value::Str(s.replace(text(0).as_str(), &text(1))),
        StringMethod::Repeat => {
            let n = arg(args, 0).to_number();
            if n < 0.0 || n.is_infinite() {
                return Err(RuntimeError::range_error(format!("Invalid count value: {}", arg(args, 0).to_display())));
            }
            let n = if n.is_nan() || s.is_empty() { 0.0 } else { n.trunc() };
            check_string_length(s.len() as f64 * n)?;
            Value::Str(s.repeat(n as usize))
        }
        StringMethod::PadStart => Value::Str(pad(&s, &arg(args, 0), &arg(args, 1), true)?),
        StringMethod::PadEnd => Value::Str(pad(&s, &arg(args, 0), &arg(args, 1), false)?),
        StringMethod::CharAt => {
            let i = arg(args, 0).to_number();
            let i = if i.is_nan() { 0.0 } else { i };
            Value::Str(
                (i >= 0.0)
                    .then(|| chars.get(i as usize))
                    .flatten()
                    .map(|c| c.to_string())
                    .unwrap_or_default(),
            )
        }
        StringMethod::At => {
            let i = arg(args, 0).to_number();
            let i = if i < 0.0 { len as f64 + i } else { i };
            if i < 0.0 {
                Value::Undefined
            } else {
                chars.get(i as usize).map(|c| Value::Str(c.to_string())).unwrap_or_default()
            }
        }
        StringMethod::Concat => {
            let mut out = s.clone();
            for a in args {
                out.push_str(&a.to_display());
                check_string_length(out.len() as f64)?;
            }
            Value::Str(out)
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(method: StringMethod, s: &str, args: Vec<Value>) -> Value {
        call(method, &Value::from(s), &args).unwrap()
    }

    #[test]
    fn test_split_and_join_shapes() {
        let parts = run(StringMethod::Split, "a,b,c", vec![Value::from(",")]);
        assert_eq!(parts.as_array().unwrap().len(), 3);
        let chars = run(StringMethod::Split, "héllo", vec![Value::from("")]);
        assert_eq!(chars.as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_slice_negative() {
        assert_eq!(run(StringMethod::Slice, "hello", vec![Value::from(-3)]).as_str(), Some("llo"));
        assert_eq!(
            run(StringMethod::Substring, "hello", vec![Value::from(3), Value::from(1)]).as_str(),
            Some("el")
        );
    }

    #[test]
    fn test_pad_and_replace() {
        assert_eq!(
            run(StringMethod::PadStart, "7", vec![Value::from(3), Value::from("0")]).as_str(),
            Some("007")
        );
        assert_eq!(
            run(StringMethod::Replace, "a-b-c", vec![Value::from("-"), Value::from("+")]).as_str(),
            Some("a+b-c")
        );
    }

    #[test]
    fn test_index_of_counts_chars() {
        assert_eq!(run(StringMethod::IndexOf, "héllo", vec![Value::from("l")]).as_f64(), Some(2.0));
        assert_eq!(run(StringMethod::IndexOf, "abc", vec![Value::from("z")]).as_f64(), Some(-1.0));
    }

    #[test]
    fn test_repeat_negative_fails() {
        assert!(call(StringMethod::Repeat, &Value::from("x"), &[Value::from(-1)]).is_err());
    }
}
