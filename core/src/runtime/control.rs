//! Control flow and unwinding
//!
//! `Control` is the normal completion of a statement. `Unwind` is everything
//! that leaves a statement abnormally: a script-level throw (catchable), a
//! host signal, an abort or a timeout (none of which a script can catch).

use std::collections::BTreeMap;

use crate::compiler::ast::Span;
use crate::runtime::value::{ObjectClass, ObjectRef, Property, Value};
use crate::trace::Snapshot;

/// Completion of a statement that did not unwind
#[derive(Debug, Clone)]
pub enum Control {
    None,
    Break,
    Continue,
    Return(Value),
}

/// A thrown script value and the call sites it passed through, innermost first
#[derive(Debug, Clone)]
pub struct Thrown {
    pub value: Value,
    pub frames: Vec<Span>,
    /// Raised by a host function; fails the run without reaching `catch`
    pub from_host: bool,
}

impl Thrown {
    pub fn new(value: Value, frames: Vec<Span>) -> Self {
        Self {
            value,
            frames,
            from_host: false,
        }
    }

    /// Message reported for an uncaught throw
    pub fn message(&self) -> String {
        match &self.value {
            Value::Object(obj) if obj.class() == ObjectClass::Error => obj
                .get_data("message")
                .map(|m| m.to_display())
                .unwrap_or_default(),
            other => other.to_display(),
        }
    }
}

/// A host signal raised while the script was running
#[derive(Debug, Clone)]
pub struct RaisedSignal {
    pub message: String,
    pub frames: Vec<Span>,
    pub variables: BTreeMap<String, Snapshot>,
}

#[derive(Debug, Clone)]
pub enum Unwind {
    Throw(Thrown),
    Signal(RaisedSignal),
    Abort,
    /// Deadline passed while executing at this position
    Timeout(Span),
}

pub type ExecResult = Result<Control, Unwind>;
pub type EvalResult = Result<Value, Unwind>;

/* ===================== Script Errors ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
    ReferenceError,
    SyntaxError,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::SyntaxError => "SyntaxError",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Error" => Some(ErrorKind::Error),
            "TypeError" => Some(ErrorKind::TypeError),
            "RangeError" => Some(ErrorKind::RangeError),
            "ReferenceError" => Some(ErrorKind::ReferenceError),
            "SyntaxError" => Some(ErrorKind::SyntaxError),
            _ => None,
        }
    }
}

/// Failure inside a runtime primitive, turned into a thrown error object
/// once the interpreter knows where it happened
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RuntimeError {
    pub fn type_error(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::TypeError,
            message: message.into(),
        }
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::RangeError,
            message: message.into(),
        }
    }

    pub fn reference_error(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ReferenceError,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Error,
            message: message.into(),
        }
    }

    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::SyntaxError,
            message: message.into(),
        }
    }

    pub fn into_value(self) -> Value {
        make_error(self.kind, &self.message)
    }
}

pub type RtResult<T> = Result<T, RuntimeError>;

/// Longest string a script may build, in bytes
pub const MAX_STRING_LENGTH: usize = 1 << 29;

/// Most elements a script array may hold
pub const MAX_ARRAY_LENGTH: usize = 1 << 24;

pub fn check_string_length(len: f64) -> RtResult<()> {
    if len > MAX_STRING_LENGTH as f64 {
        return Err(RuntimeError::range_error("Invalid string length"));
    }
    Ok(())
}

pub fn check_array_length(len: f64) -> RtResult<()> {
    if len > MAX_ARRAY_LENGTH as f64 {
        return Err(RuntimeError::range_error("Invalid array length"));
    }
    Ok(())
}

/// Build an error object the way `new Error(message)` does
pub fn make_error(kind: ErrorKind, message: &str) -> Value {
    let obj = ObjectRef::with_class(ObjectClass::Error);
    obj.define("name", Property::hidden(Value::from(kind.name())));
    obj.define("message", Property::hidden(Value::from(message)));
    let stack = if message.is_empty() {
        kind.name().to_string()
    } else {
        format!("{}: {}", kind.name(), message)
    };
    obj.define("stack", Property::hidden(Value::from(stack)));
    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_object_fields_are_hidden() {
        let err = make_error(ErrorKind::TypeError, "boom");
        let obj = err.as_object().cloned().unwrap();
        assert!(obj.keys().is_empty());
        assert_eq!(err.to_display(), "TypeError: boom");
        let thrown = Thrown::new(err, vec![]);
        assert_eq!(thrown.message(), "boom");
    }

    #[test]
    fn test_non_error_throw_message() {
        let thrown = Thrown::new(Value::from("plain"), vec![]);
        assert_eq!(thrown.message(), "plain");
    }
}
