//! Execution traces
//!
//! A run appends `Trace` entries (comments, logs, yielded tag literals, host
//! tool calls, failure markers) to a `TraceSink`, and line markers to a
//! `LineRecorder`. Both are cheap shared handles so a caller can keep one and
//! inspect it after the run, including after a failure.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::runtime::value::{lock, format_number, ObjectClass, Property, Value, CIRCULAR};

/* ===================== Snapshots ===================== */

/// Detached, serializable copy of a script value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Snapshot {
    Null,
    Bool(bool),
    Num(#[serde(serialize_with = "serialize_num")] f64),
    Str(String),
    Array(Vec<Snapshot>),
    Object(BTreeMap<String, Snapshot>),
    /// `undefined`; serialized as `null` but kept as a key in objects
    #[serde(skip_deserializing)]
    Undefined,
}

impl Snapshot {
    /// Placeholder used for signal variables that are not primitives
    pub const NON_PRIMITIVE: &'static str = "[[non-primitive]]";

    pub fn is_undefined(&self) -> bool {
        matches!(self, Snapshot::Undefined)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Snapshot for a signal variable: primitives as themselves, everything
    /// else as a placeholder
    pub fn shallow(value: &Value) -> Snapshot {
        if value.is_primitive() {
            Snapshot::from(value)
        } else {
            Snapshot::Str(Self::NON_PRIMITIVE.to_string())
        }
    }

    fn capture(value: &Value, seen: &mut HashSet<usize>) -> Snapshot {
        match value {
            Value::Undefined => Snapshot::Undefined,
            Value::Null => Snapshot::Null,
            Value::Bool(b) => Snapshot::Bool(*b),
            Value::Num(n) if n.is_finite() => Snapshot::Num(*n),
            Value::Num(n) => Snapshot::Str(format_number(*n)),
            Value::Str(s) => Snapshot::Str(s.clone()),
            Value::Function(f) => Snapshot::Str(format!("[Function {}]", f.name())),
            Value::Promise(_) => Snapshot::Str("[Promise]".to_string()),
            Value::Array(arr) => {
                if !seen.insert(arr.id()) {
                    return Snapshot::Str(CIRCULAR.to_string());
                }
                let out = arr.items().iter().map(|v| Snapshot::capture(v, seen)).collect();
                seen.remove(&arr.id());
                Snapshot::Array(out)
            }
            Value::Object(obj) => {
                if !seen.insert(obj.id()) {
                    return Snapshot::Str(CIRCULAR.to_string());
                }
                let props: Vec<(String, Property)> = obj
                    .lock()
                    .props
                    .iter()
                    .filter(|(_, p)| p.is_enumerable())
                    .map(|(k, p)| (k.clone(), p.clone()))
                    .collect();
                let snapshot = match obj.class() {
                    ObjectClass::Date(_) | ObjectClass::Error => Snapshot::Str(value.to_display()),
                    ObjectClass::Plain => {
                        let mut map = BTreeMap::new();
                        for (key, prop) in props {
                            let entry = match prop {
                                Property::Data { value, .. } => Snapshot::capture(&value, seen),
                                Property::Accessor { .. } => Snapshot::Str("[Getter/Setter]".to_string()),
                            };
                            map.insert(key, entry);
                        }
                        Snapshot::Object(map)
                    }
                };
                seen.remove(&obj.id());
                snapshot
            }
        }
    }
}

impl From<&Value> for Snapshot {
    fn from(value: &Value) -> Self {
        let mut seen = HashSet::new();
        Snapshot::capture(value, &mut seen)
    }
}

/// Integral numbers serialize as JSON integers
fn serialize_num<S: serde::Serializer>(n: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        serializer.serialize_i64(*n as i64)
    } else {
        serializer.serialize_f64(*n)
    }
}

/* ===================== Trace Entries ===================== */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trace {
    /// A statement-level comment reached during execution
    Comment { text: String, line: usize },
    /// A `console.log` call, arguments formatted and joined by spaces
    Log { message: String },
    /// A tag literal passed to `yield`
    Yield { component: String, payload: Snapshot },
    /// A call to a host function supplied through the context
    ToolCall {
        name: String,
        input: Snapshot,
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<Snapshot>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Where an uncaught error surfaced, in original coordinates
    FailureMarker { message: String, line: usize, column: usize },
    /// The script could not be compiled
    InvalidCode { message: String },
}

/// Shared, append-only trace buffer
#[derive(Debug, Clone, Default)]
pub struct TraceSink {
    entries: Arc<Mutex<Vec<Trace>>>,
}

impl TraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: Trace) {
        tracing::trace!(?entry, "trace entry");
        lock(&self.entries).push(entry);
    }

    pub fn entries(&self) -> Vec<Trace> {
        lock(&self.entries).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/* ===================== Line Recording ===================== */

/// One executed statement: original line and block nesting depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineMarker {
    pub line: usize,
    pub depth: usize,
}

/// Records the statements a run executed, in execution order
#[derive(Debug, Clone, Default)]
pub struct LineRecorder {
    markers: Arc<Mutex<Vec<LineMarker>>>,
}

impl LineRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, line: usize, depth: usize) {
        lock(&self.markers).push(LineMarker { line, depth });
    }

    pub fn markers(&self) -> Vec<LineMarker> {
        lock(&self.markers).clone()
    }

    /// Distinct lines in first-execution order
    pub fn lines(&self) -> Vec<usize> {
        let mut seen = HashSet::new();
        lock(&self.markers)
            .iter()
            .filter(|m| seen.insert(m.line))
            .map(|m| m.line)
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.markers).clear();
    }
}
