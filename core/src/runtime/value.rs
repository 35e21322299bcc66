//! Runtime value types
//!
//! Objects and arrays are shared handles into lock-protected tables, so a
//! script mutating an object the caller placed in its context mutates the
//! caller's object. Locks are only ever held for the duration of a single
//! table operation and never across an await.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::compiler::ast::FunctionDef;
use crate::runtime::control::Thrown;
use crate::runtime::scope::Env;
use crate::runtime::stdlib::Builtin;
use crate::trace::Snapshot;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Lock a table, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/* ===================== Value ===================== */

/// Placeholder for a value that contains itself
pub const CIRCULAR: &str = "[Circular]";

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(Arc<Callable>),
    Promise(Arc<PromiseCell>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", Snapshot::from(self))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Num(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Num(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Num(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(ArrayRef::new(items))
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(&json)
    }
}

impl Value {
    pub fn object<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::Object(ObjectRef::from_pairs(pairs))
    }

    pub fn array(items: impl IntoIterator<Item = Value>) -> Value {
        Value::Array(ArrayRef::new(items.into_iter().collect()))
    }

    /// A host function the script calls synchronously
    pub fn host_fn<F>(name: &str, f: F) -> Value
    where
        F: Fn(Vec<Value>) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        Value::Function(Arc::new(Callable::Host(HostFunction {
            name: name.to_string(),
            kind: HostKind::Sync(Arc::new(f)),
        })))
    }

    /// A host function returning a future; calling it yields a promise
    pub fn host_async_fn<F, Fut>(name: &str, f: F) -> Value
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HostError>> + Send + 'static,
    {
        let wrapped = move |args: Vec<Value>| -> BoxFuture<'static, Result<Value, HostError>> { Box::pin(f(args)) };
        Value::Function(Arc::new(Callable::Host(HostFunction {
            name: name.to_string(),
            kind: HostKind::Async(Arc::new(wrapped)),
        })))
    }

    pub(crate) fn builtin(func: Builtin, this: Value) -> Value {
        Value::Function(Arc::new(Callable::Builtin(BuiltinFn { func, this })))
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Num(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => Value::array(items.iter().map(Value::from_json)),
            serde_json::Value::Object(map) => {
                Value::object(map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))))
            }
        }
    }

    /// JSON view with `JSON.stringify` semantics: `undefined` and functions
    /// are dropped from objects and become `null` in arrays, cycles become
    /// `null`. Returns `None` for a top-level value JSON cannot represent.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        self.to_json_inner(&mut HashSet::new(), &serde_json::Value::Null)
    }

    /// Like `to_json`, with cycles marked `"[Circular]"`
    pub fn to_json_marking_cycles(&self) -> Option<serde_json::Value> {
        self.to_json_inner(&mut HashSet::new(), &serde_json::Value::from(CIRCULAR))
    }

    fn to_json_inner(&self, seen: &mut HashSet<usize>, cycle: &serde_json::Value) -> Option<serde_json::Value> {
        use serde_json::Value as J;
        match self {
            Value::Undefined | Value::Function(_) => None,
            Value::Promise(_) => Some(J::Object(serde_json::Map::new())),
            Value::Null => Some(J::Null),
            Value::Bool(b) => Some(J::Bool(*b)),
            Value::Num(n) => Some(json_number(*n)),
            Value::Str(s) => Some(J::String(s.clone())),
            Value::Array(arr) => {
                if !seen.insert(arr.id()) {
                    return Some(cycle.clone());
                }
                let items = arr.items();
                let out = items
                    .iter()
                    .map(|v| v.to_json_inner(seen, cycle).unwrap_or(J::Null))
                    .collect();
                seen.remove(&arr.id());
                Some(J::Array(out))
            }
            Value::Object(obj) => {
                if !seen.insert(obj.id()) {
                    return Some(cycle.clone());
                }
                if let ObjectClass::Date(ms) = obj.class() {
                    seen.remove(&obj.id());
                    return Some(J::String(crate::runtime::stdlib::date::iso_string(ms)));
                }
                let mut map = serde_json::Map::new();
                for (key, value) in obj.enumerable_data() {
                    if let Some(json) = value.to_json_inner(seen, cycle) {
                        map.insert(key, json);
                    }
                }
                seen.remove(&obj.id());
                Some(J::Object(map))
            }
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Undefined | Value::Null | Value::Bool(_) | Value::Num(_) | Value::Str(_)
        )
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Function(_) => "function",
            Value::Array(_) | Value::Object(_) | Value::Promise(_) => "object",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Identity comparison for reference values, value comparison otherwise
    pub fn same_ref(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Promise(a), Value::Promise(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// ToNumber
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Num(n) => *n,
            Value::Str(s) => string_to_number(s),
            Value::Array(arr) => {
                let items = arr.items();
                match items.len() {
                    0 => 0.0,
                    1 => items[0].to_number(),
                    _ => f64::NAN,
                }
            }
            Value::Object(obj) => match obj.class() {
                ObjectClass::Date(ms) => ms,
                _ => f64::NAN,
            },
            Value::Function(_) | Value::Promise(_) => f64::NAN,
        }
    }

    /// ToString
    pub fn to_display(&self) -> String {
        let mut seen = HashSet::new();
        self.to_display_inner(&mut seen)
    }

    fn to_display_inner(&self, seen: &mut HashSet<usize>) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Num(n) => format_number(*n),
            Value::Str(s) => s.clone(),
            Value::Array(arr) => {
                if !seen.insert(arr.id()) {
                    return String::new();
                }
                let parts: Vec<String> = arr
                    .items()
                    .iter()
                    .map(|v| {
                        if v.is_nullish() {
                            String::new()
                        } else {
                            v.to_display_inner(seen)
                        }
                    })
                    .collect();
                seen.remove(&arr.id());
                parts.join(",")
            }
            Value::Object(obj) => match obj.class() {
                ObjectClass::Error => {
                    let name = obj.get_data("name").map(|v| v.to_display()).unwrap_or_else(|| "Error".into());
                    let message = obj.get_data("message").map(|v| v.to_display()).unwrap_or_default();
                    if message.is_empty() {
                        name
                    } else {
                        format!("{}: {}", name, message)
                    }
                }
                ObjectClass::Date(ms) => crate::runtime::stdlib::date::iso_string(ms),
                ObjectClass::Plain => "[object Object]".to_string(),
            },
            Value::Function(f) => format!("function {}() {{ [native code] }}", f.name()),
            Value::Promise(_) => "[object Promise]".to_string(),
        }
    }

    /// Property key form of a value
    pub fn to_key(&self) -> String {
        self.to_display()
    }
}

fn json_number(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

/// ToNumber for strings
pub fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    let radix = match t.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0b") | Some("0B") => Some(2),
        Some("0o") | Some("0O") => Some(8),
        _ => None,
    };
    if let Some(radix) = radix {
        return u64::from_str_radix(&t[2..], radix)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }
    if !t.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

/// Number to string the way scripts print numbers
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if (1e-6..1e21).contains(&abs) {
        return format!("{}", n);
    }
    let formatted = format!("{:e}", n);
    match formatted.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
        _ => formatted,
    }
}

/* ===================== Objects ===================== */

#[derive(Clone)]
pub enum Property {
    Data {
        value: Value,
        writable: bool,
        enumerable: bool,
        configurable: bool,
    },
    Accessor {
        get: Option<Value>,
        set: Option<Value>,
        enumerable: bool,
        configurable: bool,
    },
}

impl Property {
    /// Plain writable, enumerable, configurable data property
    pub fn data(value: Value) -> Self {
        Property::Data {
            value,
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    pub fn hidden(value: Value) -> Self {
        Property::Data {
            value,
            writable: true,
            enumerable: false,
            configurable: true,
        }
    }

    pub fn is_enumerable(&self) -> bool {
        match self {
            Property::Data { enumerable, .. } | Property::Accessor { enumerable, .. } => *enumerable,
        }
    }

    pub fn is_configurable(&self) -> bool {
        match self {
            Property::Data { configurable, .. } | Property::Accessor { configurable, .. } => *configurable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObjectClass {
    Plain,
    Error,
    /// Milliseconds since the epoch
    Date(f64),
}

pub struct ObjectData {
    pub props: Vec<(String, Property)>,
    pub extensible: bool,
    pub class: ObjectClass,
}

impl ObjectData {
    pub fn position(&self, key: &str) -> Option<usize> {
        self.props.iter().position(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&Property> {
        self.props.iter().find(|(k, _)| k == key).map(|(_, p)| p)
    }

    /// Non-extensible and every property non-configurable
    pub fn is_sealed(&self) -> bool {
        !self.extensible && self.props.iter().all(|(_, p)| !p.is_configurable())
    }

    pub fn is_frozen(&self) -> bool {
        self.is_sealed()
            && self.props.iter().all(|(_, p)| match p {
                Property::Data { writable, .. } => !writable,
                Property::Accessor { .. } => true,
            })
    }
}

#[derive(Clone)]
pub struct ObjectRef(Arc<Mutex<ObjectData>>);

impl ObjectRef {
    pub fn new() -> Self {
        Self::with_class(ObjectClass::Plain)
    }

    pub fn with_class(class: ObjectClass) -> Self {
        ObjectRef(Arc::new(Mutex::new(ObjectData {
            props: Vec::new(),
            extensible: true,
            class,
        })))
    }

    pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        let obj = ObjectRef::new();
        {
            let mut data = obj.lock();
            for (key, value) in pairs {
                let key = key.into();
                match data.position(&key) {
                    Some(idx) => data.props[idx].1 = Property::data(value),
                    None => data.props.push((key, Property::data(value))),
                }
            }
        }
        obj
    }

    pub fn lock(&self) -> MutexGuard<'_, ObjectData> {
        lock(&self.0)
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn class(&self) -> ObjectClass {
        self.lock().class
    }

    /// Value of an own data property
    pub fn get_data(&self, key: &str) -> Option<Value> {
        match self.lock().get(key) {
            Some(Property::Data { value, .. }) => Some(value.clone()),
            _ => None,
        }
    }

    /// Define or overwrite a plain data property, ignoring attributes
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let mut data = self.lock();
        match data.position(&key) {
            Some(idx) => data.props[idx].1 = Property::data(value),
            None => data.props.push((key, Property::data(value))),
        }
    }

    pub fn define(&self, key: impl Into<String>, prop: Property) {
        let key = key.into();
        let mut data = self.lock();
        match data.position(&key) {
            Some(idx) => data.props[idx].1 = prop,
            None => data.props.push((key, prop)),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock()
            .props
            .iter()
            .filter(|(_, p)| p.is_enumerable())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Enumerable data properties; accessors are skipped
    pub fn enumerable_data(&self) -> Vec<(String, Value)> {
        self.lock()
            .props
            .iter()
            .filter_map(|(k, p)| match p {
                Property::Data {
                    value, enumerable: true, ..
                } => Some((k.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn is_extensible(&self) -> bool {
        self.lock().extensible
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::new()
    }
}

/* ===================== Arrays ===================== */

pub struct ArrayData {
    pub items: Vec<Value>,
    pub frozen: bool,
}

#[derive(Clone)]
pub struct ArrayRef(Arc<Mutex<ArrayData>>);

impl ArrayRef {
    pub fn new(items: Vec<Value>) -> Self {
        ArrayRef(Arc::new(Mutex::new(ArrayData { items, frozen: false })))
    }

    pub fn lock(&self) -> MutexGuard<'_, ArrayData> {
        lock(&self.0)
    }

    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Copy of the current items
    pub fn items(&self) -> Vec<Value> {
        self.lock().items.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Value {
        self.lock().items.get(index).cloned().unwrap_or_default()
    }

    pub fn is_frozen(&self) -> bool {
        self.lock().frozen
    }
}

/* ===================== Functions ===================== */

pub enum Callable {
    Script(Closure),
    Host(HostFunction),
    Builtin(BuiltinFn),
}

impl Callable {
    pub fn name(&self) -> String {
        match self {
            Callable::Script(c) => c.def.name.clone().unwrap_or_default(),
            Callable::Host(h) => h.name.clone(),
            Callable::Builtin(b) => b.func.name().to_string(),
        }
    }
}

pub struct Closure {
    pub def: Arc<FunctionDef>,
    pub env: Env,
}

/// Builtin function, with the receiver it was read from
pub struct BuiltinFn {
    pub func: Builtin,
    pub this: Value,
}

/// Error raised by a host function
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HostError {
    /// Thrown into the script as an `Error` with this message
    #[error("{0}")]
    Message(String),
    /// Ends the run as `Signaled`; scripts cannot catch it
    #[error("{0}")]
    Signal(String),
}

impl From<&str> for HostError {
    fn from(message: &str) -> Self {
        HostError::Message(message.to_string())
    }
}

impl From<String> for HostError {
    fn from(message: String) -> Self {
        HostError::Message(message)
    }
}

impl From<anyhow::Error> for HostError {
    fn from(err: anyhow::Error) -> Self {
        HostError::Message(err.to_string())
    }
}

pub type SyncHostFn = Arc<dyn Fn(Vec<Value>) -> Result<Value, HostError> + Send + Sync>;
pub type AsyncHostFn = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, HostError>> + Send + Sync>;

#[derive(Clone)]
pub enum HostKind {
    Sync(SyncHostFn),
    Async(AsyncHostFn),
}

#[derive(Clone)]
pub struct HostFunction {
    pub name: String,
    pub kind: HostKind,
}

/* ===================== Promises ===================== */

pub enum PromiseState {
    /// Host work not yet driven; `None` while it is being awaited
    Pending(Option<BoxFuture<'static, Result<Value, HostError>>>),
    Fulfilled(Value),
    Rejected(Thrown),
}

/// Host call recorded once its promise settles
#[derive(Clone)]
pub struct ToolCallInfo {
    pub name: String,
    pub input: Snapshot,
}

pub struct PromiseCell {
    state: Mutex<PromiseState>,
    tool: Option<ToolCallInfo>,
}

impl PromiseCell {
    pub fn pending(fut: BoxFuture<'static, Result<Value, HostError>>, tool: Option<ToolCallInfo>) -> Arc<Self> {
        Arc::new(PromiseCell {
            state: Mutex::new(PromiseState::Pending(Some(fut))),
            tool,
        })
    }

    pub fn fulfilled(value: Value) -> Arc<Self> {
        Arc::new(PromiseCell {
            state: Mutex::new(PromiseState::Fulfilled(value)),
            tool: None,
        })
    }

    pub fn rejected(thrown: Thrown) -> Arc<Self> {
        Arc::new(PromiseCell {
            state: Mutex::new(PromiseState::Rejected(thrown)),
            tool: None,
        })
    }

    pub fn state(&self) -> MutexGuard<'_, PromiseState> {
        lock(&self.state)
    }

    pub fn tool(&self) -> Option<&ToolCallInfo> {
        self.tool.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.state(), PromiseState::Pending(_))
    }

    /// Take the pending future out so it can be awaited without holding the lock
    pub fn take_future(&self) -> Option<BoxFuture<'static, Result<Value, HostError>>> {
        match &mut *self.state() {
            PromiseState::Pending(fut) => fut.take(),
            _ => None,
        }
    }

    pub fn settle(&self, state: PromiseState) {
        *self.state() = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(-2.5), "-2.5");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(1.5e-9), "1.5e-9");
        assert_eq!(format_number(100.0), "100");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(-0.0), "0");
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number(" 42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x10"), 16.0);
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("12px").is_nan());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Num(0.0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(Value::array(vec![]).is_truthy());
        assert!(!Value::Num(f64::NAN).is_truthy());
    }

    #[test]
    fn test_json_view_drops_undefined() {
        let v = Value::object([
            ("a", Value::Num(1.0)),
            ("b", Value::Undefined),
            ("c", Value::array(vec![Value::Undefined, Value::from("x")])),
        ]);
        assert_eq!(v.to_json(), Some(json!({"a": 1, "c": [null, "x"]})));
        assert_eq!(Value::Undefined.to_json(), None);
    }

    #[test]
    fn test_objects_are_shared_handles() {
        let obj = ObjectRef::new();
        let alias = Value::Object(obj.clone());
        if let Value::Object(o) = &alias {
            o.insert("name", Value::from("John"));
        }
        assert_eq!(obj.get_data("name").and_then(|v| v.as_str().map(String::from)), Some("John".into()));
    }

    #[test]
    fn test_sealed_and_frozen() {
        let obj = ObjectRef::from_pairs([("name", Value::from("Jane"))]);
        obj.lock().extensible = false;
        assert!(!obj.lock().is_sealed());
        for (_, p) in obj.lock().props.iter_mut() {
            if let Property::Data { configurable, .. } = p {
                *configurable = false;
            }
        }
        assert!(obj.lock().is_sealed());
        assert!(!obj.lock().is_frozen());
    }
}
