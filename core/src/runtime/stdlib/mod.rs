//! Standard library function implementations
//!
//! Every builtin is a `Builtin` identifier. Function values carry the
//! identifier plus the receiver they were read from, and `call_builtin`
//! routes a call to the implementation. Builtins that call back into script
//! code (array callbacks, promise handlers, the logging intrinsic) are async
//! methods on the VM; the rest are plain functions over argument slices.

pub mod array;
pub mod date;
pub mod globals;
pub mod intrinsics;
pub mod json;
pub mod math;
pub mod object;
pub mod promise;
pub mod string;

use std::collections::HashMap;

use crate::compiler::ast::Span;
use crate::runtime::control::{ErrorKind, EvalResult, RtResult, RuntimeError};
use crate::runtime::scope::Env;
use crate::runtime::value::{ObjectClass, ObjectRef, Value};
use crate::runtime::vm::VM;

pub use array::ArrayMethod;
pub use math::MathFn;
pub use object::ObjectFn;
pub use string::StringMethod;

/* ===================== Builtin Identifiers ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

/// Builtin function identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    // Instrumentation intrinsics
    Track,
    Comment,
    Log,
    Tag,

    Console(ConsoleLevel),
    JsonStringify,
    JsonParse,
    Math(MathFn),

    // Constructors
    ObjectCtor,
    ArrayCtor,
    NumberCtor,
    StringCtor,
    BooleanCtor,
    ErrorCtor(ErrorKind),
    DateCtor,
    PromiseCtor,

    // Global functions
    ParseInt,
    ParseFloat,
    IsNaN,
    IsFinite,

    // Static members
    Object(ObjectFn),
    ArrayIsArray,
    ArrayFrom,
    ArrayOf,
    NumberIsInteger,
    NumberIsFinite,
    NumberIsNaN,
    DateNow,
    PromiseAll,
    PromiseResolve,
    PromiseReject,

    // Methods, called with a receiver
    Array(ArrayMethod),
    String(StringMethod),
    NumberToFixed,
    ToString,
    HasOwnProperty,
    DateToIso,
    DateGetTime,
    PromiseThen,
    PromiseCatch,
    PromiseFinally,
}

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Track => "__track",
            Builtin::Comment => "__comment",
            Builtin::Log => "__log",
            Builtin::Tag => "__tag",
            Builtin::Console(level) => match level {
                ConsoleLevel::Log => "log",
                ConsoleLevel::Info => "info",
                ConsoleLevel::Warn => "warn",
                ConsoleLevel::Error => "error",
                ConsoleLevel::Debug => "debug",
            },
            Builtin::JsonStringify => "stringify",
            Builtin::JsonParse => "parse",
            Builtin::Math(f) => f.name(),
            Builtin::ObjectCtor => "Object",
            Builtin::ArrayCtor => "Array",
            Builtin::NumberCtor => "Number",
            Builtin::StringCtor => "String",
            Builtin::BooleanCtor => "Boolean",
            Builtin::ErrorCtor(kind) => kind.name(),
            Builtin::DateCtor => "Date",
            Builtin::PromiseCtor => "Promise",
            Builtin::ParseInt => "parseInt",
            Builtin::ParseFloat => "parseFloat",
            Builtin::IsNaN | Builtin::NumberIsNaN => "isNaN",
            Builtin::IsFinite | Builtin::NumberIsFinite => "isFinite",
            Builtin::Object(f) => f.name(),
            Builtin::ArrayIsArray => "isArray",
            Builtin::ArrayFrom => "from",
            Builtin::ArrayOf => "of",
            Builtin::NumberIsInteger => "isInteger",
            Builtin::DateNow => "now",
            Builtin::PromiseAll => "all",
            Builtin::PromiseResolve => "resolve",
            Builtin::PromiseReject => "reject",
            Builtin::Array(m) => m.name(),
            Builtin::String(m) => m.name(),
            Builtin::NumberToFixed => "toFixed",
            Builtin::ToString => "toString",
            Builtin::HasOwnProperty => "hasOwnProperty",
            Builtin::DateToIso => "toISOString",
            Builtin::DateGetTime => "getTime",
            Builtin::PromiseThen => "then",
            Builtin::PromiseCatch => "catch",
            Builtin::PromiseFinally => "finally",
        }
    }
}

/// Builtins usable with `new`. `Promise` is listed so that `new Promise`
/// reaches its dedicated error.
pub fn is_constructor(func: Builtin) -> bool {
    matches!(
        func,
        Builtin::ObjectCtor | Builtin::ArrayCtor | Builtin::ErrorCtor(_) | Builtin::DateCtor | Builtin::PromiseCtor
    )
}

/* ===================== Environment Injection ===================== */

fn namespace(members: Vec<(&str, Value)>) -> Value {
    Value::Object(ObjectRef::from_pairs(members))
}

fn func(builtin: Builtin) -> Value {
    Value::builtin(builtin, Value::Undefined)
}

/// Inject builtin globals into the VM's global table
pub fn inject_stdlib(globals: &mut HashMap<String, Value>) {
    let console = namespace(vec![
        ("log", func(Builtin::Console(ConsoleLevel::Log))),
        ("info", func(Builtin::Console(ConsoleLevel::Info))),
        ("warn", func(Builtin::Console(ConsoleLevel::Warn))),
        ("error", func(Builtin::Console(ConsoleLevel::Error))),
        ("debug", func(Builtin::Console(ConsoleLevel::Debug))),
    ]);
    globals.insert("console".into(), console);

    let json = namespace(vec![
        ("stringify", func(Builtin::JsonStringify)),
        ("parse", func(Builtin::JsonParse)),
    ]);
    globals.insert("JSON".into(), json);

    let mut math_members: Vec<(&str, Value)> = MathFn::ALL.iter().map(|f| (f.name(), func(Builtin::Math(*f)))).collect();
    math_members.push(("PI", Value::Num(std::f64::consts::PI)));
    math_members.push(("E", Value::Num(std::f64::consts::E)));
    globals.insert("Math".into(), namespace(math_members));

    for (name, builtin) in [
        ("Object", Builtin::ObjectCtor),
        ("Array", Builtin::ArrayCtor),
        ("Number", Builtin::NumberCtor),
        ("String", Builtin::StringCtor),
        ("Boolean", Builtin::BooleanCtor),
        ("Date", Builtin::DateCtor),
        ("Promise", Builtin::PromiseCtor),
        ("parseInt", Builtin::ParseInt),
        ("parseFloat", Builtin::ParseFloat),
        ("isNaN", Builtin::IsNaN),
        ("isFinite", Builtin::IsFinite),
        ("__track", Builtin::Track),
        ("__comment", Builtin::Comment),
        ("__log", Builtin::Log),
        ("__tag", Builtin::Tag),
    ] {
        globals.insert(name.into(), func(builtin));
    }
    for kind in [
        ErrorKind::Error,
        ErrorKind::TypeError,
        ErrorKind::RangeError,
        ErrorKind::ReferenceError,
        ErrorKind::SyntaxError,
    ] {
        globals.insert(kind.name().into(), func(Builtin::ErrorCtor(kind)));
    }

    globals.insert("undefined".into(), Value::Undefined);
    globals.insert("NaN".into(), Value::Num(f64::NAN));
    globals.insert("Infinity".into(), Value::Num(f64::INFINITY));
}

/// Members read off a constructor, such as `Array.isArray`
pub fn static_member(ctor: Builtin, key: &str) -> Option<Value> {
    let member = match (ctor, key) {
        (Builtin::ObjectCtor, _) => Builtin::Object(ObjectFn::from_name(key)?),
        (Builtin::ArrayCtor, "isArray") => Builtin::ArrayIsArray,
        (Builtin::ArrayCtor, "from") => Builtin::ArrayFrom,
        (Builtin::ArrayCtor, "of") => Builtin::ArrayOf,
        (Builtin::NumberCtor, "isInteger") => Builtin::NumberIsInteger,
        (Builtin::NumberCtor, "isFinite") => Builtin::NumberIsFinite,
        (Builtin::NumberCtor, "isNaN") => Builtin::NumberIsNaN,
        (Builtin::NumberCtor, "parseFloat") => Builtin::ParseFloat,
        (Builtin::NumberCtor, "parseInt") => Builtin::ParseInt,
        (Builtin::NumberCtor, "MAX_SAFE_INTEGER") => return Some(Value::Num(9_007_199_254_740_991.0)),
        (Builtin::NumberCtor, "MIN_SAFE_INTEGER") => return Some(Value::Num(-9_007_199_254_740_991.0)),
        (Builtin::NumberCtor, "EPSILON") => return Some(Value::Num(f64::EPSILON)),
        (Builtin::DateCtor, "now") => Builtin::DateNow,
        (Builtin::PromiseCtor, "all") => Builtin::PromiseAll,
        (Builtin::PromiseCtor, "resolve") => Builtin::PromiseResolve,
        (Builtin::PromiseCtor, "reject") => Builtin::PromiseReject,
        _ => return None,
    };
    Some(func(member))
}

/// Method a value of this kind exposes under `key`
pub fn method_of(target: &Value, key: &str) -> Option<Builtin> {
    match target {
        Value::Array(_) => ArrayMethod::from_name(key)
            .map(Builtin::Array)
            .or_else(|| (key == "toString").then_some(Builtin::ToString)),
        Value::Str(_) => StringMethod::from_name(key)
            .map(Builtin::String)
            .or_else(|| (key == "toString").then_some(Builtin::ToString)),
        Value::Num(_) => match key {
            "toFixed" => Some(Builtin::NumberToFixed),
            "toString" => Some(Builtin::ToString),
            _ => None,
        },
        Value::Bool(_) => (key == "toString").then_some(Builtin::ToString),
        Value::Object(obj) => match (obj.class(), key) {
            (ObjectClass::Date(_), "toISOString" | "toJSON") => Some(Builtin::DateToIso),
            (ObjectClass::Date(_), "getTime" | "valueOf") => Some(Builtin::DateGetTime),
            (_, "hasOwnProperty") => Some(Builtin::HasOwnProperty),
            (_, "toString") => Some(Builtin::ToString),
            _ => None,
        },
        Value::Promise(_) => match key {
            "then" => Some(Builtin::PromiseThen),
            "catch" => Some(Builtin::PromiseCatch),
            "finally" => Some(Builtin::PromiseFinally),
            _ => None,
        },
        _ => None,
    }
}

/* ===================== Argument Helpers ===================== */

pub(crate) fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

/// Relative index clamp shared by slice-like methods
pub(crate) fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = value.to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

/* ===================== Stdlib Dispatcher ===================== */

/// Builtins that never call back into the script
fn call_sync(func: Builtin, this: &Value, args: &[Value]) -> RtResult<Value> {
    match func {
        Builtin::Tag => intrinsics::tag(args),
        Builtin::JsonStringify => json::stringify(args),
        Builtin::JsonParse => json::parse(args),
        Builtin::Math(f) => Ok(math::call(f, args)),
        Builtin::ObjectCtor => Ok(globals::object_ctor(args)),
        Builtin::ArrayCtor => globals::array_ctor(args),
        Builtin::NumberCtor => Ok(Value::Num(args.first().map(|v| v.to_number()).unwrap_or(0.0))),
        Builtin::StringCtor => Ok(Value::Str(args.first().map(|v| v.to_display()).unwrap_or_default())),
        Builtin::BooleanCtor => Ok(Value::Bool(arg(args, 0).is_truthy())),
        Builtin::ErrorCtor(kind) => Ok(globals::error_ctor(kind, args)),
        Builtin::DateCtor => date::construct(args),
        Builtin::PromiseCtor => Err(RuntimeError::type_error("Promise constructor is not supported")),
        Builtin::ParseInt => Ok(globals::parse_int(args)),
        Builtin::ParseFloat => Ok(globals::parse_float(args)),
        Builtin::IsNaN => Ok(Value::Bool(arg(args, 0).to_number().is_nan())),
        Builtin::IsFinite => Ok(Value::Bool(arg(args, 0).to_number().is_finite())),
        Builtin::Object(f) => object::call(f, args),
        Builtin::ArrayIsArray => Ok(Value::Bool(matches!(arg(args, 0), Value::Array(_)))),
        Builtin::ArrayFrom => array::from(args),
        Builtin::ArrayOf => Ok(Value::array(args.iter().cloned())),
        Builtin::NumberIsInteger => Ok(Value::Bool(matches!(
            arg(args, 0),
            Value::Num(n) if n.is_finite() && n.fract() == 0.0
        ))),
        Builtin::NumberIsFinite => Ok(Value::Bool(matches!(arg(args, 0), Value::Num(n) if n.is_finite()))),
        Builtin::NumberIsNaN => Ok(Value::Bool(matches!(arg(args, 0), Value::Num(n) if n.is_nan()))),
        Builtin::DateNow => Ok(Value::Num(date::now_millis())),
        Builtin::PromiseResolve => Ok(promise::resolve(args)),
        Builtin::PromiseReject => Ok(promise::reject(args)),
        Builtin::Array(m) => array::call_sync(m, this, args),
        Builtin::String(m) => string::call(m, this, args),
        Builtin::NumberToFixed => globals::to_fixed(this, args),
        Builtin::ToString => globals::to_string(this, args),
        Builtin::HasOwnProperty => Ok(Value::Bool(crate::runtime::object::has_own(this, &arg(args, 0).to_key()))),
        Builtin::DateToIso => date::to_iso(this),
        Builtin::DateGetTime => date::get_time(this),
        Builtin::Track
        | Builtin::Comment
        | Builtin::Log
        | Builtin::Console(_)
        | Builtin::PromiseAll
        | Builtin::PromiseThen
        | Builtin::PromiseCatch
        | Builtin::PromiseFinally => Err(RuntimeError::type_error(format!(
            "{} cannot be called synchronously",
            func.name()
        ))),
    }
}

impl VM {
    /// Call a builtin with its receiver
    pub(crate) async fn call_builtin(
        &mut self,
        func: Builtin,
        this: Value,
        args: Vec<Value>,
        site: Span,
        env: &Env,
    ) -> EvalResult {
        match func {
            Builtin::Track => {
                let line = arg(&args, 0).to_number();
                let depth = arg(&args, 1).to_number();
                self.hooks.lines.record(line.max(0.0) as usize, depth.max(0.0) as usize);
                Ok(Value::Undefined)
            }
            Builtin::Comment => {
                self.hooks.trace.push(crate::trace::Trace::Comment {
                    text: arg(&args, 0).to_display(),
                    line: arg(&args, 1).to_number().max(0.0) as usize,
                });
                Ok(Value::Undefined)
            }
            Builtin::Log => self.intrinsic_log(args, site, env).await,
            Builtin::Console(level) => {
                self.console(level, &args);
                Ok(Value::Undefined)
            }
            Builtin::Array(m) if m.takes_callback() => self.array_with_callback(m, this, args, site, env).await,
            Builtin::PromiseAll => self.promise_all(args, site, env).await,
            Builtin::PromiseThen | Builtin::PromiseCatch | Builtin::PromiseFinally => {
                self.promise_chain(func, this, args, site, env).await
            }
            _ => call_sync(func, &this, &args).map_err(|e| self.throw_error(e, site)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_globals_are_injected() {
        let mut globals = HashMap::new();
        inject_stdlib(&mut globals);
        for name in ["console", "JSON", "Math", "Object", "Array", "Error", "TypeError", "undefined", "__track"] {
            assert!(globals.contains_key(name), "missing {}", name);
        }
    }

    #[test]
    fn test_static_members() {
        assert!(static_member(Builtin::ArrayCtor, "isArray").is_some());
        assert!(static_member(Builtin::ObjectCtor, "keys").is_some());
        assert!(static_member(Builtin::ObjectCtor, "nope").is_none());
        assert_eq!(
            static_member(Builtin::NumberCtor, "MAX_SAFE_INTEGER").and_then(|v| v.as_f64()),
            Some(9_007_199_254_740_991.0)
        );
    }

    #[test]
    fn test_method_lookup_by_receiver() {
        assert_eq!(method_of(&Value::array(vec![]), "push"), Some(Builtin::Array(ArrayMethod::Push)));
        assert_eq!(method_of(&Value::from("x"), "trim"), Some(Builtin::String(StringMethod::Trim)));
        assert_eq!(method_of(&Value::from(1), "toFixed"), Some(Builtin::NumberToFixed));
        assert_eq!(method_of(&Value::from(1), "push"), None);
    }

    #[test]
    fn test_relative_index() {
        assert_eq!(relative_index(&Value::from(-1), 5, 0), 4);
        assert_eq!(relative_index(&Value::from(10), 5, 0), 5);
        assert_eq!(relative_index(&Value::Undefined, 5, 5), 5);
    }
}
