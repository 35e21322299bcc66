//! Property access
//!
//! get/set/has/delete over every value kind. Accessor properties are not
//! invoked here: a lookup that lands on a getter or setter hands the function
//! back to the interpreter, which calls it in statement order.

use crate::runtime::control::{check_array_length, RtResult, RuntimeError};
use crate::runtime::stdlib;
use crate::runtime::value::{ArrayRef, Callable, ObjectRef, Property, Value};

pub enum Lookup {
    Value(Value),
    Getter(Value),
}

pub enum SetOutcome {
    Done,
    Setter(Value),
}

fn kind_label(target: &Value) -> &'static str {
    match target {
        Value::Undefined => "undefined",
        _ => "null",
    }
}

/// Parse a canonical array index
pub fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok()
}

/// Enumerable own keys in insertion order; indices for arrays and strings
pub fn own_enumerable_keys(target: &Value) -> Vec<String> {
    match target {
        Value::Object(obj) => obj.keys(),
        Value::Array(arr) => (0..arr.len()).map(|i| i.to_string()).collect(),
        Value::Str(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
        _ => Vec::new(),
    }
}

pub fn get_property(target: &Value, key: &str) -> RtResult<Lookup> {
    match target {
        Value::Undefined | Value::Null => Err(RuntimeError::type_error(format!(
            "Cannot read properties of {} (reading '{}')",
            kind_label(target),
            key
        ))),
        Value::Object(obj) => {
            let found = obj.lock().get(key).cloned();
            match found {
                Some(Property::Data { value, .. }) => Ok(Lookup::Value(value)),
                Some(Property::Accessor { get: Some(getter), .. }) => Ok(Lookup::Getter(getter)),
                Some(Property::Accessor { get: None, .. }) => Ok(Lookup::Value(Value::Undefined)),
                None => Ok(Lookup::Value(method_or_undefined(target, key))),
            }
        }
        Value::Array(arr) => {
            if key == "length" {
                return Ok(Lookup::Value(Value::from(arr.len())));
            }
            if let Some(idx) = array_index(key) {
                return Ok(Lookup::Value(arr.get(idx)));
            }
            Ok(Lookup::Value(method_or_undefined(target, key)))
        }
        Value::Str(s) => {
            if key == "length" {
                return Ok(Lookup::Value(Value::from(s.chars().count())));
            }
            if let Some(idx) = array_index(key) {
                return Ok(Lookup::Value(
                    s.chars().nth(idx).map(|c| Value::Str(c.to_string())).unwrap_or_default(),
                ));
            }
            Ok(Lookup::Value(method_or_undefined(target, key)))
        }
        Value::Function(func) => {
            if key == "name" {
                return Ok(Lookup::Value(Value::Str(func.name())));
            }
            if let Callable::Builtin(b) = &**func {
                if let Some(member) = stdlib::static_member(b.func, key) {
                    return Ok(Lookup::Value(member));
                }
            }
            Ok(Lookup::Value(Value::Undefined))
        }
        Value::Num(_) | Value::Bool(_) | Value::Promise(_) => Ok(Lookup::Value(method_or_undefined(target, key))),
    }
}

fn method_or_undefined(target: &Value, key: &str) -> Value {
    match stdlib::method_of(target, key) {
        Some(func) => Value::builtin(func, target.clone()),
        None => Value::Undefined,
    }
}

pub fn set_property(target: &Value, key: &str, value: Value) -> RtResult<SetOutcome> {
    match target {
        Value::Undefined | Value::Null => Err(RuntimeError::type_error(format!(
            "Cannot set properties of {} (setting '{}')",
            kind_label(target),
            key
        ))),
        Value::Object(obj) => set_object_property(obj, key, value),
        Value::Array(arr) => {
            set_array_property(arr, key, value)?;
            Ok(SetOutcome::Done)
        }
        _ => Ok(SetOutcome::Done),
    }
}

fn set_object_property(obj: &ObjectRef, key: &str, value: Value) -> RtResult<SetOutcome> {
    let mut data = obj.lock();
    match data.position(key) {
        Some(idx) => match &mut data.props[idx].1 {
            Property::Data {
                value: slot,
                writable: true,
                ..
            } => {
                *slot = value;
                Ok(SetOutcome::Done)
            }
            Property::Data { .. } => Err(RuntimeError::type_error(format!(
                "Cannot assign to read only property '{}' of object",
                key
            ))),
            Property::Accessor { set: Some(setter), .. } => Ok(SetOutcome::Setter(setter.clone())),
            Property::Accessor { set: None, .. } => Err(RuntimeError::type_error(format!(
                "Cannot set property {} of #<Object> which has only a getter",
                key
            ))),
        },
        None if data.extensible => {
            data.props.push((key.to_string(), Property::data(value)));
            Ok(SetOutcome::Done)
        }
        None if data.is_sealed() => Err(RuntimeError::type_error(format!(
            "Cannot add property {}, object is not extensible",
            key
        ))),
        None => Ok(SetOutcome::Done),
    }
}

fn set_array_property(arr: &ArrayRef, key: &str, value: Value) -> RtResult<()> {
    let mut data = arr.lock();
    if key == "length" {
        if data.frozen {
            return Err(RuntimeError::type_error(
                "Cannot assign to read only property 'length' of object '[object Array]'",
            ));
        }
        let n = value.to_number();
        if n < 0.0 || n.fract() != 0.0 || !n.is_finite() {
            return Err(RuntimeError::range_error("Invalid array length"));
        }
        check_array_length(n)?;
        data.items.resize(n as usize, Value::Undefined);
        return Ok(());
    }
    if let Some(idx) = array_index(key) {
        if data.frozen {
            return Err(RuntimeError::type_error(format!(
                "Cannot assign to read only property '{}' of object '[object Array]'",
                key
            )));
        }
        if idx >= data.items.len() {
            check_array_length(idx as f64 + 1.0)?;
            data.items.resize(idx + 1, Value::Undefined);
        }
        data.items[idx] = value;
    }
    Ok(())
}

pub fn delete_property(target: &Value, key: &str) -> RtResult<bool> {
    match target {
        Value::Undefined | Value::Null => Err(RuntimeError::type_error(format!(
            "Cannot convert {} to object",
            kind_label(target)
        ))),
        Value::Object(obj) => {
            let mut data = obj.lock();
            match data.position(key) {
                None => Ok(true),
                Some(idx) if data.props[idx].1.is_configurable() => {
                    data.props.remove(idx);
                    Ok(true)
                }
                Some(_) => Err(RuntimeError::type_error(format!(
                    "Cannot delete property '{}' of #<Object>",
                    key
                ))),
            }
        }
        Value::Array(arr) => {
            let mut data = arr.lock();
            if let Some(idx) = array_index(key) {
                if data.frozen {
                    return Err(RuntimeError::type_error(format!(
                        "Cannot delete property '{}' of [object Array]",
                        key
                    )));
                }
                if let Some(slot) = data.items.get_mut(idx) {
                    *slot = Value::Undefined;
                }
            }
            Ok(true)
        }
        _ => Ok(true),
    }
}

/// The `in` operator
pub fn has_property(target: &Value, key: &str) -> RtResult<bool> {
    match target {
        Value::Object(obj) => Ok(obj.lock().position(key).is_some() || stdlib::method_of(target, key).is_some()),
        Value::Array(arr) => Ok(key == "length"
            || array_index(key).map(|i| i < arr.len()).unwrap_or(false)
            || stdlib::method_of(target, key).is_some()),
        other => Err(RuntimeError::type_error(format!(
            "Cannot use 'in' operator to search for '{}' in {}",
            key,
            other.to_display()
        ))),
    }
}

/// Enumerable own keys, as `Object.keys` and `for...in` see them
pub fn own_keys(target: &Value) -> Vec<String> {
    match target {
        Value::Object(obj) => obj.keys(),
        Value::Array(arr) => (0..arr.len()).map(|i| i.to_string()).collect(),
        Value::Str(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
        _ => Vec::new(),
    }
}

/// Own property is present, regardless of enumerability
pub fn has_own(target: &Value, key: &str) -> bool {
    match target {
        Value::Object(obj) => obj.lock().position(key).is_some(),
        Value::Array(arr) => array_index(key).map(|i| i < arr.len()).unwrap_or(false),
        Value::Str(s) => array_index(key).map(|i| i < s.chars().count()).unwrap_or(false),
        _ => false,
    }
}

/* ===================== Integrity Levels ===================== */

pub fn prevent_extensions(target: &Value) {
    match target {
        Value::Object(obj) => obj.lock().extensible = false,
        Value::Array(arr) => arr.lock().frozen = true,
        _ => {}
    }
}

pub fn seal(target: &Value) {
    if let Value::Object(obj) = target {
        let mut data = obj.lock();
        data.extensible = false;
        for (_, prop) in data.props.iter_mut() {
            match prop {
                Property::Data { configurable, .. } | Property::Accessor { configurable, .. } => *configurable = false,
            }
        }
    } else {
        prevent_extensions(target);
    }
}

pub fn freeze(target: &Value) {
    if let Value::Object(obj) = target {
        let mut data = obj.lock();
        data.extensible = false;
        for (_, prop) in data.props.iter_mut() {
            match prop {
                Property::Data {
                    writable, configurable, ..
                } => {
                    *writable = false;
                    *configurable = false;
                }
                Property::Accessor { configurable, .. } => *configurable = false,
            }
        }
    } else {
        prevent_extensions(target);
    }
}

pub fn is_extensible(target: &Value) -> bool {
    match target {
        Value::Object(obj) => obj.is_extensible(),
        Value::Array(arr) => !arr.is_frozen(),
        _ => false,
    }
}

pub fn is_sealed(target: &Value) -> bool {
    match target {
        Value::Object(obj) => obj.lock().is_sealed(),
        Value::Array(arr) => arr.is_frozen(),
        _ => true,
    }
}

pub fn is_frozen(target: &Value) -> bool {
    match target {
        Value::Object(obj) => obj.lock().is_frozen(),
        Value::Array(arr) => arr.is_frozen(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jane() -> Value {
        Value::object([("name", Value::from("Jane"))])
    }

    #[test]
    fn test_sealed_object_rejects_new_property() {
        let obj = jane();
        seal(&obj);
        let err = set_property(&obj, "age", Value::from(33)).err().unwrap();
        assert_eq!(err.message, "Cannot add property age, object is not extensible");
        assert_eq!(own_keys(&obj), vec!["name"]);
    }

    #[test]
    fn test_non_extensible_object_ignores_new_property() {
        let obj = jane();
        prevent_extensions(&obj);
        assert!(set_property(&obj, "age", Value::from(33)).is_ok());
        assert_eq!(own_keys(&obj), vec!["name"]);
        assert!(delete_property(&obj, "name").unwrap());
        assert!(own_keys(&obj).is_empty());
    }

    #[test]
    fn test_frozen_object_rejects_writes() {
        let obj = jane();
        freeze(&obj);
        assert!(set_property(&obj, "name", Value::from("x")).is_err());
        assert!(delete_property(&obj, "name").is_err());
        assert!(is_frozen(&obj));
    }

    #[test]
    fn test_read_from_undefined() {
        let err = get_property(&Value::Undefined, "x").err().unwrap();
        assert_eq!(err.message, "Cannot read properties of undefined (reading 'x')");
    }

    #[test]
    fn test_array_length_and_index() {
        let arr = Value::array(vec![Value::from(1), Value::from(2)]);
        set_property(&arr, "3", Value::from(4)).ok();
        match get_property(&arr, "length") {
            Ok(Lookup::Value(v)) => assert_eq!(v.as_f64(), Some(4.0)),
            _ => panic!("expected length"),
        }
        set_property(&arr, "length", Value::from(1)).ok();
        assert_eq!(arr.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_array_index_parsing() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("12"), Some(12));
        assert_eq!(array_index("01"), None);
        assert_eq!(array_index("-1"), None);
        assert_eq!(array_index("length"), None);
    }

    #[test]
    fn test_accessor_lookup_returns_function() {
        let obj = ObjectRef::new();
        let getter = Value::host_fn("get", |_| Ok(Value::from(1)));
        obj.define(
            "x",
            Property::Accessor {
                get: Some(getter),
                set: None,
                enumerable: true,
                configurable: true,
            },
        );
        let target = Value::Object(obj);
        assert!(matches!(get_property(&target, "x"), Ok(Lookup::Getter(_))));
        assert!(set_property(&target, "x", Value::Null).is_err());
    }
}
