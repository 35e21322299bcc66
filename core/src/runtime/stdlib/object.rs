//! `Object.*` static functions

use crate::runtime::control::{RtResult, RuntimeError};
use crate::runtime::object as props;
use crate::runtime::stdlib::arg;
use crate::runtime::value::{ObjectRef, Property, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectFn {
    Keys,
    Values,
    Entries,
    Assign,
    Freeze,
    Seal,
    PreventExtensions,
    IsFrozen,
    IsSealed,
    IsExtensible,
    DefineProperty,
    FromEntries,
}

const FUNCTIONS: &[(&str, ObjectFn)] = &[
    ("keys", ObjectFn::Keys),
    ("values", ObjectFn::Values),
    ("entries", ObjectFn::Entries),
    ("assign", ObjectFn::Assign),
    ("freeze", ObjectFn::Freeze),
    ("seal", ObjectFn::Seal),
    ("preventExtensions", ObjectFn::PreventExtensions),
    ("isFrozen", ObjectFn::IsFrozen),
    ("isSealed", ObjectFn::IsSealed),
    ("isExtensible", ObjectFn::IsExtensible),
    ("defineProperty", ObjectFn::DefineProperty),
    ("fromEntries", ObjectFn::FromEntries),
];

impl ObjectFn {
    pub fn from_name(name: &str) -> Option<Self> {
        FUNCTIONS.iter().find(|(n, _)| *n == name).map(|(_, f)| *f)
    }

    pub fn name(&self) -> &'static str {
        FUNCTIONS
            .iter()
            .find(|(_, f)| f == self)
            .map(|(n, _)| *n)
            .unwrap_or("")
    }
}

fn require_object(value: &Value, func: ObjectFn) -> RtResult<()> {
    if value.is_nullish() {
        return Err(RuntimeError::type_error(format!(
            "Object.{} called on null or undefined",
            func.name()
        )));
    }
    Ok(())
}

/// Enumerable own entries; accessor values read as undefined here
fn own_entries(target: &Value) -> Vec<(String, Value)> {
    match target {
        Value::Object(obj) => obj
            .lock()
            .props
            .iter()
            .filter(|(_, p)| p.is_enumerable())
            .map(|(k, p)| match p {
                Property::Data { value, .. } => (k.clone(), value.clone()),
                Property::Accessor { .. } => (k.clone(), Value::Undefined),
            })
            .collect(),
        Value::Array(arr) => arr
            .items()
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        Value::Str(s) => s
            .chars()
            .enumerate()
            .map(|(i, c)| (i.to_string(), Value::Str(c.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}

fn flag(descriptor: &Value, key: &str) -> bool {
    descriptor
        .as_object()
        .and_then(|d| d.get_data(key))
        .map(|v| v.is_truthy())
        .unwrap_or(false)
}

fn define_property(target: &Value, key: &str, descriptor: &Value) -> RtResult<()> {
    let obj = match target {
        Value::Object(obj) => obj,
        _ => return Err(RuntimeError::type_error("Object.defineProperty called on non-object")),
    };
    let desc = descriptor
        .as_object()
        .ok_or_else(|| RuntimeError::type_error("Property description must be an object"))?;

    let existing = obj.lock().get(key).cloned();
    if let Some(prop) = &existing {
        if !prop.is_configurable() {
            return Err(RuntimeError::type_error(format!("Cannot redefine property: {}", key)));
        }
    } else if !obj.is_extensible() {
        return Err(RuntimeError::type_error(format!(
            "Cannot define property {}, object is not extensible",
            key
        )));
    }

    let getter = desc.get_data("get");
    let setter = desc.get_data("set");
    let enumerable = flag(descriptor, "enumerable");
    let configurable = flag(descriptor, "configurable");

    let prop = if getter.is_some() || setter.is_some() {
        for accessor in [&getter, &setter].into_iter().flatten() {
            if !matches!(accessor, Value::Function(_) | Value::Undefined) {
                return Err(RuntimeError::type_error(format!(
                    "Getter must be a function: {}",
                    accessor.to_display()
                )));
            }
        }
        Property::Accessor {
            get: getter.filter(|g| !g.is_nullish()),
            set: setter.filter(|s| !s.is_nullish()),
            enumerable,
            configurable,
        }
    } else {
        Property::Data {
            value: desc.get_data("value").unwrap_or_default(),
            writable: flag(descriptor, "writable"),
            enumerable,
            configurable,
        }
    };
    obj.define(key, prop);
    Ok(())
}

pub fn call(func: ObjectFn, args: &[Value]) -> RtResult<Value> {
    let target = arg(args, 0);
    let value = match func {
        ObjectFn::Keys => {
            require_object(&target, func)?;
            Value::array(own_entries(&target).into_iter().map(|(k, _)| Value::Str(k)))
        }
        ObjectFn::Values => {
            require_object(&target, func)?;
            Value::array(own_entries(&target).into_iter().map(|(_, v)| v))
        }
        ObjectFn::Entries => {
            require_object(&target, func)?;
            Value::array(
                own_entries(&target)
                    .into_iter()
                    .map(|(k, v)| Value::array(vec![Value::Str(k), v])),
            )
        }
        ObjectFn::Assign => {
            require_object(&target, func)?;
            for source in args.iter().skip(1) {
                for (key, value) in own_entries(source) {
                    props::set_property(&target, &key, value)?;
                }
            }
            target
        }
        ObjectFn::Freeze => {
            props::freeze(&target);
            target
        }
        ObjectFn::Seal => {
            props::seal(&target);
            target
        }
        ObjectFn::PreventExtensions => {
            props::prevent_extensions(&target);
            target
        }
        ObjectFn::IsFrozen => Value::Bool(props::is_frozen(&target)),
        ObjectFn::IsSealed => Value::Bool(props::is_sealed(&target)),
        ObjectFn::IsExtensible => Value::Bool(props::is_extensible(&target)),
        ObjectFn::DefineProperty => {
            define_property(&target, &arg(args, 1).to_key(), &arg(args, 2))?;
            target
        }
        ObjectFn::FromEntries => {
            let entries = match &target {
                Value::Array(arr) => arr.items(),
                other => {
                    return Err(RuntimeError::type_error(format!(
                        "{} is not iterable",
                        other.to_display()
                    )))
                }
            };
            let obj = ObjectRef::new();
            for entry in entries {
                let pair = entry
                    .as_array()
                    .map(|a| a.items())
                    .ok_or_else(|| RuntimeError::type_error("Iterator value is not an entry object"))?;
                let key = pair.first().cloned().unwrap_or_default().to_key();
                obj.insert(key, pair.get(1).cloned().unwrap_or_default());
            }
            Value::Object(obj)
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_values_entries_keep_order() {
        let obj = Value::object([("b", Value::from(1)), ("a", Value::from(2))]);
        let keys = call(ObjectFn::Keys, &[obj.clone()]).unwrap();
        assert_eq!(keys.to_json(), Some(json!(["b", "a"])));
        let entries = call(ObjectFn::Entries, &[obj]).unwrap();
        assert_eq!(entries.to_json(), Some(json!([["b", 1], ["a", 2]])));
    }

    #[test]
    fn test_keys_of_null_fails() {
        assert!(call(ObjectFn::Keys, &[Value::Null]).is_err());
    }

    #[test]
    fn test_assign_merges_into_target() {
        let target = Value::object([("a", Value::from(1))]);
        let source = Value::object([("b", Value::from(2))]);
        call(ObjectFn::Assign, &[target.clone(), source]).unwrap();
        assert_eq!(target.to_json(), Some(json!({"a": 1, "b": 2})));
    }

    #[test]
    fn test_define_property_defaults_to_hidden_read_only() {
        let target = Value::object([("a", Value::from(1))]);
        let desc = Value::object([("value", Value::from(42))]);
        call(ObjectFn::DefineProperty, &[target.clone(), Value::from("secret"), desc]).unwrap();
        assert_eq!(target.to_json(), Some(json!({"a": 1})));
        assert!(props::set_property(&target, "secret", Value::from(0)).is_err());
    }

    #[test]
    fn test_define_on_non_configurable_fails() {
        let target = Value::object([("a", Value::from(1))]);
        call(ObjectFn::Freeze, &[target.clone()]).unwrap();
        let desc = Value::object([("value", Value::from(2))]);
        assert!(call(ObjectFn::DefineProperty, &[target, Value::from("a"), desc]).is_err());
    }

    #[test]
    fn test_from_entries() {
        let entries = Value::array(vec![Value::array(vec![Value::from("k"), Value::from(true)])]);
        let obj = call(ObjectFn::FromEntries, &[entries]).unwrap();
        assert_eq!(obj.to_json(), Some(json!({"k": true})));
    }
}
