//! Object graph copies across the isolate boundary
//!
//! `copy_in` deep-copies the caller's graph, preserving sharing, cycles,
//! extensibility and property attributes. Functions, accessor functions and
//! promises are not copied: the isolate calls the caller's functions live.
//! `copy_back` then writes every copied object's properties back into its
//! original, so data mutations made by the script are observable by the
//! caller, and `restore` maps values leaving the isolate onto originals.

use std::collections::{HashMap, HashSet};

use crate::runtime::value::{ArrayRef, ObjectRef, Property, Value};
use crate::runtime::Context;

#[derive(Default)]
pub struct Marshal {
    /// Original id to copy
    copies: HashMap<usize, Value>,
    /// Copy id to original
    originals: HashMap<usize, Value>,
    objects: Vec<(ObjectRef, ObjectRef)>,
    arrays: Vec<(ArrayRef, ArrayRef)>,
}

impl Marshal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detached copy of a context and everything reachable from it
    pub fn copy_context(&mut self, context: &Context) -> Context {
        let copy = Context::new();
        for (name, value) in context.entries() {
            copy.set(name, self.copy_in(&value));
        }
        copy
    }

    pub fn copy_in(&mut self, value: &Value) -> Value {
        match value {
            Value::Object(obj) => {
                if let Some(copy) = self.copies.get(&obj.id()) {
                    return copy.clone();
                }
                let copy = ObjectRef::with_class(obj.class());
                self.remember(value, Value::Object(copy.clone()));
                self.objects.push((obj.clone(), copy.clone()));

                let (props, extensible) = {
                    let data = obj.lock();
                    (data.props.clone(), data.extensible)
                };
                let props: Vec<(String, Property)> = props
                    .into_iter()
                    .map(|(key, prop)| (key, self.copy_property(prop)))
                    .collect();
                let mut data = copy.lock();
                data.props = props;
                data.extensible = extensible;
                drop(data);
                Value::Object(copy)
            }
            Value::Array(arr) => {
                if let Some(copy) = self.copies.get(&arr.id()) {
                    return copy.clone();
                }
                let copy = ArrayRef::new(Vec::new());
                self.remember(value, Value::Array(copy.clone()));
                self.arrays.push((arr.clone(), copy.clone()));

                let (items, frozen) = {
                    let data = arr.lock();
                    (data.items.clone(), data.frozen)
                };
                let items: Vec<Value> = items.iter().map(|item| self.copy_in(item)).collect();
                let mut data = copy.lock();
                data.items = items;
                data.frozen = frozen;
                drop(data);
                Value::Array(copy)
            }
            other => other.clone(),
        }
    }

    fn copy_property(&mut self, prop: Property) -> Property {
        match prop {
            Property::Data {
                value,
                writable,
                enumerable,
                configurable,
            } => Property::Data {
                value: self.copy_in(&value),
                writable,
                enumerable,
                configurable,
            },
            accessor => accessor,
        }
    }

    fn remember(&mut self, original: &Value, copy: Value) {
        if let Some(id) = reference_id(original) {
            self.copies.insert(id, copy.clone());
        }
        if let Some(id) = reference_id(&copy) {
            self.originals.insert(id, original.clone());
        }
    }

    /// Write the isolate's view of every copied object back into its original
    pub fn copy_back(&self) {
        let mut visited = HashSet::new();
        for (original, copy) in &self.objects {
            let (props, extensible) = {
                let data = copy.lock();
                (data.props.clone(), data.extensible)
            };
            let props: Vec<(String, Property)> = props
                .into_iter()
                .map(|(key, prop)| (key, self.restore_property(prop, &mut visited)))
                .collect();
            let mut data = original.lock();
            data.props = props;
            data.extensible = extensible;
        }
        for (original, copy) in &self.arrays {
            let (items, frozen) = {
                let data = copy.lock();
                (data.items.clone(), data.frozen)
            };
            let items: Vec<Value> = items.iter().map(|item| self.restore_inner(item, &mut visited)).collect();
            let mut data = original.lock();
            data.items = items;
            data.frozen = frozen;
        }
    }

    /// Write the isolate's context entries back, including names the script created
    pub fn copy_back_context(&self, isolated: &Context, original: &Context) {
        for (name, value) in isolated.entries() {
            let restored = self.restore(&value);
            let unchanged = original
                .get(&name)
                .map(|current| current.same_ref(&restored))
                .unwrap_or(false);
            if !unchanged {
                original.set(name, restored);
            }
        }
    }

    /// Map a value leaving the isolate onto the caller's graph. Copies become
    /// their originals; objects created inside the isolate are kept, with
    /// any copies they reference swapped for originals.
    pub fn restore(&self, value: &Value) -> Value {
        let mut visited = HashSet::new();
        self.restore_inner(value, &mut visited)
    }

    fn restore_inner(&self, value: &Value, visited: &mut HashSet<usize>) -> Value {
        let Some(id) = reference_id(value) else {
            return value.clone();
        };
        if let Some(original) = self.originals.get(&id) {
            return original.clone();
        }
        if !visited.insert(id) {
            return value.clone();
        }
        match value {
            Value::Object(obj) => {
                let props = obj.lock().props.clone();
                let props: Vec<(String, Property)> = props
                    .into_iter()
                    .map(|(key, prop)| (key, self.restore_property(prop, visited)))
                    .collect();
                obj.lock().props = props;
            }
            Value::Array(arr) => {
                let items = arr.items();
                let items: Vec<Value> = items.iter().map(|item| self.restore_inner(item, visited)).collect();
                arr.lock().items = items;
            }
            _ => {}
        }
        value.clone()
    }

    fn restore_property(&self, prop: Property, visited: &mut HashSet<usize>) -> Property {
        match prop {
            Property::Data {
                value,
                writable,
                enumerable,
                configurable,
            } => Property::Data {
                value: self.restore_inner(&value, visited),
                writable,
                enumerable,
                configurable,
            },
            accessor => accessor,
        }
    }
}

fn reference_id(value: &Value) -> Option<usize> {
    match value {
        Value::Object(obj) => Some(obj.id()),
        Value::Array(arr) => Some(arr.id()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::object;

    #[test]
    fn test_copy_is_detached() {
        let original = Value::object([("name", Value::from("Jane"))]);
        let mut marshal = Marshal::new();
        let copy = marshal.copy_in(&original);
        assert!(!copy.same_ref(&original));
        copy.as_object().unwrap().insert("name", Value::from("John"));
        assert_eq!(original.as_object().unwrap().get_data("name").unwrap().as_str(), Some("Jane"));
    }

    #[test]
    fn test_copy_back_applies_mutations() {
        let original = Value::object([("name", Value::from("Jane"))]);
        let mut marshal = Marshal::new();
        let copy = marshal.copy_in(&original);
        copy.as_object().unwrap().insert("age", Value::from(30));
        marshal.copy_back();
        assert_eq!(original.to_json(), Some(serde_json::json!({"name": "Jane", "age": 30})));
    }

    #[test]
    fn test_sharing_and_cycles_are_preserved() {
        let shared = Value::array(vec![Value::from(1)]);
        let root = Value::object([("a", shared.clone()), ("b", shared.clone())]);
        root.as_object().unwrap().insert("self", root.clone());

        let mut marshal = Marshal::new();
        let copy = marshal.copy_in(&root);
        let obj = copy.as_object().unwrap();
        assert!(obj.get_data("a").unwrap().same_ref(&obj.get_data("b").unwrap()));
        assert!(obj.get_data("self").unwrap().same_ref(&copy));
    }

    #[test]
    fn test_integrity_flags_survive_the_copy() {
        let original = Value::object([("name", Value::from("Jane"))]);
        object::seal(&original);
        let mut marshal = Marshal::new();
        let copy = marshal.copy_in(&original);
        assert!(object::is_sealed(&copy));
        assert!(object::set_property(&copy, "age", Value::from(1)).is_err());
    }

    #[test]
    fn test_restore_maps_copies_to_originals() {
        let original = Value::object([("n", Value::from(1))]);
        let mut marshal = Marshal::new();
        let copy = marshal.copy_in(&original);
        let fresh = Value::object([("inner", copy.clone())]);
        let restored = marshal.restore(&fresh);
        assert!(restored.same_ref(&fresh));
        let inner = restored.as_object().unwrap().get_data("inner").unwrap();
        assert!(inner.same_ref(&original));
    }

    #[test]
    fn test_context_copy_back_adds_new_names() {
        let original = Context::new().with("count", 1);
        let mut marshal = Marshal::new();
        let isolated = marshal.copy_context(&original);
        isolated.set("count", Value::from(2));
        isolated.set("created", Value::from("yes"));
        marshal.copy_back();
        marshal.copy_back_context(&isolated, &original);
        assert_eq!(original.get("count").and_then(|v| v.as_f64()), Some(2.0));
        assert!(original.contains("created"));
    }
}
