//! Caller-supplied execution context
//!
//! Names the caller exposes to a script. The context is a shared handle:
//! assignments to undeclared names made by the script land here and stay
//! visible to the caller after the run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::runtime::value::{lock, Value};

#[derive(Clone, Default)]
pub struct Context {
    inner: Arc<Mutex<Vec<(String, Value)>>>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.entries()).finish()
    }
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value.into());
        self
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        let mut entries = lock(&self.inner);
        match entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        lock(&self.inner)
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        lock(&self.inner).iter().any(|(n, _)| n == name)
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        let mut entries = lock(&self.inner);
        let idx = entries.iter().position(|(n, _)| n == name)?;
        Some(entries.remove(idx).1)
    }

    pub fn names(&self) -> Vec<String> {
        lock(&self.inner).iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        lock(&self.inner).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace every entry, keeping this handle's identity
    pub fn replace_all(&self, entries: Vec<(String, Value)>) {
        *lock(&self.inner) = entries;
    }

    /// Context built from a JSON object; other JSON values give an empty context
    pub fn from_json(json: &serde_json::Value) -> Self {
        let ctx = Context::new();
        if let serde_json::Value::Object(map) = json {
            for (name, value) in map {
                ctx.set(name.clone(), Value::from_json(value));
            }
        }
        ctx
    }
}

impl From<HashMap<String, Value>> for Context {
    fn from(map: HashMap<String, Value>) -> Self {
        let mut entries: Vec<(String, Value)> = map.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Context {
            inner: Arc::new(Mutex::new(entries)),
        }
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let ctx = Context::new();
        for (name, value) in iter {
            ctx.set(name, value);
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashmap;

    #[test]
    fn test_clones_share_entries() {
        let ctx = Context::new().with("a", 1);
        let alias = ctx.clone();
        alias.set("b", Value::from(2));
        assert_eq!(ctx.names(), vec!["a", "b"]);
    }

    #[test]
    fn test_from_hashmap_is_sorted() {
        let ctx = Context::from(hashmap! {
            "z".to_string() => Value::from(1),
            "a".to_string() => Value::from(2),
        });
        assert_eq!(ctx.names(), vec!["a", "z"]);
    }

    #[test]
    fn test_set_replaces_in_place() {
        let ctx = Context::new().with("a", 1).with("b", 2);
        ctx.set("a", Value::from(10));
        assert_eq!(ctx.names(), vec!["a", "b"]);
        assert_eq!(ctx.get("a").and_then(|v| v.as_f64()), Some(10.0));
    }
}
