//! Lexical scopes
//!
//! A scope chain of binding tables. Closures capture the `Env` they were
//! created in; function scopes mark where `var` declarations land.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::runtime::control::{RtResult, RuntimeError};
use crate::runtime::value::{lock, Value};

pub type Env = Arc<Scope>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Var,
    Let,
    Const,
    Function,
    Param,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Value,
    pub kind: BindingKind,
}

pub struct Scope {
    vars: Mutex<HashMap<String, Binding>>,
    /// Declaration order, for deterministic reporting
    order: Mutex<Vec<String>>,
    parent: Option<Env>,
    function_scope: bool,
}

impl Scope {
    pub fn root() -> Env {
        Arc::new(Scope {
            vars: Mutex::new(HashMap::new()),
            order: Mutex::new(Vec::new()),
            parent: None,
            function_scope: true,
        })
    }

    /// Block scope inside `parent`
    pub fn child(parent: &Env) -> Env {
        Arc::new(Scope {
            vars: Mutex::new(HashMap::new()),
            order: Mutex::new(Vec::new()),
            parent: Some(parent.clone()),
            function_scope: false,
        })
    }

    /// Function body scope inside the closure's captured environment
    pub fn function(parent: &Env) -> Env {
        Arc::new(Scope {
            vars: Mutex::new(HashMap::new()),
            order: Mutex::new(Vec::new()),
            parent: Some(parent.clone()),
            function_scope: true,
        })
    }

    pub fn parent(&self) -> Option<&Env> {
        self.parent.as_ref()
    }

    pub fn is_function_scope(&self) -> bool {
        self.function_scope
    }

    /// Create or overwrite a binding in this scope
    pub fn declare(&self, name: &str, value: Value, kind: BindingKind) {
        let mut vars = lock(&self.vars);
        if vars.insert(name.to_string(), Binding { value, kind }).is_none() {
            lock(&self.order).push(name.to_string());
        }
    }

    /// Declare a `var` without clobbering an existing value
    pub fn declare_var(&self, name: &str) {
        let exists = lock(&self.vars).contains_key(name);
        if !exists {
            self.declare(name, Value::Undefined, BindingKind::Var);
        }
    }

    pub fn has_own(&self, name: &str) -> bool {
        lock(&self.vars).contains_key(name)
    }

    pub fn get_own(&self, name: &str) -> Option<Binding> {
        lock(&self.vars).get(name).cloned()
    }

    /// Own bindings in declaration order
    pub fn bindings(&self) -> Vec<(String, Binding)> {
        let vars = lock(&self.vars);
        lock(&self.order)
            .iter()
            .filter_map(|name| vars.get(name).map(|b| (name.clone(), b.clone())))
            .collect()
    }
}

/// Resolve a name along the scope chain
pub fn lookup(env: &Env, name: &str) -> Option<Value> {
    let mut scope = Some(env);
    while let Some(s) = scope {
        if let Some(binding) = lock(&s.vars).get(name) {
            return Some(binding.value.clone());
        }
        scope = s.parent.as_ref();
    }
    None
}

/// Assign to the nearest binding named `name`. `None` when the chain has no
/// such binding.
pub fn assign(env: &Env, name: &str, value: Value) -> Option<RtResult<()>> {
    let mut scope = Some(env);
    while let Some(s) = scope {
        let mut vars = lock(&s.vars);
        if let Some(binding) = vars.get_mut(name) {
            if binding.kind == BindingKind::Const {
                return Some(Err(RuntimeError::type_error("Assignment to constant variable.")));
            }
            binding.value = value;
            return Some(Ok(()));
        }
        drop(vars);
        scope = s.parent.as_ref();
    }
    None
}

/// Nearest enclosing function scope, where `var` bindings live
pub fn function_env(env: &Env) -> Env {
    let mut scope = env.clone();
    loop {
        if scope.function_scope {
            return scope;
        }
        match scope.parent.clone() {
            Some(parent) => scope = parent,
            None => return scope,
        }
    }
}

/// Every binding visible from `env`, innermost shadowing outer ones
pub fn visible_bindings(env: &Env) -> Vec<(String, Binding)> {
    let mut out: Vec<(String, Binding)> = Vec::new();
    let mut scope = Some(env);
    while let Some(s) = scope {
        for (name, binding) in s.bindings() {
            if !out.iter().any(|(n, _)| *n == name) {
                out.push((name, binding));
            }
        }
        scope = s.parent.as_ref();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_parents() {
        let root = Scope::root();
        root.declare("a", Value::from(1), BindingKind::Let);
        let inner = Scope::child(&root);
        inner.declare("b", Value::from(2), BindingKind::Let);
        assert!(lookup(&inner, "a").is_some());
        assert!(lookup(&root, "b").is_none());
    }

    #[test]
    fn test_const_assignment_fails() {
        let root = Scope::root();
        root.declare("c", Value::from(1), BindingKind::Const);
        let err = assign(&root, "c", Value::from(2)).unwrap().unwrap_err();
        assert_eq!(err.message, "Assignment to constant variable.");
        assert!(assign(&root, "missing", Value::Null).is_none());
    }

    #[test]
    fn test_function_env_skips_blocks() {
        let root = Scope::root();
        let func = Scope::function(&root);
        let block = Scope::child(&func);
        assert!(Arc::ptr_eq(&function_env(&block), &func));
    }

    #[test]
    fn test_visible_bindings_shadowing() {
        let root = Scope::root();
        root.declare("x", Value::from(1), BindingKind::Var);
        let inner = Scope::child(&root);
        inner.declare("x", Value::from(2), BindingKind::Let);
        let all = visible_bindings(&inner);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].1.value.as_f64(), Some(2.0));
    }
}
