//! Statement execution

use crate::compiler::ast::{CatchClause, DeclKind, Declarator, ForInit, Pattern, Span, Stmt, SwitchCase};
use crate::runtime::control::{Control, ExecResult, RuntimeError, Unwind};
use crate::runtime::object;
use crate::runtime::operators::strict_equals;
use crate::runtime::scope::{self, BindingKind, Env, Scope};
use crate::runtime::value::{BoxFuture, ObjectRef, Value};
use crate::runtime::vm::VM;
use crate::trace::Trace;

fn binding_kind(kind: DeclKind) -> BindingKind {
    match kind {
        DeclKind::Var => BindingKind::Var,
        DeclKind::Let => BindingKind::Let,
        DeclKind::Const => BindingKind::Const,
    }
}

/// What a loop body's completion means for the loop
enum LoopStep {
    Next,
    Exit(ExecResult),
}

fn loop_step(control: Control) -> LoopStep {
    match control {
        Control::Break => LoopStep::Exit(Ok(Control::None)),
        Control::Return(value) => LoopStep::Exit(Ok(Control::Return(value))),
        Control::None | Control::Continue => LoopStep::Next,
    }
}

/// Fresh scope holding copies of the loop's `let` bindings
fn iteration_env(parent: &Env, from: &Env, names: &[String]) -> Env {
    let env = Scope::child(parent);
    for name in names {
        if let Some(binding) = from.get_own(name) {
            env.declare(name, binding.value, binding.kind);
        }
    }
    env
}

impl VM {
    /// Run statements in order, stopping at the first abrupt completion
    pub(crate) fn exec_block<'a>(&'a mut self, body: &'a [Stmt], env: &'a Env) -> BoxFuture<'a, ExecResult> {
        Box::pin(async move {
            for stmt in body {
                match self.exec(stmt, env).await? {
                    Control::None => {}
                    other => return Ok(other),
                }
            }
            Ok(Control::None)
        })
    }

    /// Statements in a fresh block scope
    async fn exec_scoped(&mut self, body: &[Stmt], env: &Env) -> ExecResult {
        let block_env = Scope::child(env);
        self.hoist_functions(body, &block_env);
        self.exec_block(body, &block_env).await
    }

    pub(crate) fn exec<'a>(&'a mut self, stmt: &'a Stmt, env: &'a Env) -> BoxFuture<'a, ExecResult> {
        Box::pin(async move {
            let span = stmt.span();
            self.check(span)?;
            self.current = span;

            match stmt {
                Stmt::Block { body, .. } => self.exec_scoped(body, env).await,
                Stmt::Decl { kind, decls, .. } => {
                    self.exec_declarations(*kind, decls, env).await?;
                    Ok(Control::None)
                }
                // Hoisted on entry to the enclosing body
                Stmt::Function { .. } | Stmt::Empty { .. } => Ok(Control::None),
                Stmt::If {
                    test,
                    consequent,
                    alternate,
                    ..
                } => {
                    if self.eval(test, env).await?.is_truthy() {
                        self.exec(consequent, env).await
                    } else if let Some(alternate) = alternate {
                        self.exec(alternate, env).await
                    } else {
                        Ok(Control::None)
                    }
                }
                Stmt::While { test, body, .. } => {
                    loop {
                        self.check(span)?;
                        if !self.eval(test, env).await?.is_truthy() {
                            return Ok(Control::None);
                        }
                        if let LoopStep::Exit(result) = loop_step(self.exec(body, env).await?) {
                            return result;
                        }
                    }
                }
                Stmt::DoWhile { body, test, .. } => {
                    loop {
                        self.check(span)?;
                        if let LoopStep::Exit(result) = loop_step(self.exec(body, env).await?) {
                            return result;
                        }
                        if !self.eval(test, env).await?.is_truthy() {
                            return Ok(Control::None);
                        }
                    }
                }
                Stmt::For {
                    init,
                    test,
                    update,
                    body,
                    ..
                } => {
                    let loop_env = Scope::child(env);
                    let mut per_iteration = Vec::new();
                    match init {
                        Some(ForInit::Decl { kind, decls }) => {
                            if *kind != DeclKind::Var {
                                per_iteration = decls.iter().flat_map(|d| d.target.bound_names()).collect();
                            }
                            self.exec_declarations(*kind, decls, &loop_env).await?;
                        }
                        Some(ForInit::Expr { expr }) => {
                            self.eval(expr, &loop_env).await?;
                        }
                        None => {}
                    }
                    let mut iter_env = iteration_env(env, &loop_env, &per_iteration);
                    loop {
                        self.check(span)?;
                        if let Some(test) = test {
                            if !self.eval(test, &iter_env).await?.is_truthy() {
                                return Ok(Control::None);
                            }
                        }
                        if let LoopStep::Exit(result) = loop_step(self.exec(body, &iter_env).await?) {
                            return result;
                        }
                        iter_env = iteration_env(env, &iter_env, &per_iteration);
                        if let Some(update) = update {
                            self.eval(update, &iter_env).await?;
                        }
                    }
                }
                Stmt::ForOf {
                    kind,
                    target,
                    iterable,
                    body,
                    ..
                } => {
                    let iterable_value = self.eval(iterable, env).await?;
                    let items = match &iterable_value {
                        Value::Array(arr) => arr.items(),
                        Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
                        other => {
                            return Err(self.type_error(
                                format!("{} is not iterable", other.to_display()),
                                iterable.span(),
                            ))
                        }
                    };
                    self.exec_for_each(*kind, target, items, body, env, span).await
                }
                Stmt::ForIn {
                    kind,
                    target,
                    object,
                    body,
                    ..
                } => {
                    let object_value = self.eval(object, env).await?;
                    let keys = object::own_keys(&object_value).into_iter().map(Value::Str).collect();
                    self.exec_for_each(*kind, target, keys, body, env, span).await
                }
                Stmt::Switch {
                    discriminant, cases, ..
                } => {
                    let value = self.eval(discriminant, env).await?;
                    self.exec_switch(&value, cases, env).await
                }
                Stmt::Try {
                    block,
                    handler,
                    finalizer,
                    ..
                } => self.exec_try(block, handler.as_ref(), finalizer.as_deref(), env).await,
                Stmt::Return { value, .. } => {
                    let value = match value {
                        Some(expr) => self.eval(expr, env).await?,
                        None => Value::Undefined,
                    };
                    Ok(Control::Return(value))
                }
                Stmt::Break { .. } => Ok(Control::Break),
                Stmt::Continue { .. } => Ok(Control::Continue),
                Stmt::Throw { value, .. } => {
                    let value = self.eval(value, env).await?;
                    Err(self.throw_value(value, span))
                }
                Stmt::Expr { expr, .. } => {
                    self.eval(expr, env).await?;
                    Ok(Control::None)
                }
                Stmt::Comment { text, span } => {
                    self.hooks.trace.push(Trace::Comment {
                        text: text.clone(),
                        line: span.line,
                    });
                    Ok(Control::None)
                }
            }
        })
    }

    async fn exec_declarations(&mut self, kind: DeclKind, decls: &[Declarator], env: &Env) -> Result<(), Unwind> {
        for decl in decls {
            let value = match &decl.init {
                Some(init) => self.eval(init, env).await?,
                // `var x;` keeps the hoisted value
                None if kind == DeclKind::Var => continue,
                None => Value::Undefined,
            };
            self.bind_pattern(&decl.target, value, Some(binding_kind(kind)), env).await?;
        }
        Ok(())
    }

    async fn exec_for_each(
        &mut self,
        kind: Option<DeclKind>,
        target: &Pattern,
        items: Vec<Value>,
        body: &Stmt,
        env: &Env,
        span: Span,
    ) -> ExecResult {
        for item in items {
            self.check(span)?;
            let iter_env = Scope::child(env);
            self.bind_pattern(target, item, kind.map(binding_kind), &iter_env).await?;
            if let LoopStep::Exit(result) = loop_step(self.exec(body, &iter_env).await?) {
                return result;
            }
        }
        Ok(Control::None)
    }

    async fn exec_switch(&mut self, value: &Value, cases: &[SwitchCase], env: &Env) -> ExecResult {
        let mut start = None;
        for (i, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                let candidate = self.eval(test, env).await?;
                if strict_equals(value, &candidate) {
                    start = Some(i);
                    break;
                }
            }
        }
        let start = start.or_else(|| cases.iter().position(|c| c.test.is_none()));
        let Some(start) = start else {
            return Ok(Control::None);
        };

        let switch_env = Scope::child(env);
        for case in &cases[start..] {
            self.hoist_functions(&case.body, &switch_env);
            match self.exec_block(&case.body, &switch_env).await? {
                Control::None => {}
                Control::Break => return Ok(Control::None),
                other => return Ok(other),
            }
        }
        Ok(Control::None)
    }

    async fn exec_try(
        &mut self,
        block: &[Stmt],
        handler: Option<&CatchClause>,
        finalizer: Option<&[Stmt]>,
        env: &Env,
    ) -> ExecResult {
        let mut result = self.exec_scoped(block, env).await;

        let caught = match &result {
            Err(Unwind::Throw(thrown)) if !thrown.from_host => Some(thrown.value.clone()),
            _ => None,
        };
        if let (Some(handler), Some(value)) = (handler, caught) {
            let catch_env = Scope::child(env);
            if let Some(param) = &handler.param {
                self.bind_pattern(param, value, Some(BindingKind::Let), &catch_env).await?;
            }
            result = self.exec_scoped(&handler.body, &catch_env).await;
        }

        if let Some(finalizer) = finalizer {
            if matches!(result, Err(Unwind::Abort) | Err(Unwind::Timeout(_)) | Err(Unwind::Signal(_))) {
                return result;
            }
            match self.exec_scoped(finalizer, env).await? {
                Control::None => {}
                other => return Ok(other),
            }
        }
        result
    }

    /* ===================== Binding ===================== */

    /// Bind a pattern to a value. `kind` declares new bindings (`var` lands in
    /// the function scope); `None` assigns to existing names.
    pub(crate) fn bind_pattern<'a>(
        &'a mut self,
        pattern: &'a Pattern,
        value: Value,
        kind: Option<BindingKind>,
        env: &'a Env,
    ) -> BoxFuture<'a, Result<(), Unwind>> {
        Box::pin(async move {
            match pattern {
                Pattern::Ident { name, span } => match kind {
                    Some(BindingKind::Var) => {
                        scope::function_env(env).declare(name, value, BindingKind::Var);
                        Ok(())
                    }
                    Some(kind) => {
                        env.declare(name, value, kind);
                        Ok(())
                    }
                    None => self.assign_name(name, value, *span, env),
                },
                Pattern::Object { props, rest, span } => {
                    if value.is_nullish() {
                        return Err(self.throw_error(
                            RuntimeError::type_error(format!(
                                "Cannot destructure '{}' as it is {}.",
                                value.to_display(),
                                value.to_display()
                            )),
                            *span,
                        ));
                    }
                    for prop in props {
                        let mut item = self.get_member(&value, &prop.key, *span, env).await?;
                        if let (Value::Undefined, Some(default)) = (&item, &prop.default) {
                            item = self.eval(default, env).await?;
                        }
                        self.bind_pattern(&prop.value, item, kind, env).await?;
                    }
                    if let Some(rest) = rest {
                        let remaining = ObjectRef::new();
                        for key in object::own_enumerable_keys(&value) {
                            if props.iter().any(|p| p.key == key) {
                                continue;
                            }
                            let item = self.get_member(&value, &key, *span, env).await?;
                            remaining.insert(&key, item);
                        }
                        self.bind_pattern(rest, Value::Object(remaining), kind, env).await?;
                    }
                    Ok(())
                }
                Pattern::Array { elems, rest, span } => {
                    let items = match &value {
                        Value::Array(arr) => arr.items(),
                        Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
                        other => {
                            return Err(
                                self.type_error(format!("{} is not iterable", other.to_display()), *span)
                            )
                        }
                    };
                    for (i, elem) in elems.iter().enumerate() {
                        let mut item = items.get(i).cloned().unwrap_or_default();
                        if let (Value::Undefined, Some(default)) = (&item, &elem.default) {
                            item = self.eval(default, env).await?;
                        }
                        self.bind_pattern(&elem.target, item, kind, env).await?;
                    }
                    if let Some(rest) = rest {
                        let remaining = items.get(elems.len()..).map(<[Value]>::to_vec).unwrap_or_default();
                        self.bind_pattern(rest, Value::array(remaining), kind, env).await?;
                    }
                    Ok(())
                }
            }
        })
    }
}
