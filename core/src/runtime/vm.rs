//! Virtual Machine state
//!
//! The VM holds everything one run needs:
//! - root: the script's top-level scope (its bindings become rebindings)
//! - context: caller names, written through on bare assignment
//! - globals: builtins, consulted after the context
//! - call_stack: call sites of the active script functions
//! - pending: host promises the script has not awaited yet
//!
//! Evaluation is recursive and async; every recursive step returns a boxed
//! future borrowing the VM mutably.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll, Waker};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::compiler::ast::{DeclKind, ForInit, FunctionBody, FunctionDef, Program, Span, Stmt};
use crate::runtime::context::Context;
use crate::runtime::control::{
    make_error, Control, ErrorKind, EvalResult, RaisedSignal, RuntimeError, Thrown, Unwind,
};
use crate::runtime::scope::{self, BindingKind, Env, Scope};
use crate::runtime::stdlib;
use crate::runtime::value::{
    BoxFuture, Callable, Closure, HostError, HostFunction, HostKind, PromiseCell, PromiseState, ToolCallInfo,
    Value,
};
use crate::trace::{LineRecorder, Snapshot, Trace, TraceSink};

/// Deepest script call nesting before a `RangeError`
pub const MAX_CALL_DEPTH: usize = 200;

/// Runs a host future somewhere else and resolves with its result
pub type Spawner = Arc<
    dyn Fn(BoxFuture<'static, Result<Value, HostError>>) -> BoxFuture<'static, Result<Value, HostError>>
        + Send
        + Sync,
>;

/// Host call running as its own task; aborted when dropped
struct HostTask {
    task: JoinHandle<Result<Value, HostError>>,
}

impl Future for HostTask {
    type Output = Result<Value, HostError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.task).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(err)) if err.is_cancelled() => {
                Poll::Ready(Err(HostError::Message("Host call was cancelled".into())))
            }
            Poll::Ready(Err(_)) => Poll::Ready(Err(HostError::Message("Host call panicked".into()))),
        }
    }
}

impl Drop for HostTask {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start a host call on `handle` right away. The call runs up to its first
/// suspension point before this returns, the rest continues as a task.
pub fn spawn_host_call(
    handle: &Handle,
    mut fut: BoxFuture<'static, Result<Value, HostError>>,
) -> BoxFuture<'static, Result<Value, HostError>> {
    let first = {
        let _runtime = handle.enter();
        fut.as_mut().poll(&mut TaskContext::from_waker(Waker::noop()))
    };
    match first {
        Poll::Ready(result) => Box::pin(std::future::ready(result)),
        Poll::Pending => Box::pin(HostTask {
            task: handle.spawn(fut),
        }),
    }
}

/// Sinks a run reports into
#[derive(Debug, Clone, Default)]
pub struct RunHooks {
    pub trace: TraceSink,
    pub lines: LineRecorder,
    /// Builtin `console` writes through `tracing`
    pub console_passthrough: bool,
}

/// Cancellation and deadline for one run
#[derive(Debug, Clone)]
pub struct Guard {
    pub token: CancellationToken,
    pub deadline: Option<Instant>,
    /// Check before every statement, loop iteration and call, not only at awaits
    pub preemptive: bool,
}

impl Guard {
    pub fn new(token: CancellationToken, deadline: Option<Instant>, preemptive: bool) -> Self {
        Self {
            token,
            deadline,
            preemptive,
        }
    }

    /// Interrupt check usable at any point
    pub fn poll(&self, span: Span) -> Result<(), Unwind> {
        if self.token.is_cancelled() {
            return Err(Unwind::Abort);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Unwind::Timeout(span));
            }
        }
        Ok(())
    }
}

impl Default for Guard {
    fn default() -> Self {
        Self::new(CancellationToken::new(), None, false)
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/* ===================== VM ===================== */

pub struct VM {
    pub(crate) root: Env,
    pub(crate) context: Context,
    pub(crate) globals: HashMap<String, Value>,
    pub(crate) hooks: RunHooks,
    pub(crate) guard: Guard,
    pub(crate) spawner: Option<Spawner>,
    pub(crate) call_stack: Vec<Span>,
    pub(crate) pending: Vec<Arc<PromiseCell>>,
    /// Span of the statement currently executing
    pub(crate) current: Span,
}

impl VM {
    pub fn new(context: Context, hooks: RunHooks, guard: Guard) -> Self {
        let mut globals = HashMap::new();
        stdlib::inject_stdlib(&mut globals);
        VM {
            root: Scope::root(),
            context,
            globals,
            hooks,
            guard,
            spawner: None,
            call_stack: Vec::new(),
            pending: Vec::new(),
            current: Span::default(),
        }
    }

    /// Route async host calls through `spawner` instead of the current runtime
    pub fn with_spawner(mut self, spawner: Spawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Run a program to completion. A returned promise is awaited and host
    /// calls the script never awaited are driven before returning.
    pub async fn run(&mut self, program: &Program) -> EvalResult {
        self.guard.poll(Span::default())?;
        let root = self.root.clone();
        self.hoist_declarations(&program.body, &root);
        let control = self.exec_block(&program.body, &root).await?;
        let value = match control {
            Control::Return(value) => value,
            _ => Value::Undefined,
        };
        let span = self.current;
        let value = self.await_value(value, span, &root).await?;
        self.drain_pending(&root).await?;
        Ok(value)
    }

    /// Top-level declarations of the script, functions excluded
    pub fn rebindings(&self) -> HashMap<String, Value> {
        self.root
            .bindings()
            .into_iter()
            .filter(|(_, b)| b.kind != BindingKind::Function)
            .map(|(name, b)| (name, b.value))
            .collect()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /* ===================== Interrupts ===================== */

    /// Preemptive interrupt check; a no-op for cooperative runs
    pub(crate) fn check(&self, span: Span) -> Result<(), Unwind> {
        if self.guard.preemptive {
            self.guard.poll(span)
        } else {
            Ok(())
        }
    }

    /// Drive a host future, giving up when the run is cancelled or times out
    async fn drive(
        &self,
        fut: BoxFuture<'static, Result<Value, HostError>>,
        span: Span,
    ) -> Result<Result<Value, HostError>, Unwind> {
        let token = self.guard.token.clone();
        let deadline = self.guard.deadline;
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Unwind::Abort),
            _ = sleep_until_deadline(deadline) => Err(Unwind::Timeout(span)),
            result = fut => Ok(result),
        }
    }

    /* ===================== Errors ===================== */

    /// Throw site followed by the active call sites, innermost first
    pub(crate) fn frames(&self, site: Span) -> Vec<Span> {
        let mut frames = vec![site];
        frames.extend(self.call_stack.iter().rev().copied());
        frames
    }

    pub(crate) fn throw_value(&self, value: Value, site: Span) -> Unwind {
        Unwind::Throw(Thrown::new(value, self.frames(site)))
    }

    pub(crate) fn throw_error(&self, err: RuntimeError, site: Span) -> Unwind {
        self.throw_value(err.into_value(), site)
    }

    pub(crate) fn type_error(&self, message: impl Into<String>, site: Span) -> Unwind {
        self.throw_error(RuntimeError::type_error(message), site)
    }

    fn host_failure(&self, message: &str, site: Span) -> Thrown {
        Thrown {
            value: make_error(ErrorKind::Error, message),
            frames: self.frames(site),
            from_host: true,
        }
    }

    /// Capture a host signal with every binding visible at the raise point
    pub(crate) fn raise_signal(&self, message: String, site: Span, env: &Env) -> Unwind {
        let variables = scope::visible_bindings(env)
            .into_iter()
            .map(|(name, binding)| (name, Snapshot::shallow(&binding.value)))
            .collect();
        Unwind::Signal(RaisedSignal {
            message,
            frames: self.frames(site),
            variables,
        })
    }

    /* ===================== Name Resolution ===================== */

    /// Scope chain, then context, then builtins
    pub(crate) fn lookup_name(&self, name: &str, env: &Env) -> Option<Value> {
        scope::lookup(env, name)
            .or_else(|| self.context.get(name))
            .or_else(|| self.globals.get(name).cloned())
    }

    pub(crate) fn resolve(&self, name: &str, span: Span, env: &Env) -> EvalResult {
        self.lookup_name(name, env).ok_or_else(|| {
            self.throw_error(
                RuntimeError::reference_error(format!("{} is not defined", name)),
                span,
            )
        })
    }

    /// Bare assignment: nearest declared binding, else the context entry
    pub(crate) fn assign_name(&self, name: &str, value: Value, span: Span, env: &Env) -> Result<(), Unwind> {
        match scope::assign(env, name, value.clone()) {
            Some(Ok(())) => Ok(()),
            Some(Err(err)) => Err(self.throw_error(err, span)),
            None => {
                self.context.set(name, value);
                Ok(())
            }
        }
    }

    /* ===================== Hoisting ===================== */

    /// `var` names and function declarations of a function or script body
    pub(crate) fn hoist_declarations(&self, body: &[Stmt], env: &Env) {
        let mut names = Vec::new();
        collect_var_names(body, &mut names);
        for name in names {
            env.declare_var(&name);
        }
        self.hoist_functions(body, env);
    }

    /// Function declarations directly inside a block
    pub(crate) fn hoist_functions(&self, body: &[Stmt], env: &Env) {
        for stmt in body {
            if let Stmt::Function { func, .. } = stmt {
                if let Some(name) = &func.name {
                    env.declare(name, make_closure(func, env), BindingKind::Function);
                }
            }
        }
    }

    /* ===================== Calls ===================== */

    /// Call any callable value
    pub(crate) fn call_function<'a>(
        &'a mut self,
        callee: Value,
        args: Vec<Value>,
        site: Span,
        env: &'a Env,
    ) -> BoxFuture<'a, EvalResult> {
        Box::pin(async move {
            self.check(site)?;
            let func = match &callee {
                Value::Function(func) => func.clone(),
                other => {
                    return Err(self.type_error(format!("{} is not a function", other.to_display()), site));
                }
            };
            match &*func {
                Callable::Script(closure) => self.invoke_closure(closure, args, site).await,
                Callable::Host(host) => self.invoke_host(host, args, site, env, true).await,
                Callable::Builtin(builtin) => {
                    let this = builtin.this.clone();
                    self.call_builtin(builtin.func, this, args, site, env).await
                }
            }
        })
    }

    /// Call a host function without recording a tool call
    pub(crate) async fn call_untraced(&mut self, callee: Value, args: Vec<Value>, site: Span, env: &Env) -> EvalResult {
        if let Value::Function(func) = &callee {
            if let Callable::Host(host) = &**func {
                return self.invoke_host(host, args, site, env, false).await;
            }
        }
        self.call_function(callee, args, site, env).await
    }

    fn invoke_closure<'a>(&'a mut self, closure: &'a Closure, args: Vec<Value>, site: Span) -> BoxFuture<'a, EvalResult> {
        Box::pin(async move {
            if self.call_stack.len() >= MAX_CALL_DEPTH {
                return Err(self.throw_error(
                    RuntimeError::range_error("Maximum call stack size exceeded"),
                    site,
                ));
            }
            self.call_stack.push(site);
            let result = self.run_closure(closure, args).await;
            self.call_stack.pop();

            if !closure.def.is_async {
                return result;
            }
            match result {
                Ok(Value::Promise(p)) => Ok(Value::Promise(p)),
                Ok(value) => Ok(Value::Promise(PromiseCell::fulfilled(value))),
                Err(Unwind::Throw(thrown)) if !thrown.from_host => Ok(Value::Promise(PromiseCell::rejected(thrown))),
                Err(other) => Err(other),
            }
        })
    }

    async fn run_closure(&mut self, closure: &Closure, args: Vec<Value>) -> EvalResult {
        let def = &closure.def;
        let fenv = Scope::function(&closure.env);
        for (i, param) in def.params.iter().enumerate() {
            let value = if param.rest {
                Value::array(args.iter().skip(i).cloned())
            } else {
                args.get(i).cloned().unwrap_or_default()
            };
            let value = match (&value, &param.default) {
                (Value::Undefined, Some(default)) => self.eval(default, &fenv).await?,
                _ => value,
            };
            self.bind_pattern(&param.target, value, Some(BindingKind::Param), &fenv).await?;
        }
        match &def.body {
            FunctionBody::Block { body } => {
                self.hoist_declarations(body, &fenv);
                match self.exec_block(body, &fenv).await? {
                    Control::Return(value) => Ok(value),
                    _ => Ok(Value::Undefined),
                }
            }
            FunctionBody::Expr { expr } => self.eval(expr, &fenv).await,
        }
    }

    async fn invoke_host(
        &mut self,
        host: &HostFunction,
        args: Vec<Value>,
        site: Span,
        env: &Env,
        traced: bool,
    ) -> EvalResult {
        let input = traced.then(|| tool_input(&args));
        match &host.kind {
            HostKind::Sync(f) => {
                let result = f(args);
                if let Some(input) = input {
                    self.record_tool_call(&host.name, input, &result);
                }
                match result {
                    Ok(value) => Ok(value),
                    Err(HostError::Message(message)) => {
                        tracing::warn!(function = %host.name, %message, "host function failed");
                        Err(Unwind::Throw(self.host_failure(&message, site)))
                    }
                    Err(HostError::Signal(message)) => Err(self.raise_signal(message, site, env)),
                }
            }
            HostKind::Async(f) => {
                let fut = f(args);
                let fut = match (&self.spawner, Handle::try_current()) {
                    (Some(spawn), _) => spawn(fut),
                    (None, Ok(handle)) => spawn_host_call(&handle, fut),
                    (None, Err(_)) => fut,
                };
                let tool = input.map(|input| ToolCallInfo {
                    name: host.name.clone(),
                    input,
                });
                let promise = PromiseCell::pending(fut, tool);
                self.pending.push(promise.clone());
                Ok(Value::Promise(promise))
            }
        }
    }

    fn record_tool_call(&self, name: &str, input: Snapshot, result: &Result<Value, HostError>) {
        let (output, error) = match result {
            Ok(value) => (Some(Snapshot::from(value)), None),
            Err(err) => (None, Some(err.to_string())),
        };
        self.hooks.trace.push(Trace::ToolCall {
            name: name.to_string(),
            input,
            output,
            error,
        });
    }

    /* ===================== Promises ===================== */

    /// `await`: settle a promise, pass anything else through
    pub(crate) async fn await_value(&mut self, value: Value, span: Span, env: &Env) -> EvalResult {
        self.guard.poll(span)?;
        match value {
            Value::Promise(promise) => self.settle(&promise, span, env).await,
            other => Ok(other),
        }
    }

    async fn settle(&mut self, promise: &Arc<PromiseCell>, span: Span, env: &Env) -> EvalResult {
        let fut = promise.take_future();
        let Some(fut) = fut else {
            let settled = match &*promise.state() {
                PromiseState::Fulfilled(value) => Ok(value.clone()),
                PromiseState::Rejected(thrown) => Err(Unwind::Throw(thrown.clone())),
                PromiseState::Pending(_) => Ok(Value::Undefined),
            };
            return settled;
        };

        let result = self.drive(fut, span).await?;
        if let Some(tool) = promise.tool() {
            self.record_tool_call(&tool.name, tool.input.clone(), &result);
        }
        match result {
            Ok(value) => {
                promise.settle(PromiseState::Fulfilled(value.clone()));
                Ok(value)
            }
            Err(HostError::Message(message)) => {
                tracing::warn!(%message, "async host function failed");
                let thrown = self.host_failure(&message, span);
                promise.settle(PromiseState::Rejected(thrown.clone()));
                Err(Unwind::Throw(thrown))
            }
            Err(HostError::Signal(message)) => {
                let thrown = self.host_failure(&message, span);
                promise.settle(PromiseState::Rejected(thrown));
                Err(self.raise_signal(message, span, env))
            }
        }
    }

    /// Settle host promises the script started but never awaited
    async fn drain_pending(&mut self, env: &Env) -> Result<(), Unwind> {
        let pending = std::mem::take(&mut self.pending);
        let span = self.current;
        for promise in pending.iter().filter(|p| p.is_pending()) {
            match self.settle(promise, span, env).await {
                Ok(_) => {}
                Err(Unwind::Throw(thrown)) => {
                    tracing::warn!(message = %thrown.message(), "unawaited host call failed");
                }
                Err(other) => return Err(other),
            }
        }
        Ok(())
    }
}

/// Tool-call input: nothing, the single argument, or the argument list
fn tool_input(args: &[Value]) -> Snapshot {
    match args {
        [] => Snapshot::Undefined,
        [single] => Snapshot::from(single),
        many => Snapshot::from(&Value::array(many.iter().cloned())),
    }
}

pub(crate) fn make_closure(def: &Arc<FunctionDef>, env: &Env) -> Value {
    Value::Function(Arc::new(Callable::Script(Closure {
        def: def.clone(),
        env: env.clone(),
    })))
}

fn collect_var_names(body: &[Stmt], out: &mut Vec<String>) {
    for stmt in body {
        collect_var_names_stmt(stmt, out);
    }
}

fn collect_var_names_stmt(stmt: &Stmt, out: &mut Vec<String>) {
    match stmt {
        Stmt::Decl {
            kind: DeclKind::Var,
            decls,
            ..
        } => {
            for decl in decls {
                out.extend(decl.target.bound_names());
            }
        }
        Stmt::Block { body, .. } => collect_var_names(body, out),
        Stmt::If {
            consequent, alternate, ..
        } => {
            collect_var_names_stmt(consequent, out);
            if let Some(alt) = alternate {
                collect_var_names_stmt(alt, out);
            }
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => collect_var_names_stmt(body, out),
        Stmt::For { init, body, .. } => {
            if let Some(ForInit::Decl {
                kind: DeclKind::Var,
                decls,
            }) = init
            {
                for decl in decls {
                    out.extend(decl.target.bound_names());
                }
            }
            collect_var_names_stmt(body, out);
        }
        Stmt::ForOf { kind, target, body, .. } | Stmt::ForIn { kind, target, body, .. } => {
            if *kind == Some(DeclKind::Var) {
                out.extend(target.bound_names());
            }
            collect_var_names_stmt(body, out);
        }
        Stmt::Switch { cases, .. } => {
            for case in cases {
                collect_var_names(&case.body, out);
            }
        }
        Stmt::Try {
            block,
            handler,
            finalizer,
            ..
        } => {
            collect_var_names(block, out);
            if let Some(handler) = handler {
                collect_var_names(&handler.body, out);
            }
            if let Some(finalizer) = finalizer {
                collect_var_names(finalizer, out);
            }
        }
        _ => {}
    }
}
