//! Isolate backend
//!
//! Each run gets its own worker thread with a single-threaded runtime and a
//! detached copy of the context. The interpreter checks the cancellation
//! token and deadline before every statement, loop iteration and call, so
//! a runaway script is interrupted wherever it is. Async host functions
//! still execute on the caller's runtime; the worker only awaits them. A
//! panic on the worker fails the run instead of reaching the caller.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::compiler::CompilationUnit;
use crate::host::marshal::Marshal;
use crate::host::{Backend, BackendKind, RunRequest, RunResult};
use crate::runtime::control::make_error;
use crate::runtime::value::BoxFuture;
use crate::runtime::{
    spawn_host_call, Context, ErrorKind, Guard, HostError, RunHooks, Spawner, Thrown, Unwind, Value, VM,
};

/// Worker thread stack, sized for the deepest script call nesting
pub const WORKER_STACK_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug)]
pub struct IsolateBackend {
    stack_size: usize,
}

impl IsolateBackend {
    pub fn new() -> Self {
        Self {
            stack_size: WORKER_STACK_SIZE,
        }
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size
    }
}

impl Default for IsolateBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn remote_spawner(caller: Handle) -> Spawner {
    Arc::new(
        move |fut: BoxFuture<'static, Result<Value, HostError>>| -> BoxFuture<'static, Result<Value, HostError>> {
            spawn_host_call(&caller, fut)
        },
    )
}

fn isolate_failure(message: String) -> RunResult {
    tracing::error!(%message, "isolate failure");
    RunResult {
        result: Err(Unwind::Throw(Thrown::new(
            make_error(ErrorKind::Error, &message),
            Vec::new(),
        ))),
        rebindings: HashMap::new(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn run_on_worker(
    unit: Arc<CompilationUnit>,
    context: Context,
    hooks: RunHooks,
    token: CancellationToken,
    timeout: Option<Duration>,
    caller: Handle,
) -> RunResult {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => return isolate_failure(format!("Failed to build isolate runtime: {}", err)),
    };
    runtime.block_on(async move {
        let deadline = timeout.map(|t| Instant::now() + t);
        let guard = Guard::new(token, deadline, true);
        let mut vm = VM::new(context, hooks, guard).with_spawner(remote_spawner(caller));
        let result = vm.run(unit.program()).await;
        RunResult {
            result,
            rebindings: vm.rebindings(),
        }
    })
}

impl Backend for IsolateBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Isolate
    }

    fn supports_preemption(&self) -> bool {
        true
    }

    fn run(&self, request: RunRequest) -> BoxFuture<'_, RunResult> {
        let stack_size = self.stack_size;
        Box::pin(async move {
            let caller = Handle::current();
            let mut marshal = Marshal::new();
            let isolated = marshal.copy_context(&request.context);

            // Cancels the worker if this future is dropped mid-run
            let worker_token = request.token.child_token();
            let _cancel_on_drop = worker_token.clone().drop_guard();

            let (tx, rx) = oneshot::channel();
            let unit = request.unit.clone();
            let hooks = request.hooks.clone();
            let timeout = request.timeout;
            let worker_context = isolated.clone();
            let spawned = thread::Builder::new()
                .name("sandscript-isolate".into())
                .stack_size(stack_size)
                .spawn(move || {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        run_on_worker(unit, worker_context, hooks, worker_token, timeout, caller)
                    }))
                    .unwrap_or_else(|payload| {
                        isolate_failure(format!("Isolate worker panicked: {}", panic_message(payload.as_ref())))
                    });
                    let _ = tx.send(result);
                });
            if let Err(err) = spawned {
                return isolate_failure(format!("Failed to start isolate: {}", err));
            }

            let worker = match rx.await {
                Ok(worker) => worker,
                Err(_) => return isolate_failure("Isolate worker stopped unexpectedly".into()),
            };

            marshal.copy_back();
            marshal.copy_back_context(&isolated, &request.context);
            RunResult {
                result: worker.result.map(|value| marshal.restore(&value)),
                rebindings: worker
                    .rebindings
                    .into_iter()
                    .map(|(name, value)| (name, marshal.restore(&value)))
                    .collect(),
            }
        })
    }
}
