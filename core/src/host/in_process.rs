use tokio::time::Instant;

use crate::host::{Backend, BackendKind, RunRequest, RunResult};
use crate::runtime::value::BoxFuture;
use crate::runtime::{Guard, VM};

/// Runs scripts directly in the caller's task, on the caller's objects
#[derive(Debug, Default)]
pub struct InProcessBackend;

impl InProcessBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for InProcessBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::InProcess
    }

    fn supports_preemption(&self) -> bool {
        false
    }

    fn run(&self, request: RunRequest) -> BoxFuture<'_, RunResult> {
        Box::pin(async move {
            let deadline = request.timeout.map(|t| Instant::now() + t);
            let guard = Guard::new(request.token, deadline, false);
            let mut vm = VM::new(request.context, request.hooks, guard);
            let result = vm.run(request.unit.program()).await;
            RunResult {
                result,
                rebindings: vm.rebindings(),
            }
        })
    }
}
