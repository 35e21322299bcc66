//! Script execution entry point
//!
//! `execute` compiles (or reuses) a unit, runs it on the engine's backend and
//! packages the raw result: completions carry the return value, rebindings
//! and line trace; throws and timeouts are rendered against the original
//! source and leave a failure marker in the trace; signals carry their
//! variable snapshot; aborts carry their reason.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::compiler::CompilationUnit;
use crate::diagnostics::{self, failure_marker};
use crate::engine::{default_engine, Engine};
use crate::errors::InvalidCodeError;
use crate::host::RunRequest;
use crate::runtime::{Context, RunHooks, Unwind};
use crate::trace::{LineRecorder, Trace, TraceSink};
use crate::types::{ExecutionOutcome, DEFAULT_ABORT_REASON};

/// Source text or an already compiled unit
#[derive(Debug, Clone)]
pub enum Script {
    Source(String),
    Unit(Arc<CompilationUnit>),
}

impl From<&str> for Script {
    fn from(source: &str) -> Self {
        Script::Source(source.to_string())
    }
}

impl From<String> for Script {
    fn from(source: String) -> Self {
        Script::Source(source)
    }
}

impl From<Arc<CompilationUnit>> for Script {
    fn from(unit: Arc<CompilationUnit>) -> Self {
        Script::Unit(unit)
    }
}

impl From<CompilationUnit> for Script {
    fn from(unit: CompilationUnit) -> Self {
        Script::Unit(Arc::new(unit))
    }
}

/// Cancels a run, optionally saying why
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    token: CancellationToken,
    reason: Arc<Mutex<Option<String>>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            reason: Arc::default(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn abort_with_reason(&self, reason: impl Into<String>) {
        if let Ok(mut slot) = self.reason.lock() {
            *slot = Some(reason.into());
        }
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> String {
        self.reason
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
            .unwrap_or_else(|| DEFAULT_ABORT_REASON.to_string())
    }
}

/// Run on the process-wide engine
pub async fn execute(
    context: &Context,
    script: impl Into<Script>,
    trace: Option<TraceSink>,
    token: Option<CancellationToken>,
) -> Result<ExecutionOutcome, InvalidCodeError> {
    default_engine()
        .execute(context, script, trace, token.map(AbortHandle::from_token))
        .await
}

impl Engine {
    pub async fn execute(
        &self,
        context: &Context,
        script: impl Into<Script>,
        trace: Option<TraceSink>,
        abort: Option<AbortHandle>,
    ) -> Result<ExecutionOutcome, InvalidCodeError> {
        let script = script.into();
        let trace = trace.unwrap_or_default();
        let abort = abort.unwrap_or_default();
        let span = tracing::info_span!(
            "execute",
            run_id = %Uuid::new_v4(),
            backend = %self.backend().kind(),
        );
        self.execute_inner(context, script, trace, abort).instrument(span).await
    }

    async fn execute_inner(
        &self,
        context: &Context,
        script: Script,
        trace: TraceSink,
        abort: AbortHandle,
    ) -> Result<ExecutionOutcome, InvalidCodeError> {
        let unit = match script {
            Script::Unit(unit) => unit,
            Script::Source(source) => match self.compile(&source) {
                Ok(unit) => unit,
                Err(err) => {
                    tracing::warn!(error = %err, "invalid code");
                    trace.push(Trace::InvalidCode {
                        message: err.to_string(),
                    });
                    return Err(err);
                }
            },
        };

        if abort.is_aborted() {
            let reason = abort.reason();
            tracing::info!(%reason, "aborted before start");
            return Ok(ExecutionOutcome::Aborted { reason });
        }

        let lines = LineRecorder::new();
        let request = RunRequest {
            unit: unit.clone(),
            context: context.clone(),
            hooks: RunHooks {
                trace: trace.clone(),
                lines: lines.clone(),
                console_passthrough: self.config().console_passthrough,
            },
            token: abort.token(),
            timeout: self.config().timeout(),
        };

        let started = Instant::now();
        tracing::debug!(hash = %unit.hash, statements = unit.statement_count, "run started");
        let run = self.backend().run(request).await;
        let line_trace = lines.markers();
        let last_line = line_trace.last().map(|marker| marker.line);

        let outcome = match run.result {
            Ok(return_value) => ExecutionOutcome::Completed {
                return_value,
                rebindings: run.rebindings,
                line_trace,
            },
            Err(Unwind::Throw(thrown)) => {
                let error = diagnostics::render_error(&thrown, &unit, last_line);
                trace.push(failure_marker(&error));
                tracing::warn!(message = %error.message, line = error.line, "script failed");
                ExecutionOutcome::Failed { error }
            }
            Err(Unwind::Timeout(at)) => {
                let error = diagnostics::render_timeout(at, self.config().timeout_ms, &unit, last_line);
                trace.push(failure_marker(&error));
                tracing::warn!(message = %error.message, line = error.line, "script timed out");
                ExecutionOutcome::Failed { error }
            }
            Err(Unwind::Signal(raised)) => {
                let signal = diagnostics::render_signal(raised, &unit, last_line);
                tracing::info!(message = %signal.message, "script raised a signal");
                ExecutionOutcome::Signaled { signal }
            }
            Err(Unwind::Abort) => {
                let reason = abort.reason();
                tracing::info!(%reason, "script aborted");
                ExecutionOutcome::Aborted { reason }
            }
        };

        tracing::debug!(
            status = ?outcome.status(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "run finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_reason_defaults() {
        let handle = AbortHandle::new();
        assert!(!handle.is_aborted());
        handle.abort();
        assert!(handle.is_aborted());
        assert_eq!(handle.reason(), DEFAULT_ABORT_REASON);
    }

    #[test]
    fn test_abort_with_reason() {
        let handle = AbortHandle::new();
        handle.abort_with_reason("user cancelled");
        assert!(handle.token().is_cancelled());
        assert_eq!(handle.reason(), "user cancelled");
    }

    #[test]
    fn test_script_conversions() {
        assert!(matches!(Script::from("return 1"), Script::Source(_)));
        let unit = crate::compiler::compile("return 1").unwrap();
        assert!(matches!(Script::from(unit), Script::Unit(_)));
    }
}
