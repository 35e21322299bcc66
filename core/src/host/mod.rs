//! Execution host
//!
//! A backend runs one compilation unit against one context and reports the
//! raw result; packaging it into an outcome happens in `execute`. Two
//! backends exist:
//!
//! - `InProcessBackend` runs in the caller's task on the caller's objects and
//!   observes cancellation only while awaiting host calls.
//! - `IsolateBackend` runs on a dedicated worker thread against a deep copy
//!   of the context, checks for cancellation before every step and copies
//!   data properties back afterwards.

pub mod in_process;
pub mod isolate;
pub mod marshal;


use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::compiler::CompilationUnit;
use crate::errors::ConfigError;
use crate::runtime::value::BoxFuture;
use crate::runtime::{Context, RunHooks, Unwind, Value};

pub use in_process::InProcessBackend;
pub use isolate::IsolateBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Isolate,
    InProcess,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Isolate => "isolate",
            BackendKind::InProcess => "in_process",
        }
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        match self {
            BackendKind::Isolate => Arc::new(IsolateBackend::new()),
            BackendKind::InProcess => Arc::new(InProcessBackend::new()),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "isolate" | "quickjs" => Ok(BackendKind::Isolate),
            "in_process" | "inprocess" | "node" => Ok(BackendKind::InProcess),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// Everything a backend needs for one run
#[derive(Clone)]
pub struct RunRequest {
    pub unit: Arc<CompilationUnit>,
    pub context: Context,
    pub hooks: RunHooks,
    pub token: CancellationToken,
    pub timeout: Option<Duration>,
}

/// Raw result of a run, before diagnostics
pub struct RunResult {
    pub result: Result<Value, Unwind>,
    pub rebindings: HashMap<String, Value>,
}

pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Whether cancellation interrupts running code, not only host awaits
    fn supports_preemption(&self) -> bool;

    fn run(&self, request: RunRequest) -> BoxFuture<'_, RunResult>;
}

#[cfg(test)]
mod backend_kind_tests {
    use super::*;

    #[test]
    fn test_parse_backend_kind() {
        assert_eq!("isolate".parse::<BackendKind>().unwrap(), BackendKind::Isolate);
        assert_eq!("in-process".parse::<BackendKind>().unwrap(), BackendKind::InProcess);
        assert!("wasm".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_preemption_flag() {
        assert!(BackendKind::Isolate.backend().supports_preemption());
        assert!(!BackendKind::InProcess.backend().supports_preemption());
        assert_eq!(IsolateBackend::new().stack_size(), isolate::WORKER_STACK_SIZE);
        assert_eq!(IsolateBackend::new().with_stack_size(1 << 20).stack_size(), 1 << 20);
    }
}
