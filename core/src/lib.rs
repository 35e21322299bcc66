pub mod cli;
pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod errors;
pub mod execute;
pub mod host;
pub mod runtime;
pub mod trace;
pub mod types;

// Re-export main types
pub use types::*;

pub use compiler::{compile, CompilationUnit};
pub use config::EngineConfig;
pub use engine::{default_engine, Engine, EngineBuilder, EngineOptions};
pub use errors::{CodeExecutionError, ConfigError, InvalidCodeError};
pub use execute::{execute, AbortHandle, Script};
pub use host::BackendKind;
pub use runtime::{Context, HostError, Value};
pub use trace::{LineMarker, LineRecorder, Snapshot, Trace, TraceSink};

pub use tokio_util::sync::CancellationToken;
