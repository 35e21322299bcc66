//! Script interpreter
//!
//! Tree-walking async interpreter over the instrumented [`Program`]. The
//! [`VM`] owns the scope chain and run hooks; statement execution lives in
//! `statements.rs`, expression evaluation in `expressions.rs` and builtins
//! in `stdlib/`.
//!
//! [`Program`]: crate::compiler::ast::Program

pub mod context;
pub mod control;
pub mod expressions;
pub mod object;
pub mod operators;
pub mod scope;
pub mod statements;
pub mod stdlib;
pub mod value;
pub mod vm;

#[cfg(test)]
mod tests;

pub use context::Context;
pub use control::{Control, ErrorKind, RaisedSignal, RuntimeError, Thrown, Unwind};
pub use value::{HostError, ObjectRef, Value};
pub use vm::{spawn_host_call, Guard, RunHooks, Spawner, VM};
