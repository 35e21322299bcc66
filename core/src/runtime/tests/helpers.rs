//! Test helpers for interpreter tests
//!
//! Compile a script and run it on a bare VM with fresh sinks

use std::collections::HashMap;

use crate::compiler::compile;
use crate::runtime::control::EvalResult;
use crate::runtime::{Context, Guard, RunHooks, Thrown, Unwind, Value, VM};
use crate::trace::{LineMarker, Trace};

/// Everything a finished run left behind
pub struct Run {
    pub result: EvalResult,
    pub context: Context,
    pub trace: Vec<Trace>,
    pub lines: Vec<LineMarker>,
    pub rebindings: HashMap<String, Value>,
}

impl Run {
    pub fn json(&self) -> serde_json::Value {
        match &self.result {
            Ok(value) => value.to_json().unwrap_or(serde_json::Value::Null),
            Err(err) => panic!("Script failed: {:?}", err),
        }
    }

    pub fn thrown(&self) -> &Thrown {
        match &self.result {
            Err(Unwind::Throw(thrown)) => thrown,
            other => panic!("Expected a throw, got {:?}", other.as_ref().map(|v| v.to_display())),
        }
    }
}

/// Compile and run `source` against `context`
pub async fn run_with(source: &str, context: Context) -> Run {
    let unit = compile(source).expect("Compile failed");
    let hooks = RunHooks::default();
    let mut vm = VM::new(context.clone(), hooks.clone(), Guard::default());
    let result = vm.run(unit.program()).await;
    Run {
        result,
        context,
        trace: hooks.trace.entries(),
        lines: hooks.lines.markers(),
        rebindings: vm.rebindings(),
    }
}

pub async fn run(source: &str) -> Run {
    run_with(source, Context::new()).await
}

/// Return value of a script as JSON
pub async fn eval_json(source: &str) -> serde_json::Value {
    run(source).await.json()
}

/// Message of the error a script throws
pub async fn error_message(source: &str) -> String {
    run(source).await.thrown().message()
}

