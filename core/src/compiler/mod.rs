//! Source transformer
//!
//! `compile` parses and validates a script, rewrites it into instrumented
//! text (line tracking, comment and log capture, tag literal lowering) and
//! parses that text again into the tree the runtime executes. Positions in
//! the executed tree are instrumented positions; the unit's [`SourceMap`]
//! maps them back to the script as written.

pub mod ast;
pub mod cache;
pub mod instrument;
pub mod markup;
pub mod parser;
pub mod source_map;
pub mod validator;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::errors::InvalidCodeError;
use ast::{Program, Span};

pub use cache::UnitCache;
pub use source_map::SourceMap;

/// Immutable result of compiling one script text
#[derive(Debug, Clone)]
pub struct CompilationUnit {
    /// Script as written
    pub source: String,
    /// Instrumented script text
    pub code: String,
    pub source_map: SourceMap,
    /// Executable statements in the script
    pub statement_count: usize,
    /// Hex SHA-256 of `source`
    pub hash: String,
    pub(crate) program: Arc<Program>,
}

impl CompilationUnit {
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Original position for a position in the instrumented text
    pub fn original_position(&self, generated: Span) -> Option<Span> {
        self.source_map.original_position(generated)
    }
}

pub fn source_hash(source: &str) -> String {
    format!("{:x}", Sha256::digest(source.as_bytes()))
}

/// Compile a script
pub fn compile(source: &str) -> Result<CompilationUnit, InvalidCodeError> {
    let program = parser::parse_program(source)?;
    validator::validate_program(&program)?;
    let instrumented = instrument::instrument(&program);

    let lowered = parser::parse_program(&instrumented.code).map_err(|err| {
        let (line, column) = err.position();
        let original = instrumented
            .source_map
            .original_position(Span::new(line, column))
            .unwrap_or_default();
        InvalidCodeError {
            message: format!("Failed to lower script: {}", err.message()),
            line: original.line,
            column: original.column,
        }
    })?;

    Ok(CompilationUnit {
        source: source.to_string(),
        code: instrumented.code,
        source_map: instrumented.source_map,
        statement_count: instrumented.statement_count,
        hash: source_hash(source),
        program: Arc::new(lowered),
    })
}
