//! Public error types

use serde::Serialize;
use thiserror::Error;

use crate::compiler::parser::ParseError;
use crate::compiler::validator::ValidationError;

/// Script rejected before it ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{message} ({line}:{column})")]
pub struct InvalidCodeError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl From<ParseError> for InvalidCodeError {
    fn from(err: ParseError) -> Self {
        let (line, column) = err.position();
        InvalidCodeError {
            message: err.message().to_string(),
            line,
            column,
        }
    }
}

impl From<ValidationError> for InvalidCodeError {
    fn from(err: ValidationError) -> Self {
        let span = err.span();
        InvalidCodeError {
            message: err.to_string(),
            line: span.line,
            column: span.column,
        }
    }
}

/// Uncaught runtime failure, with the source excerpt pointing at it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{message}")]
pub struct CodeExecutionError {
    pub message: String,
    /// Rendered source excerpt
    pub stack: String,
    /// Original position of the innermost frame
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown backend '{0}', expected 'isolate' or 'in_process'")]
    UnknownBackend(String),

    #[error("invalid configuration: {0}")]
    Load(#[from] config::ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::Span;

    #[test]
    fn test_validation_error_keeps_position() {
        let err: InvalidCodeError = ValidationError::IllegalBreak { span: Span::new(3, 5) }.into();
        assert_eq!(err.line, 3);
        assert_eq!(err.column, 5);
        assert_eq!(err.to_string(), "Illegal break statement (3:5)");
    }

    #[test]
    fn test_unknown_backend_message() {
        let err = ConfigError::UnknownBackend("wasm".into());
        assert!(err.to_string().contains("'wasm'"));
    }
}
