//! Failure diagnostics
//!
//! Maps failure frames from instrumented positions back to the script as
//! written and renders the excerpt attached to errors and signals:
//!
//! ```text
//! 001 | const a = 1
//! > 002 | throw new Error("boom")
//!        ^^^^^^^^^^
//!   003 | return a
//! ```
//!
//! Every line is printed as `NNN | code` behind a two-space margin; frame
//! lines get a `> ` margin and a marker line underneath.

use std::collections::BTreeSet;

use crate::compiler::ast::Span;
use crate::compiler::CompilationUnit;
use crate::errors::CodeExecutionError;
use crate::runtime::{RaisedSignal, Thrown};
use crate::trace::Trace;
use crate::types::VMSignal;

const MARKER: &str = "^^^^^^^^^^";

/// Rendered excerpt for one failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excerpt {
    /// Every line of the script
    pub full: String,
    /// Lines up to and including the furthest marked line
    pub truncated: String,
}

/// Map instrumented frame positions to original positions, dropping
/// frames without a mapping
pub fn original_frames(frames: &[Span], unit: &CompilationUnit) -> Vec<Span> {
    frames.iter().filter_map(|span| unit.original_position(*span)).collect()
}

fn indentation(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

/// Render the excerpt for frames given as original positions
pub fn render_excerpt(source: &str, frames: &[Span]) -> Excerpt {
    let marked: BTreeSet<usize> = frames.iter().map(|f| f.line).collect();
    let last_marked = marked.iter().next_back().copied().unwrap_or(0);

    let mut full = String::new();
    let mut truncated = String::new();
    let mut cut = false;

    for (i, raw) in source.split('\n').enumerate() {
        let line_no = i + 1;
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        let number = format!("{:03}", line_no);
        let mut chunk = String::new();
        if marked.contains(&line_no) {
            chunk.push_str(&format!("> {} | {}\n", number, line));
            chunk.push_str(&format!(
                "    {}{}\n",
                " ".repeat(number.len() + indentation(line)),
                MARKER
            ));
        } else {
            chunk.push_str(&format!("  {} | {}\n", number, line));
        }
        full.push_str(&chunk);
        if !cut {
            truncated.push_str(&chunk);
            if marked.contains(&line_no) && line_no >= last_marked {
                cut = true;
            }
        }
    }

    Excerpt {
        full: full.trim().to_string(),
        truncated: truncated.trim().to_string(),
    }
}

/// Frames for a failure: the mapped frames, or the last executed line when
/// none of them map
fn failure_frames(frames: &[Span], unit: &CompilationUnit, last_line: Option<usize>) -> Vec<Span> {
    let mapped = original_frames(frames, unit);
    if !mapped.is_empty() {
        return mapped;
    }
    match last_line {
        Some(line) => {
            let indent = unit
                .source
                .split('\n')
                .nth(line.saturating_sub(1))
                .map(indentation)
                .unwrap_or(0);
            vec![Span::new(line, indent + 1)]
        }
        None => Vec::new(),
    }
}

fn execution_error(message: String, frames: &[Span], unit: &CompilationUnit) -> CodeExecutionError {
    let excerpt = render_excerpt(&unit.source, frames);
    let position = frames.first().copied().unwrap_or_default();
    CodeExecutionError {
        message,
        stack: excerpt.full,
        line: position.line,
        column: position.column,
    }
}

/// Uncaught throw
pub fn render_error(thrown: &Thrown, unit: &CompilationUnit, last_line: Option<usize>) -> CodeExecutionError {
    let frames = failure_frames(&thrown.frames, unit, last_line);
    execution_error(thrown.message(), &frames, unit)
}

/// Deadline passed while executing at `span`
pub fn render_timeout(
    span: Span,
    timeout_ms: u64,
    unit: &CompilationUnit,
    last_line: Option<usize>,
) -> CodeExecutionError {
    let frames = failure_frames(&[span], unit, last_line);
    execution_error(format!("Execution timed out after {}ms", timeout_ms), &frames, unit)
}

pub fn render_signal(signal: RaisedSignal, unit: &CompilationUnit, last_line: Option<usize>) -> VMSignal {
    let frames = failure_frames(&signal.frames, unit, last_line);
    let excerpt = render_excerpt(&unit.source, &frames);
    VMSignal {
        message: signal.message,
        stack: excerpt.full,
        truncated_code: excerpt.truncated,
        variables: signal.variables,
    }
}

/// Terminal trace entry of a failed run
pub fn failure_marker(error: &CodeExecutionError) -> Trace {
    Trace::FailureMarker {
        message: error.message.clone(),
        line: error.line,
        column: error.column,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "const a = 1\nif (a) {\n  throw new Error('boom')\n}\nreturn a";

    #[test]
    fn test_marks_frame_line() {
        let excerpt = render_excerpt(SOURCE, &[Span::new(3, 3)]);
        let lines: Vec<&str> = excerpt.full.lines().collect();
        assert_eq!(lines[0], "001 | const a = 1");
        assert_eq!(lines[1], "  002 | if (a) {");
        assert_eq!(lines[2], "> 003 |   throw new Error('boom')");
        assert_eq!(lines[3], "         ^^^^^^^^^^");
        assert_eq!(lines[4], "  004 | }");
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn test_truncated_stops_after_furthest_frame() {
        let excerpt = render_excerpt(SOURCE, &[Span::new(3, 3), Span::new(1, 1)]);
        assert!(excerpt.truncated.ends_with(MARKER));
        assert!(!excerpt.truncated.contains("004"));
        assert!(excerpt.full.contains("005 | return a"));
        assert!(excerpt.truncated.starts_with("> 001 | const a = 1"));
    }

    #[test]
    fn test_no_frames_renders_plain_listing() {
        let excerpt = render_excerpt("a\nb", &[]);
        assert_eq!(excerpt.full, "001 | a\n  002 | b");
        assert_eq!(excerpt.truncated, excerpt.full);
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let frames = [Span::new(3, 3)];
        assert_eq!(render_excerpt(SOURCE, &frames), render_excerpt(SOURCE, &frames));
    }
}
