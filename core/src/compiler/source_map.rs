//! Generated-position to original-position mapping

use serde::{Deserialize, Serialize};

use super::ast::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub generated: Span,
    pub original: Span,
}

/// Mappings recorded by the instrumenter, ordered by generated position
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMap {
    mappings: Vec<Mapping>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a mapping. Positions must be added in generated order; a
    /// second mapping at the same generated position replaces the first.
    pub fn add(&mut self, generated: Span, original: Span) {
        if let Some(last) = self.mappings.last_mut() {
            if last.generated == generated {
                last.original = original;
                return;
            }
            if last.generated > generated {
                return;
            }
        }
        self.mappings.push(Mapping { generated, original });
    }

    /// Original position of the closest mapping at or before `generated`
    pub fn original_position(&self, generated: Span) -> Option<Span> {
        let idx = self.mappings.partition_point(|m| m.generated <= generated);
        if idx == 0 {
            return None;
        }
        Some(self.mappings[idx - 1].original)
    }

    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
