//! Bounded cache of compiled units keyed by source hash

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::compiler::{compile, source_hash, CompilationUnit};
use crate::errors::InvalidCodeError;
use crate::runtime::value::lock;

#[derive(Default)]
struct Entries {
    units: HashMap<String, Arc<CompilationUnit>>,
    /// Insertion order, oldest first
    order: VecDeque<String>,
}

pub struct UnitCache {
    capacity: usize,
    entries: Mutex<Entries>,
}

impl UnitCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(Entries::default()),
        }
    }

    pub fn get(&self, source: &str) -> Option<Arc<CompilationUnit>> {
        lock(&self.entries).units.get(&source_hash(source)).cloned()
    }

    /// Cached unit for `source`, compiling it on a miss. Failures are not cached.
    pub fn get_or_compile(&self, source: &str) -> Result<Arc<CompilationUnit>, InvalidCodeError> {
        let hash = source_hash(source);
        if let Some(unit) = lock(&self.entries).units.get(&hash).cloned() {
            tracing::debug!(%hash, "compile cache hit");
            return Ok(unit);
        }
        tracing::debug!(%hash, "compile cache miss");

        let unit = Arc::new(compile(source)?);
        let mut entries = lock(&self.entries);
        if !entries.units.contains_key(&hash) {
            while entries.order.len() >= self.capacity {
                if let Some(oldest) = entries.order.pop_front() {
                    entries.units.remove(&oldest);
                }
            }
            entries.order.push_back(hash.clone());
            entries.units.insert(hash, unit.clone());
        }
        Ok(unit)
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut entries = lock(&self.entries);
        entries.units.clear();
        entries.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_source_is_compiled_once() {
        let cache = UnitCache::new(4);
        let a = cache.get_or_compile("return 1").unwrap();
        let b = cache.get_or_compile("return 1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_oldest_entry_is_evicted() {
        let cache = UnitCache::new(2);
        cache.get_or_compile("return 1").unwrap();
        cache.get_or_compile("return 2").unwrap();
        cache.get_or_compile("return 3").unwrap();
        assert_eq!(cache.len(), 2);
        assert!(cache.get("return 1").is_none());
        assert!(cache.get("return 3").is_some());
    }

    #[test]
    fn test_failures_are_not_cached() {
        let cache = UnitCache::new(2);
        assert!(cache.get_or_compile("let = ;").is_err());
        assert!(cache.is_empty());
    }
}
