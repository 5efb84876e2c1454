//! Per-table set of record ids already materialized to the host.
//!
//! Mutations from a batch are collected as ordered `to_add`/`to_remove`
//! buffers during the batch and applied only once, via [`apply_delta`], after
//! the owning transaction commits — this keeps the cache coherent with the
//! database without needing a compensating undo on rollback (the delta
//! simply never gets applied).
//!
//! [`apply_delta`]: IdentityCache::apply_delta

use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct IdentityCache {
    keys: HashSet<String>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `table + "$" + id`. The caller is responsible for ensuring `table`
    /// does not itself contain `$` (assumed, not enforced here — see
    /// `crate::connection::validate_table_name` for the one path that does
    /// enforce it).
    pub fn cache_key(table: &str, id: &str) -> String {
        format!("{table}${id}")
    }

    pub fn is_cached(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn mark_as_cached(&mut self, key: String) {
        self.keys.insert(key);
    }

    pub fn remove_from_cache(&mut self, key: &str) {
        self.keys.remove(key);
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    /// Apply a batch's deferred cache deltas: inserts first, then removals,
    /// in the order given. A key appearing in both sequences nets to
    /// whichever effect came last.
    pub fn apply_delta(&mut self, to_add: Vec<String>, to_remove: Vec<String>) {
        for key in to_add {
            self.keys.insert(key);
        }
        for key in to_remove {
            self.keys.remove(&key);
        }
    }
}
