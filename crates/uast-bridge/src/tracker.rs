//! Deferred release of transient host references.
//!
//! While the engine walks a live tree it receives child values that exist
//! only because an accessor produced them. Instead of dropping those handles
//! when the accessor returns, they are parked in the buffer of the scope that
//! is currently active (a filter call or one iterator) and dropped together
//! when that scope ends.

use std::collections::HashMap;

use crate::host::{HostError, HostValue};

/// Identity of an iterator scope.
pub type ScopeId = u64;

/// Running totals, mainly for observing the release discipline.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrackerStats {
    pub tracked: usize,
    pub released: usize,
}

impl TrackerStats {
    /// Handles tracked and not released yet.
    pub fn pending(&self) -> usize {
        self.tracked - self.released
    }
}

#[derive(Debug, Default)]
pub struct MemTracker {
    filter: Option<Vec<HostValue>>,
    current: Option<ScopeId>,
    iterators: HashMap<ScopeId, Vec<HostValue>>,
    stats: TrackerStats,
}

impl MemTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the filter scope. Scopes do not nest.
    pub fn enter_filter(&mut self) -> Result<(), HostError> {
        if self.filter.is_some() {
            return Err(HostError::Busy("filter scope"));
        }
        self.filter = Some(Vec::new());
        Ok(())
    }

    /// Closes the filter scope, releasing everything tracked in it.
    pub fn exit_filter(&mut self) -> usize {
        let held = self.filter.take().unwrap_or_default();
        self.release(held)
    }

    pub fn in_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// Makes `scope` the iterator that receives tracked handles. Returns the
    /// previously current scope.
    pub fn set_current(&mut self, scope: Option<ScopeId>) -> Option<ScopeId> {
        std::mem::replace(&mut self.current, scope)
    }

    pub fn current(&self) -> Option<ScopeId> {
        self.current
    }

    /// Holds `value` until the active scope ends. Outside any scope the
    /// handle is dropped right away.
    pub fn track(&mut self, value: HostValue) {
        let buffer = match (&mut self.filter, self.current) {
            (Some(buffer), _) => buffer,
            (None, Some(scope)) => self.iterators.entry(scope).or_default(),
            (None, None) => return,
        };
        buffer.push(value);
        self.stats.tracked += 1;
        tracing::trace!(tracked = self.stats.tracked, "tracked transient reference");
    }

    /// Releases everything held for `scope`.
    pub fn dispose(&mut self, scope: ScopeId) -> usize {
        if self.current == Some(scope) {
            self.current = None;
        }
        let held = self.iterators.remove(&scope).unwrap_or_default();
        self.release(held)
    }

    /// Handles currently held for `scope`.
    pub fn held(&self, scope: ScopeId) -> usize {
        self.iterators.get(&scope).map_or(0, Vec::len)
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    fn release(&mut self, held: Vec<HostValue>) -> usize {
        let count = held.len();
        drop(held);
        self.stats.released += count;
        if count > 0 {
            tracing::debug!(count, "released tracked references");
        }
        count
    }
}
