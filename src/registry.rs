//! Fetch registry: which single-valued data requests are in flight or done.
//!
//! Every request is identified by a [`CacheKey`]. A key is either absent (never
//! attempted, or the last attempt failed), pending (one shared in-flight future that
//! every interested caller awaits) or satisfied (its records are in the store). A
//! satisfied key is never fetched again for the lifetime of its table.
//!
//! The registry is always accessed under the table lock and never across an
//! `.await`, so "check state" and "mark pending" cannot interleave with another
//! caller.

use crate::error::Result;
use crate::models::Record;
use ahash::AHashMap;
use futures::future::{BoxFuture, Shared};
use std::fmt;
use std::sync::Arc;

/// Outcome of one data request, shared by all of its waiters: the records that were
/// newly inserted into the store.
pub type FetchOutcome = Result<Arc<Vec<Record>>>;

/// In-flight request; cloning attaches another waiter to the same network call.
pub type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// Identity of one single-valued request: the table plus one value per variable
/// dimension, in the table's dimension order. `""` in a slot means "all values".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    table: String,
    values: Vec<String>,
}

impl CacheKey {
    pub fn new(table: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            table: table.into(),
            values,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn is_wildcard(&self) -> bool {
        self.values.iter().any(String::is_empty)
    }

    /// True when every request described by `other` is part of this one.
    pub fn covers(&self, other: &CacheKey) -> bool {
        self.table == other.table
            && self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(mine, theirs)| mine.is_empty() || mine == theirs)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table, self.values.join("."))
    }
}

#[derive(Clone)]
pub enum FetchState {
    Pending(SharedFetch),
    Satisfied { records: usize },
}

impl fmt::Debug for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchState::Pending(_) => f.write_str("Pending"),
            FetchState::Satisfied { records } => {
                f.debug_struct("Satisfied").field("records", records).finish()
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct FetchRegistry {
    entries: AHashMap<CacheKey, FetchState>,
    /// Satisfied keys containing `""` slots, scanned for coverage.
    wildcards: Vec<CacheKey>,
}

impl FetchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, key: &CacheKey) -> Option<&FetchState> {
        self.entries.get(key)
    }

    pub fn is_pending(&self, key: &CacheKey) -> bool {
        matches!(self.entries.get(key), Some(FetchState::Pending(_)))
    }

    /// Satisfied itself, or contained in a satisfied wildcard request.
    pub fn is_covered(&self, key: &CacheKey) -> bool {
        matches!(self.entries.get(key), Some(FetchState::Satisfied { .. }))
            || self.wildcards.iter().any(|w| w.covers(key))
    }

    /// Absent → pending. Returns `false` (and changes nothing) if the key is known.
    pub fn mark_pending(&mut self, key: CacheKey, fetch: SharedFetch) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, FetchState::Pending(fetch));
        true
    }

    /// Pending → satisfied.
    pub fn mark_satisfied(&mut self, key: CacheKey, records: usize) {
        if key.is_wildcard() && !self.wildcards.contains(&key) {
            self.wildcards.push(key.clone());
        }
        self.entries.insert(key, FetchState::Satisfied { records });
    }

    /// Pending → absent after a failed attempt, so a later call may retry.
    /// Satisfied entries are never reverted.
    pub fn revert(&mut self, key: &CacheKey) {
        if self.is_pending(key) {
            self.entries.remove(key);
        }
    }

    pub fn pending(&self) -> usize {
        self.entries
            .values()
            .filter(|s| matches!(s, FetchState::Pending(_)))
            .count()
    }

    pub fn satisfied(&self) -> usize {
        self.entries.len() - self.pending()
    }
}
