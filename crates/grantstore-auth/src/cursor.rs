//! Resume points for offset listings.
//!
//! Maps "number of records already walked" to the continuation token that
//! resumes a full partition scan right after them. Callers paging through
//! the partition hand the token to a keyset listing instead of paying for
//! another offset walk.

use dashmap::DashMap;
use grantstore_storage::ContinuationToken;

/// Concurrent position-to-token map, shared between store handles.
#[derive(Debug, Default)]
pub struct CursorMap {
    entries: DashMap<usize, ContinuationToken>,
}

impl CursorMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Token resuming after exactly `position` records.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<ContinuationToken> {
        self.entries.get(&position).map(|entry| entry.value().clone())
    }

    pub fn record(&self, position: usize, token: ContinuationToken) {
        self.entries.insert(position, token);
    }

    /// Drops every resume point. Called whenever partition membership changes.
    pub fn invalidate(&self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
