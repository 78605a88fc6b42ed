//! Request/response correlation over the publish/subscribe bus.
//!
//! The bus has no notion of a reply.  To join an asynchronous backend answer
//! to the client request that caused it, the session stamps each backend
//! request with a fresh id and parks a *completion* under that id here.  When
//! a reply carrying the id arrives, the completion is taken out and run.
//!
//! Entries are write-once and consumed exactly once.  An entry whose reply
//! never arrives stays until the table is dropped with its session; pending
//! completions are discarded without being run.

use std::collections::HashMap;

use thiserror::Error;

/// Errors returned by [`CorrelationTable::register`].
#[derive(Debug, Error, PartialEq)]
pub enum CorrelationError {
    /// An entry is already pending under this id.
    #[error("request id '{0}' is already pending")]
    DuplicateId(String),
}

/// Single-owner map from request id to pending completion `C`.
#[derive(Debug)]
pub struct CorrelationTable<C> {
    pending: HashMap<String, C>,
}

impl<C> Default for CorrelationTable<C> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }
}

impl<C> CorrelationTable<C> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks `completion` under `request_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::DuplicateId`] if the id is already pending;
    /// the existing entry is left untouched.
    pub fn register(
        &mut self,
        request_id: impl Into<String>,
        completion: C,
    ) -> Result<(), CorrelationError> {
        use std::collections::hash_map::Entry;

        match self.pending.entry(request_id.into()) {
            Entry::Occupied(slot) => Err(CorrelationError::DuplicateId(slot.key().clone())),
            Entry::Vacant(slot) => {
                slot.insert(completion);
                Ok(())
            }
        }
    }

    /// Removes and returns the completion for `request_id`.
    ///
    /// Returns `None` for unknown, stale or already-consumed ids.
    pub fn take(&mut self, request_id: &str) -> Option<C> {
        self.pending.remove(request_id)
    }

    /// Number of pending completions.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drops every pending completion without running it.  Returns how many
    /// were discarded.
    pub fn discard_all(&mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_returns_registered_completion_once() {
        // Arrange
        let mut table = CorrelationTable::new();
        table.register("r1", "first").unwrap();

        // Act
        let first = table.take("r1");
        let second = table.take("r1");

        // Assert
        assert_eq!(first, Some("first"));
        assert_eq!(second, None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_take_unknown_id_is_none() {
        let mut table: CorrelationTable<u32> = CorrelationTable::new();
        assert_eq!(table.take("nope"), None);
    }

    #[test]
    fn test_duplicate_register_is_rejected_and_keeps_original() {
        let mut table = CorrelationTable::new();
        table.register("r1", 1).unwrap();

        let result = table.register("r1", 2);

        assert_eq!(result, Err(CorrelationError::DuplicateId("r1".to_string())));
        assert_eq!(table.take("r1"), Some(1));
    }

    #[test]
    fn test_entries_are_independent() {
        let mut table = CorrelationTable::new();
        table.register("a", 'a').unwrap();
        table.register("b", 'b').unwrap();

        assert_eq!(table.take("b"), Some('b'));
        assert_eq!(table.len(), 1);
        assert_eq!(table.take("a"), Some('a'));
    }

    #[test]
    fn test_discard_all_drops_without_running() {
        // A completion that records whether it ran.
        use std::cell::Cell;
        let ran = Cell::new(false);
        let mut table: CorrelationTable<Box<dyn FnOnce() + '_>> = CorrelationTable::new();
        table.register("r1", Box::new(|| ran.set(true))).unwrap();

        let discarded = table.discard_all();

        assert_eq!(discarded, 1);
        assert!(table.is_empty());
        assert!(!ran.get());
    }
}
