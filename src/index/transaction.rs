//! The two-phase commit protocol shared by mutable index components.
//!
//! A component is updated inside a transaction:
//!
//! 1. [`Committable::transaction`] opens it (at most one at a time),
//! 2. mutations are applied,
//! 3. [`Committable::ready`] does all work that can fail and votes,
//! 4. [`Committable::commit`] (only after a `true` vote) makes the changes
//!    visible, or [`Committable::abort`] discards them.
//!
//! Calling these out of order is a programming error and panics.

use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::error::Result;

/// A component whose changes are applied through two-phase commit.
pub trait Committable {
    /// Open a transaction. Fails if another writer holds the index.
    ///
    /// # Panics
    /// If a transaction is already open on this component.
    fn transaction(&mut self) -> Result<()>;

    /// Prepare the changes and vote on whether they can be committed.
    /// Repeated calls return the first vote.
    ///
    /// # Panics
    /// Outside a transaction.
    fn ready(&mut self) -> bool;

    /// Make prepared changes visible.
    ///
    /// # Panics
    /// Unless `ready()` voted `true` in the open transaction.
    fn commit(&mut self) -> Result<()>;

    /// Discard the transaction's changes.
    ///
    /// # Panics
    /// Outside a transaction.
    fn abort(&mut self) -> Result<()>;
}

/// Transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and accepting operations.
    Active,
    /// `ready()` has voted.
    Prepared { vote: bool },
    /// Transaction is committed.
    Committed,
    /// Transaction is aborted/rolled back.
    Aborted,
}

/// Bookkeeping for one open transaction.
#[derive(Debug)]
pub struct Transaction {
    /// Unique transaction ID, used in logs.
    pub id: String,
    /// Current state of the transaction.
    pub state: TransactionState,
    /// Start timestamp in milliseconds.
    pub start_time: u64,
}

impl Transaction {
    /// Create a new transaction.
    pub fn new() -> Self {
        Transaction {
            id: Uuid::new_v4().to_string(),
            state: TransactionState::Active,
            start_time: now_millis(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// The recorded vote, if `ready()` has run.
    pub fn vote(&self) -> Option<bool> {
        match self.state {
            TransactionState::Prepared { vote } => Some(vote),
            _ => None,
        }
    }

    /// Record the outcome of `ready()`.
    pub fn record_vote(&mut self, vote: bool) {
        assert!(
            self.is_active(),
            "transaction {} voted twice or after completion",
            self.id
        );
        self.state = TransactionState::Prepared { vote };
    }

    /// Mark transaction as committed.
    pub fn mark_committed(&mut self) {
        assert_eq!(
            self.state,
            TransactionState::Prepared { vote: true },
            "transaction {} committed without a successful ready()",
            self.id
        );
        self.state = TransactionState::Committed;
    }

    /// Mark transaction as aborted.
    pub fn mark_aborted(&mut self) {
        assert!(
            !matches!(
                self.state,
                TransactionState::Committed | TransactionState::Aborted
            ),
            "transaction {} already finished",
            self.id
        );
        self.state = TransactionState::Aborted;
    }

    /// Milliseconds since the transaction started.
    pub fn elapsed_millis(&self) -> u64 {
        now_millis().saturating_sub(self.start_time)
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_path() {
        let mut transaction = Transaction::new();
        assert!(transaction.is_active());
        assert_eq!(transaction.vote(), None);

        transaction.record_vote(true);
        assert_eq!(transaction.vote(), Some(true));
        transaction.mark_committed();
        assert_eq!(transaction.state, TransactionState::Committed);
    }

    #[test]
    fn test_abort_after_failed_vote() {
        let mut transaction = Transaction::new();
        transaction.record_vote(false);
        transaction.mark_aborted();
        assert_eq!(transaction.state, TransactionState::Aborted);
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(Transaction::new().id, Transaction::new().id);
    }

    #[test]
    #[should_panic(expected = "without a successful ready()")]
    fn test_commit_after_failed_vote_panics() {
        let mut transaction = Transaction::new();
        transaction.record_vote(false);
        transaction.mark_committed();
    }

    #[test]
    #[should_panic(expected = "without a successful ready()")]
    fn test_commit_without_vote_panics() {
        Transaction::new().mark_committed();
    }

    #[test]
    #[should_panic(expected = "voted twice")]
    fn test_double_vote_panics() {
        let mut transaction = Transaction::new();
        transaction.record_vote(true);
        transaction.record_vote(true);
    }

    #[test]
    #[should_panic(expected = "already finished")]
    fn test_abort_after_commit_panics() {
        let mut transaction = Transaction::new();
        transaction.record_vote(true);
        transaction.mark_committed();
        transaction.mark_aborted();
    }
}
