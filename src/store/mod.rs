// Credential store adapter - document CRUD, aggregation, and transactions
//
// The rest of the crate talks to the document store exclusively through the
// `CredentialStore` trait. The production implementation is MongoDB-backed
// (`MongoStore`); `MemoryStore` is an in-process implementation used by the
// test suite.

pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use bson::Document;
use thiserror::Error;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Upper bound on transaction retries. The store reports two retryable error
/// classes with different semantics: a transient error retries the whole
/// transaction (writes + commit) from scratch, while an ambiguous commit
/// outcome retries only the commit step - re-running the writes after an
/// ambiguous commit could double-apply them.
pub const MAX_TXN_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The whole transaction should be retried from scratch.
    #[error("transient transaction error: {0}")]
    Transient(String),

    /// The outcome of a commit is unknown; only the commit may be retried.
    #[error("transaction commit outcome unknown: {0}")]
    CommitAmbiguous(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("document serialization failed: {0}")]
    Document(String),

    #[error("store operation failed: {0}")]
    Other(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    pub fn is_commit_ambiguous(&self) -> bool {
        matches!(self, StoreError::CommitAmbiguous(_))
    }
}

/// What the transaction loop should do after a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnRetry {
    /// Restart the writes and the commit from scratch.
    RetryTransaction,
    /// Retry the commit only; the writes must not run again.
    RetryCommit,
    GiveUp,
}

/// Retry bookkeeping for one logical transaction. Transient errors and
/// ambiguous commit outcomes carry separate budgets, each bounded by
/// [`MAX_TXN_RETRIES`].
#[derive(Debug, Default)]
pub struct TxnRetryPolicy {
    transaction_attempts: u32,
    commit_attempts: u32,
}

impl TxnRetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_error(&mut self, error: &StoreError) -> TxnRetry {
        if error.is_transient() && self.transaction_attempts < MAX_TXN_RETRIES {
            self.transaction_attempts += 1;
            TxnRetry::RetryTransaction
        } else if error.is_commit_ambiguous() && self.commit_attempts < MAX_TXN_RETRIES {
            self.commit_attempts += 1;
            TxnRetry::RetryCommit
        } else {
            TxnRetry::GiveUp
        }
    }
}

/// Abstracts document CRUD, aggregation pipelines, and multi-document
/// transactions over the credential store.
///
/// Filters, sorts, updates, and pipelines are BSON documents in MongoDB
/// query syntax; implementations only need to support the operator subset
/// this crate generates (`$or`, `$and`, `$eq`, `$in`, `$expr`, `$set`,
/// `$regex`, plain field equality).
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_one(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>, StoreError>;

    async fn find_many(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
        skip: Option<u64>,
        limit: Option<i64>,
    ) -> Result<Vec<Document>, StoreError>;

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>, StoreError>;

    async fn insert_one(&self, collection: &str, doc: Document) -> Result<(), StoreError>;

    /// Applies an update document (e.g. `{$set: {...}}`) to the first
    /// matching document. Returns the number of documents modified.
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64, StoreError>;

    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64, StoreError>;

    async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64, StoreError>;

    /// Counts documents. With no filter, an estimated count is used - cheap,
    /// and all callers that pass `None` only care about empty vs non-empty.
    async fn count(&self, collection: &str, filter: Option<Document>) -> Result<u64, StoreError>;

    /// Upserts every document (keyed by `_id`) inside a single transaction.
    /// Retries per the `StoreError` class contract, bounded by
    /// [`MAX_TXN_RETRIES`].
    async fn save_with_transaction(
        &self,
        collection: &str,
        docs: Vec<Document>,
    ) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classes_are_disjoint() {
        let transient = StoreError::Transient("lock conflict".to_string());
        assert!(transient.is_transient());
        assert!(!transient.is_commit_ambiguous());

        let ambiguous = StoreError::CommitAmbiguous("commit timed out".to_string());
        assert!(ambiguous.is_commit_ambiguous());
        assert!(!ambiguous.is_transient());

        let other = StoreError::Other("duplicate key".to_string());
        assert!(!other.is_transient());
        assert!(!other.is_commit_ambiguous());
    }

    #[test]
    fn transient_errors_restart_the_transaction_up_to_the_ceiling() {
        let mut policy = TxnRetryPolicy::new();
        let transient = StoreError::Transient("write conflict".to_string());
        for _ in 0..MAX_TXN_RETRIES {
            assert_eq!(policy.on_error(&transient), TxnRetry::RetryTransaction);
        }
        assert_eq!(policy.on_error(&transient), TxnRetry::GiveUp);
    }

    #[test]
    fn ambiguous_commit_retries_the_commit_step_only() {
        let mut policy = TxnRetryPolicy::new();
        let ambiguous = StoreError::CommitAmbiguous("commit timed out".to_string());
        for _ in 0..MAX_TXN_RETRIES {
            assert_eq!(policy.on_error(&ambiguous), TxnRetry::RetryCommit);
        }
        assert_eq!(policy.on_error(&ambiguous), TxnRetry::GiveUp);
    }

    #[test]
    fn commit_retries_do_not_consume_the_transaction_budget() {
        let mut policy = TxnRetryPolicy::new();
        let ambiguous = StoreError::CommitAmbiguous("commit timed out".to_string());
        assert_eq!(policy.on_error(&ambiguous), TxnRetry::RetryCommit);

        // a transient failure on the retried commit still restarts the writes
        let transient = StoreError::Transient("write conflict".to_string());
        assert_eq!(policy.on_error(&transient), TxnRetry::RetryTransaction);
    }

    #[test]
    fn non_retryable_errors_give_up_immediately() {
        let mut policy = TxnRetryPolicy::new();
        let other = StoreError::Other("duplicate key".to_string());
        assert_eq!(policy.on_error(&other), TxnRetry::GiveUp);

        let unavailable = StoreError::Unavailable("no reachable servers".to_string());
        assert_eq!(policy.on_error(&unavailable), TxnRetry::GiveUp);
    }
}
