//! Job ledger: durable storage of execution records.
//!
//! ## Components
//!
//! - `JobLedger`: persistence seam used by the executor
//! - `InMemoryLedger`: in-process store for tests and embedding
//! - `PostgresLedger`: durable store backed by a `sqlx` Postgres pool
//!
//! Records are keyed by their correlation code. `update` must apply state and
//! response together or not at all, and must refuse to touch a record that is
//! already OK.

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use courier_core::{CorrelationCode, DomainError, ExecutionRecord, ExecutionState};

pub use in_memory::InMemoryLedger;
pub use postgres::PostgresLedger;

/// Persistence for execution records. Shared by every running job.
#[async_trait]
pub trait JobLedger: Send + Sync {
    /// Insert a new record, assigning a storage id if it has none.
    ///
    /// A record whose correlation code already exists is rejected, never merged.
    async fn create(&self, record: ExecutionRecord) -> Result<ExecutionRecord, LedgerError>;

    /// Atomically set state and response for the record with `code`.
    async fn update(
        &self,
        code: &CorrelationCode,
        state: ExecutionState,
        response: &str,
    ) -> Result<(), LedgerError>;

    /// Fetch a record by correlation code.
    async fn get(&self, code: &CorrelationCode) -> Result<Option<ExecutionRecord>, LedgerError>;
}

/// Ledger operation error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("execution record already exists: {0}")]
    AlreadyExists(CorrelationCode),
    #[error("execution record not found: {0}")]
    NotFound(CorrelationCode),
    #[error("invalid transition for {code}: {source}")]
    InvalidTransition {
        code: CorrelationCode,
        #[source]
        source: DomainError,
    },
    #[error("storage error: {0}")]
    Storage(String),
}

#[async_trait]
impl<L: JobLedger + ?Sized> JobLedger for std::sync::Arc<L> {
    async fn create(&self, record: ExecutionRecord) -> Result<ExecutionRecord, LedgerError> {
        (**self).create(record).await
    }

    async fn update(
        &self,
        code: &CorrelationCode,
        state: ExecutionState,
        response: &str,
    ) -> Result<(), LedgerError> {
        (**self).update(code, state, response).await
    }

    async fn get(&self, code: &CorrelationCode) -> Result<Option<ExecutionRecord>, LedgerError> {
        (**self).get(code).await
    }
}
