//! Domain building blocks for the async call executor.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the execution record state machine and the retry policy.

pub mod error;
pub mod id;
pub mod record;
pub mod retry;

pub use error::{DomainError, DomainResult};
pub use id::{CorrelationCode, RecordId};
pub use record::{ExecutionRecord, ExecutionState};
pub use retry::RetryPolicy;
