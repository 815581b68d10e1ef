//! Execution record: the persisted lifecycle of one async job.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::{CorrelationCode, RecordId};

/// Lifecycle state of an execution record.
///
/// Wire names are `PROCESSING`, `OK` and `ERROR`; external tooling reads them as-is.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    /// Created, no attempt outcome recorded yet.
    Processing,
    /// An attempt succeeded. Terminal.
    Ok,
    /// The latest attempt failed; more attempts may follow.
    Error,
}

impl ExecutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Processing => "PROCESSING",
            ExecutionState::Ok => "OK",
            ExecutionState::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Ok)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Allowed: PROCESSING→ERROR, ERROR→ERROR, PROCESSING→OK, ERROR→OK.
    pub fn can_transition_to(&self, next: ExecutionState) -> bool {
        matches!(
            (self, next),
            (
                ExecutionState::Processing | ExecutionState::Error,
                ExecutionState::Error | ExecutionState::Ok
            )
        )
    }
}

impl core::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROCESSING" => Ok(ExecutionState::Processing),
            "OK" => Ok(ExecutionState::Ok),
            "ERROR" => Ok(ExecutionState::Error),
            other => Err(DomainError::unknown_state(other)),
        }
    }
}

/// Persisted unit of state describing one job's lifecycle.
///
/// `response` holds the success payload when `state` is OK and the error payload
/// when it is ERROR; it is `None` while PROCESSING.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: RecordId,
    pub code: CorrelationCode,
    pub endpoint: String,
    /// Request body snapshot taken at creation time.
    pub body: String,
    pub state: ExecutionState,
    pub response: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ExecutionRecord {
    /// Build the initial PROCESSING record for a job.
    pub fn processing(
        code: CorrelationCode,
        endpoint: impl Into<String>,
        body: Option<&[u8]>,
    ) -> Self {
        Self {
            id: RecordId::new(),
            code,
            endpoint: endpoint.into(),
            body: body
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default(),
            state: ExecutionState::Processing,
            response: None,
            created_at: Utc::now(),
        }
    }

    /// Apply an attempt outcome, replacing any previous response.
    pub fn transition(
        &mut self,
        next: ExecutionState,
        response: impl Into<String>,
    ) -> DomainResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(DomainError::invalid_transition(self.state, next));
        }
        self.state = next;
        self.response = Some(response.into());
        Ok(())
    }
}
