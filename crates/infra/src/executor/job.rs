//! One async job: create the record, then attempt/update/backoff until done.

use serde_json::Value as JsonValue;
use tracing::{error, info, warn};

use courier_core::{CorrelationCode, ExecutionRecord, ExecutionState, RetryPolicy};

use crate::ledger::JobLedger;
use crate::transport::{
    RequestDescriptor, ResponseBody, Transport, TransportError, TransportResponse,
};

/// Which ledger call ended a job early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LedgerStage {
    Create,
    Update,
}

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32 },
    Aborted { attempts: u32, stage: LedgerStage },
}

impl JobOutcome {
    pub(crate) fn attempts(&self) -> u32 {
        match self {
            JobOutcome::Succeeded { attempts }
            | JobOutcome::Exhausted { attempts }
            | JobOutcome::Aborted { attempts, .. } => *attempts,
        }
    }
}

/// Outcome of a single attempt, with the payload to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AttemptOutcome {
    Success(String),
    Failure(String),
}

/// Drive one job to completion. Never returns an error: every failure is either
/// persisted on the record or logged.
pub(crate) async fn run<L, T>(
    ledger: &L,
    transport: &T,
    code: CorrelationCode,
    request: &RequestDescriptor,
    policy: RetryPolicy,
) -> JobOutcome
where
    L: JobLedger + ?Sized,
    T: Transport + ?Sized,
{
    let record = ExecutionRecord::processing(code, request.url(), request.body());
    if let Err(e) = ledger.create(record).await {
        error!(error = %e, "failed to create execution record");
        return JobOutcome::Aborted {
            attempts: 0,
            stage: LedgerStage::Create,
        };
    }
    info!(endpoint = request.url(), "execution record created");

    for attempt in policy.attempts() {
        info!(attempt, endpoint = request.url(), method = %request.method(), "dispatching");

        match attempt_once(transport, request).await {
            AttemptOutcome::Success(payload) => {
                if let Err(e) = ledger.update(&code, ExecutionState::Ok, &payload).await {
                    error!(attempt, error = %e, "failed to record success");
                    return JobOutcome::Aborted {
                        attempts: attempt,
                        stage: LedgerStage::Update,
                    };
                }
                info!(attempt, "succeeded");
                return JobOutcome::Succeeded { attempts: attempt };
            }
            AttemptOutcome::Failure(payload) => {
                warn!(attempt, error = %payload, "attempt failed");

                if let Err(e) = ledger.update(&code, ExecutionState::Error, &payload).await {
                    error!(attempt, error = %e, "failed to record attempt failure");
                    return JobOutcome::Aborted {
                        attempts: attempt,
                        stage: LedgerStage::Update,
                    };
                }

                if policy.should_backoff(attempt) {
                    tokio::time::sleep(policy.backoff()).await;
                }
            }
        }
    }

    warn!(attempts = policy.budget(), "retry budget exhausted");
    JobOutcome::Exhausted {
        attempts: policy.budget(),
    }
}

async fn attempt_once<T>(transport: &T, request: &RequestDescriptor) -> AttemptOutcome
where
    T: Transport + ?Sized,
{
    if let Some(err) = request.build_error() {
        return AttemptOutcome::Failure(TransportError::Build(err.to_string()).to_string());
    }
    classify(transport.send(request).await)
}

/// Map a transport result onto the record's next state and payload.
pub(crate) fn classify(result: Result<TransportResponse, TransportError>) -> AttemptOutcome {
    let response = match result {
        Ok(response) => response,
        Err(e) => return AttemptOutcome::Failure(e.to_string()),
    };

    let status = response.status;
    let success_status = response.is_success_status();

    match response.body {
        ResponseBody::Data(data) if success_status => {
            AttemptOutcome::Success(to_json(&data, "No response available"))
        }
        ResponseBody::Error(err) if !err.is_null() => {
            AttemptOutcome::Failure(to_json(&err, "No error response available"))
        }
        _ => AttemptOutcome::Failure(format!("unexpected status {status}")),
    }
}

fn to_json(value: &JsonValue, fallback: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| fallback.to_string())
}
