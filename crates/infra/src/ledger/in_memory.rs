//! In-memory ledger for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use courier_core::{CorrelationCode, ExecutionRecord, ExecutionState, RecordId};

use super::{JobLedger, LedgerError};

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    records: RwLock<HashMap<CorrelationCode, ExecutionRecord>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// All records, oldest first.
    pub fn list(&self) -> Result<Vec<ExecutionRecord>, LedgerError> {
        let records = self.records.read().map_err(poisoned)?;
        let mut result: Vec<_> = records.values().cloned().collect();
        result.sort_by_key(|r| r.created_at);
        Ok(result)
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> LedgerError {
    LedgerError::Storage("in-memory ledger lock poisoned".to_string())
}

#[async_trait]
impl JobLedger for InMemoryLedger {
    async fn create(&self, mut record: ExecutionRecord) -> Result<ExecutionRecord, LedgerError> {
        let mut records = self.records.write().map_err(poisoned)?;
        if records.contains_key(&record.code) {
            return Err(LedgerError::AlreadyExists(record.code));
        }
        if record.id.is_nil() {
            record.id = RecordId::new();
        }
        records.insert(record.code, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        code: &CorrelationCode,
        state: ExecutionState,
        response: &str,
    ) -> Result<(), LedgerError> {
        let mut records = self.records.write().map_err(poisoned)?;
        let record = records.get_mut(code).ok_or(LedgerError::NotFound(*code))?;
        record
            .transition(state, response)
            .map_err(|source| LedgerError::InvalidTransition {
                code: *code,
                source,
            })
    }

    async fn get(&self, code: &CorrelationCode) -> Result<Option<ExecutionRecord>, LedgerError> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(code).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_record() -> ExecutionRecord {
        ExecutionRecord::processing(
            CorrelationCode::generate(),
            "http://svc/hook",
            Some(b"{}".as_slice()),
        )
    }

    #[tokio::test]
    async fn create_then_get() {
        let ledger = InMemoryLedger::new();
        let created = ledger.create(test_record()).await.unwrap();

        let fetched = ledger.get(&created.code).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn create_assigns_missing_id() {
        let ledger = InMemoryLedger::new();
        let mut record = test_record();
        record.id = RecordId::nil();

        let created = ledger.create(record).await.unwrap();
        assert!(!created.id.is_nil());
    }

    #[tokio::test]
    async fn duplicate_code_is_rejected_not_merged() {
        let ledger = InMemoryLedger::new();
        let first = ledger.create(test_record()).await.unwrap();

        let mut dup = test_record();
        dup.code = first.code;
        dup.endpoint = "http://other".to_string();

        assert_eq!(
            ledger.create(dup).await.unwrap_err(),
            LedgerError::AlreadyExists(first.code)
        );
        let stored = ledger.get(&first.code).await.unwrap().unwrap();
        assert_eq!(stored.endpoint, "http://svc/hook");
    }

    #[tokio::test]
    async fn update_sets_state_and_response_together() {
        let ledger = InMemoryLedger::new();
        let record = ledger.create(test_record()).await.unwrap();

        ledger.update(&record.code, ExecutionState::Error, "timeout").await.unwrap();
        ledger.update(&record.code, ExecutionState::Ok, r#"{"ok":true}"#).await.unwrap();

        let stored = ledger.get(&record.code).await.unwrap().unwrap();
        assert_eq!(stored.state, ExecutionState::Ok);
        assert_eq!(stored.response.as_deref(), Some(r#"{"ok":true}"#));
        assert_eq!(stored.id, record.id);
    }

    #[tokio::test]
    async fn ok_record_is_never_updated_again() {
        let ledger = InMemoryLedger::new();
        let record = ledger.create(test_record()).await.unwrap();
        ledger.update(&record.code, ExecutionState::Ok, "done").await.unwrap();

        let err = ledger
            .update(&record.code, ExecutionState::Error, "late")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));

        let stored = ledger.get(&record.code).await.unwrap().unwrap();
        assert_eq!(stored.response.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn update_unknown_code_is_not_found() {
        let ledger = InMemoryLedger::new();
        let code = CorrelationCode::generate();
        assert_eq!(
            ledger.update(&code, ExecutionState::Error, "x").await.unwrap_err(),
            LedgerError::NotFound(code)
        );
    }
}
