//! Postgres-backed job ledger.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | LedgerError | Scenario |
//! |------------|----------------------|-------------|----------|
//! | Database (unique violation) | `23505` | `AlreadyExists` | Duplicate correlation code on create |
//! | Database (other) | Any other | `Storage` | Check constraint or other database errors |
//! | PoolClosed | N/A | `Storage` | Connection pool was closed |
//! | Other | N/A | `Storage` | Network errors, connection failures, etc. |
//!
//! ## Atomicity
//!
//! `update` is a single `UPDATE` statement guarded by the state machine in its
//! `WHERE` clause, so state and response change together or not at all, and an
//! OK record is never rewritten.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use courier_core::{CorrelationCode, DomainError, ExecutionRecord, ExecutionState, RecordId};

use super::{JobLedger, LedgerError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS execution_records (
    id          UUID PRIMARY KEY,
    code        UUID NOT NULL UNIQUE,
    endpoint    TEXT NOT NULL,
    body        TEXT NOT NULL,
    state       TEXT NOT NULL CHECK (state IN ('PROCESSING', 'OK', 'ERROR')),
    response    TEXT,
    created_at  TIMESTAMPTZ NOT NULL
)
"#;

/// Durable ledger over a Postgres connection pool.
///
/// `Send + Sync`; the pool handles connection sharing between jobs.
#[derive(Debug, Clone)]
pub struct PostgresLedger {
    pool: Arc<PgPool>,
}

impl PostgresLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect to `database_url` with a small pool.
    pub async fn connect(database_url: &str) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the `execution_records` table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), LedgerError> {
        sqlx::query(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn current_state(
        &self,
        code: &CorrelationCode,
    ) -> Result<Option<ExecutionState>, LedgerError> {
        let row = sqlx::query("SELECT state FROM execution_records WHERE code = $1")
            .bind(code.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("current_state", e))?;

        row.map(|row| {
            let state: String = row
                .try_get("state")
                .map_err(|e| map_sqlx_error("current_state", e))?;
            ExecutionState::from_str(&state).map_err(|e| LedgerError::Storage(e.to_string()))
        })
        .transpose()
    }
}

#[async_trait]
impl JobLedger for PostgresLedger {
    #[instrument(skip(self, record), fields(code = %record.code), err)]
    async fn create(&self, mut record: ExecutionRecord) -> Result<ExecutionRecord, LedgerError> {
        if record.id.is_nil() {
            record.id = RecordId::new();
        }

        sqlx::query(
            r#"
            INSERT INTO execution_records (id, code, endpoint, body, state, response, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.code.as_uuid())
        .bind(&record.endpoint)
        .bind(&record.body)
        .bind(record.state.as_str())
        .bind(record.response.as_deref())
        .bind(record.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::AlreadyExists(record.code)
            } else {
                map_sqlx_error("create", e)
            }
        })?;

        Ok(record)
    }

    #[instrument(skip(self, response), fields(code = %code, state = %state), err)]
    async fn update(
        &self,
        code: &CorrelationCode,
        state: ExecutionState,
        response: &str,
    ) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE execution_records
            SET state = $2, response = $3
            WHERE code = $1
                AND state <> 'OK'
                AND $2::text <> 'PROCESSING'
            "#,
        )
        .bind(code.as_uuid())
        .bind(state.as_str())
        .bind(response)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update", e))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        match self.current_state(code).await? {
            None => Err(LedgerError::NotFound(*code)),
            Some(current) => Err(LedgerError::InvalidTransition {
                code: *code,
                source: DomainError::invalid_transition(current, state),
            }),
        }
    }

    async fn get(&self, code: &CorrelationCode) -> Result<Option<ExecutionRecord>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT id, code, endpoint, body, state, response, created_at
            FROM execution_records
            WHERE code = $1
            "#,
        )
        .bind(code.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get", e))?;

        row.map(|row| {
            ExecutionRecordRow::from_row(&row)
                .map_err(|e| map_sqlx_error("get", e))?
                .try_into()
        })
        .transpose()
    }
}

struct ExecutionRecordRow {
    id: uuid::Uuid,
    code: uuid::Uuid,
    endpoint: String,
    body: String,
    state: String,
    response: Option<String>,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ExecutionRecordRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ExecutionRecordRow {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            endpoint: row.try_get("endpoint")?,
            body: row.try_get("body")?,
            state: row.try_get("state")?,
            response: row.try_get("response")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<ExecutionRecordRow> for ExecutionRecord {
    type Error = LedgerError;

    fn try_from(row: ExecutionRecordRow) -> Result<Self, Self::Error> {
        Ok(ExecutionRecord {
            id: RecordId::from_uuid(row.id),
            code: CorrelationCode::from_uuid(row.code),
            endpoint: row.endpoint,
            body: row.body,
            state: ExecutionState::from_str(&row.state)
                .map_err(|e| LedgerError::Storage(e.to_string()))?,
            response: row.response,
            created_at: row.created_at,
        })
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    match err {
        sqlx::Error::Database(db_err) => {
            LedgerError::Storage(format!("database error in {}: {}", operation, db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            LedgerError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => LedgerError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_with_unknown_state_is_a_storage_error() {
        let row = ExecutionRecordRow {
            id: uuid::Uuid::now_v7(),
            code: uuid::Uuid::new_v4(),
            endpoint: "http://svc".to_string(),
            body: String::new(),
            state: "RUNNING".to_string(),
            response: None,
            created_at: Utc::now(),
        };

        let err = ExecutionRecord::try_from(row).unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));
    }

    #[test]
    fn row_maps_to_record() {
        let id = uuid::Uuid::now_v7();
        let code = uuid::Uuid::new_v4();
        let row = ExecutionRecordRow {
            id,
            code,
            endpoint: "http://svc".to_string(),
            body: "{}".to_string(),
            state: "ERROR".to_string(),
            response: Some("timeout".to_string()),
            created_at: Utc::now(),
        };

        let record = ExecutionRecord::try_from(row).unwrap();
        assert_eq!(record.id, RecordId::from_uuid(id));
        assert_eq!(record.code, CorrelationCode::from_uuid(code));
        assert_eq!(record.state, ExecutionState::Error);
        assert_eq!(record.response.as_deref(), Some("timeout"));
    }

    #[test]
    fn pool_closed_maps_to_storage() {
        assert!(matches!(
            map_sqlx_error("update", sqlx::Error::PoolClosed),
            LedgerError::Storage(msg) if msg.contains("update")
        ));
    }
}
