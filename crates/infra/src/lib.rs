//! Infrastructure layer: async executor, job ledger, HTTP transport, config.
//!
//! Typical wiring:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use courier_infra::config::ExecutorConfig;
//! use courier_infra::executor::{AsyncExecutor, Dispatch};
//! use courier_infra::ledger::PostgresLedger;
//! use courier_infra::transport::{HttpTransport, RequestDescriptor};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExecutorConfig::from_env()?;
//! courier_observability::init_with(config.log_format);
//!
//! let ledger = PostgresLedger::connect(config.database_url.as_deref().unwrap_or_default()).await?;
//! ledger.ensure_schema().await?;
//! let transport = HttpTransport::with_timeout(config.http_timeout)?;
//!
//! let executor = AsyncExecutor::new(Arc::new(ledger), Arc::new(transport)).spawn(config);
//! executor.execute(
//!     RequestDescriptor::builder("https://hooks.example.com/orders")
//!         .method(reqwest::Method::POST)
//!         .json_headers()
//!         .json_body(&serde_json::json!({"order": 42}))
//!         .build(),
//!     3,
//! );
//! executor.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod executor;
pub mod ledger;
pub mod transport;

pub use config::{ConfigError, ExecutorConfig};
pub use executor::{AsyncExecutor, AsyncExecutorHandle, Dispatch, ExecutorStats};
pub use ledger::{InMemoryLedger, JobLedger, LedgerError, PostgresLedger};
pub use transport::{
    HttpTransport, RequestBuilder, RequestDescriptor, ResponseBody, Transport, TransportError,
    TransportResponse,
};
