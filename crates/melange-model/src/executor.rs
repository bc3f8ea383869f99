//! The `DbExecutor` seam: melange-compiler's `Installer` logic (actually
//! living in melange-database, see SPEC_FULL.md) is written against this
//! trait rather than `sqlx` directly, mirroring how `ciam-authz` keeps its
//! `PolicyEngine` generic over a store trait instead of a concrete pool.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One result row, column-indexed. Deliberately untyped (`String`-ish JSON
/// values) — the executor boundary only ever needs DDL acknowledgement and
/// migration bookkeeping reads, never query results shaped by the compiled
/// functions themselves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorRow {
    pub columns: Vec<String>,
    pub values: Vec<Option<String>>,
}

impl ExecutorRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values[i].as_deref())
    }
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("database connection error: {0}")]
    Connection(String),
    #[error("statement execution failed: {0}")]
    Execution(String),
    #[error("transaction aborted: {0}")]
    Transaction(String),
}

/// The execution surface the installer needs from a Postgres-compatible
/// backend. Implemented by `melange_database::PgExecutor` over `sqlx::PgPool`;
/// kept here so `melange-compiler` can describe what *would* be installed
/// without depending on `sqlx` at all.
#[async_trait]
pub trait DbExecutor: Send + Sync {
    async fn exec(&self, sql: &str) -> Result<(), ExecutorError>;

    async fn query(&self, sql: &str) -> Result<Vec<ExecutorRow>, ExecutorError>;

    async fn query_row(&self, sql: &str) -> Result<Option<ExecutorRow>, ExecutorError> {
        Ok(self.query(sql).await?.into_iter().next())
    }
}
