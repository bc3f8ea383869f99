//! `PgExecutor` — the concrete [`melange_model::DbExecutor`] implementation
//! over `sqlx::PgPool` (SPEC_FULL.md §4.8). The compiler crate never
//! depends on `sqlx` directly; this is the only place that translates
//! `sqlx::Row` into the untyped [`melange_model::ExecutorRow`] shape the
//! trait's callers (installer bookkeeping queries) expect.

use async_trait::async_trait;
use sqlx::{Column, PgPool, Row};

use melange_model::{DbExecutor, ExecutorError, ExecutorRow};

#[derive(Clone)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_executor_row(row: sqlx::postgres::PgRow) -> ExecutorRow {
    let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values: Vec<Option<String>> = (0..columns.len())
        .map(|i| row.try_get::<Option<String>, _>(i).unwrap_or(None))
        .collect();
    ExecutorRow { columns, values }
}

#[async_trait]
impl DbExecutor for PgExecutor {
    async fn exec(&self, sql: &str) -> Result<(), ExecutorError> {
        sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| ExecutorError::Execution(e.to_string()))?;
        Ok(())
    }

    async fn query(&self, sql: &str) -> Result<Vec<ExecutorRow>, ExecutorError> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ExecutorError::Execution(e.to_string()))?;
        Ok(rows.into_iter().map(row_to_executor_row).collect())
    }
}
