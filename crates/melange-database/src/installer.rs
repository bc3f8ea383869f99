//! Transactional install + orphan-function diff + migration bookkeeping
//! (SPEC_FULL.md §4.8), grounded on the transaction-scoped, repository-style
//! multi-statement execution in `ciam_database::repositories::*` (each
//! repository method runs its statements against one acquired connection or
//! transaction, never string-building ad hoc SQL at the call site).

use sqlx::{PgPool, Row};

use melange_model::CompileResult;

use crate::error::{DbError, Result};

pub struct Installer {
    pool: PgPool,
}

impl Installer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the fixed metadata tables (spec.md §6.2) if they do not
    /// already exist. Idempotent — safe to call before every install.
    pub async fn bootstrap(&self, result: &CompileResult) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in &result.ddl {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|source| DbError::Execution {
                    statement: statement.clone(),
                    source,
                })?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Applies every emitted function in declaration order inside one
    /// transaction, then drops whatever functions the *previous*
    /// `melange_migrations` row names that are absent from this compile's
    /// function list, and finally records the new migration row
    /// (spec.md §8 "idempotent install").
    pub async fn install(&self, result: &CompileResult) -> Result<()> {
        self.bootstrap(result).await?;

        let migration = result.migration.as_ref().ok_or(DbError::NoMigrationRecord)?;

        let mut tx = self.pool.begin().await?;

        for function in &result.functions {
            sqlx::query(&function.sql)
                .execute(&mut *tx)
                .await
                .map_err(|source| DbError::Execution {
                    statement: function.name.clone(),
                    source,
                })?;
        }

        let previous_names: Vec<String> = sqlx::query(
            "SELECT function_names FROM melange_migrations ORDER BY melange_version DESC LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?
        .map(|row| row.try_get::<Vec<String>, _>("function_names").unwrap_or_default())
        .unwrap_or_default();

        let orphans: Vec<&String> = previous_names
            .iter()
            .filter(|name| !migration.function_names.contains(name))
            .collect();

        for orphan in &orphans {
            let drop_sql = format!("DROP FUNCTION IF EXISTS {orphan} CASCADE;");
            sqlx::query(&drop_sql)
                .execute(&mut *tx)
                .await
                .map_err(|source| DbError::Execution {
                    statement: drop_sql.clone(),
                    source,
                })?;
            tracing::info!(function = %orphan, "dropped orphaned function");
        }

        sqlx::query(
            "INSERT INTO melange_migrations (schema_checksum, codegen_version, function_names) VALUES ($1, $2, $3)",
        )
        .bind(&migration.schema_checksum)
        .bind(&migration.codegen_version)
        .bind(&migration.function_names)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            functions = result.functions.len(),
            orphans = orphans.len(),
            "install complete"
        );
        Ok(())
    }

    /// Reads the most recently installed migration's checksum, for a
    /// cheap "did anything change" check before recompiling.
    pub async fn current_checksum(&self) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT schema_checksum FROM melange_migrations ORDER BY melange_version DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get("schema_checksum")))
    }
}
