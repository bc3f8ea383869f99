use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

/// Mirrors `ciam_database::DatabaseError` in spirit (SPEC_FULL.md §7):
/// installing a compiled bundle is genuinely a database-repository concern,
/// not a compiler concern, so it gets its own small error enum rather than
/// folding into [`melange_model::CompileError`].
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database connection error: {0}")]
    Connection(#[from] sqlx::Error),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("migration record not found")]
    NoMigrationRecord,

    #[error("statement execution failed: {statement}: {source}")]
    Execution {
        statement: String,
        #[source]
        source: sqlx::Error,
    },
}

impl From<DbError> for melange_model::ExecutorError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Connection(e) => melange_model::ExecutorError::Connection(e.to_string()),
            DbError::ConnectionFailed(msg) => melange_model::ExecutorError::Connection(msg),
            DbError::NoMigrationRecord => melange_model::ExecutorError::Execution(
                "no migration record found".to_string(),
            ),
            DbError::Execution { statement, source } => {
                melange_model::ExecutorError::Execution(format!("{statement}: {source}"))
            }
        }
    }
}
