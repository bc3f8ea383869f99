use thiserror::Error;

pub type Result<T> = std::result::Result<T, CompileError>;

/// The compiler's error taxonomy (spec.md §7). Only `CyclicSchema` is
/// fatal at compile time; `UnsupportedFeature` is recorded as a
/// [`crate::output::Diagnostic`] and does not stop compilation.
/// `ResolutionTooComplex` is never raised here — it is a runtime
/// `SQLSTATE M2002` surfaced by the emitted SQL itself.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("cyclic schema: {0}")]
    CyclicSchema(String),

    #[error("not a valid SQL identifier: {0}")]
    InvalidIdentifier(String),

    #[error("unknown type referenced: {0}")]
    UnknownType(String),

    #[error("unknown relation referenced: {object_type}#{relation}")]
    UnknownRelation { object_type: String, relation: String },

    #[error("failed to parse model: {0}")]
    Deserialize(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for CompileError {
    fn from(err: serde_json::Error) -> Self {
        CompileError::Deserialize(err.to_string())
    }
}

impl From<serde_yaml::Error> for CompileError {
    fn from(err: serde_yaml::Error) -> Self {
        CompileError::Deserialize(err.to_string())
    }
}
