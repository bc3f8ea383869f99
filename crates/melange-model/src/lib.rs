//! Shared intermediate-representation types for the melange authorization
//! schema compiler: the input IR ([`ir`]), the derived IR produced by the
//! compiler's validation/closure/userset/analysis stages ([`closure`],
//! [`userset`], [`analysis`]), the compiler's output shape ([`output`]),
//! the database executor seam ([`executor`]), and the shared error type
//! ([`error`]).

pub mod analysis;
pub mod closure;
pub mod error;
pub mod executor;
pub mod ir;
pub mod output;
pub mod userset;

pub use analysis::{AnalysisInventory, Capabilities, Features, RelationAnalysis, Strategy, MAX_USERSET_DEPTH};
pub use closure::{Closure, ClosureRow};
pub use error::{CompileError, Result};
pub use executor::{DbExecutor, ExecutorError, ExecutorRow};
pub use ir::{
    ExcludedParentRelation, IntersectionGroup, IntersectionPart, Model, RelationDefinition,
    SubjectTypeRef, TypeDefinition,
};
pub use output::{CompileResult, Diagnostic, FunctionDef, FunctionKind, MigrationRecord};
pub use userset::{UsersetRule, UsersetRules};
