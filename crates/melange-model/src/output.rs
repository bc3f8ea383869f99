//! Compiler output IR (spec.md §3.5, §6) — what `melange-compiler::compile`
//! hands back, and what `melange-database::Installer` persists.

use serde::{Deserialize, Serialize};

/// The kind of PL/pgSQL routine a [`FunctionDef`] represents. Mirrors the
/// naming scheme in spec.md §6.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionKind {
    Check,
    ListObjects,
    ListSubjects,
    CheckDispatcher,
    ListObjectsDispatcher,
    ListSubjectsDispatcher,
}

/// One emitted SQL routine, keyed by object_type/relation (dispatchers
/// carry `relation: None`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub kind: FunctionKind,
    pub object_type: Option<String>,
    pub relation: Option<String>,
    pub sql: String,
}

impl FunctionDef {
    pub fn check_name(object_type: &str, relation: &str) -> String {
        format!("check_{object_type}_{relation}")
    }

    pub fn list_objects_name(object_type: &str, relation: &str) -> String {
        format!("list_{object_type}_{relation}_objects")
    }

    pub fn list_subjects_name(object_type: &str, relation: &str) -> String {
        format!("list_{object_type}_{relation}_subjects")
    }
}

/// A diagnostic raised for a relation the compiler could not fully support
/// (spec.md §7 `UnsupportedFeature`) — non-fatal: a stub function is still
/// emitted, and compilation proceeds for every other relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub object_type: String,
    pub relation: String,
    pub message: String,
}

/// The full, deterministic output of compiling one [`crate::ir::Model`].
///
/// Byte-identical across repeated compiles of the same model (spec.md
/// §8 determinism requirement) — every collection here is built and kept
/// in the model's own declaration order, never sorted incidentally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResult {
    pub ddl: Vec<String>,
    pub functions: Vec<FunctionDef>,
    pub diagnostics: Vec<Diagnostic>,
    pub migration: Option<MigrationRecord>,
}

impl CompileResult {
    pub fn function_names(&self) -> Vec<String> {
        self.functions.iter().map(|f| f.name.clone()).collect()
    }

    pub fn has_fatal_diagnostics(&self) -> bool {
        false // diagnostics recorded here are, by construction, non-fatal
    }
}

/// Row shape for `melange_migrations` (spec.md §5 fixed metadata tables).
/// `schema_checksum` lets the installer recognize "nothing changed" on a
/// re-run without diffing SQL text function by function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub schema_checksum: String,
    pub codegen_version: String,
    pub function_names: Vec<String>,
}
