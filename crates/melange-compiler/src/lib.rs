//! The melange schema compiler: a pure, deterministic pipeline from an
//! authorization [`melange_model::Model`] to a bundle of PL/pgSQL functions
//! (spec.md §2). `compile` is the single coarse entrypoint; everything else
//! in this crate is a private stage it calls in order, mirroring how
//! `ciam_authz::engine::PolicyEngine` exposes one `check()` entrypoint that
//! internally dispatches to several private helpers (SPEC_FULL.md §2).

pub mod analyzer;
pub mod builders;
pub mod closure;
pub mod functions;
pub mod schema;
pub mod sql;
pub mod userset;
pub mod validator;

use sha2::{Digest, Sha256};

use melange_model::analysis::RelationAnalysis;
use melange_model::output::Diagnostic;
use melange_model::{CompileResult, MigrationRecord, Model, Result};

/// The compiler's two configuration knobs (spec.md §9 "Dynamic named
/// options"). No other tuning is visible at this layer.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Recorded verbatim into the emitted [`MigrationRecord`]; changing it
    /// forces every function to be considered "changed" by an installer
    /// even when the model itself did not change.
    pub codegen_version: String,
    /// When set, only relations whose name starts with this prefix get
    /// specialized functions emitted (and a dispatcher route). Every other
    /// relation is skipped silently — this is a narrowing knob for
    /// incremental rollout, not a validation gate, so skipped relations do
    /// not produce diagnostics.
    pub relation_filter_prefix: Option<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            codegen_version: "1".to_string(),
            relation_filter_prefix: None,
        }
    }
}

fn included(analysis: &RelationAnalysis, opts: &CompileOptions) -> bool {
    match &opts.relation_filter_prefix {
        Some(prefix) => analysis.relation.starts_with(prefix.as_str()),
        None => true,
    }
}

/// Runs the full six-stage pipeline (spec.md §2) over `model` and returns
/// the emitted SQL bundle. The only fatal error is [`melange_model::CompileError::CyclicSchema`]
/// (stage 1); every other relation-level problem is downgraded to a
/// [`Diagnostic`] and the relation's functions become fixed "unsupported
/// feature" stubs (spec.md §7).
pub fn compile(model: &Model, opts: &CompileOptions) -> Result<CompileResult> {
    tracing::info!(types = model.types.len(), "starting compile");

    validator::validate(model)?;
    tracing::debug!("stage 1 (validator) passed: no fatal cycles");

    let closure = closure::build_closure(model);
    tracing::debug!(rows = closure.rows.len(), "stage 2 (closure) built");

    let userset_rules = userset::build_userset_rules(model, &closure);
    tracing::debug!(rules = userset_rules.rules.len(), "stage 3 (userset rules) built");

    let inventory = analyzer::analyze_model(model, &closure, &userset_rules);
    tracing::debug!(relations = inventory.analyses.len(), "stage 4 (feature analyzer) built");

    let mut diagnostics = Vec::new();
    let mut functions = Vec::new();
    let mut emitted: Vec<RelationAnalysis> = Vec::new();

    for analysis in &inventory.analyses {
        if !included(analysis, opts) {
            continue;
        }

        if !analysis.capabilities.check_allowed || !analysis.capabilities.list_allowed {
            let reason = analysis
                .capabilities
                .check_reason
                .clone()
                .or_else(|| analysis.capabilities.list_reason.clone())
                .unwrap_or_else(|| "unsupported feature combination".to_string());
            diagnostics.push(Diagnostic {
                object_type: analysis.object_type.clone(),
                relation: analysis.relation.clone(),
                message: reason,
            });
            tracing::warn!(
                object_type = %analysis.object_type,
                relation = %analysis.relation,
                "relation unsupported, emitting stub"
            );
        } else {
            tracing::debug!(
                object_type = %analysis.object_type,
                relation = %analysis.relation,
                strategy = analysis.list_strategy.label(),
                "strategy selected"
            );
        }

        functions.push(functions::build_check_function(analysis, false));
        functions.push(functions::build_check_function(analysis, true));
        functions.push(functions::build_list_objects_function(analysis));
        functions.push(functions::build_list_subjects_function(analysis));
        emitted.push(analysis.clone());
    }

    functions.push(functions::build_check_permission_internal(&emitted));
    functions.extend(functions::build_dispatchers(&emitted));

    let ddl = schema::bootstrap_ddl().into_iter().map(str::to_string).collect();

    let function_names: Vec<String> = functions.iter().map(|f| f.name.clone()).collect();
    let schema_checksum = compute_checksum(model, &opts.codegen_version);

    tracing::info!(
        functions = function_names.len(),
        diagnostics = diagnostics.len(),
        "compile finished"
    );

    Ok(CompileResult {
        ddl,
        functions,
        diagnostics,
        migration: Some(MigrationRecord {
            schema_checksum,
            codegen_version: opts.codegen_version.clone(),
            function_names,
        }),
    })
}

/// A stable hash of the input model plus codegen version (spec.md §8
/// determinism, §6.2 `melange_migrations.schema_checksum`). Hashes the
/// model's canonical JSON serialization rather than the emitted SQL text
/// directly, so an installer can detect "nothing changed" from the Model
/// alone without regenerating SQL first.
fn compute_checksum(model: &Model, codegen_version: &str) -> String {
    let mut hasher = Sha256::new();
    let canonical = serde_json::to_vec(model).unwrap_or_default();
    hasher.update(&canonical);
    hasher.update(codegen_version.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use melange_model::{RelationDefinition, SubjectTypeRef, TypeDefinition};

    fn simple_model() -> Model {
        Model::new(vec![TypeDefinition {
            name: "doc".into(),
            relations: vec![RelationDefinition::new("viewer").with_direct(vec![SubjectTypeRef::direct("user")])],
        }])
    }

    #[test]
    fn compile_is_deterministic() {
        let model = simple_model();
        let opts = CompileOptions::default();
        let a = compile(&model, &opts).unwrap();
        let b = compile(&model, &opts).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn compile_rejects_cyclic_schema() {
        let model = Model::new(vec![TypeDefinition {
            name: "doc".into(),
            relations: vec![
                RelationDefinition::new("a").with_implied_by(vec!["b"]),
                RelationDefinition::new("b").with_implied_by(vec!["a"]),
            ],
        }]);
        let err = compile(&model, &CompileOptions::default()).unwrap_err();
        assert!(matches!(err, melange_model::CompileError::CyclicSchema(_)));
    }

    #[test]
    fn compile_emits_dispatchers_and_check_functions() {
        let model = simple_model();
        let result = compile(&model, &CompileOptions::default()).unwrap();
        assert!(result.functions.iter().any(|f| f.name == "check_doc_viewer"));
        assert!(result.functions.iter().any(|f| f.name == "check_doc_viewer_no_wildcard"));
        assert!(result.functions.iter().any(|f| f.name == "check_permission"));
        assert!(result.functions.iter().any(|f| f.name == "check_permission_no_wildcard"));
        assert!(result.functions.iter().any(|f| f.name == "check_permission_internal"));
        assert!(result.diagnostics.is_empty());
        assert!(result.migration.is_some());
    }

    #[test]
    fn relation_filter_prefix_narrows_emitted_functions() {
        let model = Model::new(vec![TypeDefinition {
            name: "doc".into(),
            relations: vec![
                RelationDefinition::new("viewer").with_direct(vec![SubjectTypeRef::direct("user")]),
                RelationDefinition::new("internal_admin").with_direct(vec![SubjectTypeRef::direct("user")]),
            ],
        }]);
        let opts = CompileOptions {
            codegen_version: "1".into(),
            relation_filter_prefix: Some("internal_".to_string()),
        };
        let result = compile(&model, &opts).unwrap();
        assert!(result.functions.iter().any(|f| f.name == "check_doc_internal_admin"));
        assert!(!result.functions.iter().any(|f| f.name == "check_doc_viewer"));
    }

    #[test]
    fn unsupported_relation_is_non_fatal_and_gets_a_stub() {
        let model = Model::new(vec![TypeDefinition {
            name: "doc".into(),
            relations: vec![RelationDefinition::new("ghost")],
        }]);
        let result = compile(&model, &CompileOptions::default()).unwrap();
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].relation, "ghost");
        assert!(result.functions.iter().any(|f| f.name == "check_doc_ghost"));
    }
}
