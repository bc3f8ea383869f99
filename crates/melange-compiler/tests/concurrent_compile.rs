//! `compile` takes `&Model` and returns an owned `CompileResult` with no
//! shared mutable state (SPEC_FULL.md §5) — safe to call from many threads
//! at once. No new dependency needed; `std::thread::scope` is enough to
//! exercise this without pulling in a thread-pool crate the core has no
//! other use for.

use melange_compiler::{compile, CompileOptions};
use melange_model::{Model, RelationDefinition, SubjectTypeRef, TypeDefinition};

fn model_for(n: usize) -> Model {
    Model::new(vec![TypeDefinition {
        name: format!("doc{n}"),
        relations: vec![RelationDefinition::new("viewer").with_direct(vec![SubjectTypeRef::direct("user")])],
    }])
}

#[test]
fn compile_is_safe_to_call_concurrently_across_distinct_models() {
    let models: Vec<Model> = (0..16).map(model_for).collect();
    let opts = CompileOptions::default();

    std::thread::scope(|scope| {
        for (i, model) in models.iter().enumerate() {
            let opts = &opts;
            scope.spawn(move || {
                let result = compile(model, opts).unwrap();
                let expected_check = format!("check_doc{i}_viewer");
                assert!(result.functions.iter().any(|f| f.name == expected_check));
            });
        }
    });
}
