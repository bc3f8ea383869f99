//! Stage 3 — userset-rule expander (spec.md §4.3).

use std::collections::HashSet;

use melange_model::{Closure, Model, UsersetRule, UsersetRules};

/// Crosses closure with userset subject-type references: for each relation,
/// every satisfying relation (closure, falling back to the relation itself
/// when closure produced no rows) that itself carries a userset ref
/// contributes one rule. A hashed composite key dedupes; output preserves
/// input traversal order.
pub fn build_userset_rules(model: &Model, closure: &Closure) -> UsersetRules {
    let mut seen = HashSet::new();
    let mut rules = Vec::new();

    for ty in &model.types {
        for rel in &ty.relations {
            let satisfiers = closure.satisfying_relations(&ty.name, &rel.name);
            let satisfiers = if satisfiers.is_empty() {
                vec![rel.name.clone()]
            } else {
                satisfiers
            };

            for satisfying in &satisfiers {
                let Some(def) = model.relation(&ty.name, satisfying) else {
                    continue;
                };
                for uref in def.usersets() {
                    let Some(subject_relation) = uref.relation.clone() else {
                        continue;
                    };
                    let rule = UsersetRule {
                        object_type: ty.name.clone(),
                        relation: rel.name.clone(),
                        tuple_relation: satisfying.clone(),
                        subject_type: uref.type_name.clone(),
                        subject_relation,
                    };
                    if seen.insert(rule.dedup_key()) {
                        rules.push(rule);
                    }
                }
            }
        }
    }

    UsersetRules { rules }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::closure::build_closure;
    use melange_model::{RelationDefinition, SubjectTypeRef, TypeDefinition};

    #[test]
    fn direct_userset_ref_produces_one_rule() {
        let model = Model::new(vec![
            TypeDefinition {
                name: "group".into(),
                relations: vec![
                    RelationDefinition::new("member").with_direct(vec![SubjectTypeRef::direct("user")]),
                ],
            },
            TypeDefinition {
                name: "doc".into(),
                relations: vec![RelationDefinition::new("viewer")
                    .with_direct(vec![SubjectTypeRef::userset("group", "member")])],
            },
        ]);

        let closure = build_closure(&model);
        let rules = build_userset_rules(&model, &closure);
        let matches = rules.for_relation("doc", "viewer");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].subject_type, "group");
        assert_eq!(matches[0].subject_relation, "member");
        assert_eq!(matches[0].tuple_relation, "viewer");
    }

    #[test]
    fn userset_ref_contributed_through_implied_by_is_expanded() {
        let model = Model::new(vec![
            TypeDefinition {
                name: "group".into(),
                relations: vec![
                    RelationDefinition::new("member").with_direct(vec![SubjectTypeRef::direct("user")]),
                ],
            },
            TypeDefinition {
                name: "doc".into(),
                relations: vec![
                    RelationDefinition::new("editor")
                        .with_direct(vec![SubjectTypeRef::userset("group", "member")]),
                    RelationDefinition::new("viewer").with_implied_by(vec!["editor"]),
                ],
            },
        ]);

        let closure = build_closure(&model);
        let rules = build_userset_rules(&model, &closure);
        let matches = rules.for_relation("doc", "viewer");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].tuple_relation, "editor");
    }
}
