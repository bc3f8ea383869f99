//! Stage 2 — closure builder (spec.md §4.2).

use std::collections::VecDeque;

use melange_model::{Closure, ClosureRow, Model};

/// BFS per `(type, relation)` over `implied_by` adjacency. Every relation
/// self-satisfies (path `[R]`). Each target is visited once — first-found
/// path wins, which BFS guarantees is the shortest. Traversal order is the
/// model's own declaration order, so output is stable across runs.
pub fn build_closure(model: &Model) -> Closure {
    let mut rows = Vec::new();

    for ty in &model.types {
        for rel in &ty.relations {
            rows.extend(closure_for_relation(model, &ty.name, &rel.name));
        }
    }

    Closure { rows }
}

fn closure_for_relation(model: &Model, object_type: &str, relation: &str) -> Vec<ClosureRow> {
    let mut visited = vec![relation.to_string()];
    let mut rows = vec![ClosureRow {
        object_type: object_type.to_string(),
        relation: relation.to_string(),
        satisfying_relation: relation.to_string(),
        via_path: vec![relation.to_string()],
    }];

    let mut queue: VecDeque<(String, Vec<String>)> = VecDeque::new();
    queue.push_back((relation.to_string(), vec![relation.to_string()]));

    while let Some((current, path)) = queue.pop_front() {
        let Some(def) = model.relation(object_type, &current) else {
            continue;
        };
        for implying in &def.implied_by {
            if visited.contains(implying) {
                continue;
            }
            visited.push(implying.clone());
            let mut next_path = path.clone();
            next_path.push(implying.clone());

            rows.push(ClosureRow {
                object_type: object_type.to_string(),
                relation: relation.to_string(),
                satisfying_relation: implying.clone(),
                via_path: next_path.clone(),
            });
            queue.push_back((implying.clone(), next_path));
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use melange_model::{RelationDefinition, SubjectTypeRef, TypeDefinition};

    fn sample_model() -> Model {
        Model::new(vec![TypeDefinition {
            name: "doc".into(),
            relations: vec![
                RelationDefinition::new("owner").with_direct(vec![SubjectTypeRef::direct("user")]),
                RelationDefinition::new("editor").with_implied_by(vec!["owner"]),
                RelationDefinition::new("viewer").with_implied_by(vec!["editor"]),
            ],
        }])
    }

    #[test]
    fn every_relation_self_satisfies() {
        let closure = build_closure(&sample_model());
        for rel in ["owner", "editor", "viewer"] {
            let satisfiers = closure.satisfying_relations("doc", rel);
            assert!(satisfiers.contains(&rel.to_string()));
        }
    }

    #[test]
    fn closure_is_transitive_through_implied_by() {
        let closure = build_closure(&sample_model());
        let satisfiers = closure.satisfying_relations("doc", "viewer");
        assert!(satisfiers.contains(&"editor".to_string()));
        assert!(satisfiers.contains(&"owner".to_string()));
    }

    #[test]
    fn shortest_path_wins_for_diamond_implication() {
        let model = Model::new(vec![TypeDefinition {
            name: "doc".into(),
            relations: vec![
                RelationDefinition::new("owner").with_direct(vec![SubjectTypeRef::direct("user")]),
                RelationDefinition::new("mid_a").with_implied_by(vec!["owner"]),
                RelationDefinition::new("mid_b").with_implied_by(vec!["owner"]),
                RelationDefinition::new("viewer").with_implied_by(vec!["mid_a", "mid_b"]),
            ],
        }]);

        let closure = build_closure(&model);
        let row = closure
            .satisfiers("doc", "viewer")
            .into_iter()
            .find(|r| r.satisfying_relation == "owner")
            .unwrap();
        assert_eq!(row.via_path, vec!["viewer", "mid_a", "owner"]);
    }
}
