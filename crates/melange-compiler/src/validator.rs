//! Stage 1 — cycle validator (spec.md §4.1).
//!
//! Two DFS passes share one three-color marking routine, the way
//! `ciam_authz::AuthzError`/`ciam_database::DatabaseError` are each one
//! enum reused across many call sites rather than bespoke per-call types
//! (SPEC_FULL.md §4.1).

use std::collections::HashMap;

use melange_model::{CompileError, Model, Result};

// Every name the compiler ever splices into generated SQL text (type
// names, relation names, linking relations) has to be a safe identifier
// fragment, since function names like `check_<type>_<relation>` are built
// by plain string concatenation, not through a parameterized query.
lazy_static::lazy_static! {
    static ref IDENTIFIER_RE: regex::Regex = regex::Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap();
}

fn check_identifier(name: &str, errors: &mut Vec<String>) {
    if !IDENTIFIER_RE.is_match(name) {
        errors.push(name.to_string());
    }
}

/// Walks every name-bearing field of `model` and collects any that are not
/// valid SQL identifier fragments (spec.md §4.1 implicit precondition: the
/// emitter never quotes or escapes these, it concatenates them).
fn validate_identifiers(model: &Model) -> Vec<String> {
    let mut errors = Vec::new();

    for ty in &model.types {
        check_identifier(&ty.name, &mut errors);
        for rel in &ty.relations {
            check_identifier(&rel.name, &mut errors);
            for subject_ref in &rel.subject_type_refs {
                check_identifier(&subject_ref.type_name, &mut errors);
                if let Some(r) = &subject_ref.relation {
                    check_identifier(r, &mut errors);
                }
            }
            for name in &rel.implied_by {
                check_identifier(name, &mut errors);
            }
            if let Some(r) = &rel.parent_relation {
                check_identifier(r, &mut errors);
            }
            if let Some(r) = &rel.parent_type {
                check_identifier(r, &mut errors);
            }
            for name in &rel.excluded_relations {
                check_identifier(name, &mut errors);
            }
            for excluded in &rel.excluded_parent_relations {
                check_identifier(&excluded.relation, &mut errors);
                check_identifier(&excluded.parent_type, &mut errors);
            }
            for group in &rel.intersection_groups {
                for part in &group.parts {
                    match part {
                        melange_model::IntersectionPart::ThisRelation => {}
                        melange_model::IntersectionPart::Relation { relation, excluded_relation } => {
                            check_identifier(relation, &mut errors);
                            if let Some(e) = excluded_relation {
                                check_identifier(e, &mut errors);
                            }
                        }
                        melange_model::IntersectionPart::TupleToUserset { relation, parent_type } => {
                            check_identifier(relation, &mut errors);
                            check_identifier(parent_type, &mut errors);
                        }
                    }
                }
            }
        }
    }

    errors.sort();
    errors.dedup();
    errors
}

type Node = (String, String);

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

struct CycleDetector {
    color: HashMap<Node, Color>,
}

impl CycleDetector {
    fn new() -> Self {
        Self {
            color: HashMap::new(),
        }
    }

    /// DFS from `node`. Returns the first back-edge cycle found below it,
    /// as the path from the cycle's start back to itself.
    fn visit(&mut self, node: Node, edges: &impl Fn(&Node) -> Vec<Node>, path: &mut Vec<Node>) -> Option<Vec<Node>> {
        match self.color.get(&node) {
            Some(Color::Black) => return None,
            Some(Color::Gray) => {
                let start = path.iter().position(|n| n == &node).unwrap_or(0);
                let mut cycle: Vec<Node> = path[start..].to_vec();
                cycle.push(node);
                return Some(cycle);
            }
            _ => {}
        }

        self.color.insert(node.clone(), Color::Gray);
        path.push(node.clone());

        for next in edges(&node) {
            if let Some(cycle) = self.visit(next, edges, path) {
                return Some(cycle);
            }
        }

        path.pop();
        self.color.insert(node, Color::Black);
        None
    }
}

fn format_path(path: &[Node]) -> String {
    path.iter()
        .map(|(t, r)| format!("{t}.{r}"))
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Implied-by pass, per type: an edge `R → R'` exists when `R'` appears in
/// `R.implied_by` (spec.md §4.1 — "`R'` implies `R`"). Any back-edge within
/// a type is a fatal cycle.
fn validate_implied_by(model: &Model) -> Vec<String> {
    let mut errors = Vec::new();

    for ty in &model.types {
        let edges = |node: &Node| -> Vec<Node> {
            model
                .relation(&node.0, &node.1)
                .map(|r| {
                    r.implied_by
                        .iter()
                        .map(|r2| (node.0.clone(), r2.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut detector = CycleDetector::new();
        for rel in &ty.relations {
            let start = (ty.name.clone(), rel.name.clone());
            if detector.color.get(&start).is_none() {
                let mut path = Vec::new();
                if let Some(cycle) = detector.visit(start, &edges, &mut path) {
                    errors.push(format_path(&cycle));
                }
            }
        }
    }

    errors
}

/// Resolve the object type a relation's TTU parent edge points at: the
/// first direct subject type of the *linking relation* (`parent_type`'s
/// value, despite the name, is a relation on the same type — spec.md §3.1).
pub(crate) fn resolve_parent_type(model: &Model, object_type: &str, linking_relation: &str) -> Option<String> {
    model
        .relation(object_type, linking_relation)
        .and_then(|r| r.subject_type_refs.first())
        .map(|r| r.type_name.clone())
}

/// Parent pass, cross-type: an edge `(T,R) → (ParentType, parent_relation)`
/// exists when `R` has a TTU parent. A cycle is fatal only when it spans
/// two or more distinct object types; same-type back-edges encode accepted
/// hierarchical recursion (spec.md §4.1) and are left for the recursive-TTU
/// strategy (§4.4/§4.7) to bound at runtime.
fn validate_parent(model: &Model) -> Vec<String> {
    let mut errors = Vec::new();

    let edges = |node: &Node| -> Vec<Node> {
        let Some(rel) = model.relation(&node.0, &node.1) else {
            return Vec::new();
        };
        let (Some(parent_relation), Some(parent_type)) = (&rel.parent_relation, &rel.parent_type) else {
            return Vec::new();
        };
        match resolve_parent_type(model, &node.0, parent_type) {
            Some(resolved_type) => vec![(resolved_type, parent_relation.clone())],
            None => Vec::new(),
        }
    };

    let mut detector = CycleDetector::new();
    for ty in &model.types {
        for rel in &ty.relations {
            let start = (ty.name.clone(), rel.name.clone());
            if detector.color.get(&start).is_some() {
                continue;
            }
            let mut path = Vec::new();
            if let Some(cycle) = detector.visit(start, &edges, &mut path) {
                let distinct_types: std::collections::HashSet<&str> =
                    cycle.iter().map(|(t, _)| t.as_str()).collect();
                if distinct_types.len() >= 2 {
                    errors.push(format_path(&cycle));
                }
            }
        }
    }

    errors
}

/// Runs both cycle-detection passes. Never mutates `model`. Fails with a
/// single aggregate error naming every offending cycle found.
pub fn validate(model: &Model) -> Result<()> {
    let bad_identifiers = validate_identifiers(model);
    if !bad_identifiers.is_empty() {
        return Err(CompileError::InvalidIdentifier(bad_identifiers.join(", ")));
    }

    let mut cycles = validate_implied_by(model);
    cycles.extend(validate_parent(model));

    if cycles.is_empty() {
        Ok(())
    } else {
        Err(CompileError::CyclicSchema(cycles.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use melange_model::{RelationDefinition, SubjectTypeRef, TypeDefinition};

    #[test]
    fn accepts_acyclic_implied_by_chain() {
        let model = Model::new(vec![TypeDefinition {
            name: "doc".into(),
            relations: vec![
                RelationDefinition::new("owner").with_direct(vec![SubjectTypeRef::direct("user")]),
                RelationDefinition::new("editor").with_implied_by(vec!["owner"]),
                RelationDefinition::new("viewer").with_implied_by(vec!["editor"]),
            ],
        }]);

        assert!(validate(&model).is_ok());
    }

    #[test]
    fn rejects_same_type_implied_by_cycle() {
        let model = Model::new(vec![TypeDefinition {
            name: "doc".into(),
            relations: vec![
                RelationDefinition::new("a").with_implied_by(vec!["b"]),
                RelationDefinition::new("b").with_implied_by(vec!["a"]),
            ],
        }]);

        let err = validate(&model).unwrap_err();
        assert!(matches!(err, CompileError::CyclicSchema(_)));
    }

    #[test]
    fn accepts_same_type_parent_recursion() {
        let model = Model::new(vec![TypeDefinition {
            name: "folder".into(),
            relations: vec![
                RelationDefinition::new("parent").with_direct(vec![SubjectTypeRef::direct("folder")]),
                RelationDefinition::new("viewer")
                    .with_direct(vec![SubjectTypeRef::direct("user")])
                    .with_ttu("viewer", "parent"),
            ],
        }]);

        assert!(validate(&model).is_ok());
    }

    #[test]
    fn rejects_type_name_that_is_not_a_safe_sql_identifier() {
        let model = Model::new(vec![TypeDefinition {
            name: "doc; DROP TABLE melange_tuples; --".into(),
            relations: vec![RelationDefinition::new("viewer").with_direct(vec![SubjectTypeRef::direct("user")])],
        }]);

        let err = validate(&model).unwrap_err();
        assert!(matches!(err, CompileError::InvalidIdentifier(_)));
    }

    #[test]
    fn rejects_cross_type_parent_cycle() {
        let model = Model::new(vec![
            TypeDefinition {
                name: "a".into(),
                relations: vec![
                    RelationDefinition::new("link").with_direct(vec![SubjectTypeRef::direct("b")]),
                    RelationDefinition::new("viewer").with_ttu("viewer", "link"),
                ],
            },
            TypeDefinition {
                name: "b".into(),
                relations: vec![
                    RelationDefinition::new("link").with_direct(vec![SubjectTypeRef::direct("a")]),
                    RelationDefinition::new("viewer").with_ttu("viewer", "link"),
                ],
            },
        ]);

        let err = validate(&model).unwrap_err();
        assert!(matches!(err, CompileError::CyclicSchema(_)));
    }
}
