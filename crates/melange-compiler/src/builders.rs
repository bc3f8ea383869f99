//! Stage 5 — query builders, the pattern library of spec.md §4.6.
//!
//! Each function accepts a typed, narrow input and returns the
//! [`SelectStmt`] for a single pattern. Naming mirrors the spec's table so
//! the function builders of [`crate::functions`] can treat this module as a
//! fixed library rather than hand-rolling SQL shapes inline.

use melange_model::analysis::{ExclusionConfig, ParentRelationInfo, UsersetPattern};

use crate::sql::{Expr, FromClause, JoinClause, JoinKind, SelectColumn, SelectStmt, TableRef, TupleQuery};

pub const P_SUBJECT_TYPE: &str = "p_subject_type";
pub const P_SUBJECT_ID: &str = "p_subject_id";
pub const P_OBJECT_ID: &str = "p_object_id";

/// The low-level recursion-safe permission check (spec.md §5): accepts a
/// visited-path array to break cycles during closure/userset traversal.
/// Distinct from the public `check_permission` dispatcher.
fn check_permission_internal_call(subject_type: Expr, subject_id: Expr, relation: Expr, object_type: Expr, object_id: Expr) -> Expr {
    Expr::Eq(
        Box::new(Expr::FunctionCall {
            name: "check_permission_internal".to_string(),
            args: vec![subject_type, subject_id, relation, object_type, object_id, Expr::Raw("p_visited_path".to_string())],
        }),
        Box::new(Expr::int_lit(1)),
    )
}

pub(crate) fn and_extend(stmt: &mut SelectStmt, predicate: Expr) {
    stmt.where_clause = Some(match stmt.where_clause.take() {
        Some(Expr::And(mut parts)) => {
            parts.push(predicate);
            Expr::And(parts)
        }
        Some(existing) => Expr::And(vec![existing, predicate]),
        None => predicate,
    });
}

/// Restricts any of the above object-returning builders to a single
/// object id — used by [`crate::functions`] to turn a list-objects block
/// into a Check existence probe without duplicating each builder.
pub(crate) fn require_object_id(stmt: &mut SelectStmt) {
    and_extend(stmt, Expr::col("t", "object_id").eq(Expr::param(P_OBJECT_ID)));
}

/// `list_objects_direct` — direct-tuple lookup over all satisfying
/// relations, type-guarded subject type, optional wildcard match.
pub fn list_objects_direct(object_type: &str, satisfying_relations: &[String], allow_wildcard: bool) -> SelectStmt {
    TupleQuery::new("t")
        .select(Expr::col("t", "object_id"), None)
        .object_type(object_type)
        .relations(satisfying_relations.to_vec())
        .and_where(Expr::col("t", "subject_type").eq(Expr::param(P_SUBJECT_TYPE)))
        .and_where(Expr::SubjectIdMatch {
            column: Box::new(Expr::col("t", "subject_id")),
            id: Box::new(Expr::param(P_SUBJECT_ID)),
            allow_wildcard,
        })
        .build()
}

/// `list_subjects_direct` — mirror of [`list_objects_direct`], returning
/// subjects for a fixed object.
pub fn list_subjects_direct(object_type: &str, satisfying_relations: &[String]) -> SelectStmt {
    TupleQuery::new("t")
        .select(Expr::col("t", "subject_id"), None)
        .object_type(object_type)
        .relations(satisfying_relations.to_vec())
        .and_where(Expr::col("t", "object_id").eq(Expr::param(P_OBJECT_ID)))
        .and_where(Expr::col("t", "subject_type").eq(Expr::param(P_SUBJECT_TYPE)))
        .build()
}

/// `list_objects_userset_subject` — when the caller's subject is itself a
/// userset `T#R`, match tuples whose subject is any userset on `T` whose
/// relation is closure-related to `R`.
pub fn list_objects_userset_subject(object_type: &str, satisfying_relations: &[String], related_subject_relations: &[String]) -> SelectStmt {
    let candidates: Vec<Expr> = related_subject_relations
        .iter()
        .map(|r| Expr::NormalizedUsersetSubject {
            subject_id: Box::new(Expr::param(P_SUBJECT_ID)),
            relation: Box::new(Expr::str_lit(r.clone())),
        })
        .collect();

    TupleQuery::new("t")
        .select(Expr::col("t", "object_id"), None)
        .object_type(object_type)
        .relations(satisfying_relations.to_vec())
        .and_where(Expr::In(Box::new(Expr::col("t", "subject_id")), candidates))
        .build()
}

/// `list_subjects_userset_subject` — mirror of
/// [`list_objects_userset_subject`], returning the raw userset subject
/// strings stored on matching tuples.
pub fn list_subjects_userset_subject(object_type: &str, satisfying_relations: &[String]) -> SelectStmt {
    TupleQuery::new("t")
        .select(Expr::col("t", "subject_id"), None)
        .object_type(object_type)
        .relations(satisfying_relations.to_vec())
        .and_where(Expr::col("t", "object_id").eq(Expr::param(P_OBJECT_ID)))
        .and_where(Expr::HasUserset(Box::new(Expr::col("t", "subject_id"))))
        .build()
}

/// `list_objects_complex_closure` — as [`list_objects_direct`], but each
/// candidate is validated by calling `check_permission_internal` rather
/// than trusted as a plain tuple join, for userset patterns whose own
/// relation is itself complex (spec.md §3.4 `is_complex`).
pub fn list_objects_complex_closure(object_type: &str, tuple_relation: &str, pattern: &UsersetPattern) -> SelectStmt {
    TupleQuery::new("t")
        .select(Expr::col("t", "object_id"), None)
        .object_type(object_type)
        .relations(vec![tuple_relation.to_string()])
        .and_where(Expr::col("t", "subject_type").eq(Expr::str_lit(pattern.subject_type.clone())))
        .and_where(Expr::HasUserset(Box::new(Expr::col("t", "subject_id"))))
        .and_where(check_permission_internal_call(
            Expr::str_lit(pattern.subject_type.clone()),
            Expr::param(P_SUBJECT_ID),
            Expr::UsersetRelation(Box::new(Expr::col("t", "subject_id"))),
            Expr::str_lit(pattern.subject_type.clone()),
            Expr::UsersetObjectId(Box::new(Expr::col("t", "subject_id"))),
        ))
        .build()
}

/// `list_subjects_complex_closure` — mirror for list-subjects.
pub fn list_subjects_complex_closure(object_type: &str, tuple_relation: &str, pattern: &UsersetPattern) -> SelectStmt {
    TupleQuery::new("t")
        .select(Expr::col("t", "subject_id"), None)
        .object_type(object_type)
        .relations(vec![tuple_relation.to_string()])
        .and_where(Expr::col("t", "object_id").eq(Expr::param(P_OBJECT_ID)))
        .and_where(Expr::col("t", "subject_type").eq(Expr::str_lit(pattern.subject_type.clone())))
        .build()
}

fn lateral_sibling_call(sibling_list_function: &str, limit: Expr, after: Expr) -> TableRef {
    TableRef::Function {
        name: sibling_list_function.to_string(),
        args: vec![Expr::param(P_SUBJECT_TYPE), Expr::param(P_SUBJECT_ID), limit, after],
    }
}

/// `list_objects_intersection_closure` (and its `_validated` sibling) —
/// delegate to a sibling intersection-composing relation's own list
/// function via a LATERAL join, passing `NULL` limit/cursor so the outer
/// caller's own pagination wrapper controls the final page (spec.md §9
/// open question, resolved in DESIGN.md: inner calls are unbounded).
/// `validated` additionally re-checks the candidate with
/// `check_permission_internal` rather than trusting the sibling's result —
/// required when the relation delegated to is itself complex.
pub fn list_objects_intersection_closure(object_type: &str, sibling_list_function: &str, validated: bool) -> SelectStmt {
    // There is no outer tuple row to join against — the lateral call into
    // the sibling's own list function is the sole row source, seeded from a
    // single dummy row the way a `SELECT … FROM generate_series(1,1)` seed
    // is used to invoke a set-returning function with no base table.
    let mut stmt = SelectStmt {
        distinct: true,
        columns: vec![SelectColumn::new(Expr::col("sibling", "object_id"), None)],
        from: FromClause::Table {
            name: "(SELECT 1) AS seed(x)".to_string(),
            alias: None,
        },
        joins: vec![JoinClause {
            kind: JoinKind::LateralLeft,
            table: lateral_sibling_call(sibling_list_function, Expr::Null, Expr::Null),
            alias: "sibling".to_string(),
            on: None,
        }],
        where_clause: None,
        order_by: Vec::new(),
        limit: None,
    };

    if validated {
        and_extend(
            &mut stmt,
            check_permission_internal_call(
                Expr::param(P_SUBJECT_TYPE),
                Expr::param(P_SUBJECT_ID),
                Expr::str_lit(sibling_list_function.to_string()),
                Expr::str_lit(object_type.to_string()),
                Expr::col("sibling", "object_id"),
            ),
        );
    }
    stmt
}

/// `list_objects_userset_pattern_simple` — traverse
/// `tuples(t) JOIN tuples(m)`: `t` holds the userset-subject tuple on the
/// object, `m` holds the membership tuple granting the caller that userset.
pub fn list_objects_userset_pattern_simple(object_type: &str, tuple_relation: &str, pattern: &UsersetPattern) -> SelectStmt {
    let join = JoinClause {
        kind: JoinKind::Inner,
        table: TableRef::Named("melange_tuples".to_string()),
        alias: "m".to_string(),
        on: Some(Expr::And(vec![
            Expr::col("m", "object_type").eq(Expr::str_lit(pattern.subject_type.clone())),
            Expr::col("m", "object_id").eq(Expr::UsersetObjectId(Box::new(Expr::col("t", "subject_id")))),
            Expr::In(
                Box::new(Expr::col("m", "relation")),
                pattern.satisfying_relations.iter().map(|r| Expr::str_lit(r.clone())).collect(),
            ),
            Expr::col("m", "subject_type").eq(Expr::param(P_SUBJECT_TYPE)),
            Expr::col("m", "subject_id").eq(Expr::param(P_SUBJECT_ID)),
        ])),
    };

    let mut stmt = TupleQuery::new("t")
        .select(Expr::col("t", "object_id"), None)
        .object_type(object_type)
        .relations(vec![tuple_relation.to_string()])
        .and_where(Expr::HasUserset(Box::new(Expr::col("t", "subject_id"))))
        .build();
    stmt.joins.push(join);
    stmt
}

/// `list_objects_userset_pattern_complex` — as the simple variant, but `m`
/// is replaced by a LATERAL call into the userset relation's own list
/// function, used when that relation is itself complex.
pub fn list_objects_userset_pattern_complex(object_type: &str, tuple_relation: &str, pattern: &UsersetPattern, member_list_function: &str) -> SelectStmt {
    let join = JoinClause {
        kind: JoinKind::LateralLeft,
        table: lateral_sibling_call(member_list_function, Expr::Null, Expr::Null),
        alias: "m".to_string(),
        on: Some(Expr::col("m", "object_id").eq(Expr::UsersetObjectId(Box::new(Expr::col("t", "subject_id"))))),
    };

    let mut stmt = TupleQuery::new("t")
        .select(Expr::col("t", "object_id"), None)
        .object_type(object_type)
        .relations(vec![tuple_relation.to_string()])
        .and_where(Expr::HasUserset(Box::new(Expr::col("t", "subject_id"))))
        .build();
    stmt.joins.push(join);
    and_extend(&mut stmt, Expr::Raw("m.object_id IS NOT NULL".to_string()));
    stmt
}

/// `list_objects_self_candidate` — when the subject is a userset on the
/// same object type, the userset's own object id is itself a candidate,
/// gated by the closure (e.g. nested-group `member: [user, group#member]`).
pub fn list_objects_self_candidate(object_type: &str, relation: &str) -> SelectStmt {
    SelectStmt {
        distinct: false,
        columns: vec![SelectColumn::new(Expr::UsersetObjectId(Box::new(Expr::param(P_SUBJECT_ID))), Some("object_id"))],
        from: FromClause::Table {
            name: "(SELECT 1) AS seed(x)".to_string(),
            alias: None,
        },
        joins: Vec::new(),
        where_clause: Some(Expr::And(vec![
            Expr::HasUserset(Box::new(Expr::param(P_SUBJECT_ID))),
            Expr::param(P_SUBJECT_TYPE).eq(Expr::str_lit(object_type.to_string())),
            Expr::UsersetRelation(Box::new(Expr::param(P_SUBJECT_ID))).eq(Expr::str_lit(relation.to_string())),
        ])),
        order_by: Vec::new(),
        limit: None,
    }
}

/// `list_objects_cross_type_ttu` — tuple-to-userset reaching a different
/// object type, validated with `check_permission_internal` on the parent.
pub fn list_objects_cross_type_ttu(object_type: &str, linking_relation: &str, info: &ParentRelationInfo) -> SelectStmt {
    TupleQuery::new("t")
        .select(Expr::col("t", "object_id"), None)
        .object_type(object_type)
        .relations(vec![linking_relation.to_string()])
        .and_where(Expr::In(
            Box::new(Expr::col("t", "subject_type")),
            info.allowed_linking_types.iter().map(|t| Expr::str_lit(t.clone())).collect(),
        ))
        .and_where(check_permission_internal_call(
            Expr::param(P_SUBJECT_TYPE),
            Expr::param(P_SUBJECT_ID),
            Expr::str_lit(info.relation.clone()),
            Expr::col("t", "subject_type"),
            Expr::col("t", "subject_id"),
        ))
        .build()
}

pub fn list_subjects_cross_type_ttu(object_type: &str, linking_relation: &str, info: &ParentRelationInfo, subject_list_function: &str) -> SelectStmt {
    let mut stmt = TupleQuery::new("t")
        .select(Expr::col("m", "subject_id"), None)
        .object_type(object_type)
        .relations(vec![linking_relation.to_string()])
        .and_where(Expr::col("t", "object_id").eq(Expr::param(P_OBJECT_ID)))
        .build();
    stmt.joins.push(JoinClause {
        kind: JoinKind::LateralLeft,
        table: TableRef::Function {
            name: subject_list_function.to_string(),
            args: vec![Expr::col("t", "subject_id"), Expr::param(P_SUBJECT_TYPE), Expr::Null, Expr::Null],
        },
        alias: "m".to_string(),
        on: None,
    });
    stmt
}

/// `list_objects_recursive_ttu` — the base case of the recursive CTE body
/// for same-type TTU; [`crate::functions`] wraps this with the `WITH
/// RECURSIVE accessible(object_id, depth)` shell and the step case.
pub fn list_objects_recursive_ttu_base(object_type: &str, satisfying_relations: &[String], allow_wildcard: bool) -> SelectStmt {
    let mut stmt = list_objects_direct(object_type, satisfying_relations, allow_wildcard);
    stmt.columns.push(SelectColumn::new(Expr::int_lit(0), Some("depth")));
    stmt
}

pub fn list_objects_recursive_ttu_step(object_type: &str, linking_relation: &str) -> SelectStmt {
    let mut stmt = SelectStmt {
        distinct: false,
        columns: vec![
            SelectColumn::new(Expr::col("t", "object_id"), None),
            SelectColumn::new(Expr::Raw("a.depth + 1".to_string()), Some("depth")),
        ],
        from: FromClause::Table {
            name: "melange_tuples".to_string(),
            alias: Some("t".to_string()),
        },
        joins: vec![JoinClause {
            kind: JoinKind::Inner,
            table: TableRef::Named("accessible".to_string()),
            alias: "a".to_string(),
            on: Some(Expr::col("t", "subject_id").eq(Expr::col("a", "object_id"))),
        }],
        where_clause: None,
        order_by: Vec::new(),
        limit: None,
    };
    and_extend(&mut stmt, Expr::col("t", "object_type").eq(Expr::str_lit(object_type.to_string())));
    and_extend(&mut stmt, Expr::col("t", "relation").eq(Expr::str_lit(linking_relation.to_string())));
    and_extend(&mut stmt, Expr::col("t", "subject_type").eq(Expr::str_lit(object_type.to_string())));
    and_extend(&mut stmt, Expr::Lt(Box::new(Expr::col("a", "depth")), Box::new(Expr::int_lit(melange_model::analysis::MAX_USERSET_DEPTH as i64))));
    stmt
}

/// Builds the `NotExists` predicates contributed by an [`ExclusionConfig`]:
/// simple excluded relations, complex excluded relations (via
/// `check_permission_internal`), and excluded parent TTUs. Applied
/// uniformly by every strategy (spec.md §4.6).
pub fn exclusion_predicates(object_type: &str, exclusions: &ExclusionConfig) -> Vec<Expr> {
    let mut preds = Vec::new();

    if !exclusions.excluded_relations.is_empty() {
        let stmt = TupleQuery::new("ex")
            .select(Expr::int_lit(1), None)
            .object_type(object_type)
            .relations(exclusions.excluded_relations.clone())
            .and_where(Expr::col("ex", "object_id").eq(Expr::col("t", "object_id")))
            .and_where(Expr::col("ex", "subject_type").eq(Expr::param(P_SUBJECT_TYPE)))
            .and_where(Expr::col("ex", "subject_id").eq(Expr::param(P_SUBJECT_ID)))
            .build();
        preds.push(Expr::NotExists(Box::new(stmt)));
    }

    for relation in &exclusions.excluded_complex_relations {
        preds.push(Expr::Not(Box::new(check_permission_internal_call(
            Expr::param(P_SUBJECT_TYPE),
            Expr::param(P_SUBJECT_ID),
            Expr::str_lit(relation.clone()),
            Expr::str_lit(object_type.to_string()),
            Expr::col("t", "object_id"),
        ))));
    }

    for parent in &exclusions.excluded_parents {
        let stmt = TupleQuery::new("exp")
            .select(Expr::int_lit(1), None)
            .object_type(object_type)
            .relations(vec![parent.linking_relation.clone()])
            .and_where(Expr::col("exp", "object_id").eq(Expr::col("t", "object_id")))
            .and_where(check_permission_internal_call(
                Expr::param(P_SUBJECT_TYPE),
                Expr::param(P_SUBJECT_ID),
                Expr::str_lit(parent.relation.clone()),
                Expr::col("exp", "subject_type"),
                Expr::col("exp", "subject_id"),
            ))
            .build();
        preds.push(Expr::NotExists(Box::new(stmt)));
    }

    preds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_objects_direct_renders_wildcard_clause_when_enabled() {
        let sql = list_objects_direct("doc", &["viewer".to_string()], true).sql();
        assert!(sql.contains("subject_id = p_subject_id OR t.subject_id = '*'"));
    }

    #[test]
    fn list_objects_direct_omits_wildcard_clause_when_disabled() {
        let sql = list_objects_direct("doc", &["viewer".to_string()], false).sql();
        assert!(!sql.contains("'*'"));
    }

    #[test]
    fn exclusion_predicates_cover_simple_and_parent_cases() {
        let exclusions = ExclusionConfig {
            excluded_relations: vec!["author".to_string()],
            excluded_complex_relations: vec![],
            excluded_parents: vec![],
        };
        let preds = exclusion_predicates("doc", &exclusions);
        assert_eq!(preds.len(), 1);
        assert!(preds[0].sql().starts_with("NOT EXISTS"));
    }

    #[test]
    fn recursive_ttu_step_bounds_depth() {
        let sql = list_objects_recursive_ttu_step("folder", "parent").sql();
        assert!(sql.contains("a.depth < 25"));
    }
}
