//! Stage 6 — function builders (spec.md §4.7): the two orchestrators that
//! pick a strategy and assemble the final PL/pgSQL function body, plus the
//! check-function composer, the low-level `check_permission_internal`
//! (spec.md §5), and the public dispatchers.

use melange_model::analysis::{RelationAnalysis, Strategy, MAX_USERSET_DEPTH};
use melange_model::output::{FunctionDef, FunctionKind};

use crate::builders::{self, P_OBJECT_ID, P_SUBJECT_ID, P_SUBJECT_TYPE};
use crate::sql::{render_set_op, Expr, SelectStmt};

/// Every non-exhaustive strategy branch still gets the exclusion predicates
/// applied uniformly (spec.md §4.6).
fn apply_exclusions(mut stmt: SelectStmt, analysis: &RelationAnalysis) -> SelectStmt {
    let preds = builders::exclusion_predicates(&analysis.object_type, &analysis.exclusions);
    for pred in preds {
        builders::and_extend(&mut stmt, pred);
    }
    stmt
}

/// Direct-strategy candidate blocks, shared by the check composer, the
/// list-objects builder, and the base case of the recursive CTE.
fn direct_object_blocks(analysis: &RelationAnalysis, allow_wildcard: bool) -> Vec<SelectStmt> {
    let mut blocks = Vec::new();

    if analysis.features.direct || analysis.features.implied {
        blocks.push(apply_exclusions(
            builders::list_objects_direct(&analysis.object_type, &analysis.satisfying_relations, allow_wildcard),
            analysis,
        ));
    }

    for pattern in &analysis.userset_patterns {
        let tuple_relation = pattern.source_relation.clone().unwrap_or_else(|| analysis.relation.clone());
        if pattern.is_complex {
            blocks.push(apply_exclusions(
                builders::list_objects_complex_closure(&analysis.object_type, &tuple_relation, pattern),
                analysis,
            ));
        } else {
            blocks.push(apply_exclusions(
                builders::list_objects_userset_pattern_simple(&analysis.object_type, &tuple_relation, pattern),
                analysis,
            ));
        }
    }

    for pattern in &analysis.closure_userset_patterns {
        let tuple_relation = pattern.source_relation.clone().unwrap_or_else(|| analysis.relation.clone());
        blocks.push(apply_exclusions(
            builders::list_objects_userset_pattern_simple(&analysis.object_type, &tuple_relation, pattern),
            analysis,
        ));
    }

    for parent in &analysis.parent_relations {
        if parent.has_cross_type_links {
            blocks.push(apply_exclusions(
                builders::list_objects_cross_type_ttu(&analysis.object_type, &parent.linking_relation, parent),
                analysis,
            ));
        }
    }

    if blocks.is_empty() {
        // A relation with no grant path still gets a well-shaped, always-empty query.
        blocks.push(builders::list_objects_direct(&analysis.object_type, &analysis.satisfying_relations, allow_wildcard));
    }

    blocks
}

fn list_objects_body_sql(analysis: &RelationAnalysis) -> String {
    match &analysis.list_strategy {
        Strategy::Direct | Strategy::ComposedIndirect { .. } => {
            let mut blocks = direct_object_blocks(analysis, true);
            blocks.push(builders::list_objects_self_candidate(&analysis.object_type, &analysis.relation));
            render_set_op("UNION", &blocks)
        }
        Strategy::Recursive { linking_relation } => {
            let base = direct_object_blocks(analysis, true);
            let base_sql = base
                .into_iter()
                .map(|mut s| {
                    s.columns.push(crate::sql::SelectColumn::new(Expr::int_lit(0), Some("depth")));
                    s
                })
                .collect::<Vec<_>>();
            let base_union = render_set_op("UNION", &base_sql);
            let step = builders::list_objects_recursive_ttu_step(&analysis.object_type, linking_relation);
            format!(
                "WITH RECURSIVE accessible(object_id, depth) AS (\n{base_union}\n  UNION\n{step_sql}\n)\nSELECT DISTINCT object_id FROM accessible",
                step_sql = step.sql(),
            )
        }
        Strategy::Intersection { .. } => {
            let mut group_sqls = Vec::new();
            for group in &analysis.intersection_groups {
                let mut part_sqls = Vec::new();
                for part in &group.parts {
                    if part.direct {
                        part_sqls.push(
                            apply_exclusions(
                                builders::list_objects_direct(&analysis.object_type, &analysis.satisfying_relations, true),
                                analysis,
                            )
                            .sql(),
                        );
                    } else if let Some(relation) = &part.relation {
                        let fn_name = FunctionDef::list_objects_name(&analysis.object_type, relation);
                        part_sqls.push(builders::list_objects_intersection_closure(&analysis.object_type, &fn_name, part.is_complex).sql());
                    } else if let Some(pr) = &part.parent_relation {
                        let linking = part.parent_linking_relation.as_deref().unwrap_or_default();
                        match analysis.parent_relations.iter().find(|p| p.relation == *pr && p.linking_relation == linking) {
                            Some(info) => part_sqls.push(builders::list_objects_cross_type_ttu(&analysis.object_type, &info.linking_relation, info).sql()),
                            None => part_sqls.push("SELECT t.object_id FROM melange_tuples t WHERE FALSE".to_string()),
                        }
                    }
                }
                group_sqls.push(format!("(\n{}\n)", part_sqls.join("\n  INTERSECT\n")));
            }
            let mut sql = group_sqls.join("\n  UNION\n");
            if analysis.features.recursive {
                if let Some(parent) = analysis.parent_relations.first() {
                    let tail = builders::list_objects_recursive_ttu_step(&analysis.object_type, &parent.linking_relation);
                    sql = format!("{sql}\n  UNION\n{}", tail.sql());
                }
            }
            sql
        }
        Strategy::SelfReferentialUserset { .. } => {
            let base = direct_object_blocks(analysis, true);
            let base_sql = base
                .into_iter()
                .map(|mut s| {
                    s.columns.push(crate::sql::SelectColumn::new(Expr::int_lit(0), Some("depth")));
                    s
                })
                .collect::<Vec<_>>();
            let base_union = render_set_op("UNION", &base_sql);
            format!(
                "WITH RECURSIVE member_expansion(object_id, depth) AS (\n{base_union}\n  UNION\n  SELECT t.object_id, m.depth + 1\n  FROM melange_tuples t\n  JOIN member_expansion m ON t.subject_id = {object_id_match}\n  WHERE t.object_type = '{object_type}' AND t.relation = '{relation}' AND m.depth < {max_depth}\n)\nSELECT DISTINCT object_id FROM member_expansion",
                object_id_match = Expr::NormalizedUsersetSubject {
                    subject_id: Box::new(Expr::col("m", "object_id")),
                    relation: Box::new(Expr::str_lit(analysis.relation.clone())),
                }
                .sql(),
                object_type = analysis.object_type,
                relation = analysis.relation,
                max_depth = MAX_USERSET_DEPTH,
            )
        }
        Strategy::DepthExceeded { .. } => String::new(),
    }
}

fn pagination_wrapper_objects(fn_name: &str, candidates_sql: &str) -> String {
    format!(
        "CREATE OR REPLACE FUNCTION {fn_name}(p_subject_type text, p_subject_id text, p_limit int DEFAULT NULL, p_after text DEFAULT NULL, p_visited_path text[] DEFAULT '{{}}'::text[])\nRETURNS TABLE(object_id text, next_cursor text)\nLANGUAGE plpgsql STABLE AS $$\nBEGIN\n  RETURN QUERY\n  WITH candidates AS (\n{candidates_sql}\n  ),\n  page AS (\n    SELECT c.object_id FROM candidates c\n    WHERE p_after IS NULL OR c.object_id > p_after\n    ORDER BY c.object_id\n    LIMIT CASE WHEN p_limit IS NULL THEN NULL ELSE p_limit + 1 END\n  )\n  SELECT p.object_id,\n    CASE WHEN p_limit IS NOT NULL AND (SELECT count(*) FROM page) > p_limit\n      THEN (SELECT object_id FROM page ORDER BY object_id OFFSET p_limit - 1 LIMIT 1)\n      ELSE NULL END AS next_cursor\n  FROM page p\n  ORDER BY p.object_id\n  LIMIT CASE WHEN p_limit IS NULL THEN NULL ELSE p_limit END;\nEND;\n$$;"
    )
}

fn depth_exceeded_body(fn_name: &str, params: &str, returns: &str) -> String {
    format!(
        "CREATE OR REPLACE FUNCTION {fn_name}({params})\nRETURNS {returns}\nLANGUAGE plpgsql STABLE AS $$\nBEGIN\n  RAISE EXCEPTION 'resolution too complex' USING ERRCODE = 'M2002';\nEND;\n$$;"
    )
}

/// Fixed stub body for a relation the analyzer declared uncompilable
/// (spec.md §4.4, §7 `UnsupportedFeature` — non-fatal: every other
/// relation still compiles, this one just can never return a real answer).
fn unsupported_stub_body(fn_name: &str, params: &str, returns: &str, reason: &str) -> String {
    let escaped = reason.replace('\'', "''");
    format!(
        "CREATE OR REPLACE FUNCTION {fn_name}({params})\nRETURNS {returns}\nLANGUAGE plpgsql STABLE AS $$\nBEGIN\n  RAISE EXCEPTION 'feature unsupported: {escaped}';\nEND;\n$$;"
    )
}

/// Builds the `list_<type>_<relation>_objects` function (spec.md §3.5).
pub fn build_list_objects_function(analysis: &RelationAnalysis) -> FunctionDef {
    let fn_name = FunctionDef::list_objects_name(&analysis.object_type, &analysis.relation);

    let sql = if !analysis.capabilities.list_allowed {
        unsupported_stub_body(
            &fn_name,
            "p_subject_type text, p_subject_id text, p_limit int DEFAULT NULL, p_after text DEFAULT NULL, p_visited_path text[] DEFAULT '{}'::text[]",
            "TABLE(object_id text, next_cursor text)",
            analysis.capabilities.list_reason.as_deref().unwrap_or("unsupported"),
        )
    } else if matches!(analysis.list_strategy, Strategy::DepthExceeded { .. }) {
        depth_exceeded_body(
            &fn_name,
            "p_subject_type text, p_subject_id text, p_limit int DEFAULT NULL, p_after text DEFAULT NULL, p_visited_path text[] DEFAULT '{}'::text[]",
            "TABLE(object_id text, next_cursor text)",
        )
    } else {
        pagination_wrapper_objects(&fn_name, &list_objects_body_sql(analysis))
    };

    FunctionDef {
        name: fn_name,
        kind: FunctionKind::ListObjects,
        object_type: Some(analysis.object_type.clone()),
        relation: Some(analysis.relation.clone()),
        sql,
    }
}

fn direct_subject_blocks(analysis: &RelationAnalysis) -> Vec<SelectStmt> {
    let mut blocks = Vec::new();

    if analysis.features.direct || analysis.features.implied {
        blocks.push(apply_exclusions(
            builders::list_subjects_direct(&analysis.object_type, &analysis.satisfying_relations),
            analysis,
        ));
    }

    for pattern in analysis.userset_patterns.iter().chain(analysis.closure_userset_patterns.iter()) {
        let tuple_relation = pattern.source_relation.clone().unwrap_or_else(|| analysis.relation.clone());
        if pattern.is_complex {
            blocks.push(apply_exclusions(
                builders::list_subjects_complex_closure(&analysis.object_type, &tuple_relation, pattern),
                analysis,
            ));
        } else {
            blocks.push(apply_exclusions(
                builders::list_subjects_userset_subject(&analysis.object_type, &[tuple_relation]),
                analysis,
            ));
        }
    }

    for parent in &analysis.parent_relations {
        if parent.has_cross_type_links {
            let fn_name = FunctionDef::list_subjects_name(&parent.relation, &analysis.relation);
            blocks.push(builders::list_subjects_cross_type_ttu(&analysis.object_type, &parent.linking_relation, parent, &fn_name));
        }
    }

    if blocks.is_empty() {
        blocks.push(builders::list_subjects_direct(&analysis.object_type, &analysis.satisfying_relations));
    }

    blocks
}

fn pagination_wrapper_subjects(fn_name: &str, candidates_sql: &str) -> String {
    format!(
        "CREATE OR REPLACE FUNCTION {fn_name}(p_object_id text, p_subject_type text, p_limit int DEFAULT NULL, p_after text DEFAULT NULL, p_visited_path text[] DEFAULT '{{}}'::text[])\nRETURNS TABLE(subject_id text, next_cursor text)\nLANGUAGE plpgsql STABLE AS $$\nBEGIN\n  RETURN QUERY\n  WITH candidates AS (\n{candidates_sql}\n  ),\n  tagged AS (\n    SELECT c.subject_id, (c.subject_id = '*') AS is_wildcard FROM candidates c\n  ),\n  page AS (\n    SELECT subject_id, is_wildcard FROM tagged\n    WHERE p_after IS NULL OR subject_id > p_after\n    ORDER BY is_wildcard DESC, subject_id ASC\n    LIMIT CASE WHEN p_limit IS NULL THEN NULL ELSE p_limit + 1 END\n  )\n  SELECT p.subject_id,\n    CASE WHEN p_limit IS NOT NULL AND (SELECT count(*) FROM page) > p_limit\n      THEN (SELECT subject_id FROM page ORDER BY is_wildcard DESC, subject_id ASC OFFSET p_limit - 1 LIMIT 1)\n      ELSE NULL END AS next_cursor\n  FROM page p\n  ORDER BY p.is_wildcard DESC, p.subject_id ASC\n  LIMIT CASE WHEN p_limit IS NULL THEN NULL ELSE p_limit END;\nEND;\n$$;"
    )
}

/// Builds the `list_<type>_<relation>_subjects` function (spec.md §3.5).
pub fn build_list_subjects_function(analysis: &RelationAnalysis) -> FunctionDef {
    let fn_name = FunctionDef::list_subjects_name(&analysis.object_type, &analysis.relation);

    let sql = if !analysis.capabilities.list_allowed {
        unsupported_stub_body(
            &fn_name,
            "p_object_id text, p_subject_type text, p_limit int DEFAULT NULL, p_after text DEFAULT NULL, p_visited_path text[] DEFAULT '{}'::text[]",
            "TABLE(subject_id text, next_cursor text)",
            analysis.capabilities.list_reason.as_deref().unwrap_or("unsupported"),
        )
    } else if matches!(analysis.list_strategy, Strategy::DepthExceeded { .. }) {
        depth_exceeded_body(
            &fn_name,
            "p_object_id text, p_subject_type text, p_limit int DEFAULT NULL, p_after text DEFAULT NULL, p_visited_path text[] DEFAULT '{}'::text[]",
            "TABLE(subject_id text, next_cursor text)",
        )
    } else {
        let blocks = direct_subject_blocks(analysis);
        let candidates_sql = render_set_op("UNION", &blocks);
        pagination_wrapper_subjects(&fn_name, &candidates_sql)
    };

    FunctionDef {
        name: fn_name,
        kind: FunctionKind::ListSubjects,
        object_type: Some(analysis.object_type.clone()),
        relation: Some(analysis.relation.clone()),
        sql,
    }
}

/// Builds a boolean OR-of-EXISTS check expression for a relation, composed
/// from the same pattern library used by the list builders (spec.md §4.7).
/// Non-direct strategies delegate to their own already-compiled list
/// function rather than re-deriving the CTE inline.
fn check_expr(analysis: &RelationAnalysis, no_wildcard: bool) -> Expr {
    match &analysis.list_strategy {
        Strategy::Direct | Strategy::ComposedIndirect { .. } => {
            let mut blocks = direct_object_blocks(analysis, !no_wildcard);
            for block in &mut blocks {
                builders::require_object_id(block);
            }
            let exists: Vec<Expr> = blocks.into_iter().map(|s| Expr::Exists(Box::new(s))).collect();
            Expr::Or(exists)
        }
        Strategy::Recursive { .. } | Strategy::SelfReferentialUserset { .. } | Strategy::Intersection { .. } => {
            let list_fn = FunctionDef::list_objects_name(&analysis.object_type, &analysis.relation);
            Expr::Exists(Box::new(SelectStmt {
                distinct: false,
                columns: vec![crate::sql::SelectColumn::new(Expr::int_lit(1), None)],
                from: crate::sql::FromClause::Table {
                    name: format!("{list_fn}(p_subject_type, p_subject_id, NULL, NULL)"),
                    alias: Some("r".to_string()),
                },
                joins: Vec::new(),
                where_clause: Some(Expr::col("r", "object_id").eq(Expr::param(P_OBJECT_ID))),
                order_by: Vec::new(),
                limit: None,
            }))
        }
        Strategy::DepthExceeded { .. } => Expr::Raw("FALSE".to_string()),
    }
}

/// Builds `check_<type>_<relation>` and, when `no_wildcard` is requested,
/// `check_<type>_<relation>_no_wildcard` — used internally to resolve
/// wildcard-vs-explicit-denial ambiguity inside list queries (spec.md §4.7).
pub fn build_check_function(analysis: &RelationAnalysis, no_wildcard: bool) -> FunctionDef {
    let base_name = FunctionDef::check_name(&analysis.object_type, &analysis.relation);
    let fn_name = if no_wildcard { format!("{base_name}_no_wildcard") } else { base_name };

    let sql = if !analysis.capabilities.check_allowed {
        unsupported_stub_body(
            &fn_name,
            "p_subject_type text, p_subject_id text, p_object_id text, p_visited_path text[] DEFAULT '{}'::text[]",
            "int",
            analysis.capabilities.check_reason.as_deref().unwrap_or("unsupported"),
        )
    } else if matches!(analysis.list_strategy, Strategy::DepthExceeded { .. }) {
        depth_exceeded_body(
            &fn_name,
            "p_subject_type text, p_subject_id text, p_object_id text, p_visited_path text[] DEFAULT '{}'::text[]",
            "int",
        )
    } else {
        let expr = check_expr(analysis, no_wildcard);
        format!(
            "CREATE OR REPLACE FUNCTION {fn_name}(p_subject_type text, p_subject_id text, p_object_id text, p_visited_path text[] DEFAULT '{{}}'::text[])\nRETURNS int\nLANGUAGE plpgsql STABLE AS $$\nBEGIN\n  IF {cond} THEN\n    RETURN 1;\n  END IF;\n  RETURN 0;\nEND;\n$$;",
            cond = expr.sql(),
        )
    };

    FunctionDef {
        name: fn_name,
        kind: FunctionKind::Check,
        object_type: Some(analysis.object_type.clone()),
        relation: Some(analysis.relation.clone()),
        sql,
    }
}

fn dispatch_route(object_type: &str, relation: &str, target_fn: &str, call_args: &str) -> String {
    format!(
        "  IF p_object_type = '{object_type}' AND p_relation = '{relation}' THEN\n    RETURN QUERY SELECT * FROM {target_fn}({call_args});\n    RETURN;\n  END IF;"
    )
}

/// Builds the low-level `check_permission_internal` (spec.md §5): the
/// visited-path-carrying permission check every `check_<type>_<relation>`
/// body calls to validate a userset/TTU candidate without re-entering a
/// node already on the current resolution path. Distinct from the public
/// `check_permission` dispatcher — external callers never see a path
/// argument, only the relations being checked do, by threading their own
/// `p_visited_path` parameter through.
pub fn build_check_permission_internal(analyses: &[RelationAnalysis]) -> FunctionDef {
    let routes: Vec<String> = analyses
        .iter()
        .filter(|a| a.capabilities.check_allowed)
        .map(|a| {
            let fn_name = FunctionDef::check_name(&a.object_type, &a.relation);
            format!(
                "  IF p_object_type = '{object_type}' AND p_relation = '{relation}' THEN\n    RETURN {fn_name}(p_subject_type, p_subject_id, p_object_id, v_path);\n  END IF;",
                object_type = a.object_type,
                relation = a.relation,
            )
        })
        .collect();

    let sql = format!(
        "CREATE OR REPLACE FUNCTION check_permission_internal(p_subject_type text, p_subject_id text, p_relation text, p_object_type text, p_object_id text, p_visited_path text[] DEFAULT '{{}}'::text[])\nRETURNS int\nLANGUAGE plpgsql STABLE AS $$\nDECLARE\n  v_key text := p_object_type || ':' || p_object_id || '#' || p_relation;\n  v_path text[];\nBEGIN\n  IF v_key = ANY(p_visited_path) THEN\n    RETURN 0;\n  END IF;\n  v_path := p_visited_path || v_key;\n{}\n  RETURN 0;\nEND;\n$$;",
        routes.join("\n"),
    );

    FunctionDef {
        name: "check_permission_internal".to_string(),
        kind: FunctionKind::CheckDispatcher,
        object_type: None,
        relation: None,
        sql,
    }
}

/// Builds `check_permission`, `check_permission_no_wildcard`,
/// `list_accessible_objects`, `list_accessible_subjects` (spec.md §3.5,
/// §5, §6.3): straightforward routing by `(object_type, relation)`,
/// returning empty/denied for unknown pairs.
pub fn build_dispatchers(analyses: &[RelationAnalysis]) -> Vec<FunctionDef> {
    let mut routes_check = Vec::new();
    let mut routes_check_no_wildcard = Vec::new();
    let mut routes_objects = Vec::new();
    let mut routes_subjects = Vec::new();

    for analysis in analyses {
        if analysis.capabilities.check_allowed {
            let fn_name = FunctionDef::check_name(&analysis.object_type, &analysis.relation);
            routes_check.push(format!(
                "  IF p_subject_type IS NOT NULL AND p_object_type = '{object_type}' AND p_relation = '{relation}' THEN\n    RETURN {fn_name}(p_subject_type, p_subject_id, p_object_id);\n  END IF;",
                object_type = analysis.object_type,
                relation = analysis.relation,
            ));
            routes_check_no_wildcard.push(format!(
                "  IF p_subject_type IS NOT NULL AND p_object_type = '{object_type}' AND p_relation = '{relation}' THEN\n    RETURN {fn_name}_no_wildcard(p_subject_type, p_subject_id, p_object_id);\n  END IF;",
                object_type = analysis.object_type,
                relation = analysis.relation,
            ));
        }
        if analysis.capabilities.list_allowed {
            let lo = FunctionDef::list_objects_name(&analysis.object_type, &analysis.relation);
            let ls = FunctionDef::list_subjects_name(&analysis.object_type, &analysis.relation);
            routes_objects.push(dispatch_route(&analysis.object_type, &analysis.relation, &lo, "p_subject_type, p_subject_id, p_limit, p_after"));
            routes_subjects.push(dispatch_route(&analysis.object_type, &analysis.relation, &ls, "p_object_id, p_subject_type, p_limit, p_after"));
        }
    }

    let check_sql = format!(
        "CREATE OR REPLACE FUNCTION check_permission(p_subject_type text, p_subject_id text, p_relation text, p_object_type text, p_object_id text)\nRETURNS int\nLANGUAGE plpgsql STABLE AS $$\nBEGIN\n{}\n  RETURN 0;\nEND;\n$$;",
        routes_check.join("\n")
    );

    let check_no_wildcard_sql = format!(
        "CREATE OR REPLACE FUNCTION check_permission_no_wildcard(p_subject_type text, p_subject_id text, p_relation text, p_object_type text, p_object_id text)\nRETURNS int\nLANGUAGE plpgsql STABLE AS $$\nBEGIN\n{}\n  RETURN 0;\nEND;\n$$;",
        routes_check_no_wildcard.join("\n")
    );

    let objects_sql = format!(
        "CREATE OR REPLACE FUNCTION list_accessible_objects(p_subject_type text, p_subject_id text, p_relation text, p_object_type text, p_limit int DEFAULT NULL, p_after text DEFAULT NULL)\nRETURNS TABLE(object_id text, next_cursor text)\nLANGUAGE plpgsql STABLE AS $$\nBEGIN\n{}\n  RETURN;\nEND;\n$$;",
        routes_objects.join("\n")
    );

    let subjects_sql = format!(
        "CREATE OR REPLACE FUNCTION list_accessible_subjects(p_object_type text, p_object_id text, p_relation text, p_subject_type text, p_limit int DEFAULT NULL, p_after text DEFAULT NULL)\nRETURNS TABLE(subject_id text, next_cursor text)\nLANGUAGE plpgsql STABLE AS $$\nBEGIN\n{}\n  RETURN;\nEND;\n$$;",
        routes_subjects.join("\n")
    );

    vec![
        FunctionDef {
            name: "check_permission".to_string(),
            kind: FunctionKind::CheckDispatcher,
            object_type: None,
            relation: None,
            sql: check_sql,
        },
        FunctionDef {
            name: "check_permission_no_wildcard".to_string(),
            kind: FunctionKind::CheckDispatcher,
            object_type: None,
            relation: None,
            sql: check_no_wildcard_sql,
        },
        FunctionDef {
            name: "list_accessible_objects".to_string(),
            kind: FunctionKind::ListObjectsDispatcher,
            object_type: None,
            relation: None,
            sql: objects_sql,
        },
        FunctionDef {
            name: "list_accessible_subjects".to_string(),
            kind: FunctionKind::ListSubjectsDispatcher,
            object_type: None,
            relation: None,
            sql: subjects_sql,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use melange_model::analysis::{Capabilities, ExclusionConfig, Features};

    fn direct_analysis() -> RelationAnalysis {
        RelationAnalysis {
            object_type: "doc".into(),
            relation: "viewer".into(),
            features: Features {
                direct: true,
                ..Default::default()
            },
            satisfying_relations: vec!["viewer".into()],
            direct_subject_types: vec!["user".into()],
            allowed_subject_types: vec!["user".into()],
            userset_patterns: vec![],
            closure_userset_patterns: vec![],
            parent_relations: vec![],
            intersection_groups: vec![],
            exclusions: ExclusionConfig::default(),
            list_strategy: Strategy::Direct,
            capabilities: Capabilities::fully_supported(),
            max_userset_depth: 0,
        }
    }

    #[test]
    fn direct_check_function_embeds_relation_name() {
        let f = build_check_function(&direct_analysis(), false);
        assert_eq!(f.name, "check_doc_viewer");
        assert!(f.sql.contains("t.relation IN ('viewer')"));
    }

    #[test]
    fn list_objects_function_has_pagination_shell() {
        let f = build_list_objects_function(&direct_analysis());
        assert!(f.sql.contains("next_cursor"));
        assert!(f.sql.contains("list_doc_viewer_objects"));
    }

    #[test]
    fn dispatcher_routes_every_allowed_relation() {
        let analyses = vec![direct_analysis()];
        let dispatchers = build_dispatchers(&analyses);
        assert_eq!(dispatchers.len(), 4);
        assert!(dispatchers[0].sql.contains("check_doc_viewer"));
        let no_wildcard = dispatchers.iter().find(|f| f.name == "check_permission_no_wildcard").unwrap();
        assert!(no_wildcard.sql.contains("check_doc_viewer_no_wildcard"));
    }

    #[test]
    fn check_permission_internal_routes_by_object_type_and_relation_and_guards_cycles() {
        let analyses = vec![direct_analysis()];
        let f = build_check_permission_internal(&analyses);
        assert_eq!(f.name, "check_permission_internal");
        assert!(f.sql.contains("check_doc_viewer(p_subject_type, p_subject_id, p_object_id, v_path)"));
        assert!(f.sql.contains("v_key = ANY(p_visited_path)"));
    }

    #[test]
    fn depth_exceeded_emits_raise_exception_only() {
        let mut analysis = direct_analysis();
        analysis.list_strategy = Strategy::DepthExceeded { max_userset_depth: 26 };
        let f = build_list_objects_function(&analysis);
        assert!(f.sql.contains("RAISE EXCEPTION 'resolution too complex' USING ERRCODE = 'M2002'"));
    }

    #[test]
    fn unsupported_capability_emits_stub_instead_of_a_real_query() {
        let mut analysis = direct_analysis();
        analysis.capabilities = Capabilities::unsupported("relation has no satisfying path defined");
        let check = build_check_function(&analysis, false);
        assert!(check.sql.contains("feature unsupported: relation has no satisfying path defined"));
        let list = build_list_objects_function(&analysis);
        assert!(list.sql.contains("feature unsupported"));
    }
}
