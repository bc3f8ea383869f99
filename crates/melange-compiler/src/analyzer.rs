//! Stage 4 — feature analyzer (spec.md §4.4).

use melange_model::analysis::{
    AnalysisInventory, Capabilities, ExcludedParentInfo, ExclusionConfig, Features,
    IntersectionGroupAnalysis, IntersectionPartAnalysis, ParentRelationInfo, RelationAnalysis,
    Strategy, UsersetPattern, MAX_USERSET_DEPTH,
};
use melange_model::{Closure, IntersectionPart, Model, RelationDefinition, UsersetRules};

use crate::validator::resolve_parent_type;

fn push_dedup(into: &mut Vec<String>, value: String) {
    if !into.contains(&value) {
        into.push(value);
    }
}

fn direct_non_userset_types(def: &RelationDefinition) -> Vec<String> {
    let mut out = Vec::new();
    for r in &def.subject_type_refs {
        if !r.is_userset() {
            push_dedup(&mut out, r.type_name.clone());
        }
    }
    out
}

fn has_standalone_direct(def: &RelationDefinition) -> bool {
    def.subject_type_refs.iter().any(|r| !r.is_userset())
}

/// A relation "requires further permission checks rather than a direct-tuple
/// join" — spec.md §3.4 — when its own definition is a TTU, an intersection,
/// or carries an exclusion. Plain direct/implied-by-only relations resolve
/// with a tuple existence check or a closure join.
fn relation_is_complex(model: &Model, object_type: &str, relation: &str) -> bool {
    model
        .relation(object_type, relation)
        .map(|d| d.is_ttu() || d.has_intersection() || d.has_exclusion())
        .unwrap_or(false)
}

/// Depth-first reachability, cut off at [`MAX_USERSET_DEPTH`], checking
/// whether following the TTU parent chain from `(object_type, relation)`
/// eventually returns to itself (spec.md §4.4 "Recursive").
fn is_recursive_ttu(model: &Model, object_type: &str, relation: &str) -> bool {
    let Some(def) = model.relation(object_type, relation) else {
        return false;
    };
    let (Some(parent_relation), Some(linking)) = (&def.parent_relation, &def.parent_type) else {
        return false;
    };
    let Some(mut current_type) = resolve_parent_type(model, object_type, linking) else {
        return false;
    };
    let mut current_relation = parent_relation.clone();
    let start = (object_type.to_string(), relation.to_string());

    for _ in 0..MAX_USERSET_DEPTH {
        if (current_type.clone(), current_relation.clone()) == start {
            return true;
        }
        let Some(cur_def) = model.relation(&current_type, &current_relation) else {
            return false;
        };
        let (Some(pr), Some(lk)) = (&cur_def.parent_relation, &cur_def.parent_type) else {
            return false;
        };
        let Some(next_type) = resolve_parent_type(model, &current_type, lk) else {
            return false;
        };
        current_relation = pr.clone();
        current_type = next_type;
    }
    false
}

/// Longest static chain of `userset_ref → userset's own relation has
/// userset_ref → …` starting from this relation's own direct userset refs
/// (spec.md §4.4). A chain that revisits a node is a cycle, reported as one
/// past the bound so the relation is unambiguously `depth-exceeded`.
fn userset_chain_depth(model: &Model, object_type: &str, relation: &str, stack: &mut Vec<(String, String)>) -> usize {
    let key = (object_type.to_string(), relation.to_string());
    if stack.contains(&key) {
        return MAX_USERSET_DEPTH + 1;
    }
    let Some(def) = model.relation(object_type, relation) else {
        return 0;
    };
    let refs: Vec<_> = def.usersets().collect();
    if refs.is_empty() {
        return 0;
    }

    stack.push(key);
    let mut max_depth = 0;
    for uref in refs {
        let Some(sub_relation) = uref.relation.as_deref() else {
            continue;
        };
        let depth = 1 + userset_chain_depth(model, &uref.type_name, sub_relation, stack);
        max_depth = max_depth.max(depth);
        if max_depth > MAX_USERSET_DEPTH {
            break;
        }
    }
    stack.pop();
    max_depth
}

fn build_userset_pattern(
    model: &Model,
    subject_type: &str,
    subject_relation: &str,
    closure: &Closure,
    has_wildcard: bool,
    source_relation: Option<String>,
) -> UsersetPattern {
    UsersetPattern {
        subject_type: subject_type.to_string(),
        subject_relation: subject_relation.to_string(),
        satisfying_relations: closure.satisfying_relations(subject_type, subject_relation),
        has_wildcard,
        is_complex: relation_is_complex(model, subject_type, subject_relation),
        source_relation,
    }
}

fn build_parent_relation_info(model: &Model, object_type: &str, parent_relation: &str, linking_relation: &str) -> ParentRelationInfo {
    let allowed_linking_types = model
        .relation(object_type, linking_relation)
        .map(direct_non_userset_types)
        .unwrap_or_default();
    let cross_type_linking_types: Vec<String> = allowed_linking_types
        .iter()
        .filter(|t| t.as_str() != object_type)
        .cloned()
        .collect();

    ParentRelationInfo {
        relation: parent_relation.to_string(),
        linking_relation: linking_relation.to_string(),
        has_cross_type_links: !cross_type_linking_types.is_empty(),
        cross_type_linking_types,
        allowed_linking_types,
    }
}

fn build_exclusions(model: &Model, object_type: &str, def: &RelationDefinition) -> ExclusionConfig {
    let mut excluded_relations = Vec::new();
    let mut excluded_complex_relations = Vec::new();

    for name in &def.excluded_relations {
        if relation_is_complex(model, object_type, name) {
            excluded_complex_relations.push(name.clone());
        } else {
            excluded_relations.push(name.clone());
        }
    }

    let excluded_parents = def
        .excluded_parent_relations
        .iter()
        .map(|epr| ExcludedParentInfo {
            relation: epr.relation.clone(),
            linking_relation: epr.parent_type.clone(),
            parent_type: resolve_parent_type(model, object_type, &epr.parent_type).unwrap_or_default(),
        })
        .collect();

    ExclusionConfig {
        excluded_relations,
        excluded_complex_relations,
        excluded_parents,
    }
}

fn build_intersection_groups(model: &Model, object_type: &str, def: &RelationDefinition) -> Vec<IntersectionGroupAnalysis> {
    def.intersection_groups
        .iter()
        .map(|group| IntersectionGroupAnalysis {
            parts: group
                .parts
                .iter()
                .map(|part| match part {
                    IntersectionPart::ThisRelation => IntersectionPartAnalysis {
                        direct: true,
                        relation: None,
                        parent_relation: None,
                        parent_linking_relation: None,
                        excluded_relation: None,
                        is_complex: false,
                    },
                    IntersectionPart::Relation {
                        relation,
                        excluded_relation,
                    } => IntersectionPartAnalysis {
                        direct: false,
                        relation: Some(relation.clone()),
                        parent_relation: None,
                        parent_linking_relation: None,
                        excluded_relation: excluded_relation.clone(),
                        is_complex: relation_is_complex(model, object_type, relation),
                    },
                    IntersectionPart::TupleToUserset {
                        relation,
                        parent_type,
                    } => IntersectionPartAnalysis {
                        direct: false,
                        relation: None,
                        parent_relation: Some(relation.clone()),
                        parent_linking_relation: Some(parent_type.clone()),
                        excluded_relation: None,
                        is_complex: true,
                    },
                })
                .collect(),
        })
        .collect()
}

/// Analyzes a single `(object_type, relation)` pair into its full
/// [`RelationAnalysis`] (spec.md §3.4, §4.4).
pub fn analyze_relation(
    model: &Model,
    closure: &Closure,
    _userset_rules: &UsersetRules,
    object_type: &str,
    relation: &str,
) -> RelationAnalysis {
    let def = model
        .relation(object_type, relation)
        .cloned()
        .unwrap_or_else(|| RelationDefinition::new(relation));

    let satisfying_relations = closure.satisfying_relations(object_type, relation);
    let direct_subject_types = direct_non_userset_types(&def);

    let userset_patterns: Vec<UsersetPattern> = def
        .usersets()
        .filter_map(|uref| {
            uref.relation.as_deref().map(|subject_relation| {
                build_userset_pattern(model, &uref.type_name, subject_relation, closure, uref.wildcard, None)
            })
        })
        .collect();

    let mut closure_userset_patterns = Vec::new();
    for satisfying in &satisfying_relations {
        if satisfying == relation {
            continue;
        }
        let Some(sat_def) = model.relation(object_type, satisfying) else {
            continue;
        };
        for uref in sat_def.usersets() {
            let Some(subject_relation) = uref.relation.as_deref() else {
                continue;
            };
            closure_userset_patterns.push(build_userset_pattern(
                model,
                &uref.type_name,
                subject_relation,
                closure,
                uref.wildcard,
                Some(satisfying.clone()),
            ));
        }
    }

    let mut allowed_subject_types = Vec::new();
    for satisfying in &satisfying_relations {
        if let Some(sat_def) = model.relation(object_type, satisfying) {
            for t in direct_non_userset_types(sat_def) {
                push_dedup(&mut allowed_subject_types, t);
            }
        }
    }
    for pattern in userset_patterns.iter().chain(closure_userset_patterns.iter()) {
        push_dedup(&mut allowed_subject_types, pattern.subject_type.clone());
    }

    let mut parent_relations = Vec::new();
    if let (Some(parent_relation), Some(linking)) = (&def.parent_relation, &def.parent_type) {
        parent_relations.push(build_parent_relation_info(model, object_type, parent_relation, linking));
    }
    for group in &def.intersection_groups {
        for part in &group.parts {
            if let IntersectionPart::TupleToUserset { relation: r, parent_type } = part {
                parent_relations.push(build_parent_relation_info(model, object_type, r, parent_type));
            }
        }
    }

    let exclusions = build_exclusions(model, object_type, &def);
    let intersection_groups = build_intersection_groups(model, object_type, &def);

    let recursive = is_recursive_ttu(model, object_type, relation);
    let max_userset_depth = userset_chain_depth(model, object_type, relation, &mut Vec::new());

    let features = Features {
        direct: !direct_subject_types.is_empty(),
        wildcard: def.subject_type_refs.iter().any(|r| r.wildcard),
        implied: satisfying_relations.iter().any(|r| r != relation),
        userset: !userset_patterns.is_empty() || !closure_userset_patterns.is_empty(),
        exclusion: !exclusions.is_empty(),
        parent_ttu: def.is_ttu(),
        intersection: def.has_intersection(),
        recursive,
    };

    let self_referential_userset = userset_patterns
        .iter()
        .any(|p| p.subject_type == object_type && p.subject_relation == relation);

    let anchor_count = (if def.is_ttu() { 1 } else { 0 }) + userset_patterns.len();

    let list_strategy = if max_userset_depth > MAX_USERSET_DEPTH {
        Strategy::DepthExceeded {
            max_userset_depth,
        }
    } else if features.intersection {
        Strategy::Intersection {
            group_count: intersection_groups.len(),
            has_recursive_tail: recursive,
        }
    } else if self_referential_userset {
        Strategy::SelfReferentialUserset {
            subject_relation: relation.to_string(),
        }
    } else if recursive {
        Strategy::Recursive {
            linking_relation: def.parent_type.clone().unwrap_or_default(),
        }
    } else if anchor_count == 1 && !has_standalone_direct(&def) && intersection_groups.is_empty() {
        let anchor_relation = if def.is_ttu() {
            def.parent_relation.clone().unwrap_or_default()
        } else {
            let p = &userset_patterns[0];
            format!("{}#{}", p.subject_type, p.subject_relation)
        };
        Strategy::ComposedIndirect { anchor_relation }
    } else {
        Strategy::Direct
    };

    let has_any_grant_path =
        def.has_direct() || !def.implied_by.is_empty() || def.is_ttu() || def.has_intersection();

    let capabilities = if has_any_grant_path {
        Capabilities::fully_supported()
    } else {
        Capabilities::unsupported("relation has no satisfying path defined")
    };

    RelationAnalysis {
        object_type: object_type.to_string(),
        relation: relation.to_string(),
        features,
        satisfying_relations,
        direct_subject_types,
        allowed_subject_types,
        userset_patterns,
        closure_userset_patterns,
        parent_relations,
        intersection_groups,
        exclusions,
        list_strategy,
        capabilities,
        max_userset_depth,
    }
}

/// Analyzes every `(object_type, relation)` pair in the model, in
/// declaration order.
pub fn analyze_model(model: &Model, closure: &Closure, userset_rules: &UsersetRules) -> AnalysisInventory {
    let mut analyses = Vec::new();
    for ty in &model.types {
        for rel in &ty.relations {
            analyses.push(analyze_relation(model, closure, userset_rules, &ty.name, &rel.name));
        }
    }
    AnalysisInventory { analyses }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::closure::build_closure;
    use crate::userset::build_userset_rules;
    use melange_model::{RelationDefinition, SubjectTypeRef, TypeDefinition};

    fn doc_user_model() -> Model {
        Model::new(vec![TypeDefinition {
            name: "doc".into(),
            relations: vec![RelationDefinition::new("viewer").with_direct(vec![SubjectTypeRef::direct("user")])],
        }])
    }

    #[test]
    fn direct_relation_selects_direct_strategy() {
        let model = doc_user_model();
        let closure = build_closure(&model);
        let rules = build_userset_rules(&model, &closure);
        let analysis = analyze_relation(&model, &closure, &rules, "doc", "viewer");
        assert!(analysis.features.direct);
        assert_eq!(analysis.list_strategy, Strategy::Direct);
        assert!(analysis.capabilities.check_allowed);
    }

    #[test]
    fn recursive_ttu_is_detected() {
        let model = Model::new(vec![TypeDefinition {
            name: "folder".into(),
            relations: vec![
                RelationDefinition::new("parent").with_direct(vec![SubjectTypeRef::direct("folder")]),
                RelationDefinition::new("viewer")
                    .with_direct(vec![SubjectTypeRef::direct("user")])
                    .with_ttu("viewer", "parent"),
            ],
        }]);
        let closure = build_closure(&model);
        let rules = build_userset_rules(&model, &closure);
        let analysis = analyze_relation(&model, &closure, &rules, "folder", "viewer");
        assert!(analysis.features.recursive);
        assert!(matches!(analysis.list_strategy, Strategy::Recursive { .. }));
    }

    #[test]
    fn composed_indirect_selected_for_single_ttu_anchor_without_direct() {
        let model = Model::new(vec![
            TypeDefinition {
                name: "org".into(),
                relations: vec![RelationDefinition::new("member").with_direct(vec![SubjectTypeRef::direct("user")])],
            },
            TypeDefinition {
                name: "repo".into(),
                relations: vec![
                    RelationDefinition::new("org").with_direct(vec![SubjectTypeRef::direct("org")]),
                    RelationDefinition::new("reader").with_ttu("member", "org"),
                ],
            },
        ]);
        let closure = build_closure(&model);
        let rules = build_userset_rules(&model, &closure);
        let analysis = analyze_relation(&model, &closure, &rules, "repo", "reader");
        assert!(matches!(analysis.list_strategy, Strategy::ComposedIndirect { .. }));
    }

    #[test]
    fn empty_relation_is_unsupported() {
        let model = Model::new(vec![TypeDefinition {
            name: "doc".into(),
            relations: vec![RelationDefinition::new("ghost")],
        }]);
        let closure = build_closure(&model);
        let rules = build_userset_rules(&model, &closure);
        let analysis = analyze_relation(&model, &closure, &rules, "doc", "ghost");
        assert!(!analysis.capabilities.check_allowed);
        assert!(!analysis.capabilities.list_allowed);
    }
}
