//! Input IR — type definitions
//!
//! A [`Model`] is the opaque-upstream IR the core consumes: an ordered list
//! of object-type definitions. Nothing in this module parses the surface
//! DSL; it is assumed some upstream (out of scope here) already produced
//! this shape.

use serde::{Deserialize, Serialize};

/// An ordered list of type definitions. Order is preserved end to end: the
/// closure builder, analyzer, and emitter all walk `Model.types` in this
/// order, which is what makes `compile` deterministic (spec.md §8).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub types: Vec<TypeDefinition>,
}

impl Model {
    pub fn new(types: Vec<TypeDefinition>) -> Self {
        Self { types }
    }

    pub fn type_named(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn relation(&self, object_type: &str, relation: &str) -> Option<&RelationDefinition> {
        self.type_named(object_type)
            .and_then(|t| t.relations.iter().find(|r| r.name == relation))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub name: String,
    #[serde(default)]
    pub relations: Vec<RelationDefinition>,
}

/// A subject-type reference inside a relation's direct-assignment list.
///
/// `relation` empty (`None`) means a direct subject type (`[user]`); set
/// means a userset reference (`user#member` spelled `type#relation`).
/// `wildcard` admits the sentinel subject-id `*` (`user:*`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectTypeRef {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub relation: Option<String>,
    #[serde(default)]
    pub wildcard: bool,
}

impl SubjectTypeRef {
    pub fn direct(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            relation: None,
            wildcard: false,
        }
    }

    pub fn wildcard(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            relation: None,
            wildcard: true,
        }
    }

    pub fn userset(type_name: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            relation: Some(relation.into()),
            wildcard: false,
        }
    }

    pub fn is_userset(&self) -> bool {
        self.relation.is_some()
    }
}

/// One `IntersectionGroup` is an AND of `parts`; a relation's
/// `intersection_groups` as a whole is an OR of these groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectionGroup {
    pub parts: Vec<IntersectionPart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IntersectionPart {
    /// `this` — the relation's own direct/implied satisfiers.
    ThisRelation,
    /// A same-type relation reference, with an optional exclusion applied
    /// to just this part (`A and (B but not C)`).
    Relation {
        relation: String,
        excluded_relation: Option<String>,
    },
    /// A tuple-to-userset part (`A and (B from L)`).
    TupleToUserset {
        relation: String,
        parent_type: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationDefinition {
    pub name: String,

    #[serde(default)]
    pub subject_type_refs: Vec<SubjectTypeRef>,

    /// Names of other relations on the *same type* that, when held, also
    /// grant this one (`A or B` unions collapse to this list).
    #[serde(default)]
    pub implied_by: Vec<String>,

    /// Tuple-to-userset inheritance: `parent_relation from parent_type`.
    /// `parent_type` names the *linking relation* on this type, not an
    /// object-type name (spec.md §3.1 — the field is a misnomer carried
    /// from the surface DSL's `from <linkingRel>` syntax).
    #[serde(default)]
    pub parent_relation: Option<String>,
    #[serde(default)]
    pub parent_type: Option<String>,

    #[serde(default)]
    pub excluded_relations: Vec<String>,
    #[serde(default)]
    pub excluded_parent_relations: Vec<ExcludedParentRelation>,

    #[serde(default)]
    pub intersection_groups: Vec<IntersectionGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedParentRelation {
    pub relation: String,
    pub parent_type: String,
}

impl RelationDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_direct(mut self, refs: Vec<SubjectTypeRef>) -> Self {
        self.subject_type_refs = refs;
        self
    }

    pub fn with_implied_by(mut self, names: Vec<impl Into<String>>) -> Self {
        self.implied_by = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_ttu(mut self, relation: impl Into<String>, linking: impl Into<String>) -> Self {
        self.parent_relation = Some(relation.into());
        self.parent_type = Some(linking.into());
        self
    }

    pub fn with_exclusion(mut self, excluded: impl Into<String>) -> Self {
        self.excluded_relations.push(excluded.into());
        self
    }

    pub fn is_ttu(&self) -> bool {
        self.parent_relation.is_some()
    }

    pub fn has_direct(&self) -> bool {
        !self.subject_type_refs.is_empty()
    }

    pub fn has_wildcard(&self) -> bool {
        self.subject_type_refs.iter().any(|r| r.wildcard)
    }

    pub fn usersets(&self) -> impl Iterator<Item = &SubjectTypeRef> {
        self.subject_type_refs.iter().filter(|r| r.is_userset())
    }

    pub fn has_exclusion(&self) -> bool {
        !self.excluded_relations.is_empty() || !self.excluded_parent_relations.is_empty()
    }

    pub fn has_intersection(&self) -> bool {
        !self.intersection_groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_looks_up_relation_by_type_and_name() {
        let model = Model::new(vec![TypeDefinition {
            name: "doc".into(),
            relations: vec![RelationDefinition::new("viewer")
                .with_direct(vec![SubjectTypeRef::direct("user")])],
        }]);

        let rel = model.relation("doc", "viewer").unwrap();
        assert_eq!(rel.subject_type_refs.len(), 1);
        assert!(model.relation("doc", "missing").is_none());
        assert!(model.relation("missing", "viewer").is_none());
    }

    #[test]
    fn subject_type_ref_constructors_set_expected_flags() {
        let direct = SubjectTypeRef::direct("user");
        assert!(!direct.is_userset());
        assert!(!direct.wildcard);

        let wc = SubjectTypeRef::wildcard("user");
        assert!(wc.wildcard);

        let us = SubjectTypeRef::userset("group", "member");
        assert!(us.is_userset());
        assert_eq!(us.relation.as_deref(), Some("member"));
    }

    #[test]
    fn relation_definition_round_trips_through_json() {
        let rel = RelationDefinition::new("viewer")
            .with_direct(vec![SubjectTypeRef::direct("user")])
            .with_implied_by(vec!["editor"])
            .with_exclusion("banned");

        let json = serde_json::to_string(&rel).unwrap();
        let back: RelationDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(rel, back);
    }
}
