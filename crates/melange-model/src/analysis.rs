//! Derived IR — `RelationAnalysis` (spec.md §3.4, §4.4).
//!
//! This is the richest piece of the IR: for every `(object_type, relation)`
//! pair the feature analyzer (melange-compiler::analyzer) populates one of
//! these, and the function builders (melange-compiler::functions) consume
//! it directly rather than re-deriving feature flags from the raw `Model`.

use serde::{Deserialize, Serialize};

/// Boolean feature flags over a relation. Kept as named fields rather than
/// a bitset: the analyzer and emitter both want to match on individual
/// flags by name, and there are few enough of them that a bitset buys
/// nothing but obscurity (spec.md §9 warns against "boolean soup" for the
/// *strategy* choice specifically — these flags feed that choice, they are
/// not a substitute for it).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    pub direct: bool,
    pub wildcard: bool,
    pub implied: bool,
    pub userset: bool,
    pub exclusion: bool,
    pub parent_ttu: bool,
    pub intersection: bool,
    pub recursive: bool,
}

/// One userset pattern: subjects expressed as `subject_type#subject_relation`
/// that can satisfy this relation, either directly (`userset_patterns`) or
/// transitively via closure (`closure_userset_patterns`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsersetPattern {
    pub subject_type: String,
    pub subject_relation: String,
    pub satisfying_relations: Vec<String>,
    pub has_wildcard: bool,
    /// True when `subject_relation` itself requires further permission
    /// checks to resolve (calls `check_permission_internal`) rather than a
    /// direct-tuple join.
    pub is_complex: bool,
    /// The relation on `object_type` this pattern was contributed through,
    /// when reached via closure rather than being defined directly.
    pub source_relation: Option<String>,
}

/// One parent (tuple-to-userset) relation: `relation from linking_relation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRelationInfo {
    pub relation: String,
    pub linking_relation: String,
    pub allowed_linking_types: Vec<String>,
    pub has_cross_type_links: bool,
    pub cross_type_linking_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedParentInfo {
    pub relation: String,
    pub linking_relation: String,
    pub parent_type: String,
}

/// The taxonomy of emission strategies (spec.md §4.4, §9 — "each variant
/// carries the substructure the emitter needs; do not encode as boolean
/// soup").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    Direct,
    Recursive {
        /// The linking relation the recursive step joins through.
        linking_relation: String,
    },
    Intersection {
        group_count: usize,
        has_recursive_tail: bool,
    },
    ComposedIndirect {
        /// Name of the single TTU relation or userset ref this relation is
        /// reached through.
        anchor_relation: String,
    },
    SelfReferentialUserset {
        subject_relation: String,
    },
    DepthExceeded {
        max_userset_depth: usize,
    },
}

impl Strategy {
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::Recursive { .. } => "recursive",
            Strategy::Intersection { .. } => "intersection",
            Strategy::ComposedIndirect { .. } => "composed-indirect",
            Strategy::SelfReferentialUserset { .. } => "self-referential-userset",
            Strategy::DepthExceeded { .. } => "depth-exceeded",
        }
    }
}

/// Whether the compiler can emit a working Check / ListObjects-ListSubjects
/// function for this relation at all (spec.md §4.4, §7 `UnsupportedFeature`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub check_allowed: bool,
    pub check_reason: Option<String>,
    pub list_allowed: bool,
    pub list_reason: Option<String>,
}

impl Capabilities {
    pub fn fully_supported() -> Self {
        Self {
            check_allowed: true,
            check_reason: None,
            list_allowed: true,
            list_reason: None,
        }
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            check_allowed: false,
            check_reason: Some(reason.clone()),
            list_allowed: false,
            list_reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionConfig {
    pub excluded_relations: Vec<String>,
    pub excluded_complex_relations: Vec<String>,
    pub excluded_parents: Vec<ExcludedParentInfo>,
}

impl ExclusionConfig {
    pub fn is_empty(&self) -> bool {
        self.excluded_relations.is_empty()
            && self.excluded_complex_relations.is_empty()
            && self.excluded_parents.is_empty()
    }
}

impl Default for ExclusionConfig {
    fn default() -> Self {
        Self {
            excluded_relations: Vec::new(),
            excluded_complex_relations: Vec::new(),
            excluded_parents: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntersectionPartAnalysis {
    pub direct: bool,
    pub relation: Option<String>,
    /// The TTU relation name (`relation` in `relation from parent_type`),
    /// set only for the `TupleToUserset` part variant.
    pub parent_relation: Option<String>,
    /// The linking relation (`parent_type` in `relation from parent_type`),
    /// paired with `parent_relation` to look up the matching entry in
    /// [`super::RelationAnalysis::parent_relations`].
    pub parent_linking_relation: Option<String>,
    /// Set for `A and (B but not C)` — the per-part exclusion attached to a
    /// single intersection member rather than the relation as a whole.
    pub excluded_relation: Option<String>,
    pub is_complex: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntersectionGroupAnalysis {
    pub parts: Vec<IntersectionPartAnalysis>,
}

/// The full per-(object_type, relation) analysis record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationAnalysis {
    pub object_type: String,
    pub relation: String,
    pub features: Features,
    pub satisfying_relations: Vec<String>,
    pub direct_subject_types: Vec<String>,
    pub allowed_subject_types: Vec<String>,
    pub userset_patterns: Vec<UsersetPattern>,
    pub closure_userset_patterns: Vec<UsersetPattern>,
    pub parent_relations: Vec<ParentRelationInfo>,
    pub intersection_groups: Vec<IntersectionGroupAnalysis>,
    pub exclusions: ExclusionConfig,
    pub list_strategy: Strategy,
    pub capabilities: Capabilities,
    pub max_userset_depth: usize,
}

/// The inventory produced across an entire `Model`: one analysis per
/// `(object_type, relation)` pair, in input-traversal order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisInventory {
    pub analyses: Vec<RelationAnalysis>,
}

impl AnalysisInventory {
    pub fn get(&self, object_type: &str, relation: &str) -> Option<&RelationAnalysis> {
        self.analyses
            .iter()
            .find(|a| a.object_type == object_type && a.relation == relation)
    }

    pub fn unsupported(&self) -> impl Iterator<Item = &RelationAnalysis> {
        self.analyses
            .iter()
            .filter(|a| !a.capabilities.check_allowed || !a.capabilities.list_allowed)
    }
}

/// Hard limit on recursive userset / TTU traversal depth (spec.md §4,
/// glossary "Depth bound"). Exceeding it at compile time selects
/// [`Strategy::DepthExceeded`]; exceeding it at runtime raises `SQLSTATE
/// M2002` from the emitted SQL.
pub const MAX_USERSET_DEPTH: usize = 25;
