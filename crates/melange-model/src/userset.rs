//! Derived IR — userset rules (spec.md §3.3).

use serde::{Deserialize, Serialize};

/// A tuple `(subject_type#subject_relation, tuple_relation, object_type:*)`
/// can satisfy `(object_type, relation)` iff a matching rule exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsersetRule {
    pub object_type: String,
    pub relation: String,
    pub tuple_relation: String,
    pub subject_type: String,
    pub subject_relation: String,
}

impl UsersetRule {
    /// A hashed composite key used to dedupe rules produced from crossing
    /// closure rows with userset subject-type references (spec.md §4.3).
    pub fn dedup_key(&self) -> (String, String, String, String, String) {
        (
            self.object_type.clone(),
            self.relation.clone(),
            self.tuple_relation.clone(),
            self.subject_type.clone(),
            self.subject_relation.clone(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsersetRules {
    pub rules: Vec<UsersetRule>,
}

impl UsersetRules {
    pub fn for_relation(&self, object_type: &str, relation: &str) -> Vec<&UsersetRule> {
        self.rules
            .iter()
            .filter(|r| r.object_type == object_type && r.relation == relation)
            .collect()
    }
}
