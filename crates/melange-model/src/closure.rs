//! Derived IR — transitive closure of the implied-by graph (spec.md §3.2).

use serde::{Deserialize, Serialize};

/// One row of the relation closure: `satisfying_relation` (possibly
/// transitively, via `via_path`) grants `relation` on `object_type`.
///
/// Every relation self-satisfies: for relation `R` on type `T` there is
/// always a row `(T, R, R, [R])`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureRow {
    pub object_type: String,
    pub relation: String,
    pub satisfying_relation: String,
    pub via_path: Vec<String>,
}

/// The closure for one compiled `Model`: all rows, queryable by
/// `(object_type, relation)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Closure {
    pub rows: Vec<ClosureRow>,
}

impl Closure {
    pub fn satisfiers(&self, object_type: &str, relation: &str) -> Vec<&ClosureRow> {
        self.rows
            .iter()
            .filter(|r| r.object_type == object_type && r.relation == relation)
            .collect()
    }

    pub fn satisfying_relations(&self, object_type: &str, relation: &str) -> Vec<String> {
        self.satisfiers(object_type, relation)
            .into_iter()
            .map(|r| r.satisfying_relation.clone())
            .collect()
    }
}
