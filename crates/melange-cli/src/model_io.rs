//! Reads a [`melange_model::Model`] off disk (SPEC_FULL.md §1): a direct
//! `serde` deserialization of the IR itself, not a surface-DSL parser.
//! Dispatches on file extension so both hand-written fixtures (`.json`)
//! and more readable ones (`.yaml`/`.yml`) work.

use std::path::Path;

use anyhow::{bail, Context};
use melange_model::Model;

pub fn read_model(path: &Path) -> anyhow::Result<Model> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read model file {}", path.display()))?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => {
            serde_json::from_str(&content).with_context(|| format!("invalid JSON model in {}", path.display()))
        }
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&content).with_context(|| format!("invalid YAML model in {}", path.display()))
        }
        other => bail!(
            "unrecognized model file extension {:?} for {} (expected .json, .yaml, or .yml)",
            other,
            path.display()
        ),
    }
}
