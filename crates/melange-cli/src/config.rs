//! Flat TOML configuration for the `melange` binary (SPEC_FULL.md §6.4).
//!
//! Unlike `coreauth-proxy`'s `ProxyConfig` — a nested YAML document with a
//! route table — a compiler has no routing rules to express, so this stays
//! a single flat struct loaded through the `config` crate rather than ad
//! hoc `serde_yaml::from_str`: a file source with every field optional,
//! layered under `MELANGE_`-prefixed environment overrides.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct MelangeConfig {
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_codegen_version")]
    pub codegen_version: String,
    #[serde(default)]
    pub relation_filter_prefix: Option<String>,
}

fn default_codegen_version() -> String {
    "1".to_string()
}

impl MelangeConfig {
    /// Loads `path` (if it exists) as TOML, then layers `MELANGE_*`
    /// environment variables on top (`MELANGE_DATABASE_URL`, etc.).
    /// A missing config file is not an error — every field has a usable
    /// default or is supplied on the command line instead.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if path.exists() {
            builder = builder.add_source(config::File::from(path.to_path_buf()));
        }
        builder = builder.add_source(config::Environment::with_prefix("MELANGE").separator("_"));

        let settings = builder.build()?;
        let config = settings.try_deserialize::<MelangeConfig>()?;
        Ok(config)
    }
}
