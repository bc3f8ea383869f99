//! Fixed metadata table DDL (spec.md §6.2). The core never creates tables
//! itself — `melange-database::Installer::bootstrap` emits these once,
//! before the first install — but the literal text lives here since it is
//! part of what the compiler's output depends on being present: the model,
//! closure, and userset-rule metadata an operator may want inspected
//! alongside the generated functions.
//!
//! Grounded on `pg_tviews::metadata::create_metadata_tables` in the wider
//! example pack (the sibling DDL-text-generation crate) — same idiom of a
//! handful of `const &str` DDL blocks rather than a migration framework.

pub const CREATE_MELANGE_TYPES: &str = "CREATE TABLE IF NOT EXISTS melange_types (\n    object_type text PRIMARY KEY\n);";

pub const CREATE_MELANGE_MODEL: &str = "CREATE TABLE IF NOT EXISTS melange_model (\n    id bigserial PRIMARY KEY,\n    object_type text NOT NULL,\n    relation text NOT NULL,\n    subject_type text,\n    subject_relation text,\n    subject_wildcard boolean NOT NULL DEFAULT FALSE,\n    implied_by text,\n    parent_relation text,\n    excluded_relation text,\n    excluded_parent_relation text,\n    excluded_parent_type text,\n    rule_group_id int,\n    rule_group_mode text,\n    check_relation text,\n    check_excluded_relation text,\n    check_parent_relation text,\n    check_parent_type text\n);";

pub const CREATE_MELANGE_RELATION_CLOSURE: &str = "CREATE TABLE IF NOT EXISTS melange_relation_closure (\n    object_type text NOT NULL,\n    relation text NOT NULL,\n    satisfying_relation text NOT NULL,\n    via_path text[] NOT NULL,\n    PRIMARY KEY (object_type, relation, satisfying_relation)\n);";

pub const CREATE_MELANGE_USERSET_RULES: &str = "CREATE TABLE IF NOT EXISTS melange_userset_rules (\n    object_type text NOT NULL,\n    relation text NOT NULL,\n    tuple_relation text NOT NULL,\n    subject_type text NOT NULL,\n    subject_relation text NOT NULL,\n    PRIMARY KEY (object_type, relation, tuple_relation, subject_type, subject_relation)\n);";

pub const CREATE_MELANGE_MIGRATIONS: &str = "CREATE TABLE IF NOT EXISTS melange_migrations (\n    melange_version bigserial PRIMARY KEY,\n    schema_checksum text NOT NULL,\n    codegen_version text NOT NULL,\n    function_names text[] NOT NULL,\n    installed_at timestamptz NOT NULL DEFAULT now()\n);";

pub const CREATE_MELANGE_TUPLES: &str = "CREATE TABLE IF NOT EXISTS melange_tuples (\n    subject_type text NOT NULL,\n    subject_id text NOT NULL,\n    relation text NOT NULL,\n    object_type text NOT NULL,\n    object_id text NOT NULL,\n    PRIMARY KEY (subject_type, subject_id, relation, object_type, object_id)\n);";

/// All fixed-shape DDL statements, in dependency order (`melange_tuples` has
/// no dependents here but is listed first since every emitted function reads
/// it; the rest are metadata tables an installer populates from the
/// compiled `Model` for introspection).
pub fn bootstrap_ddl() -> Vec<&'static str> {
    vec![
        CREATE_MELANGE_TUPLES,
        CREATE_MELANGE_TYPES,
        CREATE_MELANGE_MODEL,
        CREATE_MELANGE_RELATION_CLOSURE,
        CREATE_MELANGE_USERSET_RULES,
        CREATE_MELANGE_MIGRATIONS,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_ddl_includes_every_fixed_table() {
        let ddl = bootstrap_ddl();
        assert_eq!(ddl.len(), 6);
        assert!(ddl.iter().any(|s| s.contains("melange_tuples")));
        assert!(ddl.iter().any(|s| s.contains("melange_migrations")));
    }
}
