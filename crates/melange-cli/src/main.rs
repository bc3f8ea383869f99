//! `melange` — compiles and installs authorization schemas (SPEC_FULL.md
//! §6.4), grounded on `coreauth-proxy`'s `Cli` entrypoint: a `clap::Parser`
//! struct read once in `main`, `tracing_subscriber` initialized before any
//! other work, and the whole binary returning `anyhow::Result<()>` instead
//! of ever panicking on an I/O or compile error.

mod config;
mod model_io;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use config::MelangeConfig;
use melange_compiler::{compile, CompileOptions};
use melange_database::{Database, DatabaseConfig, Installer};
use melange_model::output::FunctionKind;

/// Authorization schema compiler
#[derive(Parser)]
#[command(name = "melange", about = "Compiles OpenFGA-style authorization schemas to PL/pgSQL")]
struct Cli {
    /// Path to the flat TOML configuration file
    #[arg(short, long, env = "MELANGE_CONFIG", default_value = "melange.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a model to a SQL bundle, printed to stdout or written to a directory
    Compile {
        /// Path to a Model IR file (.json, .yaml, or .yml)
        #[arg(long)]
        model: PathBuf,
        /// Directory to write one .sql file per function plus dispatchers.sql and migration.json
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Only emit functions for relations whose name starts with this prefix
        #[arg(long)]
        relation_filter_prefix: Option<String>,
    },
    /// Compile a model and install it against a running Postgres instance
    Install {
        /// Path to a Model IR file (.json, .yaml, or .yml)
        #[arg(long)]
        model: PathBuf,
        /// Postgres connection URL; overrides the config file and MELANGE_DATABASE_URL
        #[arg(long)]
        database_url: Option<String>,
    },
    /// Run validation/closure/userset/analysis only and print the per-relation inventory
    CheckModel {
        /// Path to a Model IR file (.json, .yaml, or .yml)
        #[arg(long)]
        model: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,melange=debug".to_string()),
        )
        .init();

    let cli = Cli::parse();
    let config = MelangeConfig::load(&cli.config)?;

    match cli.command {
        Command::Compile {
            model,
            out_dir,
            relation_filter_prefix,
        } => run_compile(&model, out_dir.as_deref(), &config, relation_filter_prefix),
        Command::Install { model, database_url } => run_install(&model, database_url, &config).await,
        Command::CheckModel { model } => run_check_model(&model),
    }
}

fn compile_options(config: &MelangeConfig, relation_filter_prefix: Option<String>) -> CompileOptions {
    CompileOptions {
        codegen_version: config.codegen_version.clone(),
        relation_filter_prefix: relation_filter_prefix.or_else(|| config.relation_filter_prefix.clone()),
    }
}

fn run_compile(
    model_path: &std::path::Path,
    out_dir: Option<&std::path::Path>,
    config: &MelangeConfig,
    relation_filter_prefix: Option<String>,
) -> anyhow::Result<()> {
    let model = model_io::read_model(model_path)?;
    let opts = compile_options(config, relation_filter_prefix);
    let result = compile(&model, &opts)?;

    for diagnostic in &result.diagnostics {
        tracing::warn!(
            object_type = %diagnostic.object_type,
            relation = %diagnostic.relation,
            "{}", diagnostic.message
        );
    }

    match out_dir {
        Some(dir) => write_bundle(dir, &result),
        None => {
            for statement in &result.ddl {
                println!("{statement}\n");
            }
            for function in &result.functions {
                println!("{}\n", function.sql);
            }
            Ok(())
        }
    }
}

fn write_bundle(out_dir: &std::path::Path, result: &melange_model::CompileResult) -> anyhow::Result<()> {
    std::fs::create_dir_all(out_dir)?;

    let ddl_path = out_dir.join("schema.sql");
    std::fs::write(&ddl_path, result.ddl.join("\n\n"))?;

    let mut dispatchers = String::new();
    for function in &result.functions {
        match function.kind {
            FunctionKind::CheckDispatcher
            | FunctionKind::ListObjectsDispatcher
            | FunctionKind::ListSubjectsDispatcher => {
                dispatchers.push_str(&function.sql);
                dispatchers.push_str("\n\n");
            }
            _ => {
                let path = out_dir.join(format!("{}.sql", function.name));
                std::fs::write(&path, &function.sql)?;
            }
        }
    }
    std::fs::write(out_dir.join("dispatchers.sql"), dispatchers)?;

    if let Some(migration) = &result.migration {
        let migration_json = serde_json::to_string_pretty(migration)?;
        std::fs::write(out_dir.join("migration.json"), migration_json)?;
    }

    tracing::info!(
        out_dir = %out_dir.display(),
        functions = result.functions.len(),
        "wrote SQL bundle"
    );
    Ok(())
}

async fn run_install(
    model_path: &std::path::Path,
    database_url: Option<String>,
    config: &MelangeConfig,
) -> anyhow::Result<()> {
    let model = model_io::read_model(model_path)?;
    let opts = compile_options(config, None);
    let result = compile(&model, &opts)?;

    let url = database_url
        .or_else(|| config.database_url.clone())
        .unwrap_or_else(|| DatabaseConfig::default().url);

    let db = Database::connect(DatabaseConfig {
        url,
        ..DatabaseConfig::default()
    })
    .await?;
    db.ping().await?;

    let installer = Installer::new(db.pool().clone());
    installer.install(&result).await?;

    tracing::info!(functions = result.functions.len(), "install complete");
    Ok(())
}

fn run_check_model(model_path: &std::path::Path) -> anyhow::Result<()> {
    let model = model_io::read_model(model_path)?;

    melange_compiler::validator::validate(&model)?;
    let closure = melange_compiler::closure::build_closure(&model);
    let userset_rules = melange_compiler::userset::build_userset_rules(&model, &closure);
    let inventory = melange_compiler::analyzer::analyze_model(&model, &closure, &userset_rules);

    println!(
        "{:<16} {:<20} {:<24} {:<8} {:<8} reason",
        "type", "relation", "strategy", "check", "list"
    );
    for analysis in &inventory.analyses {
        println!(
            "{:<16} {:<20} {:<24} {:<8} {:<8} {}",
            analysis.object_type,
            analysis.relation,
            analysis.list_strategy.label(),
            analysis.capabilities.check_allowed,
            analysis.capabilities.list_allowed,
            analysis
                .capabilities
                .check_reason
                .as_deref()
                .or(analysis.capabilities.list_reason.as_deref())
                .unwrap_or("-")
        );
    }

    let unsupported_count = inventory.unsupported().count();
    if unsupported_count > 0 {
        tracing::warn!(count = unsupported_count, "relations with unsupported capabilities");
    }

    Ok(())
}
