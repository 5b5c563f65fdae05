//! # Migration Tool
//!
//! Operator CLI for the Sourcebook database.
//!
//! ## Usage
//! ```bash
//! # Apply base schema (empty store only), pending migrations, then verify
//! cargo run -p sourcebook-db --bin sourcebook-migrate -- up
//!
//! # Show applied / failed / pending migrations
//! cargo run -p sourcebook-db --bin sourcebook-migrate -- status --json
//!
//! # Check applied migration files for edits
//! cargo run -p sourcebook-db --bin sourcebook-migrate -- --db ./data/sourcebook.db verify
//!
//! # Show how a migration file will be split into statements
//! cargo run -p sourcebook-db --bin sourcebook-migrate -- split migrations/003_views.sql
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sourcebook_core::split_sql_statements;
use sourcebook_db::{bootstrap, Database, MigrationManager, StorageConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Sourcebook schema migration tool
#[derive(Parser, Debug)]
#[command(name = "sourcebook-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Storage config file (default: platform config dir storage.toml)
    #[arg(short, long, global = true, env = "SOURCEBOOK_CONFIG")]
    config: Option<PathBuf>,

    /// Override the database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Override the migrations directory
    #[arg(short, long, global = true)]
    migrations_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bring the schema up to date and verify it
    Up,

    /// Show migration status
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Verify applied migrations against their files
    Verify,

    /// Print the statement blocks of a migration file
    Split {
        /// Migration file to split
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Up => up(&load_config(&cli.global)?).await,
        Commands::Status { json } => status(&load_config(&cli.global)?, json).await,
        Commands::Verify => verify(&load_config(&cli.global)?).await,
        Commands::Split { file } => split(file),
    }
}

/// Log to stderr; `RUST_LOG` overrides the default filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sourcebook=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &GlobalArgs) -> Result<StorageConfig> {
    let mut config =
        StorageConfig::load(args.config.clone()).context("Failed to load storage config")?;

    if let Some(db) = &args.db {
        config.database.path = db.clone();
    }
    if let Some(dir) = &args.migrations_dir {
        config.migrations.dir = dir.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn up(config: &StorageConfig) -> Result<()> {
    let report = bootstrap::run(config)
        .await
        .context("Startup migration failed")?;

    if report.base_schema_applied {
        println!("Applied base schema");
    }
    if report.applied.is_empty() {
        println!("Schema is up to date");
    } else {
        for filename in &report.applied {
            println!("Applied {}", filename);
        }
    }
    Ok(())
}

async fn open_manager(config: &StorageConfig) -> Result<(Database, MigrationManager)> {
    let db = Database::connect(config.db_config())
        .await
        .with_context(|| format!("Failed to open {}", config.database.path.display()))?;

    let manager = MigrationManager::new(db.dal(), &config.migrations.dir)
        .with_strict_naming(config.migrations.strict_naming);
    manager.initialize().await?;

    Ok((db, manager))
}

async fn status(config: &StorageConfig, json: bool) -> Result<()> {
    let (db, manager) = open_manager(config).await?;
    let status = manager.status().await;
    db.close().await;
    let status = status?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    for filename in &status.applied {
        println!("  applied  {}", filename);
    }
    for filename in &status.failed {
        println!("  failed   {}", filename);
    }
    for filename in &status.pending {
        println!("  pending  {}", filename);
    }
    println!(
        "{} applied, {} failed, {} pending",
        status.applied.len(),
        status.failed.len(),
        status.pending.len()
    );
    Ok(())
}

async fn verify(config: &StorageConfig) -> Result<()> {
    let (db, manager) = open_manager(config).await?;
    let verified = manager.verify_schema().await;
    db.close().await;

    verified.context("Schema verification failed")?;
    println!("Schema verified");
    Ok(())
}

fn split(file: PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let blocks = split_sql_statements(&content);
    for (index, block) in blocks.iter().enumerate() {
        println!("-- [{}] {}", index + 1, block.kind);
        println!("{}", block.sql);
        println!();
    }
    println!("-- {} statement(s)", blocks.len());
    Ok(())
}
