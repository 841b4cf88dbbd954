//! wicket-migrate: generates, inspects, and applies storefront schema
//! migrations.
//!
//! Reads `wicket.toml` (or the file named by `--config` or
//! `WICKET_CONFIG_PATH`), initializes structured logging, and runs one
//! subcommand. Startup-class failures exit with status 2, everything else
//! with status 1.

mod config;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use wicket_db::{
    diff, open, resolve, DbError, Dialect, Executor, MigrationError, MigrationStore,
    SchemaError, SchemaRegistry,
};

use crate::config::{Config, ConfigError, LoggingConfig, CONFIG_PATH_ENV};

#[derive(Parser)]
#[command(name = "wicket-migrate")]
#[command(about = "Schema migrations for the wicket storefront")]
#[command(version)]
struct Cli {
    /// Path to TOML configuration file [default: wicket.toml]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the next migration for changes in the declared schema
    Generate {
        /// Tag appended to the migration name, e.g. add_variants
        #[arg(long)]
        name: String,
    },

    /// Show schema changes not yet captured in a migration
    Diff,

    /// Apply pending migrations to the database
    Apply,

    /// List migrations and whether each has been applied
    Status,
}

/// Errors that stop the binary.
#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to read schema {}: {source}", .path.display())]
    SchemaRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid schema {}: {source}", .path.display())]
    Schema { path: PathBuf, source: SchemaError },

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<MigrationError> for CliError {
    fn from(e: MigrationError) -> Self {
        Self::Db(e.into())
    }
}

impl From<wicket_db::ConfigError> for CliError {
    fn from(e: wicket_db::ConfigError) -> Self {
        Self::Db(e.into())
    }
}

impl CliError {
    fn exit_code(&self) -> u8 {
        let fatal = match self {
            Self::Config(_) | Self::SchemaRead { .. } | Self::Schema { .. } => true,
            Self::Db(e) => e.is_fatal(),
        };
        if fatal {
            2
        } else {
            1
        }
    }
}

fn resolve_config_path(cli: Option<PathBuf>) -> (PathBuf, &'static str) {
    if let Some(path) = cli.filter(|p| !p.as_os_str().is_empty()) {
        return (path, "cli-arg");
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return (PathBuf::from(path), "env-var");
        }
    }

    (PathBuf::from("wicket.toml"), "default")
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries command output
    if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let (config_path, config_source) = resolve_config_path(cli.config);

    let config = match config::load_config(Some(&config_path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    init_tracing(&config.logging);
    tracing::info!(
        source = config_source,
        path = %config_path.display(),
        "resolved configuration path"
    );

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "wicket-migrate failed");
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(command: Commands, config: &Config) -> Result<(), CliError> {
    let registry = load_registry(&config.migrations.schema)?;

    match command {
        Commands::Generate { name } => {
            let store = MigrationStore::new(&config.migrations.out_dir, offline_dialect(config)?);
            match store.generate(&registry.snapshot(), &name)? {
                Some(migration) => println!(
                    "generated {} ({} statements) in {}",
                    migration.name,
                    migration.statements.len(),
                    store.dir().display()
                ),
                None => println!("no schema changes"),
            }
        }
        Commands::Diff => {
            let store = MigrationStore::new(&config.migrations.out_dir, offline_dialect(config)?);
            let changes = diff(&store.latest_snapshot()?, &registry.snapshot());
            if changes.is_empty() {
                println!("no schema changes");
            }
            for change in &changes {
                println!("{}", change.describe());
            }
        }
        Commands::Apply => {
            let (executor, store) = connect(config, registry)?;
            warn_on_uncaptured_changes(&store, executor.registry())?;
            let migrations = store.load()?;
            let applied = wicket_db::apply(&migrations, &executor).await?;
            if applied == 0 {
                println!("database is up to date");
            } else {
                println!("applied {applied} migration(s)");
            }
        }
        Commands::Status => {
            let (executor, store) = connect(config, registry)?;
            let migrations = store.load()?;
            for entry in wicket_db::status(&migrations, &executor).await? {
                match entry.applied_at {
                    Some(at) => println!("[x] {}  applied {at}", entry.name),
                    None => println!("[ ] {}  pending", entry.name),
                }
            }
        }
    }

    Ok(())
}

fn load_registry(path: &Path) -> Result<SchemaRegistry, CliError> {
    let source = std::fs::read_to_string(path).map_err(|source| CliError::SchemaRead {
        path: path.to_path_buf(),
        source,
    })?;
    let registry = SchemaRegistry::from_toml(&source).map_err(|source| CliError::Schema {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), entities = registry.len(), "loaded schema");
    Ok(registry)
}

/// The dialect for commands that never touch the database.
fn offline_dialect(config: &Config) -> Result<Dialect, CliError> {
    match config.migrations.dialect {
        Some(dialect) => Ok(dialect),
        None => Ok(resolve(&config.database)?.dialect()),
    }
}

fn connect(
    config: &Config,
    registry: SchemaRegistry,
) -> Result<(Executor, MigrationStore), CliError> {
    let descriptor = resolve(&config.database)?;
    let dialect = descriptor.dialect();
    if let Some(configured) = config.migrations.dialect {
        if configured != dialect {
            return Err(MigrationError::DialectMismatch {
                expected: dialect,
                found: configured,
            }
            .into());
        }
    }

    let executor = open(&descriptor, Arc::new(registry))?;
    let store = MigrationStore::new(&config.migrations.out_dir, dialect);
    Ok((executor, store))
}

fn warn_on_uncaptured_changes(
    store: &MigrationStore,
    registry: &SchemaRegistry,
) -> Result<(), CliError> {
    let pending = diff(&store.latest_snapshot()?, &registry.snapshot());
    if !pending.is_empty() {
        tracing::warn!(
            changes = pending.len(),
            "declared schema has changes without a migration; run `wicket-migrate generate`"
        );
    }
    Ok(())
}
