//! Versioned schema migrations.
//!
//! Migrations are generated from the declared schema by [`diff`]ing it
//! against the snapshot of the last migration, rendered to SQL for one
//! [`Dialect`], and written as artifacts by [`MigrationStore`]. An operator
//! applies them with [`apply`]; applied migrations are tracked in the
//! `__wicket_migrations` table together with the schema snapshot each one
//! produced.

mod diff;
mod store;

use std::path::PathBuf;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use wicket_schema::SchemaSnapshot;
use wicket_types::quote_ident;

use crate::dialect::{Dialect, MIGRATIONS_TABLE};
use crate::error::ErrorKind;
use crate::executor::Executor;
use crate::transport::{Statement, TransportError};

pub use diff::{diff, SchemaChange};
pub use store::{Journal, JournalEntry, MigrationStore};

/// Errors from generating, loading, or applying migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The dialect cannot express a change.
    #[error("{dialect} cannot {change}")]
    Unsupported {
        /// Target dialect.
        dialect: Dialect,
        /// The change, described.
        change: String,
    },

    /// The batch of pending migrations failed. Nothing from it was recorded.
    #[error("migration batch [{}] failed: {source}", .names.join(", "))]
    Failed {
        /// Migrations that were in the batch.
        names: Vec<String>,
        /// What the store reported.
        source: TransportError,
    },

    /// The tracking table could not be created or read.
    #[error("failed to read migration state: {0}")]
    State(#[source] TransportError),

    /// An applied migration's SQL differs from the artifact on disk.
    #[error("migration '{name}' was applied with checksum {applied} but the artifact has {expected}")]
    ChecksumMismatch {
        /// Migration name.
        name: String,
        /// Checksum of the local artifact.
        expected: String,
        /// Checksum recorded at apply time.
        applied: String,
    },

    /// The database recorded a migration out of sequence.
    #[error("migration '{name}' is recorded as applied out of order")]
    OutOfOrder {
        /// Migration name.
        name: String,
    },

    /// The database recorded a migration that no artifact describes.
    #[error("database records migration '{name}', which is not in the migrations directory")]
    UnknownApplied {
        /// Migration name.
        name: String,
    },

    /// Artifacts were generated for a different dialect.
    #[error("migrations were generated for {found}, but the target speaks {expected}")]
    DialectMismatch {
        /// Dialect of the target database.
        expected: Dialect,
        /// Dialect named in the journal.
        found: Dialect,
    },

    /// An artifact file could not be read or written.
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// An artifact exists but its contents are invalid.
    #[error("invalid migration artifact {}: {message}", .path.display())]
    Artifact {
        /// Offending path.
        path: PathBuf,
        /// What is wrong with it.
        message: String,
    },
}

impl MigrationError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::State(_) => ErrorKind::Transport,
            _ => ErrorKind::MigrationFailed,
        }
    }
}

/// One versioned migration: named SQL plus the schema it leaves behind.
#[derive(Debug, Clone, PartialEq)]
pub struct Migration {
    /// Unique, ordered name, e.g. `0001_add_variants`.
    pub name: String,
    /// Statements to execute, in order.
    pub statements: Vec<String>,
    /// SHA-256 of the statements, hex encoded.
    pub checksum: String,
    /// Schema after this migration.
    pub snapshot: SchemaSnapshot,
}

impl Migration {
    /// Builds a migration and computes its checksum.
    pub fn new(name: impl Into<String>, statements: Vec<String>, snapshot: SchemaSnapshot) -> Self {
        let checksum = checksum(&statements);
        Self {
            name: name.into(),
            statements,
            checksum,
            snapshot,
        }
    }

    /// Renders `changes` for `dialect` into a migration.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Unsupported`] if the dialect cannot express
    /// one of the changes.
    pub fn from_changes(
        name: impl Into<String>,
        changes: &[SchemaChange],
        snapshot: SchemaSnapshot,
        dialect: Dialect,
    ) -> Result<Self, MigrationError> {
        Ok(Self::new(name, dialect.render(changes)?, snapshot))
    }
}

/// SHA-256 over the statements joined by newlines, hex encoded.
pub fn checksum(statements: &[String]) -> String {
    hex::encode(Sha256::digest(statements.join("\n").as_bytes()))
}

/// Whether one migration has been applied to the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Migration name.
    pub name: String,
    /// When it was applied, as reported by the store; `None` while pending.
    pub applied_at: Option<String>,
}

impl MigrationStatus {
    /// Whether the migration is recorded as applied.
    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct AppliedRecord {
    name: String,
    checksum: String,
    applied_at: String,
}

/// Applies every pending migration as one all-or-nothing batch.
///
/// Creates the tracking table if needed, checks that the applied migrations
/// are a prefix of `migrations` with matching checksums, then runs the SQL
/// of every pending migration followed by its tracking row in a single
/// transaction.
///
/// Returns the number of migrations applied; `0` when the target is already
/// up to date.
///
/// # Errors
///
/// Returns [`MigrationError::Failed`] if the batch fails (nothing is
/// recorded), or a verification error if the recorded history does not
/// match `migrations`.
pub async fn apply(migrations: &[Migration], executor: &Executor) -> Result<usize, MigrationError> {
    let applied = applied_records(executor).await?;
    verify_history(migrations, &applied)?;

    let pending = &migrations[applied.len()..];
    if pending.is_empty() {
        tracing::info!(applied = applied.len(), "database is up to date");
        return Ok(0);
    }

    let mut batch = Vec::new();
    for migration in pending {
        tracing::info!(migration = %migration.name, "applying migration");
        batch.extend(migration.statements.iter().map(Statement::new));
        batch.push(record_statement(migration)?);
    }

    executor
        .execute_batch(&batch)
        .await
        .map_err(|source| MigrationError::Failed {
            names: pending.iter().map(|m| m.name.clone()).collect(),
            source,
        })?;

    tracing::info!(count = pending.len(), "migrations applied");
    Ok(pending.len())
}

/// Reports, for each known migration, whether it has been applied.
///
/// # Errors
///
/// Fails like [`apply`] when the recorded history does not match
/// `migrations`.
pub async fn status(
    migrations: &[Migration],
    executor: &Executor,
) -> Result<Vec<MigrationStatus>, MigrationError> {
    let applied = applied_records(executor).await?;
    verify_history(migrations, &applied)?;

    Ok(migrations
        .iter()
        .enumerate()
        .map(|(i, migration)| MigrationStatus {
            name: migration.name.clone(),
            applied_at: applied.get(i).map(|record| record.applied_at.clone()),
        })
        .collect())
}

/// The schema snapshot stored with the last applied migration, or an empty
/// snapshot if nothing has been applied.
///
/// # Errors
///
/// Returns [`MigrationError::State`] if the tracking table cannot be read
/// and [`MigrationError::Artifact`] if the stored snapshot is not valid.
pub async fn current_snapshot(executor: &Executor) -> Result<SchemaSnapshot, MigrationError> {
    ensure_tracking_table(executor).await?;

    let sql = format!(
        "SELECT {name}, {snapshot} FROM {table} ORDER BY {id} DESC LIMIT 1",
        name = quote_ident("name"),
        snapshot = quote_ident("snapshot"),
        table = quote_ident(MIGRATIONS_TABLE),
        id = quote_ident("id"),
    );
    let response = executor
        .execute(&Statement::new(sql))
        .await
        .map_err(MigrationError::State)?;

    let Some(row) = response.rows.into_iter().next() else {
        return Ok(SchemaSnapshot::empty());
    };
    let name = row
        .get("name")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();
    let text = row
        .get("snapshot")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| MigrationError::Artifact {
            path: PathBuf::from(MIGRATIONS_TABLE),
            message: format!("snapshot of '{name}' is missing"),
        })?;

    serde_json::from_str(text).map_err(|e| MigrationError::Artifact {
        path: PathBuf::from(MIGRATIONS_TABLE),
        message: format!("snapshot of '{name}': {e}"),
    })
}

async fn ensure_tracking_table(executor: &Executor) -> Result<(), MigrationError> {
    executor
        .execute(&Statement::new(executor.dialect().tracking_table_sql()))
        .await
        .map_err(MigrationError::State)?;
    Ok(())
}

async fn applied_records(executor: &Executor) -> Result<Vec<AppliedRecord>, MigrationError> {
    ensure_tracking_table(executor).await?;

    let sql = format!(
        "SELECT {name}, {checksum}, {applied_at} FROM {table} ORDER BY {id}",
        name = quote_ident("name"),
        checksum = quote_ident("checksum"),
        applied_at = quote_ident("applied_at"),
        table = quote_ident(MIGRATIONS_TABLE),
        id = quote_ident("id"),
    );
    let response = executor
        .execute(&Statement::new(sql))
        .await
        .map_err(MigrationError::State)?;

    response
        .rows
        .into_iter()
        .map(|row| {
            serde_json::from_value(serde_json::Value::Object(row)).map_err(|e| {
                MigrationError::State(TransportError::Protocol(format!(
                    "unexpected migration record: {e}"
                )))
            })
        })
        .collect()
}

fn verify_history(migrations: &[Migration], applied: &[AppliedRecord]) -> Result<(), MigrationError> {
    for (i, record) in applied.iter().enumerate() {
        match migrations.get(i) {
            Some(known) if known.name == record.name => {
                if known.checksum != record.checksum {
                    return Err(MigrationError::ChecksumMismatch {
                        name: record.name.clone(),
                        expected: known.checksum.clone(),
                        applied: record.checksum.clone(),
                    });
                }
            }
            _ if migrations.iter().any(|m| m.name == record.name) => {
                return Err(MigrationError::OutOfOrder {
                    name: record.name.clone(),
                });
            }
            _ => {
                return Err(MigrationError::UnknownApplied {
                    name: record.name.clone(),
                });
            }
        }
    }
    Ok(())
}

fn record_statement(migration: &Migration) -> Result<Statement, MigrationError> {
    let snapshot =
        serde_json::to_string(&migration.snapshot).map_err(|e| MigrationError::Artifact {
            path: PathBuf::from(&migration.name),
            message: format!("snapshot does not serialize: {e}"),
        })?;

    let sql = format!(
        "INSERT INTO {} ({}, {}, {}) VALUES ($1, $2, $3)",
        quote_ident(MIGRATIONS_TABLE),
        quote_ident("name"),
        quote_ident("checksum"),
        quote_ident("snapshot"),
    );
    Ok(Statement::with_params(
        sql,
        vec![
            migration.name.clone().into(),
            migration.checksum.clone().into(),
            snapshot.into(),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migration(name: &str, sql: &str) -> Migration {
        Migration::new(name, vec![sql.to_string()], SchemaSnapshot::empty())
    }

    fn record(name: &str, checksum: &str) -> AppliedRecord {
        AppliedRecord {
            name: name.to_string(),
            checksum: checksum.to_string(),
            applied_at: "2024-03-01T10:00:00Z".to_string(),
        }
    }

    #[test]
    fn checksum_is_stable_sha256_hex() {
        let a = migration("0000_init", "CREATE TABLE t (id INTEGER)");
        let b = migration("0000_other", "CREATE TABLE t (id INTEGER)");
        assert_eq!(a.checksum, b.checksum);
        assert_eq!(a.checksum.len(), 64);
        assert_ne!(a.checksum, migration("x", "DROP TABLE t").checksum);
    }

    #[test]
    fn history_must_be_a_prefix() {
        let known = [
            migration("0000_init", "CREATE TABLE a (id INTEGER)"),
            migration("0001_more", "CREATE TABLE b (id INTEGER)"),
        ];

        verify_history(&known, &[]).expect("empty history");
        verify_history(&known, &[record("0000_init", &known[0].checksum)])
            .expect("prefix history");

        let err = verify_history(&known, &[record("0001_more", &known[1].checksum)]).unwrap_err();
        assert!(matches!(err, MigrationError::OutOfOrder { name } if name == "0001_more"));

        let err = verify_history(&known, &[record("0000_legacy", "abc")]).unwrap_err();
        assert!(matches!(err, MigrationError::UnknownApplied { .. }));

        let err = verify_history(&known, &[record("0000_init", "abc")]).unwrap_err();
        assert!(matches!(err, MigrationError::ChecksumMismatch { .. }));
        assert_eq!(err.kind(), ErrorKind::MigrationFailed);
    }

    #[test]
    fn record_statement_binds_every_value() {
        let statement = record_statement(&migration("0000_init", "SELECT 1")).expect("record");
        assert_eq!(
            statement.sql,
            "INSERT INTO \"__wicket_migrations\" (\"name\", \"checksum\", \"snapshot\") VALUES ($1, $2, $3)"
        );
        assert_eq!(statement.params.len(), 3);
        assert_eq!(statement.params[2], wicket_types::Value::from("{\"entity\":[]}"));
    }
}
