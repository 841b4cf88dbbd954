//! On-disk migration artifacts.
//!
//! Layout under the migrations directory:
//!
//! ```text
//! 0000_init.sql              statements separated by `--> statement-breakpoint`
//! 0001_add_variants.sql
//! meta/_journal.json         ordered entries plus the dialect
//! meta/0000_snapshot.json    schema after each migration
//! meta/0001_snapshot.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wicket_schema::SchemaSnapshot;
use wicket_types::validate_identifier;

use super::{diff, Migration, MigrationError};
use crate::dialect::Dialect;

/// Separator between statements in a `.sql` artifact.
pub const STATEMENT_BREAKPOINT: &str = "--> statement-breakpoint";

const JOURNAL_VERSION: u32 = 1;

/// Ordered index of the migrations in a directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journal {
    /// Format version.
    pub version: u32,
    /// Dialect the SQL was rendered for.
    pub dialect: Dialect,
    /// Migrations in apply order.
    pub entries: Vec<JournalEntry>,
}

/// One journal line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Position in the journal, starting at 0.
    pub idx: usize,
    /// Migration name, also the `.sql` file stem.
    pub tag: String,
    /// When the artifact was generated.
    pub when: DateTime<Utc>,
    /// Checksum of the statements at generation time.
    pub checksum: String,
}

/// Reads and writes migration artifacts in one directory.
#[derive(Debug, Clone)]
pub struct MigrationStore {
    dir: PathBuf,
    dialect: Dialect,
}

impl MigrationStore {
    /// A store rooted at `dir` for `dialect`. Nothing is touched on disk
    /// until the store is read or written.
    pub fn new(dir: impl Into<PathBuf>, dialect: Dialect) -> Self {
        Self {
            dir: dir.into(),
            dialect,
        }
    }

    /// The migrations directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The dialect artifacts are rendered for.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn meta_dir(&self) -> PathBuf {
        self.dir.join("meta")
    }

    fn journal_path(&self) -> PathBuf {
        self.meta_dir().join("_journal.json")
    }

    fn snapshot_path(&self, idx: usize) -> PathBuf {
        self.meta_dir().join(format!("{idx:04}_snapshot.json"))
    }

    fn sql_path(&self, tag: &str) -> PathBuf {
        self.dir.join(format!("{tag}.sql"))
    }

    /// Reads the journal. A missing journal is an empty one.
    ///
    /// # Errors
    ///
    /// Fails if the journal cannot be read or parsed, or was written for a
    /// different dialect.
    pub fn journal(&self) -> Result<Journal, MigrationError> {
        let path = self.journal_path();
        if !path.exists() {
            return Ok(Journal {
                version: JOURNAL_VERSION,
                dialect: self.dialect,
                entries: Vec::new(),
            });
        }

        let journal: Journal = read_json(&path)?;
        if journal.dialect != self.dialect {
            return Err(MigrationError::DialectMismatch {
                expected: self.dialect,
                found: journal.dialect,
            });
        }
        Ok(journal)
    }

    /// Loads every migration listed in the journal, in order.
    ///
    /// # Errors
    ///
    /// Fails if an artifact is missing, unreadable, or no longer matches
    /// the checksum recorded when it was generated.
    pub fn load(&self) -> Result<Vec<Migration>, MigrationError> {
        let journal = self.journal()?;
        let mut migrations = Vec::with_capacity(journal.entries.len());

        for entry in &journal.entries {
            let path = self.sql_path(&entry.tag);
            let text = fs::read_to_string(&path).map_err(|source| MigrationError::Io {
                path: path.clone(),
                source,
            })?;
            let snapshot: SchemaSnapshot = read_json(&self.snapshot_path(entry.idx))?;
            let migration = Migration::new(entry.tag.clone(), split_statements(&text), snapshot);

            if migration.checksum != entry.checksum {
                return Err(MigrationError::Artifact {
                    path,
                    message: "SQL was modified after generation".to_string(),
                });
            }
            migrations.push(migration);
        }

        tracing::debug!(
            dir = %self.dir.display(),
            count = migrations.len(),
            "loaded migrations"
        );
        Ok(migrations)
    }

    /// Schema after the last generated migration, or an empty schema.
    ///
    /// # Errors
    ///
    /// Fails if the journal or the snapshot cannot be read.
    pub fn latest_snapshot(&self) -> Result<SchemaSnapshot, MigrationError> {
        match self.journal()?.entries.last() {
            Some(entry) => read_json(&self.snapshot_path(entry.idx)),
            None => Ok(SchemaSnapshot::empty()),
        }
    }

    /// Generates the next migration from `declared` and writes its
    /// artifacts. Returns `None` when `declared` matches the latest snapshot.
    ///
    /// # Errors
    ///
    /// Fails if `tag` is not a valid name, the dialect cannot express a
    /// change, a rendered statement contains the statement separator, or
    /// the artifacts cannot be written.
    pub fn generate(
        &self,
        declared: &SchemaSnapshot,
        tag: &str,
    ) -> Result<Option<Migration>, MigrationError> {
        validate_identifier(tag).map_err(|e| MigrationError::Artifact {
            path: self.dir.clone(),
            message: format!("invalid migration tag: {e}"),
        })?;

        let mut journal = self.journal()?;
        let current = self.latest_snapshot()?;
        let changes = diff(&current, declared);
        if changes.is_empty() {
            tracing::info!("schema unchanged, no migration generated");
            return Ok(None);
        }

        let idx = journal.entries.len();
        let name = format!("{idx:04}_{tag}");
        let migration = Migration::from_changes(&name, &changes, declared.clone(), self.dialect)?;
        if migration
            .statements
            .iter()
            .any(|statement| statement.contains(STATEMENT_BREAKPOINT))
        {
            return Err(MigrationError::Artifact {
                path: self.sql_path(&name),
                message: format!("a statement contains the separator `{STATEMENT_BREAKPOINT}`"),
            });
        }

        fs::create_dir_all(self.meta_dir()).map_err(|source| MigrationError::Io {
            path: self.meta_dir(),
            source,
        })?;
        write_file(
            &self.sql_path(&name),
            &migration
                .statements
                .join(&format!("\n{STATEMENT_BREAKPOINT}\n")),
        )?;
        write_json(&self.snapshot_path(idx), &migration.snapshot)?;

        journal.entries.push(JournalEntry {
            idx,
            tag: name.clone(),
            when: Utc::now(),
            checksum: migration.checksum.clone(),
        });
        write_json(&self.journal_path(), &journal)?;

        tracing::info!(
            migration = %name,
            changes = changes.len(),
            statements = migration.statements.len(),
            "generated migration"
        );
        Ok(Some(migration))
    }
}

/// Splits a `.sql` artifact into statements.
pub fn split_statements(text: &str) -> Vec<String> {
    text.split(STATEMENT_BREAKPOINT)
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .map(str::to_string)
        .collect()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, MigrationError> {
    let text = fs::read_to_string(path).map_err(|source| MigrationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|e| MigrationError::Artifact {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), MigrationError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| MigrationError::Artifact {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    write_file(path, &text)
}

fn write_file(path: &Path, contents: &str) -> Result<(), MigrationError> {
    fs::write(path, format!("{contents}\n")).map_err(|source| MigrationError::Io {
        path: path.to_path_buf(),
        source,
    })
}
