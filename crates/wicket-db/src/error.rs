//! Crate-level error type and the error taxonomy.

use thiserror::Error;
use wicket_schema::SchemaError;

use crate::connection::ConfigError;
use crate::migrations::MigrationError;
use crate::query::QueryError;

/// Coarse classification of every error the data layer can return.
///
/// `Configuration` and `SchemaValidation` are startup-class: the process
/// cannot serve data and should stop. The rest are scoped to one call or
/// one migration batch and go back to whoever made it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid connection settings.
    Configuration,
    /// Malformed entity or relationship declarations.
    SchemaValidation,
    /// A migration batch did not apply; nothing from it was recorded.
    MigrationFailed,
    /// The store rejected a write on a unique, foreign-key, not-null, or
    /// check constraint.
    ConstraintViolation,
    /// A point lookup matched no row.
    NotFound,
    /// The request channel or the remote store failed.
    Transport,
    /// The caller asked for something the schema does not allow.
    InvalidQuery,
}

/// Any error from the data layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// Connection settings could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The schema failed validation or an entity did not bind.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A migration operation failed.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// A query failed.
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl DbError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::Schema(_) => ErrorKind::SchemaValidation,
            Self::Migration(e) => e.kind(),
            Self::Query(e) => e.kind(),
        }
    }

    /// Whether the process should stop rather than report and continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Configuration | ErrorKind::SchemaValidation
        )
    }
}
