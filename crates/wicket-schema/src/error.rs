//! Error types for schema declaration and validation.

use thiserror::Error;
use wicket_types::{ColumnType, IdentifierError};

/// A schema declaration is malformed or does not match a bound entity.
///
/// Every variant is a startup-time configuration problem: a process that
/// hits one cannot serve data requests and should halt.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The TOML schema source could not be parsed.
    #[error("failed to parse schema source: {0}")]
    Parse(#[from] toml::de::Error),

    /// An entity or column name is not a valid SQL identifier.
    #[error("invalid identifier in {context}: {source}")]
    InvalidIdentifier {
        /// Where the identifier appeared.
        context: String,
        /// Which rule it broke.
        source: IdentifierError,
    },

    /// Two entities share a name.
    #[error("entity '{entity}' is declared more than once")]
    DuplicateEntity {
        /// The repeated name.
        entity: String,
    },

    /// An entity declares no columns.
    #[error("entity '{entity}' declares no columns")]
    EmptyEntity {
        /// The entity.
        entity: String,
    },

    /// Two columns in one entity share a name.
    #[error("column '{column}' is declared more than once on '{entity}'")]
    DuplicateColumn {
        /// The entity.
        entity: String,
        /// The repeated name.
        column: String,
    },

    /// More than one column is flagged as primary key.
    #[error("entity '{entity}' declares more than one primary key column")]
    MultiplePrimaryKeys {
        /// The entity.
        entity: String,
    },

    /// A primary key column is nullable.
    #[error("primary key '{entity}.{column}' cannot be nullable")]
    NullablePrimaryKey {
        /// The entity.
        entity: String,
        /// The column.
        column: String,
    },

    /// A `serial` column is not the primary key.
    #[error("serial column '{entity}.{column}' must be the primary key")]
    SerialWithoutPrimaryKey {
        /// The entity.
        entity: String,
        /// The column.
        column: String,
    },

    /// A default literal does not fit the column type.
    #[error("default for '{entity}.{column}' does not fit column type {ty}")]
    InvalidDefault {
        /// The entity.
        entity: String,
        /// The column.
        column: String,
        /// Declared type.
        ty: ColumnType,
    },

    /// Two relationships in one entity share a name.
    #[error("relationship '{relationship}' is declared more than once on '{entity}'")]
    DuplicateRelationship {
        /// The entity.
        entity: String,
        /// The repeated name.
        relationship: String,
    },

    /// A relationship points at an entity that is not declared.
    #[error("relationship '{entity}.{relationship}' references unknown entity '{target}'")]
    DanglingEntity {
        /// Owning entity.
        entity: String,
        /// Relationship name.
        relationship: String,
        /// Missing target.
        target: String,
    },

    /// A relationship uses a column that does not exist.
    #[error("relationship '{entity}.{relationship}' uses unknown column '{table}.{column}'")]
    DanglingColumn {
        /// Owning entity.
        entity: String,
        /// Relationship name.
        relationship: String,
        /// Table the column was expected on.
        table: String,
        /// Missing column.
        column: String,
    },

    /// A relationship's column types cannot reference each other.
    #[error(
        "relationship '{entity}.{relationship}' column type {column_type} cannot reference {target_type}"
    )]
    IncompatibleTypes {
        /// Owning entity.
        entity: String,
        /// Relationship name.
        relationship: String,
        /// Type of the referencing column.
        column_type: ColumnType,
        /// Type of the referenced column.
        target_type: ColumnType,
    },

    /// A relationship targets a column that is neither primary key nor unique.
    #[error("relationship '{entity}.{relationship}' targets '{target}.{column}', which is not a key")]
    NotReferenceable {
        /// Owning entity.
        entity: String,
        /// Relationship name.
        relationship: String,
        /// Referenced entity.
        target: String,
        /// Referenced column.
        column: String,
    },

    /// `on_delete = "set_null"` on a non-nullable column.
    #[error("relationship '{entity}.{relationship}' uses set_null on a non-nullable column")]
    InvalidSetNull {
        /// Owning entity.
        entity: String,
        /// Relationship name.
        relationship: String,
    },

    /// A typed entity was bound against a registry that does not declare it.
    #[error("entity '{entity}' is not declared in the schema registry")]
    UnknownEntity {
        /// The entity.
        entity: String,
    },

    /// A typed entity names a column the registry does not declare.
    #[error("column '{entity}.{column}' is not declared in the schema registry")]
    UnknownColumn {
        /// The entity.
        entity: String,
        /// The column.
        column: String,
    },

    /// A typed entity disagrees with the registry about a column's type.
    #[error("column '{entity}.{column}' is declared as {declared} but bound as {bound}")]
    ColumnTypeMismatch {
        /// The entity.
        entity: String,
        /// The column.
        column: String,
        /// Type in the registry.
        declared: ColumnType,
        /// Type on the Rust side.
        bound: ColumnType,
    },
}
