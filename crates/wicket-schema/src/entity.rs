//! Declarative entity, column, and relationship definitions.

use serde::{Deserialize, Serialize};
use wicket_types::{ColumnType, Value};

/// Default value applied by the database when an insert omits a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnDefault {
    /// The current timestamp at insert time.
    Now,
    /// A boolean literal.
    Bool(bool),
    /// An integer literal.
    Int(i64),
    /// A float literal.
    Float(f64),
    /// A text literal.
    Text(String),
}

impl ColumnDefault {
    /// Whether this default can populate a column of type `ty`.
    pub fn fits(&self, ty: ColumnType) -> bool {
        match self {
            Self::Now => ty == ColumnType::Timestamp,
            Self::Bool(_) => ty == ColumnType::Boolean,
            Self::Int(_) => ty.is_integer() || ty == ColumnType::Float,
            Self::Float(v) => ty == ColumnType::Float && v.is_finite(),
            Self::Text(_) => ty == ColumnType::Text,
        }
    }

    /// The literal as a [`Value`], or `None` for [`ColumnDefault::Now`].
    pub fn literal(&self) -> Option<Value> {
        match self {
            Self::Now => None,
            Self::Bool(v) => Some(Value::Bool(*v)),
            Self::Int(v) => Some(Value::Int(*v)),
            Self::Float(v) => Some(Value::Float(*v)),
            Self::Text(v) => Some(Value::Text(v.clone())),
        }
    }
}

/// A single column declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,

    /// Primitive type.
    #[serde(rename = "type")]
    pub ty: ColumnType,

    /// Whether `NULL` is allowed. Primary keys are never nullable.
    #[serde(default)]
    pub nullable: bool,

    /// Database-side default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ColumnDefault>,

    /// Whether this column is the entity's primary key.
    #[serde(default)]
    pub primary_key: bool,

    /// Whether values must be unique across rows.
    #[serde(default)]
    pub unique: bool,
}

impl ColumnDef {
    /// A non-null column with no default and no key flags.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
            default: None,
            primary_key: false,
            unique: false,
        }
    }

    /// Marks the column nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Marks the column as the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Marks the column unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the database-side default.
    pub fn default_value(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    /// Whether an insert may leave this column out.
    pub fn is_optional_on_insert(&self) -> bool {
        self.ty == ColumnType::Serial || self.default.is_some() || self.nullable
    }

    /// Whether another entity may point a foreign key at this column.
    pub fn is_referenceable(&self) -> bool {
        self.primary_key || self.unique
    }
}

/// Action taken on referencing rows when the referenced row is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    /// Reject the delete while references exist.
    #[default]
    NoAction,
    /// Reject the delete immediately.
    Restrict,
    /// Delete referencing rows.
    Cascade,
    /// Null out the referencing column.
    SetNull,
}

impl OnDelete {
    /// SQL clause text.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
        }
    }
}

fn default_referenced_column() -> String {
    "id".to_string()
}

/// A single-column foreign key from the owning entity to another entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Relationship name, unique within the owning entity.
    pub name: String,

    /// Column on the owning entity that holds the reference.
    pub column: String,

    /// Name of the referenced entity.
    pub references: String,

    /// Column on the referenced entity. Defaults to `id`.
    #[serde(default = "default_referenced_column")]
    pub referenced_column: String,

    /// Delete behaviour.
    #[serde(default)]
    pub on_delete: OnDelete,
}

impl Relationship {
    /// A relationship to `references.id` with no delete action.
    pub fn new(
        name: impl Into<String>,
        column: impl Into<String>,
        references: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            references: references.into(),
            referenced_column: default_referenced_column(),
            on_delete: OnDelete::default(),
        }
    }

    /// Overrides the referenced column.
    pub fn referenced_column(mut self, column: impl Into<String>) -> Self {
        self.referenced_column = column.into();
        self
    }

    /// Sets the delete behaviour.
    pub fn on_delete(mut self, action: OnDelete) -> Self {
        self.on_delete = action;
        self
    }

    /// Constraint name used in DDL: `<entity>_<name>_fkey`.
    pub fn constraint_name(&self, entity: &str) -> String {
        format!("{entity}_{}_fkey", self.name)
    }
}

/// One entity (table) declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Table name.
    pub name: String,

    /// Columns in declaration order.
    #[serde(default, rename = "column")]
    pub columns: Vec<ColumnDef>,

    /// Outgoing foreign keys in declaration order.
    #[serde(default, rename = "relationship")]
    pub relationships: Vec<Relationship>,
}

impl EntityDef {
    /// An entity with no columns yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Appends a column.
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Appends a relationship.
    pub fn relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Looks up a column by name.
    pub fn find_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Looks up a relationship by name.
    pub fn find_relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// The primary key column, if one is declared.
    pub fn primary_key(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.primary_key)
    }
}

/// An unvalidated, serialisable list of entity declarations.
///
/// This is the on-disk form of a schema, both for the authored TOML source
/// and for the JSON snapshots stored next to each migration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    /// Entities in declaration order.
    #[serde(default, rename = "entity")]
    pub entities: Vec<EntityDef>,
}

impl SchemaSnapshot {
    /// A snapshot with no entities, i.e. an unmigrated database.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Looks up an entity by name.
    pub fn entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.iter().find(|e| e.name == name)
    }
}
