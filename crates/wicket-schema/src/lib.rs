//! Schema registry for the wicket data layer.
//!
//! Entities (tables), their columns, and the foreign-key relationships
//! between them are declared once, validated once, and then shared
//! read-only by everything that needs to know the shape of the database:
//! the migration pipeline diffs registry snapshots, and the query façade
//! binds typed entities against the registry before issuing SQL.
//!
//! # Declaring a schema
//!
//! Schemas are usually authored as TOML and versioned alongside the
//! migration artifacts generated from them:
//!
//! ```toml
//! [[entity]]
//! name = "products"
//!
//! [[entity.column]]
//! name = "id"
//! type = "serial"
//! primary_key = true
//!
//! [[entity.column]]
//! name = "category_id"
//! type = "bigint"
//!
//! [[entity.relationship]]
//! name = "category"
//! column = "category_id"
//! references = "categories"
//! ```
//!
//! The same structures can be built in code with [`EntityDef::new`] and the
//! [`ColumnDef`] builder methods.
//!
//! # Validation
//!
//! [`SchemaRegistry::new`] fails fast on any malformed declaration. A
//! registry that exists is internally consistent: every relationship points
//! at an existing, type-compatible, referenceable column.

mod entity;
mod error;
mod registry;

pub use entity::{ColumnDef, ColumnDefault, EntityDef, OnDelete, Relationship, SchemaSnapshot};
pub use error::SchemaError;
pub use registry::SchemaRegistry;
pub use wicket_types::{ColumnType, Value};
