#![allow(dead_code)]

use std::sync::Arc;

use serde::Deserialize;
use tempfile::TempDir;
use wicket_db::{
    apply, diff, open, resolve, Column, ColumnType, DatabaseConfig, Dialect, Entity, Executor,
    Migration, SchemaRegistry,
};
use wicket_schema::{ColumnDef, EntityDef, OnDelete, Relationship, SchemaSnapshot};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub category_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductColumn {
    Id,
    Name,
    Price,
    CategoryId,
}

impl Column for ProductColumn {
    const ALL: &'static [Self] = &[Self::Id, Self::Name, Self::Price, Self::CategoryId];

    fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Price => "price",
            Self::CategoryId => "category_id",
        }
    }

    fn column_type(self) -> ColumnType {
        match self {
            Self::Id => ColumnType::Serial,
            Self::Name => ColumnType::Text,
            Self::Price => ColumnType::Float,
            Self::CategoryId => ColumnType::BigInt,
        }
    }
}

impl Entity for Product {
    const NAME: &'static str = "products";
    type Column = ProductColumn;
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryColumn {
    Id,
    Name,
}

impl Column for CategoryColumn {
    const ALL: &'static [Self] = &[Self::Id, Self::Name];

    fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
        }
    }

    fn column_type(self) -> ColumnType {
        match self {
            Self::Id => ColumnType::Serial,
            Self::Name => ColumnType::Text,
        }
    }
}

impl Entity for Category {
    const NAME: &'static str = "categories";
    type Column = CategoryColumn;
}

pub fn shop_entities() -> Vec<EntityDef> {
    vec![
        EntityDef::new("categories")
            .column(ColumnDef::new("id", ColumnType::Serial).primary_key())
            .column(ColumnDef::new("name", ColumnType::Text).unique()),
        EntityDef::new("products")
            .column(ColumnDef::new("id", ColumnType::Serial).primary_key())
            .column(ColumnDef::new("name", ColumnType::Text).unique())
            .column(ColumnDef::new("price", ColumnType::Float))
            .column(ColumnDef::new("category_id", ColumnType::BigInt).nullable())
            .relationship(
                Relationship::new("category", "category_id", "categories")
                    .on_delete(OnDelete::Cascade),
            ),
    ]
}

pub fn shop_registry() -> Arc<SchemaRegistry> {
    Arc::new(SchemaRegistry::new(shop_entities()).expect("valid shop schema"))
}

/// A SQLite-backed executor in a fresh temporary directory.
pub fn sqlite_executor(registry: Arc<SchemaRegistry>) -> (TempDir, Executor) {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("shop.db").display());
    let descriptor = resolve(&DatabaseConfig::with_url(url)).expect("resolve sqlite url");
    let executor = open(&descriptor, registry).expect("open executor");
    (dir, executor)
}

/// The migration that creates `registry` from nothing.
pub fn initial_migration(registry: &SchemaRegistry) -> Migration {
    let declared = registry.snapshot();
    let changes = diff(&SchemaSnapshot::empty(), &declared);
    Migration::from_changes("0000_init", &changes, declared, Dialect::Sqlite)
        .expect("sqlite renders the initial schema")
}

/// A migrated SQLite database for the shop schema.
pub async fn migrated_shop() -> (TempDir, Executor) {
    let registry = shop_registry();
    let (dir, executor) = sqlite_executor(registry.clone());
    apply(&[initial_migration(&registry)], &executor)
        .await
        .expect("initial migration applies");
    (dir, executor)
}
