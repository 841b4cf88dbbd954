//! Typed rows for the catalog tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wicket_db::{Column, ColumnType, Entity};

/// A product category shown in navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryColumn {
    Id,
    Slug,
    Name,
    Description,
    SortOrder,
}

impl Column for CategoryColumn {
    const ALL: &'static [Self] = &[
        Self::Id,
        Self::Slug,
        Self::Name,
        Self::Description,
        Self::SortOrder,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Slug => "slug",
            Self::Name => "name",
            Self::Description => "description",
            Self::SortOrder => "sort_order",
        }
    }

    fn column_type(self) -> ColumnType {
        match self {
            Self::Id => ColumnType::Serial,
            Self::Slug | Self::Name | Self::Description => ColumnType::Text,
            Self::SortOrder => ColumnType::Integer,
        }
    }
}

impl Entity for Category {
    const NAME: &'static str = "categories";
    type Column = CategoryColumn;
}

/// A product listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    /// Base price; variants may override it.
    pub price: f64,
    pub image_url: Option<String>,
    /// Shown in the home page carousel.
    pub featured: bool,
    /// Free-form specs (weight, willow grade, size chart).
    pub attributes: Option<serde_json::Value>,
    pub category_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductColumn {
    Id,
    Slug,
    Name,
    Description,
    Price,
    ImageUrl,
    Featured,
    Attributes,
    CategoryId,
    CreatedAt,
}

impl Column for ProductColumn {
    const ALL: &'static [Self] = &[
        Self::Id,
        Self::Slug,
        Self::Name,
        Self::Description,
        Self::Price,
        Self::ImageUrl,
        Self::Featured,
        Self::Attributes,
        Self::CategoryId,
        Self::CreatedAt,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Slug => "slug",
            Self::Name => "name",
            Self::Description => "description",
            Self::Price => "price",
            Self::ImageUrl => "image_url",
            Self::Featured => "featured",
            Self::Attributes => "attributes",
            Self::CategoryId => "category_id",
            Self::CreatedAt => "created_at",
        }
    }

    fn column_type(self) -> ColumnType {
        match self {
            Self::Id => ColumnType::Serial,
            Self::Slug | Self::Name | Self::Description | Self::ImageUrl => ColumnType::Text,
            Self::Price => ColumnType::Float,
            Self::Featured => ColumnType::Boolean,
            Self::Attributes => ColumnType::Json,
            Self::CategoryId => ColumnType::BigInt,
            Self::CreatedAt => ColumnType::Timestamp,
        }
    }
}

impl Entity for Product {
    const NAME: &'static str = "products";
    type Column = ProductColumn;
}

/// A purchasable variant of a product (size, handle length, weight).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: i64,
    pub product_id: i64,
    pub sku: String,
    pub label: String,
    pub price: Option<f64>,
    pub stock: i32,
}

impl Variant {
    /// The variant's own price, or the product's when it has none.
    pub fn effective_price(&self, product: &Product) -> f64 {
        self.price.unwrap_or(product.price)
    }

    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantColumn {
    Id,
    ProductId,
    Sku,
    Label,
    Price,
    Stock,
}

impl Column for VariantColumn {
    const ALL: &'static [Self] = &[
        Self::Id,
        Self::ProductId,
        Self::Sku,
        Self::Label,
        Self::Price,
        Self::Stock,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::ProductId => "product_id",
            Self::Sku => "sku",
            Self::Label => "label",
            Self::Price => "price",
            Self::Stock => "stock",
        }
    }

    fn column_type(self) -> ColumnType {
        match self {
            Self::Id => ColumnType::Serial,
            Self::ProductId => ColumnType::BigInt,
            Self::Sku | Self::Label => ColumnType::Text,
            Self::Price => ColumnType::Float,
            Self::Stock => ColumnType::Integer,
        }
    }
}

impl Entity for Variant {
    const NAME: &'static str = "variants";
    type Column = VariantColumn;
}
