//! The storefront catalog: its declared schema, typed entities, and the
//! read helpers pages use.
//!
//! ```ignore
//! let registry = Arc::new(wicket_catalog::registry()?);
//! let executor = wicket_db::open(&descriptor, registry)?;
//! let catalog = Catalog::new(&executor)?;
//! let carousel = catalog.featured_products(8).await?;
//! ```

mod entities;

use wicket_db::{Executor, Filter, Order, QueryError, SchemaError, SchemaRegistry, Table};

pub use entities::{Category, CategoryColumn, Product, ProductColumn, Variant, VariantColumn};

/// TOML source of the catalog schema.
pub const SCHEMA_TOML: &str = include_str!("../schema.toml");

/// Parses and validates the catalog schema.
///
/// # Errors
///
/// Returns a [`SchemaError`] if `schema.toml` is malformed.
pub fn registry() -> Result<SchemaRegistry, SchemaError> {
    SchemaRegistry::from_toml(SCHEMA_TOML)
}

/// A product with what its detail page shows alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDetail {
    pub product: Product,
    pub category: Option<Category>,
    pub variants: Vec<Variant>,
}

/// Bound catalog tables.
#[derive(Debug, Clone)]
pub struct Catalog {
    categories: Table<Category>,
    products: Table<Product>,
    variants: Table<Variant>,
}

impl Catalog {
    /// Binds the catalog entities on `executor`.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] if the executor's registry does not
    /// declare the catalog tables as the entities expect.
    pub fn new(executor: &Executor) -> Result<Self, SchemaError> {
        Ok(Self {
            categories: executor.table()?,
            products: executor.table()?,
            variants: executor.table()?,
        })
    }

    pub fn categories(&self) -> &Table<Category> {
        &self.categories
    }

    pub fn products(&self) -> &Table<Product> {
        &self.products
    }

    pub fn variants(&self) -> &Table<Variant> {
        &self.variants
    }

    /// All categories in navigation order.
    pub async fn list_categories(&self) -> Result<Vec<Category>, QueryError> {
        self.categories
            .find(
                &Filter::new()
                    .order_by(CategoryColumn::SortOrder, Order::Asc)
                    .order_by(CategoryColumn::Name, Order::Asc),
            )
            .await
    }

    /// Newest featured products, for the home page carousel.
    pub async fn featured_products(&self, limit: u64) -> Result<Vec<Product>, QueryError> {
        self.products
            .find(
                &Filter::new()
                    .eq(ProductColumn::Featured, true)
                    .order_by(ProductColumn::CreatedAt, Order::Desc)
                    .order_by(ProductColumn::Id, Order::Desc)
                    .limit(limit),
            )
            .await
    }

    /// Products in the category with `slug`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NotFound`] if no category has that slug.
    pub async fn products_in_category(&self, slug: &str) -> Result<Vec<Product>, QueryError> {
        let category = self
            .categories
            .find_one(&Filter::new().eq(CategoryColumn::Slug, slug))
            .await?;
        tracing::debug!(category = %category.slug, "listing category");
        self.products.find_related::<Category>(category.id).await
    }

    /// The product with `slug`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NotFound`] if no product has that slug.
    pub async fn product_by_slug(&self, slug: &str) -> Result<Product, QueryError> {
        self.products
            .find_one(&Filter::new().eq(ProductColumn::Slug, slug))
            .await
    }

    /// Variants of a product, in creation order.
    pub async fn variants_for_product(&self, product_id: i64) -> Result<Vec<Variant>, QueryError> {
        self.variants.find_related::<Product>(product_id).await
    }

    /// Everything the product page renders for `slug`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NotFound`] if no product has that slug.
    pub async fn product_detail(&self, slug: &str) -> Result<ProductDetail, QueryError> {
        let product = self.product_by_slug(slug).await?;
        let category = match product.category_id {
            Some(id) => Some(self.categories.find_by_pk(id).await?),
            None => None,
        };
        let variants = self.variants_for_product(product.id).await?;
        Ok(ProductDetail {
            product,
            category,
            variants,
        })
    }
}
