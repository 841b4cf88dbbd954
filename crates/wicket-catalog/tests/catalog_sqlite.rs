use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use wicket_catalog::{registry, Catalog, CategoryColumn, ProductColumn, VariantColumn};
use wicket_db::{
    apply, open, resolve, DatabaseConfig, Dialect, ErrorKind, Filter, MigrationStore, Value,
    Values,
};

struct Shop {
    _dir: TempDir,
    catalog: Catalog,
}

/// Generates the catalog migrations, applies them to a fresh SQLite file,
/// and seeds a small catalog.
async fn shop() -> Shop {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = Arc::new(registry().expect("catalog schema"));

    let store = MigrationStore::new(dir.path().join("migrations"), Dialect::Sqlite);
    store
        .generate(&registry.snapshot(), "init")
        .expect("generate")
        .expect("initial migration");
    let migrations = store.load().expect("load");

    let url = format!("sqlite://{}", dir.path().join("shop.db").display());
    let descriptor = resolve(&DatabaseConfig::with_url(url)).expect("resolve");
    let executor = open(&descriptor, registry).expect("open");
    apply(&migrations, &executor).await.expect("apply");

    let catalog = Catalog::new(&executor).expect("bind catalog");
    seed(&catalog).await;
    Shop { _dir: dir, catalog }
}

async fn seed(catalog: &Catalog) {
    let categories = catalog.categories();
    let mut ids = Vec::new();
    for (slug, name, order) in [
        ("bats", "Bats", 1),
        ("balls", "Balls", 2),
        ("protective", "Protective Gear", 0),
    ] {
        let category = categories
            .insert(
                &Values::new()
                    .set(CategoryColumn::Slug, slug)
                    .set(CategoryColumn::Name, name)
                    .set(CategoryColumn::SortOrder, order),
            )
            .await
            .expect("insert category");
        ids.push(category.id);
    }

    let products = catalog.products();
    for (slug, name, price, featured, category) in [
        ("gm-diamond", "Gunn & Moore Diamond", 199.0, true, Some(ids[0])),
        ("gn-legend", "Gray-Nicolls Legend", 329.0, false, Some(ids[0])),
        ("dukes-county", "Dukes Special County", 24.0, true, Some(ids[1])),
        ("gift-card", "Gift Card", 50.0, false, None),
    ] {
        products
            .insert(
                &Values::new()
                    .set(ProductColumn::Slug, slug)
                    .set(ProductColumn::Name, name)
                    .set(ProductColumn::Price, price)
                    .set(ProductColumn::Featured, featured)
                    .set(
                        ProductColumn::CategoryId,
                        category.map_or(Value::Null, Value::Int),
                    )
                    .set(
                        ProductColumn::Attributes,
                        json!({"willow": "english", "grade": 1}),
                    ),
            )
            .await
            .expect("insert product");
    }

    let diamond = catalog
        .product_by_slug("gm-diamond")
        .await
        .expect("diamond exists");
    for (sku, label, price, stock) in [
        ("GM-DIA-SH", "Short Handle", None, 4),
        ("GM-DIA-LH", "Long Handle", Some(209.0), 0),
    ] {
        catalog
            .variants()
            .insert(
                &Values::new()
                    .set(VariantColumn::ProductId, diamond.id)
                    .set(VariantColumn::Sku, sku)
                    .set(VariantColumn::Label, label)
                    .set(VariantColumn::Price, price.map_or(Value::Null, Value::Float))
                    .set(VariantColumn::Stock, stock),
            )
            .await
            .expect("insert variant");
    }
}

#[tokio::test]
async fn categories_come_in_navigation_order() {
    let shop = shop().await;
    let slugs: Vec<_> = shop
        .catalog
        .list_categories()
        .await
        .expect("list")
        .into_iter()
        .map(|c| c.slug)
        .collect();
    assert_eq!(slugs, ["protective", "bats", "balls"]);
}

#[tokio::test]
async fn carousel_shows_featured_products() {
    let shop = shop().await;
    let featured = shop.catalog.featured_products(8).await.expect("featured");
    assert_eq!(featured.len(), 2);
    assert!(featured.iter().all(|p| p.featured));
    // inserts can share a timestamp; ids break the tie
    assert_eq!(featured[0].slug, "dukes-county");
    assert_eq!(
        featured[0].attributes,
        Some(json!({"willow": "english", "grade": 1}))
    );

    let one = shop.catalog.featured_products(1).await.expect("featured");
    assert_eq!(one.len(), 1);
}

#[tokio::test]
async fn category_listing_and_missing_category() {
    let shop = shop().await;
    let bats = shop
        .catalog
        .products_in_category("bats")
        .await
        .expect("bats");
    let names: Vec<_> = bats.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Gunn & Moore Diamond", "Gray-Nicolls Legend"]);

    let err = shop
        .catalog
        .products_in_category("stumps")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn product_detail_gathers_category_and_variants() {
    let shop = shop().await;
    let detail = shop
        .catalog
        .product_detail("gm-diamond")
        .await
        .expect("detail");
    assert_eq!(detail.category.map(|c| c.slug).as_deref(), Some("bats"));
    assert_eq!(detail.variants.len(), 2);

    let short = &detail.variants[0];
    assert_eq!(short.sku, "GM-DIA-SH");
    assert_eq!(short.effective_price(&detail.product), 199.0);
    assert!(short.in_stock());
    let long = &detail.variants[1];
    assert_eq!(long.effective_price(&detail.product), 209.0);
    assert!(!long.in_stock());

    let gift = shop
        .catalog
        .product_detail("gift-card")
        .await
        .expect("detail");
    assert!(gift.category.is_none());
    assert!(gift.variants.is_empty());

    let err = shop.catalog.product_detail("no-such-bat").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn deleting_a_category_keeps_its_products() {
    let shop = shop().await;
    let categories = shop.catalog.categories();
    categories
        .delete(&Filter::new().eq(CategoryColumn::Slug, "balls"))
        .await
        .expect("delete");

    let ball = shop
        .catalog
        .product_by_slug("dukes-county")
        .await
        .expect("product survives");
    assert_eq!(ball.category_id, None);
}

#[tokio::test]
async fn deleting_a_product_removes_its_variants() {
    let shop = shop().await;
    let diamond = shop
        .catalog
        .product_by_slug("gm-diamond")
        .await
        .expect("diamond");
    shop.catalog
        .products()
        .delete(&Filter::new().eq(ProductColumn::Id, diamond.id))
        .await
        .expect("delete");

    assert!(shop
        .catalog
        .variants_for_product(diamond.id)
        .await
        .expect("variants")
        .is_empty());
}
