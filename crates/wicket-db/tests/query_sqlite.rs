mod common;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{
    initial_migration, migrated_shop, sqlite_executor, Category, CategoryColumn, Product,
    ProductColumn,
};
use serde::Deserialize;
use wicket_db::{
    apply, Column, ColumnType, Entity, ErrorKind, Filter, Order, QueryError, SchemaRegistry,
    Value, Values,
};
use wicket_schema::{ColumnDef, ColumnDefault, EntityDef};

#[tokio::test]
async fn insert_find_delete_round_trip() {
    let (_dir, executor) = migrated_shop().await;
    let products = executor.table::<Product>().expect("bind products");

    let bat = products
        .insert(
            &Values::new()
                .set(ProductColumn::Name, "Bat")
                .set(ProductColumn::Price, 49.99),
        )
        .await
        .expect("insert");
    assert!(bat.id > 0);
    assert_eq!(bat.name, "Bat");
    assert_eq!(bat.price, 49.99);
    assert_eq!(bat.category_id, None);

    let found = products
        .find(&Filter::new().eq(ProductColumn::Id, bat.id))
        .await
        .expect("find");
    assert_eq!(found, vec![bat.clone()]);

    let deleted = products
        .delete(&Filter::new().eq(ProductColumn::Id, bat.id))
        .await
        .expect("delete");
    assert_eq!(deleted, 1);

    let found = products
        .find(&Filter::new().eq(ProductColumn::Id, bat.id))
        .await
        .expect("find after delete");
    assert!(found.is_empty());
}

#[tokio::test]
async fn unique_violation_leaves_no_partial_row() {
    let (_dir, executor) = migrated_shop().await;
    let products = executor.table::<Product>().expect("bind products");
    let values = Values::new()
        .set(ProductColumn::Name, "Kookaburra Ghost")
        .set(ProductColumn::Price, 249.0);

    products.insert(&values).await.expect("first insert");
    let err = products.insert(&values).await.unwrap_err();
    assert!(matches!(
        err,
        QueryError::ConstraintViolation { ref constraint_code, .. } if constraint_code == "23505"
    ));
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);

    let count = products
        .count(&Filter::new().eq(ProductColumn::Name, "Kookaburra Ghost"))
        .await
        .expect("count");
    assert_eq!(count, 1);
}

#[tokio::test]
async fn unique_lookup_returns_one_or_not_found() {
    let (_dir, executor) = migrated_shop().await;
    let products = executor.table::<Product>().expect("bind products");
    products
        .insert(
            &Values::new()
                .set(ProductColumn::Name, "Pads")
                .set(ProductColumn::Price, 59.5),
        )
        .await
        .expect("insert");

    let pads = products
        .find_one(&Filter::new().eq(ProductColumn::Name, "Pads"))
        .await
        .expect("unique lookup");
    assert_eq!(pads.name, "Pads");

    let err = products
        .find_one(&Filter::new().eq(ProductColumn::Name, "Helmet"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let by_pk = products.find_by_pk(pads.id).await.expect("by pk");
    assert_eq!(by_pk, pads);
}

#[tokio::test]
async fn related_rows_follow_the_foreign_key() {
    let (_dir, executor) = migrated_shop().await;
    let categories = executor.table::<Category>().expect("bind categories");
    let products = executor.table::<Product>().expect("bind products");

    let bats = categories
        .insert(&Values::new().set(CategoryColumn::Name, "Bats"))
        .await
        .expect("insert category");
    let balls = categories
        .insert(&Values::new().set(CategoryColumn::Name, "Balls"))
        .await
        .expect("insert category");

    for (name, price, category) in [
        ("Gunn & Moore Diamond", 199.0, bats.id),
        ("Gray-Nicolls Legend", 329.0, bats.id),
        ("Dukes Special County", 24.0, balls.id),
    ] {
        products
            .insert(
                &Values::new()
                    .set(ProductColumn::Name, name)
                    .set(ProductColumn::Price, price)
                    .set(ProductColumn::CategoryId, category),
            )
            .await
            .expect("insert product");
    }

    let in_bats = products
        .find_related::<Category>(bats.id)
        .await
        .expect("related");
    let names: Vec<_> = in_bats.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Gunn & Moore Diamond", "Gray-Nicolls Legend"]);

    let err = categories
        .find_related::<Product>(1)
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::NoRelationship { .. }));

    // cascade removes the category's products
    categories
        .delete(&Filter::new().eq(CategoryColumn::Id, bats.id))
        .await
        .expect("delete category");
    assert_eq!(products.count(&Filter::new()).await.expect("count"), 1);
}

#[tokio::test]
async fn foreign_key_violation_is_a_constraint_error() {
    let (_dir, executor) = migrated_shop().await;
    let products = executor.table::<Product>().expect("bind products");
    let err = products
        .insert(
            &Values::new()
                .set(ProductColumn::Name, "Orphan")
                .set(ProductColumn::Price, 1.0)
                .set(ProductColumn::CategoryId, 999),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueryError::ConstraintViolation { ref constraint_code, .. } if constraint_code == "23503"
    ));
}

#[tokio::test]
async fn filters_order_and_page() {
    let (_dir, executor) = migrated_shop().await;
    let products = executor.table::<Product>().expect("bind products");
    for (name, price) in [("Grip", 6.0), ("Gloves", 45.0), ("Helmet", 89.0), ("Bag", 65.0)] {
        products
            .insert(
                &Values::new()
                    .set(ProductColumn::Name, name)
                    .set(ProductColumn::Price, price),
            )
            .await
            .expect("insert");
    }

    let page = products
        .find(
            &Filter::new()
                .ge(ProductColumn::Price, 40)
                .order_by(ProductColumn::Price, Order::Desc)
                .limit(2)
                .offset(1),
        )
        .await
        .expect("find");
    let names: Vec<_> = page.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Bag", "Gloves"]);

    let like = products
        .find(&Filter::new().like(ProductColumn::Name, "G%").order_by(ProductColumn::Name, Order::Asc))
        .await
        .expect("like");
    let names: Vec<_> = like.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Gloves", "Grip"]);

    let any = products
        .count(&Filter::new().any_of(ProductColumn::Name, ["Bag", "Helmet", "Stumps"]))
        .await
        .expect("count");
    assert_eq!(any, 2);

    let uncategorised = products
        .count(&Filter::new().is_null(ProductColumn::CategoryId))
        .await
        .expect("count");
    assert_eq!(uncategorised, 4);

    let changed = products
        .update(
            &Filter::new().lt(ProductColumn::Price, 50.0),
            &Values::new().set(ProductColumn::Price, Value::Float(50.0)),
        )
        .await
        .expect("update");
    assert_eq!(changed, 2);
    assert_eq!(
        products
            .count(&Filter::new().eq(ProductColumn::Price, 50.0))
            .await
            .expect("count"),
        2
    );
}

#[tokio::test]
async fn batch_is_all_or_nothing() {
    let (_dir, executor) = migrated_shop().await;
    let products = executor.table::<Product>().expect("bind products");
    let insert = |name: &str| {
        products
            .insert_statement(
                &Values::new()
                    .set(ProductColumn::Name, name)
                    .set(ProductColumn::Price, 10.0),
            )
            .expect("statement")
    };

    let mut batch = executor.batch();
    batch.push(insert("Stumps")).push(insert("Bails"));
    assert_eq!(batch.run().await.expect("batch"), vec![1, 1]);

    let mut batch = executor.batch();
    batch.push(insert("Scorebook")).push(insert("Stumps"));
    let err = batch.run().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);

    assert_eq!(products.count(&Filter::new()).await.expect("count"), 2);
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Innings {
    id: i64,
    started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InningsColumn {
    Id,
    StartedAt,
}

impl Column for InningsColumn {
    const ALL: &'static [Self] = &[Self::Id, Self::StartedAt];

    fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::StartedAt => "started_at",
        }
    }

    fn column_type(self) -> ColumnType {
        match self {
            Self::Id => ColumnType::Serial,
            Self::StartedAt => ColumnType::Timestamp,
        }
    }
}

impl Entity for Innings {
    const NAME: &'static str = "innings";
    type Column = InningsColumn;
}

#[tokio::test]
async fn defaulted_timestamps_compare_with_bound_values() {
    let registry = Arc::new(
        SchemaRegistry::new(vec![EntityDef::new("innings")
            .column(ColumnDef::new("id", ColumnType::Serial).primary_key())
            .column(
                ColumnDef::new("started_at", ColumnType::Timestamp)
                    .default_value(ColumnDefault::Now),
            )])
        .expect("valid schema"),
    );
    let (_dir, executor) = sqlite_executor(registry.clone());
    apply(&[initial_migration(&registry)], &executor)
        .await
        .expect("migrate");
    let innings = executor.table::<Innings>().expect("bind innings");

    let row = innings.insert(&Values::new()).await.expect("insert");
    let at = row.started_at;

    for filter in [
        Filter::new().eq(InningsColumn::StartedAt, at),
        Filter::new().le(InningsColumn::StartedAt, at),
        Filter::new().ge(InningsColumn::StartedAt, at),
    ] {
        assert_eq!(innings.find(&filter).await.expect("find"), vec![row.clone()]);
    }
    assert_eq!(
        innings
            .count(&Filter::new().lt(InningsColumn::StartedAt, at))
            .await
            .expect("count"),
        0
    );
}
