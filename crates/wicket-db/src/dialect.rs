//! SQL rendering for the supported backends.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wicket_schema::{ColumnDef, ColumnDefault, EntityDef, Relationship};
use wicket_types::{quote_ident, ColumnType};

use crate::migrations::{MigrationError, SchemaChange};

/// Name of the table that records applied migrations.
pub const MIGRATIONS_TABLE: &str = "__wicket_migrations";

/// SQLite expression producing the current UTC time in RFC 3339 form.
/// Padded to microseconds so stored defaults compare as text against bound
/// timestamps, which are always written with six fractional digits.
const SQLITE_NOW: &str = "(strftime('%Y-%m-%dT%H:%M:%f', 'now') || '000Z')";

/// The SQL dialect a backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Postgres, reached over the HTTP SQL endpoint.
    #[serde(alias = "postgresql")]
    Postgres,
    /// SQLite, used for local development and tests.
    Sqlite,
}

/// A dialect name that is neither `postgres` nor `sqlite`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown dialect '{0}' (expected postgres or sqlite)")]
pub struct ParseDialectError(String);

impl FromStr for Dialect {
    type Err = ParseDialectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ParseDialectError(other.to_string())),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        })
    }
}

impl Dialect {
    /// Renders `changes` into executable statements, in order.
    ///
    /// For SQLite, foreign keys of tables created by the same change list
    /// are folded into their `CREATE TABLE` statements, since SQLite cannot
    /// add a constraint to an existing table.
    ///
    /// # Errors
    ///
    /// Returns [`MigrationError::Unsupported`] for a change the dialect
    /// cannot express.
    pub fn render(self, changes: &[SchemaChange]) -> Result<Vec<String>, MigrationError> {
        let created: HashSet<&str> = changes
            .iter()
            .filter_map(|change| match change {
                SchemaChange::CreateTable { entity } => Some(entity.name.as_str()),
                _ => None,
            })
            .collect();

        let mut statements = Vec::with_capacity(changes.len());
        for change in changes {
            match (self, change) {
                (_, SchemaChange::CreateTable { entity }) => {
                    statements.push(self.create_table(entity, false));
                }
                (_, SchemaChange::AddColumn { table, column }) => {
                    statements.push(self.add_column(table, column)?);
                }
                (Self::Postgres, SchemaChange::AlterColumn { table, from, to }) => {
                    statements.extend(alter_column_postgres(table, from, to)?);
                }
                (Self::Postgres, SchemaChange::AddForeignKey { table, relationship }) => {
                    statements.push(format!(
                        "ALTER TABLE {} ADD {}",
                        quote_ident(table),
                        foreign_key_clause(table, relationship)
                    ));
                }
                (Self::Sqlite, SchemaChange::AddForeignKey { table, .. })
                    if created.contains(table.as_str()) => {}
                (Self::Postgres, SchemaChange::DropForeignKey { table, relationship }) => {
                    statements.push(format!(
                        "ALTER TABLE {} DROP CONSTRAINT {}",
                        quote_ident(table),
                        quote_ident(&relationship.constraint_name(table))
                    ));
                }
                (Self::Sqlite, SchemaChange::DropColumn { column, .. })
                    if column.primary_key || column.unique =>
                {
                    return Err(self.unsupported(change));
                }
                (_, SchemaChange::DropColumn { table, column }) => {
                    statements.push(format!(
                        "ALTER TABLE {} DROP COLUMN {}",
                        quote_ident(table),
                        quote_ident(&column.name)
                    ));
                }
                (_, SchemaChange::DropTable { table }) => {
                    statements.push(format!("DROP TABLE {}", quote_ident(table)));
                }
                (Self::Sqlite, unsupported) => return Err(self.unsupported(unsupported)),
            }
        }
        Ok(statements)
    }

    /// `CREATE TABLE IF NOT EXISTS` for the migration tracking table.
    pub fn tracking_table_sql(self) -> String {
        let applied_at = ColumnDef::new("applied_at", ColumnType::Timestamp)
            .default_value(ColumnDefault::Now);
        let entity = EntityDef::new(MIGRATIONS_TABLE)
            .column(ColumnDef::new("id", ColumnType::Serial).primary_key())
            .column(ColumnDef::new("name", ColumnType::Text).unique())
            .column(ColumnDef::new("checksum", ColumnType::Text))
            .column(ColumnDef::new("snapshot", ColumnType::Text))
            .column(applied_at);
        self.create_table(&entity, true)
    }

    /// SQL type for a column declaration.
    pub fn column_type(self, column: &ColumnDef) -> &'static str {
        match self {
            Self::Postgres => match column.ty {
                ColumnType::Serial => "BIGSERIAL",
                ColumnType::BigInt => "BIGINT",
                ColumnType::Integer => "INTEGER",
                ColumnType::Float => "DOUBLE PRECISION",
                ColumnType::Text => "TEXT",
                ColumnType::Boolean => "BOOLEAN",
                ColumnType::Timestamp => "TIMESTAMPTZ",
                ColumnType::Json => "JSONB",
            },
            Self::Sqlite => match column.ty {
                ColumnType::Serial | ColumnType::BigInt | ColumnType::Integer => "INTEGER",
                ColumnType::Float => "REAL",
                ColumnType::Boolean => "BOOLEAN",
                ColumnType::Text | ColumnType::Timestamp | ColumnType::Json => "TEXT",
            },
        }
    }

    /// SQL expression for a column default.
    pub fn default_sql(self, default: &ColumnDefault) -> String {
        match (self, default) {
            (Self::Postgres, ColumnDefault::Now) => "now()".to_string(),
            (Self::Sqlite, ColumnDefault::Now) => SQLITE_NOW.to_string(),
            (Self::Postgres, ColumnDefault::Bool(v)) => v.to_string(),
            (Self::Sqlite, ColumnDefault::Bool(v)) => i64::from(*v).to_string(),
            (_, ColumnDefault::Int(v)) => v.to_string(),
            (_, ColumnDefault::Float(v)) => format!("{v:?}"),
            (_, ColumnDefault::Text(v)) => format!("'{}'", v.replace('\'', "''")),
        }
    }

    fn column_definition(self, column: &ColumnDef) -> String {
        let mut sql = format!("{} {}", quote_ident(&column.name), self.column_type(column));
        if column.primary_key {
            sql.push_str(" PRIMARY KEY");
            if self == Self::Sqlite && column.ty == ColumnType::Serial {
                sql.push_str(" AUTOINCREMENT");
            }
        } else {
            if !column.nullable {
                sql.push_str(" NOT NULL");
            }
            if column.unique {
                sql.push_str(" UNIQUE");
            }
        }
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.default_sql(default));
        }
        sql
    }

    fn create_table(self, entity: &EntityDef, if_not_exists: bool) -> String {
        let mut lines: Vec<String> = entity
            .columns
            .iter()
            .map(|column| self.column_definition(column))
            .collect();
        if self == Self::Sqlite {
            lines.extend(
                entity
                    .relationships
                    .iter()
                    .map(|relationship| foreign_key_clause(&entity.name, relationship)),
            );
        }

        format!(
            "CREATE TABLE {}{} (\n\t{}\n)",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            quote_ident(&entity.name),
            lines.join(",\n\t")
        )
    }

    fn add_column(self, table: &str, column: &ColumnDef) -> Result<String, MigrationError> {
        if self == Self::Sqlite {
            let constrained = column.primary_key || column.unique;
            let needs_backfill = !column.nullable && column.default.is_none();
            if constrained || needs_backfill || column.default == Some(ColumnDefault::Now) {
                return Err(self.unsupported(&SchemaChange::AddColumn {
                    table: table.to_string(),
                    column: column.clone(),
                }));
            }
        }
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_ident(table),
            self.column_definition(column)
        ))
    }

    fn unsupported(self, change: &SchemaChange) -> MigrationError {
        MigrationError::Unsupported {
            dialect: self,
            change: change.describe(),
        }
    }
}

fn foreign_key_clause(table: &str, relationship: &Relationship) -> String {
    format!(
        "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({}) ON DELETE {}",
        quote_ident(&relationship.constraint_name(table)),
        quote_ident(&relationship.column),
        quote_ident(&relationship.references),
        quote_ident(&relationship.referenced_column),
        relationship.on_delete.as_sql()
    )
}

fn alter_column_postgres(
    table: &str,
    from: &ColumnDef,
    to: &ColumnDef,
) -> Result<Vec<String>, MigrationError> {
    let serial_changed =
        from.ty != to.ty && (from.ty == ColumnType::Serial || to.ty == ColumnType::Serial);
    if from.primary_key != to.primary_key || serial_changed {
        return Err(MigrationError::Unsupported {
            dialect: Dialect::Postgres,
            change: format!("change key or serial type of {table}.{}", to.name),
        });
    }

    let prefix = format!(
        "ALTER TABLE {} ALTER COLUMN {}",
        quote_ident(table),
        quote_ident(&to.name)
    );
    let mut statements = Vec::new();

    if from.ty != to.ty {
        let ty = Dialect::Postgres.column_type(to);
        statements.push(format!(
            "{prefix} SET DATA TYPE {ty} USING {}::{ty}",
            quote_ident(&to.name)
        ));
    }
    if from.nullable != to.nullable && !to.primary_key {
        let action = if to.nullable { "DROP" } else { "SET" };
        statements.push(format!("{prefix} {action} NOT NULL"));
    }
    if from.default != to.default {
        statements.push(match &to.default {
            Some(default) => format!(
                "{prefix} SET DEFAULT {}",
                Dialect::Postgres.default_sql(default)
            ),
            None => format!("{prefix} DROP DEFAULT"),
        });
    }
    if from.unique != to.unique && !to.primary_key {
        let constraint = quote_ident(&format!("{table}_{}_key", to.name));
        statements.push(if to.unique {
            format!(
                "ALTER TABLE {} ADD CONSTRAINT {constraint} UNIQUE ({})",
                quote_ident(table),
                quote_ident(&to.name)
            )
        } else {
            format!(
                "ALTER TABLE {} DROP CONSTRAINT {constraint}",
                quote_ident(table)
            )
        });
    }

    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wicket_schema::OnDelete;

    fn products() -> EntityDef {
        EntityDef::new("products")
            .column(ColumnDef::new("id", ColumnType::Serial).primary_key())
            .column(ColumnDef::new("name", ColumnType::Text))
            .column(ColumnDef::new("slug", ColumnType::Text).unique())
            .column(ColumnDef::new("price", ColumnType::Float))
            .column(
                ColumnDef::new("featured", ColumnType::Boolean)
                    .default_value(ColumnDefault::Bool(false)),
            )
            .column(ColumnDef::new("category_id", ColumnType::BigInt).nullable())
            .relationship(
                Relationship::new("category", "category_id", "categories")
                    .on_delete(OnDelete::SetNull),
            )
    }

    fn create_with_fk() -> Vec<SchemaChange> {
        let entity = products();
        let relationship = entity.relationships[0].clone();
        vec![
            SchemaChange::CreateTable { entity },
            SchemaChange::AddForeignKey {
                table: "products".into(),
                relationship,
            },
        ]
    }

    #[test]
    fn dialect_names_parse() {
        assert_eq!("postgres".parse::<Dialect>(), Ok(Dialect::Postgres));
        assert_eq!("PostgreSQL".parse::<Dialect>(), Ok(Dialect::Postgres));
        assert_eq!("sqlite".parse::<Dialect>(), Ok(Dialect::Sqlite));
        assert!("mysql".parse::<Dialect>().is_err());
        assert_eq!(
            serde_json::from_str::<Dialect>("\"postgresql\"").expect("alias"),
            Dialect::Postgres
        );
        assert_eq!(Dialect::Sqlite.to_string(), "sqlite");
    }

    #[test]
    fn postgres_adds_foreign_keys_separately() {
        let statements = Dialect::Postgres
            .render(&create_with_fk())
            .expect("renders");
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0],
            "CREATE TABLE \"products\" (\n\
             \t\"id\" BIGSERIAL PRIMARY KEY,\n\
             \t\"name\" TEXT NOT NULL,\n\
             \t\"slug\" TEXT NOT NULL UNIQUE,\n\
             \t\"price\" DOUBLE PRECISION NOT NULL,\n\
             \t\"featured\" BOOLEAN NOT NULL DEFAULT false,\n\
             \t\"category_id\" BIGINT\n\
             )"
        );
        assert_eq!(
            statements[1],
            "ALTER TABLE \"products\" ADD CONSTRAINT \"products_category_fkey\" \
             FOREIGN KEY (\"category_id\") REFERENCES \"categories\"(\"id\") ON DELETE SET NULL"
        );
    }

    #[test]
    fn sqlite_folds_foreign_keys_into_create_table() {
        let statements = Dialect::Sqlite.render(&create_with_fk()).expect("renders");
        assert_eq!(statements.len(), 1);
        assert!(statements[0].contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(statements[0].contains("\"featured\" BOOLEAN NOT NULL DEFAULT 0"));
        assert!(statements[0].contains(
            "CONSTRAINT \"products_category_fkey\" FOREIGN KEY (\"category_id\") \
             REFERENCES \"categories\"(\"id\") ON DELETE SET NULL"
        ));
    }

    #[test]
    fn sqlite_rejects_changes_it_cannot_express() {
        let relationship = products().relationships[0].clone();
        let err = Dialect::Sqlite
            .render(&[SchemaChange::AddForeignKey {
                table: "products".into(),
                relationship,
            }])
            .unwrap_err();
        assert!(matches!(
            err,
            MigrationError::Unsupported {
                dialect: Dialect::Sqlite,
                ..
            }
        ));

        let err = Dialect::Sqlite
            .render(&[SchemaChange::AddColumn {
                table: "products".into(),
                column: ColumnDef::new("sku", ColumnType::Text),
            }])
            .unwrap_err();
        assert!(matches!(err, MigrationError::Unsupported { .. }));

        let nullable = Dialect::Sqlite
            .render(&[SchemaChange::AddColumn {
                table: "products".into(),
                column: ColumnDef::new("sku", ColumnType::Text).nullable(),
            }])
            .expect("nullable column can be added");
        assert_eq!(
            nullable,
            ["ALTER TABLE \"products\" ADD COLUMN \"sku\" TEXT"]
        );
    }

    #[test]
    fn sqlite_drops_only_unconstrained_columns() {
        let drop = |column: ColumnDef| SchemaChange::DropColumn {
            table: "products".into(),
            column,
        };

        let statements = Dialect::Sqlite
            .render(&[drop(ColumnDef::new("price", ColumnType::Float))])
            .expect("plain column can be dropped");
        assert_eq!(statements, ["ALTER TABLE \"products\" DROP COLUMN \"price\""]);

        for constrained in [
            ColumnDef::new("slug", ColumnType::Text).unique(),
            ColumnDef::new("id", ColumnType::Serial).primary_key(),
        ] {
            let err = Dialect::Sqlite.render(&[drop(constrained)]).unwrap_err();
            assert!(matches!(
                err,
                MigrationError::Unsupported {
                    dialect: Dialect::Sqlite,
                    ..
                }
            ));
        }

        let statements = Dialect::Postgres
            .render(&[drop(ColumnDef::new("slug", ColumnType::Text).unique())])
            .expect("postgres drops the constraint with the column");
        assert_eq!(statements, ["ALTER TABLE \"products\" DROP COLUMN \"slug\""]);
    }

    #[test]
    fn postgres_alter_column_emits_one_statement_per_aspect() {
        let from = ColumnDef::new("stock", ColumnType::Integer);
        let to = ColumnDef::new("stock", ColumnType::BigInt)
            .nullable()
            .default_value(ColumnDefault::Int(0));
        let statements = Dialect::Postgres
            .render(&[SchemaChange::AlterColumn {
                table: "variants".into(),
                from,
                to,
            }])
            .expect("renders");
        assert_eq!(
            statements,
            [
                "ALTER TABLE \"variants\" ALTER COLUMN \"stock\" SET DATA TYPE BIGINT USING \"stock\"::BIGINT",
                "ALTER TABLE \"variants\" ALTER COLUMN \"stock\" DROP NOT NULL",
                "ALTER TABLE \"variants\" ALTER COLUMN \"stock\" SET DEFAULT 0",
            ]
        );
    }

    #[test]
    fn text_defaults_are_escaped() {
        assert_eq!(
            Dialect::Postgres.default_sql(&ColumnDefault::Text("o'clock".into())),
            "'o''clock'"
        );
        assert_eq!(Dialect::Sqlite.default_sql(&ColumnDefault::Float(1.0)), "1.0");
    }

    #[test]
    fn tracking_table_is_idempotent_ddl() {
        let sql = Dialect::Postgres.tracking_table_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"__wicket_migrations\""));
        assert!(sql.contains("\"name\" TEXT NOT NULL UNIQUE"));
        assert!(sql.contains("\"applied_at\" TIMESTAMPTZ NOT NULL DEFAULT now()"));

        let sql = Dialect::Sqlite.tracking_table_sql();
        assert!(sql.contains("DEFAULT (strftime('%Y-%m-%dT%H:%M:%f', 'now') || '000Z')"));
    }
}
