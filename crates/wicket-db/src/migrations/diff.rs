//! Structural diff between two schema snapshots.

use serde::Serialize;
use wicket_schema::{ColumnDef, EntityDef, Relationship, SchemaSnapshot};

/// One structural change needed to move a database from one schema to
/// another.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaChange {
    /// Create a table with all of its columns. Foreign keys are added by
    /// separate [`SchemaChange::AddForeignKey`] changes.
    CreateTable {
        /// The entity to create.
        entity: EntityDef,
    },
    /// Add a column to an existing table.
    AddColumn {
        /// Table name.
        table: String,
        /// The new column.
        column: ColumnDef,
    },
    /// Change type, nullability, default, or key flags of a column.
    AlterColumn {
        /// Table name.
        table: String,
        /// Current declaration.
        from: ColumnDef,
        /// Target declaration.
        to: ColumnDef,
    },
    /// Add a foreign key constraint.
    AddForeignKey {
        /// Owning table.
        table: String,
        /// The relationship to enforce.
        relationship: Relationship,
    },
    /// Drop a foreign key constraint.
    DropForeignKey {
        /// Owning table.
        table: String,
        /// The relationship being removed.
        relationship: Relationship,
    },
    /// Drop a column.
    DropColumn {
        /// Table name.
        table: String,
        /// The column as currently declared.
        column: ColumnDef,
    },
    /// Drop a table.
    DropTable {
        /// Table name.
        table: String,
    },
}

impl SchemaChange {
    /// The table this change touches.
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable { entity } => &entity.name,
            Self::AddColumn { table, .. }
            | Self::AlterColumn { table, .. }
            | Self::AddForeignKey { table, .. }
            | Self::DropForeignKey { table, .. }
            | Self::DropColumn { table, .. }
            | Self::DropTable { table } => table,
        }
    }

    /// One-line human description.
    pub fn describe(&self) -> String {
        match self {
            Self::CreateTable { entity } => format!("create table {}", entity.name),
            Self::AddColumn { table, column } => format!("add column {table}.{}", column.name),
            Self::AlterColumn { table, to, .. } => format!("alter column {table}.{}", to.name),
            Self::AddForeignKey {
                table,
                relationship,
            } => format!(
                "add foreign key {table}.{} -> {}.{}",
                relationship.column, relationship.references, relationship.referenced_column
            ),
            Self::DropForeignKey {
                table,
                relationship,
            } => format!("drop foreign key {}", relationship.constraint_name(table)),
            Self::DropColumn { table, column } => format!("drop column {table}.{}", column.name),
            Self::DropTable { table } => format!("drop table {table}"),
        }
    }
}

/// Computes the changes that turn `current` into `declared`.
///
/// Changes come out in dependency order:
///
/// 1. foreign key drops (so nothing below trips over a stale constraint),
/// 2. table creations,
/// 3. column additions,
/// 4. column alterations,
/// 5. foreign key additions (every referenced table and column now exists),
/// 6. column drops,
/// 7. table drops, each before any dropped table it references.
///
/// Within a phase, changes follow declaration order, so the output is
/// deterministic. A snapshot diffed against itself yields no changes.
pub fn diff(current: &SchemaSnapshot, declared: &SchemaSnapshot) -> Vec<SchemaChange> {
    let mut drop_fks = Vec::new();
    let mut creates = Vec::new();
    let mut adds = Vec::new();
    let mut alters = Vec::new();
    let mut add_fks = Vec::new();
    let mut drop_columns = Vec::new();
    let mut drop_tables = Vec::new();

    for existing in &current.entities {
        let Some(target) = declared.entity(&existing.name) else {
            drop_tables.push(existing);
            continue;
        };

        for relationship in &existing.relationships {
            if target.find_relationship(&relationship.name) != Some(relationship) {
                drop_fks.push(SchemaChange::DropForeignKey {
                    table: existing.name.clone(),
                    relationship: relationship.clone(),
                });
            }
        }

        for column in &existing.columns {
            if target.find_column(&column.name).is_none() {
                drop_columns.push(SchemaChange::DropColumn {
                    table: existing.name.clone(),
                    column: column.clone(),
                });
            }
        }
    }

    for target in &declared.entities {
        let Some(existing) = current.entity(&target.name) else {
            creates.push(SchemaChange::CreateTable {
                entity: target.clone(),
            });
            add_fks.extend(target.relationships.iter().map(|relationship| {
                SchemaChange::AddForeignKey {
                    table: target.name.clone(),
                    relationship: relationship.clone(),
                }
            }));
            continue;
        };

        for column in &target.columns {
            match existing.find_column(&column.name) {
                None => adds.push(SchemaChange::AddColumn {
                    table: target.name.clone(),
                    column: column.clone(),
                }),
                Some(previous) if previous != column => alters.push(SchemaChange::AlterColumn {
                    table: target.name.clone(),
                    from: previous.clone(),
                    to: column.clone(),
                }),
                Some(_) => {}
            }
        }

        for relationship in &target.relationships {
            if existing.find_relationship(&relationship.name) != Some(relationship) {
                add_fks.push(SchemaChange::AddForeignKey {
                    table: target.name.clone(),
                    relationship: relationship.clone(),
                });
            }
        }
    }

    let (cycle_fks, drop_tables) = order_table_drops(drop_tables);

    let mut changes = cycle_fks;
    changes.extend(drop_fks);
    changes.extend(creates);
    changes.extend(adds);
    changes.extend(alters);
    changes.extend(add_fks);
    changes.extend(drop_columns);
    changes.extend(drop_tables);
    changes
}

/// Orders dropped tables so each one goes before the dropped tables it
/// references. Ties keep reverse declaration order.
///
/// Tables that reference each other in a cycle cannot be ordered; their
/// foreign keys into the cycle are returned as drops to run first.
fn order_table_drops(mut pending: Vec<&EntityDef>) -> (Vec<SchemaChange>, Vec<SchemaChange>) {
    pending.reverse();
    let mut ordered = Vec::with_capacity(pending.len());
    loop {
        let Some(next) = pending
            .iter()
            .position(|entity| !is_referenced(&entity.name, &pending))
        else {
            break;
        };
        ordered.push(pending.remove(next));
    }

    let mut cycle_fks = Vec::new();
    for entity in &pending {
        for relationship in &entity.relationships {
            let into_cycle = relationship.references != entity.name
                && pending.iter().any(|other| other.name == relationship.references);
            if into_cycle {
                cycle_fks.push(SchemaChange::DropForeignKey {
                    table: entity.name.clone(),
                    relationship: relationship.clone(),
                });
            }
        }
    }
    ordered.extend(pending);

    let drops = ordered
        .into_iter()
        .map(|entity| SchemaChange::DropTable {
            table: entity.name.clone(),
        })
        .collect();
    (cycle_fks, drops)
}

/// Whether another table in `tables` holds a foreign key to `name`.
fn is_referenced(name: &str, tables: &[&EntityDef]) -> bool {
    tables.iter().any(|other| {
        other.name != name && other.relationships.iter().any(|r| r.references == name)
    })
}
