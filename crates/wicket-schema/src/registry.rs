//! Validated, read-only lookup over entity declarations.

use std::collections::{HashMap, HashSet};

use wicket_types::{validate_identifier, ColumnType};

use crate::entity::{ColumnDef, EntityDef, OnDelete, Relationship, SchemaSnapshot};
use crate::error::SchemaError;

/// The validated set of entities known to the data layer.
///
/// Construction is the only place validation happens; once built, the
/// registry is immutable and safe to share across tasks behind an `Arc`.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    entities: Vec<EntityDef>,
    index: HashMap<String, usize>,
}

impl SchemaRegistry {
    /// Validates `entities` and builds a registry.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchemaError`] found. Entity-level checks (names,
    /// columns, keys, defaults) run before relationship checks, so a
    /// relationship error always refers to otherwise well-formed entities.
    pub fn new(entities: Vec<EntityDef>) -> Result<Self, SchemaError> {
        let mut index = HashMap::with_capacity(entities.len());

        for (position, entity) in entities.iter().enumerate() {
            validate_entity(entity)?;
            if index.insert(entity.name.clone(), position).is_some() {
                return Err(SchemaError::DuplicateEntity {
                    entity: entity.name.clone(),
                });
            }
        }

        let registry = Self { entities, index };
        for entity in &registry.entities {
            for relationship in &entity.relationships {
                registry.validate_relationship(entity, relationship)?;
            }
        }

        tracing::debug!(
            entities = registry.entities.len(),
            "schema registry validated"
        );

        Ok(registry)
    }

    /// Parses a TOML schema source and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Parse`] for malformed TOML, or any validation
    /// error from [`SchemaRegistry::new`].
    pub fn from_toml(source: &str) -> Result<Self, SchemaError> {
        let snapshot: SchemaSnapshot = toml::from_str(source)?;
        Self::from_snapshot(snapshot)
    }

    /// Validates a snapshot and builds a registry from it.
    ///
    /// # Errors
    ///
    /// See [`SchemaRegistry::new`].
    pub fn from_snapshot(snapshot: SchemaSnapshot) -> Result<Self, SchemaError> {
        Self::new(snapshot.entities)
    }

    /// Looks up an entity by name.
    pub fn entity(&self, name: &str) -> Option<&EntityDef> {
        self.index.get(name).map(|&i| &self.entities[i])
    }

    /// Looks up an entity by name, failing if it is not declared.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownEntity`].
    pub fn require(&self, name: &str) -> Result<&EntityDef, SchemaError> {
        self.entity(name).ok_or_else(|| SchemaError::UnknownEntity {
            entity: name.to_string(),
        })
    }

    /// Column metadata for an entity.
    pub fn columns(&self, entity: &str) -> Option<&[ColumnDef]> {
        self.entity(entity).map(|e| e.columns.as_slice())
    }

    /// A single column of an entity.
    pub fn column(&self, entity: &str, column: &str) -> Option<&ColumnDef> {
        self.entity(entity).and_then(|e| e.find_column(column))
    }

    /// Relationship metadata for an entity.
    pub fn relationships(&self, entity: &str) -> Option<&[Relationship]> {
        self.entity(entity).map(|e| e.relationships.as_slice())
    }

    /// The first relationship declared on `from` that references `to`.
    pub fn relationship_between(&self, from: &str, to: &str) -> Option<&Relationship> {
        self.entity(from)
            .and_then(|e| e.relationships.iter().find(|r| r.references == to))
    }

    /// All entities in declaration order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityDef> {
        self.entities.iter()
    }

    /// Number of declared entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether no entities are declared.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// A serialisable copy of the declarations.
    pub fn snapshot(&self) -> SchemaSnapshot {
        SchemaSnapshot {
            entities: self.entities.clone(),
        }
    }

    fn validate_relationship(
        &self,
        entity: &EntityDef,
        relationship: &Relationship,
    ) -> Result<(), SchemaError> {
        let dangling_column = |table: &str, column: &str| SchemaError::DanglingColumn {
            entity: entity.name.clone(),
            relationship: relationship.name.clone(),
            table: table.to_string(),
            column: column.to_string(),
        };

        let local = entity
            .find_column(&relationship.column)
            .ok_or_else(|| dangling_column(&entity.name, &relationship.column))?;

        let target = self.entity(&relationship.references).ok_or_else(|| {
            SchemaError::DanglingEntity {
                entity: entity.name.clone(),
                relationship: relationship.name.clone(),
                target: relationship.references.clone(),
            }
        })?;

        let remote = target
            .find_column(&relationship.referenced_column)
            .ok_or_else(|| dangling_column(&target.name, &relationship.referenced_column))?;

        if !local.ty.can_reference(remote.ty) {
            return Err(SchemaError::IncompatibleTypes {
                entity: entity.name.clone(),
                relationship: relationship.name.clone(),
                column_type: local.ty,
                target_type: remote.ty,
            });
        }

        if !remote.is_referenceable() {
            return Err(SchemaError::NotReferenceable {
                entity: entity.name.clone(),
                relationship: relationship.name.clone(),
                target: target.name.clone(),
                column: remote.name.clone(),
            });
        }

        if relationship.on_delete == OnDelete::SetNull && !local.nullable {
            return Err(SchemaError::InvalidSetNull {
                entity: entity.name.clone(),
                relationship: relationship.name.clone(),
            });
        }

        Ok(())
    }
}

fn check_identifier(name: &str, context: impl FnOnce() -> String) -> Result<(), SchemaError> {
    validate_identifier(name).map_err(|source| SchemaError::InvalidIdentifier {
        context: context(),
        source,
    })
}

/// Checks everything about an entity that does not involve other entities.
fn validate_entity(entity: &EntityDef) -> Result<(), SchemaError> {
    check_identifier(&entity.name, || "entity name".to_string())?;

    if entity.columns.is_empty() {
        return Err(SchemaError::EmptyEntity {
            entity: entity.name.clone(),
        });
    }

    let mut seen = HashSet::new();
    let mut primary_keys = 0;
    for column in &entity.columns {
        check_identifier(&column.name, || format!("column of '{}'", entity.name))?;

        if !seen.insert(column.name.as_str()) {
            return Err(SchemaError::DuplicateColumn {
                entity: entity.name.clone(),
                column: column.name.clone(),
            });
        }

        if column.primary_key {
            primary_keys += 1;
            if column.nullable {
                return Err(SchemaError::NullablePrimaryKey {
                    entity: entity.name.clone(),
                    column: column.name.clone(),
                });
            }
        } else if column.ty == ColumnType::Serial {
            return Err(SchemaError::SerialWithoutPrimaryKey {
                entity: entity.name.clone(),
                column: column.name.clone(),
            });
        }

        if let Some(default) = &column.default {
            if !default.fits(column.ty) {
                return Err(SchemaError::InvalidDefault {
                    entity: entity.name.clone(),
                    column: column.name.clone(),
                    ty: column.ty,
                });
            }
        }
    }

    if primary_keys > 1 {
        return Err(SchemaError::MultiplePrimaryKeys {
            entity: entity.name.clone(),
        });
    }

    let mut relationship_names = HashSet::new();
    for relationship in &entity.relationships {
        check_identifier(&relationship.name, || {
            format!("relationship of '{}'", entity.name)
        })?;
        check_identifier(&relationship.constraint_name(&entity.name), || {
            format!("constraint name of '{}.{}'", entity.name, relationship.name)
        })?;
        if !relationship_names.insert(relationship.name.as_str()) {
            return Err(SchemaError::DuplicateRelationship {
                entity: entity.name.clone(),
                relationship: relationship.name.clone(),
            });
        }
    }

    Ok(())
}
