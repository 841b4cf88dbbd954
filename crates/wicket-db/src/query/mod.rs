//! The typed query façade.
//!
//! An [`Entity`] is a `serde` row type paired with a [`Column`] enum.
//! [`Executor::table`](crate::Executor::table) checks the pair against the
//! schema registry once and hands back a [`Table`], whose operations build
//! parameterised statements from registry identifiers and decode the rows
//! by declared column type.

mod batch;
mod decode;
mod filter;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;
use wicket_schema::{ColumnDef, EntityDef};
use wicket_types::{quote_ident, ColumnType, Value};

use crate::error::ErrorKind;
use crate::executor::Executor;
use crate::transport::{QueryResponse, Row, Statement, TransportError};

pub use batch::Batch;
pub use filter::{Filter, Order, Values};

/// The columns of one entity, usually a fieldless enum.
pub trait Column: Copy + fmt::Debug + Send + Sync + 'static {
    /// Every column, in the order rows are selected.
    const ALL: &'static [Self];

    /// Column name in the schema.
    fn name(self) -> &'static str;

    /// Declared type; must match the registry.
    fn column_type(self) -> ColumnType;
}

/// A row type bound to a registry entity.
pub trait Entity: DeserializeOwned + Send + 'static {
    /// Entity name in the schema.
    const NAME: &'static str;

    /// Column enum.
    type Column: Column;
}

/// Errors from query execution.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The store rejected a write on an integrity constraint.
    #[error("constraint violation [{constraint_code}]: {message}")]
    ConstraintViolation {
        /// SQLSTATE code (class `23`).
        constraint_code: String,
        /// Store-provided message.
        message: String,
    },

    /// A point lookup matched no row.
    #[error("no matching row in '{entity}'")]
    NotFound {
        /// The entity queried.
        entity: String,
    },

    /// A point lookup matched more than one row.
    #[error("expected one row in '{entity}', found several")]
    MultipleRows {
        /// The entity queried.
        entity: String,
    },

    /// A value does not fit its column.
    #[error("invalid value for '{entity}.{column}': {message}")]
    InvalidValue {
        /// The entity.
        entity: String,
        /// The column.
        column: String,
        /// Why the value was rejected.
        message: String,
    },

    /// An update named no columns.
    #[error("update of '{entity}' assigns no columns")]
    EmptyValues {
        /// The entity.
        entity: String,
    },

    /// The operation needs a primary key the entity does not declare.
    #[error("entity '{entity}' has no primary key")]
    NoPrimaryKey {
        /// The entity.
        entity: String,
    },

    /// No relationship links the two entities.
    #[error("entity '{entity}' has no relationship to '{parent}'")]
    NoRelationship {
        /// The child entity.
        entity: String,
        /// The requested parent.
        parent: String,
    },

    /// The transport or the store failed.
    #[error(transparent)]
    Transport(TransportError),

    /// A returned row did not match the entity.
    #[error("failed to decode '{entity}' row: {message}")]
    Decode {
        /// The entity.
        entity: String,
        /// What did not match.
        message: String,
    },
}

impl QueryError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Transport(_) | Self::Decode { .. } => ErrorKind::Transport,
            Self::MultipleRows { .. }
            | Self::InvalidValue { .. }
            | Self::EmptyValues { .. }
            | Self::NoPrimaryKey { .. }
            | Self::NoRelationship { .. } => ErrorKind::InvalidQuery,
        }
    }
}

impl From<TransportError> for QueryError {
    fn from(err: TransportError) -> Self {
        if err.is_constraint_violation() {
            if let TransportError::Database { code, message } = err {
                return Self::ConstraintViolation {
                    constraint_code: code.unwrap_or_default(),
                    message,
                };
            }
        }
        Self::Transport(err)
    }
}

/// Whether a value is being written or compared.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Use {
    Write,
    Compare,
}

/// Typed access to one entity.
pub struct Table<E> {
    executor: Executor,
    def: Arc<EntityDef>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Table<E> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            def: Arc::clone(&self.def),
            _entity: PhantomData,
        }
    }
}

impl<E> fmt::Debug for Table<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table").field("entity", &self.def.name).finish()
    }
}

impl<E: Entity> Table<E> {
    pub(crate) fn new(executor: Executor, def: Arc<EntityDef>) -> Self {
        Self {
            executor,
            def,
            _entity: PhantomData,
        }
    }

    /// The registry declaration this table is bound to.
    pub fn def(&self) -> &EntityDef {
        &self.def
    }

    /// Rows matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidValue`] for a value that does not fit
    /// its column, or a transport or decode error.
    pub async fn find(&self, filter: &Filter<E::Column>) -> Result<Vec<E>, QueryError> {
        let statement = self.select_statement(filter)?;
        let response = self.dispatch("select", &statement).await?;
        self.decode_rows(response)
    }

    /// The single row matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NotFound`] when nothing matches and
    /// [`QueryError::MultipleRows`] when more than one row does.
    pub async fn find_one(&self, filter: &Filter<E::Column>) -> Result<E, QueryError> {
        let probe = filter.clone().with_limit(Some(2));
        let mut rows = self.find(&probe).await?;
        match rows.len() {
            0 => Err(QueryError::NotFound {
                entity: E::NAME.to_string(),
            }),
            1 => Ok(rows.remove(0)),
            _ => Err(QueryError::MultipleRows {
                entity: E::NAME.to_string(),
            }),
        }
    }

    /// The row whose primary key is `key`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NoPrimaryKey`] if the entity declares none and
    /// [`QueryError::NotFound`] if no row has that key.
    pub async fn find_by_pk(&self, key: impl Into<Value>) -> Result<E, QueryError> {
        let pk = self.primary_key()?;
        self.find_one(&Filter::new().eq_named(pk, key.into())).await
    }

    /// Rows whose foreign key to `P` equals `parent_key`, in primary key
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NoRelationship`] if this entity declares no
    /// relationship to `P`.
    pub async fn find_related<P: Entity>(
        &self,
        parent_key: impl Into<Value>,
    ) -> Result<Vec<E>, QueryError> {
        let relationship = self
            .executor
            .registry()
            .relationship_between(E::NAME, P::NAME)
            .ok_or_else(|| QueryError::NoRelationship {
                entity: E::NAME.to_string(),
                parent: P::NAME.to_string(),
            })?;
        let column = self.static_column(&relationship.column)?;

        let mut filter = Filter::new().eq_named(column, parent_key.into());
        if let Ok(pk) = self.primary_key() {
            filter = filter.order_by_named(pk, Order::Asc);
        }
        self.find(&filter).await
    }

    /// Number of rows matching `filter`. Ordering and paging are ignored.
    ///
    /// # Errors
    ///
    /// Returns a validation, transport, or decode error.
    pub async fn count(&self, filter: &Filter<E::Column>) -> Result<u64, QueryError> {
        self.check_filter(filter)?;
        let mut params = Vec::new();
        let sql = format!(
            "SELECT COUNT(*) AS {} FROM {}{}",
            quote_ident("count"),
            quote_ident(E::NAME),
            filter.where_clause(&mut params)
        );
        let response = self
            .dispatch("count", &Statement::with_params(sql, params))
            .await?;

        let cell = response
            .rows
            .first()
            .and_then(|row| row.get("count"))
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        decode::normalize(ColumnType::BigInt, cell)
            .ok()
            .and_then(|n| n.as_u64())
            .ok_or_else(|| self.decode_error("count is not a non-negative integer"))
    }

    /// Inserts one row and returns it as stored, with generated columns
    /// filled in.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidValue`] for a missing required column
    /// or a value that does not fit, and
    /// [`QueryError::ConstraintViolation`] if the store rejects the row.
    pub async fn insert(&self, values: &Values<E::Column>) -> Result<E, QueryError> {
        let statement = self.insert_statement(values)?;
        let response = self.dispatch("insert", &statement).await?;
        self.decode_rows(response)?
            .pop()
            .ok_or_else(|| self.decode_error("insert returned no row"))
    }

    /// Assigns `values` to every row matching `filter`; returns the number
    /// of rows changed.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::EmptyValues`] if nothing is assigned, plus the
    /// errors of [`Table::insert`].
    pub async fn update(
        &self,
        filter: &Filter<E::Column>,
        values: &Values<E::Column>,
    ) -> Result<u64, QueryError> {
        let statement = self.update_statement(filter, values)?;
        Ok(self.dispatch("update", &statement).await?.row_count)
    }

    /// Deletes every row matching `filter`; returns the number deleted.
    /// An empty filter deletes every row.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::ConstraintViolation`] if a restricting foreign
    /// key still points at a deleted row.
    pub async fn delete(&self, filter: &Filter<E::Column>) -> Result<u64, QueryError> {
        let statement = self.delete_statement(filter)?;
        Ok(self.dispatch("delete", &statement).await?.row_count)
    }

    /// The `SELECT` that [`Table::find`] sends.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidValue`] for a value that does not fit.
    pub fn select_statement(&self, filter: &Filter<E::Column>) -> Result<Statement, QueryError> {
        self.check_filter(filter)?;
        let mut params = Vec::new();
        let sql = format!(
            "SELECT {} FROM {}{}{}",
            select_list::<E>(),
            quote_ident(E::NAME),
            filter.where_clause(&mut params),
            filter.tail_clause(self.executor.dialect())
        );
        Ok(Statement::with_params(sql, params))
    }

    /// The `INSERT ... RETURNING` that [`Table::insert`] sends.
    ///
    /// # Errors
    ///
    /// As [`Table::insert`], before anything is sent.
    pub fn insert_statement(&self, values: &Values<E::Column>) -> Result<Statement, QueryError> {
        for (column, value) in &values.assignments {
            self.check_value(column, value, Use::Write)?;
        }
        if let Some(missing) = self.def.columns.iter().find(|column| {
            !column.is_optional_on_insert()
                && !values.assignments.iter().any(|(name, _)| *name == column.name)
        }) {
            return Err(self.invalid(&missing.name, "required column is missing".to_string()));
        }

        let table = quote_ident(E::NAME);
        let returning = select_list::<E>();
        if values.is_empty() {
            return Ok(Statement::new(format!(
                "INSERT INTO {table} DEFAULT VALUES RETURNING {returning}"
            )));
        }

        let mut params = Vec::with_capacity(values.assignments.len());
        let columns: Vec<String> = values
            .assignments
            .iter()
            .map(|(name, _)| quote_ident(name))
            .collect();
        let placeholders: Vec<String> = values
            .assignments
            .iter()
            .map(|(_, value)| filter::bind(&mut params, value.clone()))
            .collect();
        Ok(Statement::with_params(
            format!(
                "INSERT INTO {table} ({}) VALUES ({}) RETURNING {returning}",
                columns.join(", "),
                placeholders.join(", ")
            ),
            params,
        ))
    }

    /// The `UPDATE` that [`Table::update`] sends.
    ///
    /// # Errors
    ///
    /// As [`Table::update`], before anything is sent.
    pub fn update_statement(
        &self,
        filter: &Filter<E::Column>,
        values: &Values<E::Column>,
    ) -> Result<Statement, QueryError> {
        if values.is_empty() {
            return Err(QueryError::EmptyValues {
                entity: E::NAME.to_string(),
            });
        }
        for (column, value) in &values.assignments {
            self.check_value(column, value, Use::Write)?;
        }
        self.check_filter(filter)?;

        let mut params = Vec::new();
        let assignments: Vec<String> = values
            .assignments
            .iter()
            .map(|(name, value)| {
                format!(
                    "{} = {}",
                    quote_ident(name),
                    filter::bind(&mut params, value.clone())
                )
            })
            .collect();
        let sql = format!(
            "UPDATE {} SET {}{}",
            quote_ident(E::NAME),
            assignments.join(", "),
            filter.where_clause(&mut params)
        );
        Ok(Statement::with_params(sql, params))
    }

    /// The `DELETE` that [`Table::delete`] sends.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidValue`] for a value that does not fit.
    pub fn delete_statement(&self, filter: &Filter<E::Column>) -> Result<Statement, QueryError> {
        self.check_filter(filter)?;
        let mut params = Vec::new();
        let sql = format!(
            "DELETE FROM {}{}",
            quote_ident(E::NAME),
            filter.where_clause(&mut params)
        );
        Ok(Statement::with_params(sql, params))
    }

    async fn dispatch(
        &self,
        operation: &'static str,
        statement: &Statement,
    ) -> Result<QueryResponse, QueryError> {
        tracing::debug!(
            entity = E::NAME,
            operation,
            params = statement.params.len(),
            "dispatching query"
        );
        Ok(self.executor.execute(statement).await?)
    }

    fn decode_rows(&self, response: QueryResponse) -> Result<Vec<E>, QueryError> {
        response
            .rows
            .into_iter()
            .map(|row| self.decode_row(row))
            .collect()
    }

    fn decode_row(&self, row: Row) -> Result<E, QueryError> {
        let row = decode::normalize_row(&self.def, row).map_err(|m| self.decode_error(&m))?;
        serde_json::from_value(serde_json::Value::Object(row))
            .map_err(|e| self.decode_error(&e.to_string()))
    }

    fn decode_error(&self, message: &str) -> QueryError {
        QueryError::Decode {
            entity: E::NAME.to_string(),
            message: message.to_string(),
        }
    }

    fn invalid(&self, column: &str, message: String) -> QueryError {
        QueryError::InvalidValue {
            entity: E::NAME.to_string(),
            column: column.to_string(),
            message,
        }
    }

    fn column_def(&self, column: &str) -> Result<&ColumnDef, QueryError> {
        self.def
            .find_column(column)
            .ok_or_else(|| self.invalid(column, "column is not declared".to_string()))
    }

    /// Maps a registry column name back to the entity's static name.
    fn static_column(&self, name: &str) -> Result<&'static str, QueryError> {
        E::Column::ALL
            .iter()
            .map(|column| column.name())
            .find(|column| *column == name)
            .ok_or_else(|| self.invalid(name, "column is not bound on the entity".to_string()))
    }

    fn primary_key(&self) -> Result<&'static str, QueryError> {
        let pk = self.def.primary_key().ok_or_else(|| QueryError::NoPrimaryKey {
            entity: E::NAME.to_string(),
        })?;
        self.static_column(&pk.name)
    }

    fn check_value(&self, column: &str, value: &Value, usage: Use) -> Result<(), QueryError> {
        let def = self.column_def(column)?;
        if value.is_null() {
            return match usage {
                Use::Compare => Err(self.invalid(
                    column,
                    "NULL never compares equal; use is_null or not_null".to_string(),
                )),
                Use::Write if !def.nullable => {
                    Err(self.invalid(column, "column is not nullable".to_string()))
                }
                Use::Write => Ok(()),
            };
        }
        if !value.fits(def.ty) {
            return Err(self.invalid(
                column,
                format!("expected {}, got {}", def.ty, value.kind()),
            ));
        }
        Ok(())
    }

    fn check_filter(&self, filter: &Filter<E::Column>) -> Result<(), QueryError> {
        for condition in &filter.conditions {
            for value in condition.values() {
                self.check_value(condition.column(), &value, Use::Compare)?;
            }
        }
        Ok(())
    }
}

fn select_list<E: Entity>() -> String {
    E::Column::ALL
        .iter()
        .map(|column| quote_ident(column.name()))
        .collect::<Vec<_>>()
        .join(", ")
}
