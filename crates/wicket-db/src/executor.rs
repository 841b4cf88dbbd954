//! The bound query handle.

use std::sync::Arc;

use wicket_schema::{SchemaError, SchemaRegistry};

use crate::dialect::Dialect;
use crate::query::{Batch, Column, Entity, Table};
use crate::transport::{
    QueryResponse, RetryPolicy, RetryTransport, Statement, Transport, TransportError,
};

/// A transport bound to a schema registry.
///
/// Cloning is two reference-count bumps. Nothing is held open, so an
/// executor can be built per request and dropped without ceremony.
#[derive(Debug, Clone)]
pub struct Executor {
    transport: Arc<dyn Transport>,
    registry: Arc<SchemaRegistry>,
    dialect: Dialect,
}

impl Executor {
    /// Binds `transport` to `registry`. Statements are rendered for
    /// `dialect`, which must be the dialect `transport` speaks.
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<SchemaRegistry>,
        dialect: Dialect,
    ) -> Self {
        Self {
            transport,
            registry,
            dialect,
        }
    }

    /// The registry queries are checked against.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// The SQL dialect of the backend.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Returns an executor whose read-only statements are retried on
    /// transient failures.
    pub fn with_retry(self, policy: RetryPolicy) -> Self {
        Self {
            transport: Arc::new(RetryTransport::new(self.transport, policy)),
            ..self
        }
    }

    /// Binds the typed entity `E`.
    ///
    /// Checks once that the registry declares `E::NAME` and every column of
    /// `E::Column` with the same type.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] naming the first mismatch.
    pub fn table<E: Entity>(&self) -> Result<Table<E>, SchemaError> {
        let def = self.registry.require(E::NAME)?;
        if E::Column::ALL.is_empty() {
            return Err(SchemaError::EmptyEntity {
                entity: E::NAME.to_string(),
            });
        }

        for column in E::Column::ALL {
            let declared = def.find_column(column.name()).ok_or_else(|| {
                SchemaError::UnknownColumn {
                    entity: E::NAME.to_string(),
                    column: column.name().to_string(),
                }
            })?;
            if declared.ty != column.column_type() {
                return Err(SchemaError::ColumnTypeMismatch {
                    entity: E::NAME.to_string(),
                    column: column.name().to_string(),
                    declared: declared.ty,
                    bound: column.column_type(),
                });
            }
        }

        Ok(Table::new(self.clone(), Arc::new(def.clone())))
    }

    /// Starts an explicit all-or-nothing batch.
    pub fn batch(&self) -> Batch {
        Batch::new(self.clone())
    }

    /// Sends one raw statement.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn execute(&self, statement: &Statement) -> Result<QueryResponse, TransportError> {
        self.transport.query(statement).await
    }

    /// Sends raw statements as one transaction.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged; no statement took effect.
    pub async fn execute_batch(
        &self,
        statements: &[Statement],
    ) -> Result<Vec<QueryResponse>, TransportError> {
        self.transport.transaction(statements).await
    }
}
