//! Explicit multi-statement transactions.

use crate::executor::Executor;
use crate::transport::Statement;

use super::QueryError;

/// Statements collected for one all-or-nothing transaction.
///
/// Build statements with [`Table::insert_statement`](super::Table::insert_statement),
/// [`Table::update_statement`](super::Table::update_statement), and
/// [`Table::delete_statement`](super::Table::delete_statement), push them,
/// then [`run`](Batch::run). Nothing is sent until `run`.
#[derive(Debug, Clone)]
pub struct Batch {
    executor: Executor,
    statements: Vec<Statement>,
}

impl Batch {
    /// An empty batch on `executor`.
    pub fn new(executor: Executor) -> Self {
        Self {
            executor,
            statements: Vec::new(),
        }
    }

    /// Appends a statement.
    pub fn push(&mut self, statement: Statement) -> &mut Self {
        self.statements.push(statement);
        self
    }

    /// Number of statements queued.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Whether no statements are queued.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Runs every statement in one transaction and returns the per-statement
    /// row counts. On error, no statement took effect.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::ConstraintViolation`] or
    /// [`QueryError::Transport`] from the failing statement.
    pub async fn run(self) -> Result<Vec<u64>, QueryError> {
        if self.statements.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(statements = self.statements.len(), "dispatching batch");
        let responses = self.executor.execute_batch(&self.statements).await?;
        Ok(responses.into_iter().map(|r| r.row_count).collect())
    }
}
