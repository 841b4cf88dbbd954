//! Stateless request/response channels to the database.
//!
//! A [`Transport`] sends one [`Statement`] (or one all-or-nothing batch of
//! statements) and returns the rows as loosely typed JSON maps. Typing
//! happens a layer up, in [`crate::query`], against the schema registry.

mod http;
mod retry;
mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use wicket_types::Value;

pub use http::HttpTransport;
pub use retry::{RetryPolicy, RetryTransport};
pub use sqlite::SqliteTransport;

/// One result row: column name to cell value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A parameterised SQL statement.
///
/// Placeholders are `$1..$n` in order of first appearance; both Postgres
/// and SQLite accept that form.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text. Never contains interpolated values.
    pub sql: String,
    /// Bound parameters, in placeholder order.
    pub params: Vec<Value>,
}

impl Statement {
    /// A statement with no parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// A statement with parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Whether the statement only reads.
    pub fn is_read_only(&self) -> bool {
        self.sql
            .trim_start()
            .get(..6)
            .is_some_and(|head| head.eq_ignore_ascii_case("select"))
    }
}

/// Rows and affected-row count from one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResponse {
    /// Returned rows, if any.
    pub rows: Vec<Row>,
    /// Rows returned or affected.
    pub row_count: u64,
}

/// Failures of the request channel or the remote store.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No response arrived within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The request could not be delivered.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The store executed the request and rejected it.
    #[error("database error{}: {message}", sqlstate_suffix(.code))]
    Database {
        /// SQLSTATE code, when the store reported one.
        code: Option<String>,
        /// Store-provided message.
        message: String,
    },

    /// The endpoint answered with a non-success status and no usable error.
    #[error("unexpected HTTP status {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// The response did not have the expected shape.
    #[error("malformed response: {0}")]
    Protocol(String),

    /// The local store could not be opened or the worker failed.
    #[error("local store error: {0}")]
    Local(String),
}

fn sqlstate_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|c| format!(" [{c}]"))
        .unwrap_or_default()
}

impl TransportError {
    /// SQLSTATE code reported by the store, if any.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Self::Database { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Whether the store reported an integrity constraint violation
    /// (SQLSTATE class `23`).
    pub fn is_constraint_violation(&self) -> bool {
        self.sqlstate().is_some_and(|code| code.starts_with("23"))
    }

    /// Whether the failure happened in transit, before the store could
    /// answer. Only these are candidates for an opt-in retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Network(_))
    }
}

/// A stateless channel that executes statements.
///
/// Implementations hold no per-session state: every call is independent,
/// and dropping the transport releases nothing but memory.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Executes one statement.
    async fn query(&self, statement: &Statement) -> Result<QueryResponse, TransportError>;

    /// Executes statements in order inside one transaction. Either every
    /// statement takes effect or none does.
    async fn transaction(
        &self,
        statements: &[Statement],
    ) -> Result<Vec<QueryResponse>, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn query(&self, statement: &Statement) -> Result<QueryResponse, TransportError> {
        (**self).query(statement).await
    }

    async fn transaction(
        &self,
        statements: &[Statement],
    ) -> Result<Vec<QueryResponse>, TransportError> {
        (**self).transaction(statements).await
    }
}
