//! Data access layer for the wicket storefront.
//!
//! Provides connection resolution, stateless query transports, the typed
//! query façade, and the versioned migration pipeline. Every table the
//! storefront reads is created through migrations generated from the
//! schema registry, and every query is checked against that registry.
//!
//! # Design decisions
//!
//! - **Stateless transport**: each query is one request/response exchange
//!   with the database (an HTTP SQL endpoint in production, a per-request
//!   SQLite connection locally). There is no pool and nothing to close; an
//!   [`Executor`] is a pair of `Arc`s and is cheap to build per request.
//! - **Registry-bound tables**: [`Executor::table`] checks a Rust entity's
//!   column enum against the registry once. After that, statements name
//!   only registry identifiers and bind every value as a parameter.
//! - **Out-of-band migrations**: schema changes are diffed, rendered to
//!   SQL artifacts, and applied by an operator as one all-or-nothing batch,
//!   tracked in the `__wicket_migrations` table.
//! - **No implicit retries**: [`RetryTransport`] exists, but only callers
//!   who opt in get it.

mod config;
mod connection;
mod dialect;
mod error;
mod executor;
pub mod migrations;
pub mod query;
pub mod transport;

pub use config::{DatabaseConfig, DATABASE_URL_ENV};
pub use connection::{open, resolve, Backend, ConfigError, ConnectionDescriptor};
pub use dialect::{Dialect, ParseDialectError};
pub use error::{DbError, ErrorKind};
pub use executor::Executor;
pub use migrations::{
    apply, current_snapshot, diff, status, Migration, MigrationError, MigrationStatus,
    MigrationStore, SchemaChange,
};
pub use query::{Batch, Column, Entity, Filter, Order, QueryError, Table, Values};
pub use transport::{
    QueryResponse, RetryPolicy, RetryTransport, Row, Statement, Transport, TransportError,
};
pub use wicket_schema::{SchemaError, SchemaRegistry};
pub use wicket_types::{ColumnType, Value};
