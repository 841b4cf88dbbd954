//! Shared types for the wicket data layer.
//!
//! This crate provides the value model that every other wicket crate speaks:
//! the primitive column types a schema may declare ([`ColumnType`]), the
//! bound parameter / decoded cell representation ([`Value`]), and SQL
//! identifier validation and quoting.
//!
//! It has no knowledge of entities, transports, or migrations. Keeping these
//! definitions here lets `wicket-schema` and `wicket-db` agree on types
//! without depending on each other in both directions.

mod ident;
mod value;

pub use ident::{quote_ident, validate_identifier, IdentifierError, MAX_IDENTIFIER_LENGTH};
pub use value::{ColumnType, Value};
