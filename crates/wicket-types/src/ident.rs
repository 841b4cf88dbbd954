//! SQL identifier validation and quoting.
//!
//! Identifiers (table and column names) cannot be bound as parameters, so
//! every identifier that reaches a statement comes from a validated schema
//! declaration and is double-quoted on the way out.

use thiserror::Error;

/// Maximum identifier length in bytes. Postgres truncates beyond 63.
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Reasons an identifier is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// The identifier is empty.
    #[error("identifier cannot be empty")]
    Empty,

    /// The identifier exceeds [`MAX_IDENTIFIER_LENGTH`].
    #[error("identifier '{name}' exceeds {MAX_IDENTIFIER_LENGTH} bytes")]
    TooLong {
        /// The offending identifier.
        name: String,
    },

    /// The identifier contains characters outside `[A-Za-z0-9_]` or starts
    /// with a digit.
    #[error("identifier '{name}' must match [A-Za-z_][A-Za-z0-9_]*")]
    InvalidCharacters {
        /// The offending identifier.
        name: String,
    },
}

/// Validates a table or column name.
///
/// Accepted identifiers start with an ASCII letter or underscore and contain
/// only ASCII letters, digits, and underscores.
///
/// # Errors
///
/// Returns [`IdentifierError`] describing the first rule that failed.
pub fn validate_identifier(name: &str) -> Result<(), IdentifierError> {
    if name.is_empty() {
        return Err(IdentifierError::Empty);
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(IdentifierError::TooLong {
            name: name.to_string(),
        });
    }

    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(IdentifierError::InvalidCharacters {
            name: name.to_string(),
        });
    }

    Ok(())
}

/// Wraps an identifier in double quotes, doubling any embedded quote.
///
/// Both Postgres and SQLite accept this form.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
