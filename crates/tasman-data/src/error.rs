//! Error types for data operations.

use thiserror::Error;

/// Result type for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur during data operations.
#[derive(Debug, Error)]
pub enum DataError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// A column declared by a schema is absent from the frame
    #[error("Table {table} is missing column {column}")]
    MissingColumn {
        /// Table (schema) name
        table: String,
        /// Column that was expected
        column: String,
    },

    /// A column exists but has an incompatible type
    #[error("Table {table}, column {column}: expected {expected}, found {found}")]
    SchemaMismatch {
        /// Table (schema) name
        table: String,
        /// Offending column
        column: String,
        /// Declared type
        expected: String,
        /// Type found in the frame
        found: String,
    },

    /// A non-nullable column contains nulls
    #[error("Table {table}, column {column}: {count} unexpected null value(s)")]
    UnexpectedNulls {
        /// Table (schema) name
        table: String,
        /// Offending column
        column: String,
        /// Number of nulls found
        count: usize,
    },

    /// Table or column name that cannot be used as an SQL identifier
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Table not present in the extract store
    #[error("Table not found: {0}")]
    TableNotFound(String),
}
