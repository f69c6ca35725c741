//! Error types for merge operations.

use chrono::NaiveDate;
use tasman_data::DataError;
use thiserror::Error;

/// Result type for merge operations.
pub type Result<T> = std::result::Result<T, MergeError>;

/// Errors that abort a merge stage.
///
/// Row-level problems (unmatched keys, ambiguous duplicate groups, empty
/// windows) are reported in stage diagnostics instead.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Data layer error
    #[error(transparent)]
    Data(#[from] DataError),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// Secondary table is not unique per join key and the join inflated the panel
    #[error(
        "Join with {table} fanned out: {primary_rows} primary rows became {aligned_rows} \
         ({duplicate_keys} duplicate key(s) in secondary)"
    )]
    JoinFanout {
        /// Secondary table name
        table: String,
        /// Rows in the primary panel
        primary_rows: usize,
        /// Rows after the join
        aligned_rows: usize,
        /// Keys occurring more than once in the secondary table
        duplicate_keys: usize,
    },

    /// A secondary payload column already exists in the primary panel
    #[error("Column {column} from {table} already exists in the primary panel")]
    ColumnConflict {
        /// Secondary table name
        table: String,
        /// Conflicting column
        column: String,
    },

    /// Join keys have different types on each side
    #[error("Key {column} has type {left} in the primary panel but {right} in {table}")]
    KeyTypeMismatch {
        /// Secondary table name
        table: String,
        /// Key column
        column: String,
        /// Primary dtype
        left: String,
        /// Secondary dtype
        right: String,
    },

    /// A required column is absent
    #[error("Column {column} not found in {table}")]
    MissingColumn {
        /// Table name
        table: String,
        /// Column name
        column: String,
    },

    /// Monthly series holds more than one point for a calendar month
    #[error("Monthly series has more than one value for {month}")]
    DuplicateSeriesMonth {
        /// First day of the offending month
        month: NaiveDate,
    },

    /// Invalid stage configuration
    #[error("Invalid specification: {0}")]
    InvalidSpec(String),
}
