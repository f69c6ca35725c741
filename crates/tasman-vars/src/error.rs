//! Error types for derived variables and winsorization.

use tasman_data::DataError;
use thiserror::Error;

/// Result type for variable operations.
pub type Result<T> = std::result::Result<T, VarError>;

/// Errors from computing or winsorizing variables.
#[derive(Debug, Error)]
pub enum VarError {
    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// Data layer error
    #[error(transparent)]
    Data(#[from] DataError),

    /// An input column is absent
    #[error("Variable {variable} requires column {column}")]
    MissingColumn {
        /// Variable or stage name
        variable: String,
        /// Missing input column
        column: String,
    },

    /// Tail fractions outside `[0, 1)` or overlapping
    #[error("Invalid winsorization cutoffs: lower {lower}, upper {upper}")]
    InvalidCutoffs {
        /// Lower tail fraction
        lower: f64,
        /// Upper tail fraction
        upper: f64,
    },
}
