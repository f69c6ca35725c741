//! Pipeline errors.

use tasman_data::DataError;
use tasman_merge::MergeError;
use tasman_output::ExportError;
use tasman_vars::VarError;
use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that abort a pipeline run.
///
/// Row-level problems (unresolved aliases, ambiguous groups, invalid scale,
/// empty windows) are reported in the diagnostics instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Loading or validating a table failed
    #[error(transparent)]
    Data(#[from] DataError),

    /// Deduplication, alignment or window aggregation failed
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// Variable construction or winsorization failed
    #[error(transparent)]
    Vars(#[from] VarError),

    /// Export failed
    #[error(transparent)]
    Export(#[from] ExportError),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// Config file could not be parsed
    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration is inconsistent
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A configured input was not supplied
    #[error("Missing input: {0}")]
    MissingInput(String),
}
