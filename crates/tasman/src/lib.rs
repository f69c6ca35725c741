#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tasman/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod pipeline;
pub mod sample;

// Re-export main types from sub-crates
pub use tasman_data as data;
pub use tasman_merge as merge;
pub use tasman_output as output;
pub use tasman_vars as vars;

pub use config::{PipelineConfig, Preference, PrimaryConfig, SeriesConfig, SourceConfig};
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, PipelineInputs, PipelineOutput};
pub use sample::SampleSelector;
pub use tasman_output::{PipelineDiagnostics, SampleReport};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
