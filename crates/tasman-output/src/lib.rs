#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tasman/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod diagnostics;
pub mod export;
pub mod summary;

pub use diagnostics::{
    MetricRecord, PipelineDiagnostics, SampleReport, SourceDiagnostics, WindowDiagnostics,
};
pub use export::{ExportError, ExportFormat, Exporter, panel_to_csv, write_panel_csv};
pub use summary::{AuditLine, AuditSection, AuditSummary};
