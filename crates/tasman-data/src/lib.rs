#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tasman/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod alias;
pub mod columns;
pub mod dates;
pub mod error;
pub mod schema;
pub mod store;

pub use alias::{AliasMap, CanonicalKey, Resolution, ResolutionReport, ResolveSpec};
pub use error::{DataError, Result};
pub use schema::{Field, FieldType, TableSchema};
pub use store::{ExtractStore, StoreStats};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
