#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tasman/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod adjusted_earnings;
pub mod engine;
pub mod error;
pub mod fields;
pub mod loss;
pub mod profitability;
pub mod rd_intensity;
pub mod registry;
pub mod variable;
pub mod winsorize;

pub use adjusted_earnings::AdjustedEarnings;
pub use engine::DerivedVariableEngine;
pub use error::{Result, VarError};
pub use fields::DerivedFields;
pub use loss::LossIndicator;
pub use profitability::Profitability;
pub use rd_intensity::RdIntensity;
pub use registry::{VariableInfo, available_variables, variable_info};
pub use variable::DerivedVariable;
pub use winsorize::{WinsorBounds, Winsorizer};
