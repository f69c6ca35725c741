//! Input field mapping and output column names.

use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Output column of [`crate::AdjustedEarnings`].
pub const ADJUSTED_EARNINGS: &str = "adj_earnings";
/// Output column of [`crate::Profitability`].
pub const PROFITABILITY: &str = "profitability";
/// Output column of [`crate::RdIntensity`].
pub const RD_INTENSITY: &str = "rd_intensity";
/// Output column of [`crate::LossIndicator`].
pub const LOSS: &str = "loss";

/// Maps the logical inputs of the derived variables to panel columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivedFields {
    /// Income measure (default: `ib`, income before extraordinary items)
    pub income: String,
    /// Adjustment subtracted from income (default: `spi`, special items)
    pub adjustment: String,
    /// Scale denominator (default: `at`, total assets)
    pub scale: String,
    /// R&D expense (default: `xrd`)
    pub rd_expense: String,
}

impl Default for DerivedFields {
    fn default() -> Self {
        Self {
            income: "ib".to_string(),
            adjustment: "spi".to_string(),
            scale: "at".to_string(),
            rd_expense: "xrd".to_string(),
        }
    }
}

impl DerivedFields {
    /// `income - adjustment`, with a missing adjustment read as zero.
    pub(crate) fn adjusted_earnings(&self) -> Expr {
        col(self.income.as_str()).cast(DataType::Float64)
            - col(self.adjustment.as_str())
                .cast(DataType::Float64)
                .fill_null(lit(0.0))
    }

    /// `numerator / scale` when scale is positive, null otherwise.
    pub(crate) fn scaled(&self, numerator: Expr) -> Expr {
        let scale = col(self.scale.as_str()).cast(DataType::Float64);
        when(scale.clone().gt(lit(0.0)))
            .then(numerator / scale)
            .otherwise(lit(NULL).cast(DataType::Float64))
    }
}
