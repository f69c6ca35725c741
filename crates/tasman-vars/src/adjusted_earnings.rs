//! Adjusted earnings
//!
//! Income less the adjustment term (special items by default). A missing
//! adjustment counts as zero; a missing income leaves the result null.

use crate::error::Result;
use crate::fields::{ADJUSTED_EARNINGS, DerivedFields};
use crate::variable::DerivedVariable;
use polars::prelude::*;

/// `income - adjustment`
#[derive(Debug, Clone, Default)]
pub struct AdjustedEarnings {
    fields: DerivedFields,
}

impl AdjustedEarnings {
    /// Create the variable over the given field mapping.
    pub const fn new(fields: DerivedFields) -> Self {
        Self { fields }
    }
}

impl DerivedVariable for AdjustedEarnings {
    fn name(&self) -> &str {
        ADJUSTED_EARNINGS
    }

    fn required_columns(&self) -> Vec<&str> {
        vec![self.fields.income.as_str(), self.fields.adjustment.as_str()]
    }

    fn compute(&self, data: LazyFrame) -> Result<LazyFrame> {
        Ok(data.with_columns([self.fields.adjusted_earnings().alias(ADJUSTED_EARNINGS)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasman_data::columns::f64_values;

    #[test]
    fn test_missing_adjustment_counts_as_zero() {
        let df = df! {
            "ib" => [Some(10.0), Some(10.0), None],
            "spi" => [Some(4.0), None, Some(1.0)],
        }
        .unwrap();

        let out = AdjustedEarnings::default()
            .compute(df.lazy())
            .unwrap()
            .collect()
            .unwrap();
        assert_eq!(
            f64_values(&out, ADJUSTED_EARNINGS).unwrap(),
            vec![Some(6.0), Some(10.0), None]
        );
    }
}
