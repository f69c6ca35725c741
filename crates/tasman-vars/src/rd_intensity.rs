//! R&D intensity

use crate::error::Result;
use crate::fields::{DerivedFields, RD_INTENSITY};
use crate::variable::DerivedVariable;
use polars::prelude::*;

/// R&D expense over the scale denominator.
///
/// Missing R&D expense is read as zero (the firm reports none); the
/// denominator policy is the same as [`crate::Profitability`].
#[derive(Debug, Clone, Default)]
pub struct RdIntensity {
    fields: DerivedFields,
}

impl RdIntensity {
    /// Create the variable over the given field mapping.
    pub const fn new(fields: DerivedFields) -> Self {
        Self { fields }
    }
}

impl DerivedVariable for RdIntensity {
    fn name(&self) -> &str {
        RD_INTENSITY
    }

    fn required_columns(&self) -> Vec<&str> {
        vec![self.fields.rd_expense.as_str(), self.fields.scale.as_str()]
    }

    fn compute(&self, data: LazyFrame) -> Result<LazyFrame> {
        let expense = col(self.fields.rd_expense.as_str())
            .cast(DataType::Float64)
            .fill_null(lit(0.0));
        Ok(data.with_columns([self.fields.scaled(expense).alias(RD_INTENSITY)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasman_data::columns::f64_values;

    #[test]
    fn test_rd_intensity() {
        let df = df! {
            "xrd" => [Some(5.0), None, Some(5.0)],
            "at" => [Some(50.0), Some(50.0), Some(0.0)],
        }
        .unwrap();

        let out = RdIntensity::default()
            .compute(df.lazy())
            .unwrap()
            .collect()
            .unwrap();
        assert_eq!(
            f64_values(&out, RD_INTENSITY).unwrap(),
            vec![Some(0.1), Some(0.0), None]
        );
    }
}
