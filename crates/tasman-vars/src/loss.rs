//! Loss indicator

use crate::error::Result;
use crate::fields::{DerivedFields, LOSS};
use crate::variable::DerivedVariable;
use polars::prelude::*;

/// `1` when adjusted earnings are strictly negative, `0` otherwise.
///
/// Stored as `Int32`. Break-even (exactly zero) is not a loss. Null when
/// income is null.
#[derive(Debug, Clone, Default)]
pub struct LossIndicator {
    fields: DerivedFields,
}

impl LossIndicator {
    /// Create the variable over the given field mapping.
    pub const fn new(fields: DerivedFields) -> Self {
        Self { fields }
    }
}

impl DerivedVariable for LossIndicator {
    fn name(&self) -> &str {
        LOSS
    }

    fn required_columns(&self) -> Vec<&str> {
        vec![self.fields.income.as_str(), self.fields.adjustment.as_str()]
    }

    fn compute(&self, data: LazyFrame) -> Result<LazyFrame> {
        let earnings = self.fields.adjusted_earnings();
        let flag = when(earnings.clone().is_null())
            .then(lit(NULL).cast(DataType::Int32))
            .when(earnings.lt(lit(0.0)))
            .then(lit(1i32))
            .otherwise(lit(0i32))
            .cast(DataType::Int32);
        Ok(data.with_columns([flag.alias(LOSS)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tasman_data::columns::i32_values;

    #[rstest]
    #[case(Some(-0.5), Some(1))]
    #[case(Some(0.0), Some(0))]
    #[case(Some(3.0), Some(0))]
    #[case(None, None)]
    fn test_loss_boundary(#[case] ib: Option<f64>, #[case] expected: Option<i32>) {
        let df = df! {
            "ib" => [ib],
            "spi" => [None::<f64>],
        }
        .unwrap();

        let out = LossIndicator::default()
            .compute(df.lazy())
            .unwrap()
            .collect()
            .unwrap();
        assert_eq!(i32_values(&out, LOSS).unwrap(), vec![expected]);
    }
}
