//! Winsorization
//!
//! Clips each selected column at its own empirical tail quantiles, computed
//! over every non-null, non-NaN value in the frame. NaN is left in place. Bounds use the nearest-rank
//! quantile, so they are always observed values and a second pass with the
//! same cutoffs changes nothing.

use crate::error::{Result, VarError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tasman_data::columns::f64_values;
use tracing::{debug, info};

/// Bounds applied to one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinsorBounds {
    /// Column name
    pub column: String,
    /// Lower quantile bound (None when the column is all null)
    pub lower: Option<f64>,
    /// Upper quantile bound (None when the column is all null)
    pub upper: Option<f64>,
    /// Values raised to the lower bound
    pub clipped_low: usize,
    /// Values lowered to the upper bound
    pub clipped_high: usize,
    /// Non-null values in the column
    pub non_null: usize,
}

/// Tail-fraction winsorizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Winsorizer {
    lower: f64,
    upper: f64,
}

impl Default for Winsorizer {
    fn default() -> Self {
        Self {
            lower: 0.01,
            upper: 0.01,
        }
    }
}

impl Winsorizer {
    /// Create a winsorizer clipping the bottom `lower` and top `upper`
    /// fractions.
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        let valid = lower.is_finite()
            && upper.is_finite()
            && lower >= 0.0
            && upper >= 0.0
            && lower + upper < 1.0;
        if valid {
            Ok(Self { lower, upper })
        } else {
            Err(VarError::InvalidCutoffs { lower, upper })
        }
    }

    /// Lower tail fraction.
    pub const fn lower(&self) -> f64 {
        self.lower
    }

    /// Upper tail fraction.
    pub const fn upper(&self) -> f64 {
        self.upper
    }

    /// Quantile bounds of one column, without clipping.
    pub fn bounds(&self, df: &DataFrame, column: &str) -> Result<(Option<f64>, Option<f64>)> {
        if df.column(column).is_err() {
            return Err(VarError::MissingColumn {
                variable: "winsorize".to_string(),
                column: column.to_string(),
            });
        }

        let value = col(column).cast(DataType::Float64);
        let value = value.clone().filter(value.is_not_nan());
        let quantiles = df
            .clone()
            .lazy()
            .select([
                value
                    .clone()
                    .quantile(lit(self.lower), QuantileMethod::Nearest)
                    .alias("lower"),
                value
                    .quantile(lit(1.0 - self.upper), QuantileMethod::Nearest)
                    .alias("upper"),
            ])
            .collect()?;

        let lower = f64_values(&quantiles, "lower")?.first().copied().flatten();
        let upper = f64_values(&quantiles, "upper")?.first().copied().flatten();
        Ok((lower, upper))
    }

    /// Winsorize `columns` of `df`, returning the new frame and the bounds
    /// used per column.
    ///
    /// Each column is cast to `Float64`. Nulls stay null and the non-null
    /// count is unchanged.
    pub fn apply(
        &self,
        df: &DataFrame,
        columns: &[String],
    ) -> Result<(DataFrame, Vec<WinsorBounds>)> {
        let mut clipped = Vec::with_capacity(columns.len());
        let mut report = Vec::with_capacity(columns.len());

        for column in columns {
            let (lower, upper) = self.bounds(df, column)?;
            let values = f64_values(df, column)?;
            let non_null = values.iter().flatten().count();

            let (Some(lo), Some(hi)) = (lower, upper) else {
                debug!(column = %column, "Column is all null, left unchanged");
                report.push(WinsorBounds {
                    column: column.clone(),
                    lower: None,
                    upper: None,
                    clipped_low: 0,
                    clipped_high: 0,
                    non_null,
                });
                continue;
            };

            let bounds = WinsorBounds {
                column: column.clone(),
                lower,
                upper,
                clipped_low: values.iter().flatten().filter(|v| **v < lo).count(),
                clipped_high: values.iter().flatten().filter(|v| **v > hi).count(),
                non_null,
            };
            debug!(
                column = %column,
                lower = lo,
                upper = hi,
                clipped_low = bounds.clipped_low,
                clipped_high = bounds.clipped_high,
                "Winsor bounds"
            );
            report.push(bounds);

            let value = col(column.as_str()).cast(DataType::Float64);
            clipped.push(
                when(value.clone().is_nan())
                    .then(value.clone())
                    .when(value.clone().lt(lit(lo)))
                    .then(lit(lo))
                    .when(value.clone().gt(lit(hi)))
                    .then(lit(hi))
                    .otherwise(value)
                    .alias(column.as_str()),
            );
        }

        let out = if clipped.is_empty() {
            df.clone()
        } else {
            df.clone().lazy().with_columns(clipped).collect()?
        };

        info!(
            columns = report.len(),
            clipped = report
                .iter()
                .map(|b| b.clipped_low + b.clipped_high)
                .sum::<usize>(),
            "Winsorization complete"
        );
        Ok((out, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(-0.1, 0.01)]
    #[case(0.01, 1.0)]
    #[case(0.5, 0.5)]
    #[case(f64::NAN, 0.01)]
    fn test_invalid_cutoffs(#[case] lower: f64, #[case] upper: f64) {
        assert!(matches!(
            Winsorizer::new(lower, upper),
            Err(VarError::InvalidCutoffs { .. })
        ));
    }

    #[test]
    fn test_zero_cutoffs_are_identity() {
        let df = df! { "x" => [Some(3.0), None, Some(-8.0), Some(100.0)] }.unwrap();
        let (out, bounds) = Winsorizer::new(0.0, 0.0)
            .unwrap()
            .apply(&df, &["x".to_string()])
            .unwrap();
        assert!(out.equals_missing(&df));
        assert_eq!(bounds[0].lower, Some(-8.0));
        assert_eq!(bounds[0].upper, Some(100.0));
    }

    #[test]
    fn test_all_null_column_passes_through() {
        let df = df! { "x" => [None::<f64>, None] }.unwrap();
        let (out, bounds) = Winsorizer::default()
            .apply(&df, &["x".to_string()])
            .unwrap();
        assert_eq!(out.column("x").unwrap().null_count(), 2);
        assert_eq!(bounds[0].lower, None);
        assert_eq!(bounds[0].non_null, 0);
    }

    #[test]
    fn test_missing_column() {
        let df = df! { "x" => [1.0] }.unwrap();
        let err = Winsorizer::default()
            .apply(&df, &["y".to_string()])
            .unwrap_err();
        assert!(matches!(err, VarError::MissingColumn { .. }));
    }
}
