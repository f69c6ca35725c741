//! Sample selection by fiscal year and minimum scale.

use crate::error::Result;
use polars::prelude::*;
use tasman_output::SampleReport;
use tracing::info;

/// Keeps rows inside the sample years whose scale reaches a minimum.
///
/// Rows with a null fiscal year fall outside any bound that is set. When a
/// minimum scale is set, rows with a null scale are dropped with the
/// undersized ones.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSelector {
    year_column: String,
    scale_column: String,
    year_start: Option<i32>,
    year_end: Option<i32>,
    min_scale: Option<f64>,
}

impl SampleSelector {
    /// Selector over the given year and scale columns, with no bounds.
    pub fn new(year_column: impl Into<String>, scale_column: impl Into<String>) -> Self {
        Self {
            year_column: year_column.into(),
            scale_column: scale_column.into(),
            year_start: None,
            year_end: None,
            min_scale: None,
        }
    }

    /// Inclusive fiscal-year bounds.
    pub const fn with_years(mut self, start: Option<i32>, end: Option<i32>) -> Self {
        self.year_start = start;
        self.year_end = end;
        self
    }

    /// Minimum scale denominator.
    pub const fn with_min_scale(mut self, min_scale: Option<f64>) -> Self {
        self.min_scale = min_scale;
        self
    }

    fn year_filter(&self) -> Option<Expr> {
        let year = col(self.year_column.as_str());
        match (self.year_start, self.year_end) {
            (None, None) => None,
            (Some(start), None) => Some(year.gt_eq(lit(start))),
            (None, Some(end)) => Some(year.lt_eq(lit(end))),
            (Some(start), Some(end)) => {
                Some(year.clone().gt_eq(lit(start)).and(year.lt_eq(lit(end))))
            }
        }
    }

    /// Apply the filters, returning the kept rows and the drop counts.
    pub fn apply(&self, df: &DataFrame) -> Result<(DataFrame, SampleReport)> {
        let mut report = SampleReport {
            rows_in: df.height(),
            ..Default::default()
        };

        let in_years = match self.year_filter() {
            Some(filter) => df.clone().lazy().filter(filter).collect()?,
            None => df.clone(),
        };
        report.outside_years = df.height() - in_years.height();

        let selected = match self.min_scale {
            Some(min) => in_years
                .clone()
                .lazy()
                .filter(
                    col(self.scale_column.as_str())
                        .cast(DataType::Float64)
                        .gt_eq(lit(min)),
                )
                .collect()?,
            None => in_years.clone(),
        };
        report.below_min_scale = in_years.height() - selected.height();
        report.rows_out = selected.height();

        info!(
            rows_in = report.rows_in,
            outside_years = report.outside_years,
            below_min_scale = report.below_min_scale,
            rows_out = report.rows_out,
            "Sample selected"
        );
        Ok((selected, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn panel() -> DataFrame {
        df! {
            "fyear" => [Some(2003), Some(2004), Some(2010), Some(2021), None],
            "at" => [Some(50.0), Some(5.0), None, Some(80.0), Some(20.0)],
        }
        .unwrap()
    }

    #[rstest]
    #[case(None, None, None, 0, 0, 5)]
    #[case(Some(2004), Some(2020), None, 3, 0, 2)]
    #[case(None, None, Some(10.0), 0, 2, 3)]
    #[case(Some(2004), Some(2020), Some(10.0), 3, 2, 0)]
    #[case(Some(2000), None, Some(10.0), 1, 2, 2)]
    fn test_selection_counts(
        #[case] start: Option<i32>,
        #[case] end: Option<i32>,
        #[case] min_scale: Option<f64>,
        #[case] outside_years: usize,
        #[case] below_min_scale: usize,
        #[case] rows_out: usize,
    ) {
        let (out, report) = SampleSelector::new("fyear", "at")
            .with_years(start, end)
            .with_min_scale(min_scale)
            .apply(&panel())
            .unwrap();

        assert_eq!(report.rows_in, 5);
        assert_eq!(report.outside_years, outside_years);
        assert_eq!(report.below_min_scale, below_min_scale);
        assert_eq!(report.rows_out, rows_out);
        assert_eq!(out.height(), rows_out);
    }

    #[test]
    fn test_min_scale_is_inclusive() {
        let df = df! { "fyear" => [2010, 2010], "at" => [10.0, 9.99] }.unwrap();
        let (out, _) = SampleSelector::new("fyear", "at")
            .with_min_scale(Some(10.0))
            .apply(&df)
            .unwrap();
        assert_eq!(out.height(), 1);
    }
}
