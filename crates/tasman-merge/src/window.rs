//! Lookback-window aggregation of monthly series onto panel rows.
//!
//! Each panel row is anchored on its period-end date `D`. The row's window
//! holds every calendar month whose first day falls in `[D - L months, D]`,
//! where `L` is the configured lookback. The monthly series is aggregated
//! over the months of that window that carry a value; missing months are
//! skipped, and a window with no values yields null.
//!
//! The lookback is fixed even when a firm changes its fiscal year end and the
//! gap to its previous anchor differs from `L`. Such rows are flagged with
//! `cadence_changed`, and an entity's earliest anchor is flagged with
//! `is_first_obs`, so callers can filter or audit them.

use crate::align::{AlignReport, AlignSpec, align};
use crate::error::{MergeError, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::RangeInclusive;
use tasman_data::columns::{date_column, date_values, f64_values, has_column, str_values};
use tasman_data::dates::{lookback_months, month_index, month_start, months_between};
use tracing::{debug, info, warn};

/// Flag column: the row is its entity's earliest anchor.
pub const IS_FIRST_OBS: &str = "is_first_obs";

/// Flag column: the gap to the previous anchor differs from the lookback.
pub const CADENCE_CHANGED: &str = "cadence_changed";

/// Observed months between the previous anchor and this one.
pub const CADENCE_MONTHS: &str = "cadence_months";

/// How values inside a window are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Arithmetic mean
    #[default]
    Mean,
    /// Sum
    Sum,
    /// Minimum
    Min,
    /// Maximum
    Max,
    /// Median
    Median,
}

impl Aggregation {
    /// Aggregate `values`; `None` for an empty slice.
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let out = match self {
            Self::Mean => values.iter().sum::<f64>() / n,
            Self::Sum => values.iter().sum(),
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
        };
        Some(out)
    }
}

/// A monthly time series keyed by calendar month.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlySeries {
    points: BTreeMap<i32, Option<f64>>,
}

impl MonthlySeries {
    /// Create an empty series.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the value for the month containing `month`.
    ///
    /// A `None` value records a known-missing month. Two points in the same
    /// calendar month are rejected.
    pub fn insert(&mut self, month: NaiveDate, value: Option<f64>) -> Result<()> {
        let idx = month_index(month);
        if self.points.insert(idx, value.filter(|v| v.is_finite())).is_some() {
            return Err(MergeError::DuplicateSeriesMonth {
                month: month_start(idx).unwrap_or(month),
            });
        }
        Ok(())
    }

    /// Read a series from a frame with a date column and a value column.
    pub fn from_frame(df: &DataFrame, date: &str, value: &str) -> Result<Self> {
        let dates = date_values(df, date)?;
        let values = f64_values(df, value)?;
        let mut series = Self::new();
        for (d, v) in dates.into_iter().zip(values) {
            if let Some(d) = d {
                series.insert(d, v)?;
            }
        }
        debug!(months = series.len(), "Monthly series loaded");
        Ok(series)
    }

    /// Number of months recorded.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no month is recorded.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Non-missing values in a range of absolute month numbers.
    pub fn values_in(&self, months: RangeInclusive<i32>) -> Vec<f64> {
        self.points
            .range(months)
            .filter_map(|(_, v)| *v)
            .collect()
    }
}

/// Column roles and parameters for window aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    /// Entity column
    pub entity: String,
    /// Anchor (period-end) date column
    pub anchor: String,
    /// Lookback length in calendar months
    pub lookback_months: u32,
    /// Aggregation over the window
    pub aggregation: Aggregation,
    /// Output column for the aggregate
    pub output: String,
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            entity: "gvkey".to_string(),
            anchor: "datadate".to_string(),
            lookback_months: 12,
            aggregation: Aggregation::Mean,
            output: "sentiment".to_string(),
        }
    }
}

impl WindowSpec {
    /// Column counting the months that contributed to the aggregate.
    pub fn months_column(&self) -> String {
        format!("{}_months", self.output)
    }
}

/// Diagnostics from one aggregation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowReport {
    /// Distinct (entity, anchor) rows aggregated
    pub rows: usize,
    /// Rows with no earlier anchor for their entity
    pub first_observations: usize,
    /// Rows whose gap to the previous anchor differs from the lookback
    pub cadence_changed: usize,
    /// Rows whose window held no values
    pub empty_windows: usize,
    /// Panel rows skipped for a null entity or anchor
    pub skipped_rows: usize,
}

/// Aggregates a monthly series over each panel row's lookback window.
#[derive(Debug, Clone)]
pub struct WindowAggregator {
    spec: WindowSpec,
}

impl WindowAggregator {
    /// Create an aggregator.
    pub fn new(spec: WindowSpec) -> Result<Self> {
        if spec.lookback_months == 0 {
            return Err(MergeError::InvalidSpec(
                "lookback window must span at least one month".to_string(),
            ));
        }
        Ok(Self { spec })
    }

    /// The aggregation parameters.
    pub const fn spec(&self) -> &WindowSpec {
        &self.spec
    }

    /// One row per distinct (entity, anchor) with the aggregate and flags.
    ///
    /// Every output value depends only on the row's own anchor, the set of
    /// anchors of its entity and the series, so input row order is irrelevant.
    pub fn aggregate(
        &self,
        panel: &DataFrame,
        series: &MonthlySeries,
    ) -> Result<(DataFrame, WindowReport)> {
        for column in [&self.spec.entity, &self.spec.anchor] {
            if !has_column(panel, column) {
                return Err(MergeError::MissingColumn {
                    table: "primary".to_string(),
                    column: column.clone(),
                });
            }
        }

        let entities = str_values(panel, &self.spec.entity)?;
        let anchors = date_values(panel, &self.spec.anchor)?;

        let mut history: HashMap<&str, Vec<NaiveDate>> = HashMap::new();
        let mut keys: Vec<(&str, NaiveDate)> = Vec::new();
        let mut seen: HashSet<(&str, NaiveDate)> = HashSet::new();
        let mut report = WindowReport::default();

        for (entity, anchor) in entities.iter().zip(&anchors) {
            let (Some(entity), Some(anchor)) = (entity.as_deref(), *anchor) else {
                report.skipped_rows += 1;
                continue;
            };
            if seen.insert((entity, anchor)) {
                keys.push((entity, anchor));
                history.entry(entity).or_default().push(anchor);
            }
        }
        for dates in history.values_mut() {
            dates.sort_unstable();
        }

        let lookback = self.spec.lookback_months;
        let n = keys.len();
        let mut out_entity = Vec::with_capacity(n);
        let mut out_anchor = Vec::with_capacity(n);
        let mut out_value = Vec::with_capacity(n);
        let mut out_months = Vec::with_capacity(n);
        let mut out_first = Vec::with_capacity(n);
        let mut out_changed = Vec::with_capacity(n);
        let mut out_cadence = Vec::with_capacity(n);

        for (entity, anchor) in keys {
            let dates = history.get(entity).map(Vec::as_slice).unwrap_or_default();
            let previous = dates.partition_point(|d| *d < anchor).checked_sub(1);
            let cadence = previous.map(|i| months_between(dates[i], anchor));
            let changed = cadence.is_some_and(|c| c != lookback as i32);

            let values = lookback_months(anchor, lookback)
                .map(|window| series.values_in(window))
                .unwrap_or_default();
            let aggregate = self.spec.aggregation.apply(&values);

            report.rows += 1;
            report.first_observations += usize::from(previous.is_none());
            report.cadence_changed += usize::from(changed);
            report.empty_windows += usize::from(aggregate.is_none());

            out_entity.push(entity.to_string());
            out_anchor.push(Some(anchor));
            out_value.push(aggregate);
            out_months.push(values.len() as i32);
            out_first.push(previous.is_none());
            out_changed.push(changed);
            out_cadence.push(cadence);
        }

        let entity_dtype = panel.column(&self.spec.entity)?.dtype().clone();
        let entity_column: Column = Series::new(self.spec.entity.as_str().into(), out_entity)
            .cast(&entity_dtype)?
            .into();

        let frame = DataFrame::new(vec![
            entity_column,
            date_column(&self.spec.anchor, &out_anchor)?,
            Column::new(self.spec.output.as_str().into(), out_value),
            Column::new(self.spec.months_column().into(), out_months),
            Column::new(IS_FIRST_OBS.into(), out_first),
            Column::new(CADENCE_CHANGED.into(), out_changed),
            Column::new(CADENCE_MONTHS.into(), out_cadence),
        ])?;

        if report.cadence_changed > 0 {
            warn!(
                rows = report.cadence_changed,
                lookback, "Fiscal cadence changed; fixed lookback applied"
            );
        }
        if report.empty_windows > 0 {
            debug!(rows = report.empty_windows, "Windows without series values");
        }
        info!(
            output = %self.spec.output,
            rows = report.rows,
            first_observations = report.first_observations,
            "Window aggregation complete"
        );

        Ok((frame, report))
    }

    /// Aggregate and left-join the results back onto the panel.
    pub fn attach(
        &self,
        panel: &DataFrame,
        series: &MonthlySeries,
    ) -> Result<(DataFrame, WindowReport, AlignReport)> {
        let (aggregates, report) = self.aggregate(panel, series)?;
        let payload = [
            self.spec.output.clone(),
            self.spec.months_column(),
            IS_FIRST_OBS.to_string(),
            CADENCE_CHANGED.to_string(),
            CADENCE_MONTHS.to_string(),
        ];
        let spec = AlignSpec::new(
            self.spec.output.as_str(),
            [self.spec.entity.as_str(), self.spec.anchor.as_str()],
            payload,
        );
        let aligned = align(panel, &aggregates, &spec)?;
        Ok((aligned.frame, report, aligned.report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use tasman_data::columns::{bool_values, i32_values};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn series(points: &[(NaiveDate, Option<f64>)]) -> MonthlySeries {
        let mut s = MonthlySeries::new();
        for (d, v) in points {
            s.insert(*d, *v).unwrap();
        }
        s
    }

    fn panel(rows: &[(&str, NaiveDate)]) -> DataFrame {
        let entities: Vec<&str> = rows.iter().map(|r| r.0).collect();
        let anchors: Vec<Option<NaiveDate>> = rows.iter().map(|r| Some(r.1)).collect();
        DataFrame::new(vec![
            Column::new("gvkey".into(), entities),
            date_column("datadate", &anchors).unwrap(),
        ])
        .unwrap()
    }

    fn aggregator(lookback: u32) -> WindowAggregator {
        WindowAggregator::new(WindowSpec {
            lookback_months: lookback,
            ..Default::default()
        })
        .unwrap()
    }

    #[rstest]
    #[case(Aggregation::Mean, 2.0)]
    #[case(Aggregation::Sum, 6.0)]
    #[case(Aggregation::Min, 1.0)]
    #[case(Aggregation::Max, 3.0)]
    #[case(Aggregation::Median, 2.0)]
    fn test_aggregations(#[case] agg: Aggregation, #[case] expected: f64) {
        assert_relative_eq!(agg.apply(&[3.0, 1.0, 2.0]).unwrap(), expected);
        assert_eq!(agg.apply(&[]), None);
    }

    #[test]
    fn test_duplicate_month_rejected() {
        let mut s = MonthlySeries::new();
        s.insert(date(2020, 1, 1), Some(1.0)).unwrap();
        let err = s.insert(date(2020, 1, 31), Some(2.0)).unwrap_err();
        assert!(matches!(err, MergeError::DuplicateSeriesMonth { .. }));
    }

    #[test]
    fn test_missing_month_excluded_from_mean() {
        let s = series(&[
            (date(2020, 1, 1), Some(1.0)),
            (date(2020, 2, 1), None),
            (date(2020, 3, 1), Some(3.0)),
            (date(2019, 12, 1), Some(100.0)),
        ]);
        let (out, _) = aggregator(3)
            .aggregate(&panel(&[("A", date(2020, 3, 31))]), &s)
            .unwrap();
        assert_relative_eq!(f64_values(&out, "sentiment").unwrap()[0].unwrap(), 2.0);
        assert_eq!(i32_values(&out, "sentiment_months").unwrap()[0], Some(2));
    }

    #[test]
    fn test_all_missing_window_is_null() {
        let s = series(&[(date(2018, 1, 1), Some(5.0))]);
        let (out, report) = aggregator(12)
            .aggregate(&panel(&[("A", date(2020, 12, 31))]), &s)
            .unwrap();
        assert_eq!(f64_values(&out, "sentiment").unwrap()[0], None);
        assert_eq!(report.empty_windows, 1);
    }

    #[test]
    fn test_first_observation_and_cadence_flags() {
        // Fiscal year end moves from December to June in 2017.
        let rows = [
            ("A", date(2016, 12, 31)),
            ("A", date(2015, 12, 31)),
            ("A", date(2017, 6, 30)),
            ("B", date(2017, 6, 30)),
        ];
        let (out, report) = aggregator(12)
            .aggregate(&panel(&rows), &MonthlySeries::new())
            .unwrap();

        assert_eq!(
            bool_values(&out, IS_FIRST_OBS).unwrap(),
            vec![Some(false), Some(true), Some(false), Some(true)]
        );
        assert_eq!(
            bool_values(&out, CADENCE_CHANGED).unwrap(),
            vec![Some(false), Some(false), Some(true), Some(false)]
        );
        assert_eq!(
            i32_values(&out, CADENCE_MONTHS).unwrap(),
            vec![Some(12), None, Some(6), None]
        );
        assert_eq!(report.first_observations, 2);
        assert_eq!(report.cadence_changed, 1);
    }

    #[test]
    fn test_attach_keeps_panel_rows() {
        let s = series(&[(date(2016, 12, 1), Some(1.5))]);
        let df = panel(&[("A", date(2016, 12, 31)), ("A", date(2016, 12, 31)), ("B", date(2015, 12, 31))]);
        let (out, report, align_report) = aggregator(12).attach(&df, &s).unwrap();

        assert_eq!(out.height(), 3);
        assert_eq!(report.rows, 2);
        assert!(!align_report.fanout);
        assert_eq!(
            f64_values(&out, "sentiment").unwrap(),
            vec![Some(1.5), Some(1.5), None]
        );
    }

    #[test]
    fn test_zero_lookback_rejected() {
        assert!(WindowAggregator::new(WindowSpec {
            lookback_months: 0,
            ..Default::default()
        })
        .is_err());
    }
}
