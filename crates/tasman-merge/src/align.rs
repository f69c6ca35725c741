//! Left-join alignment of secondary tables onto the primary panel.
//!
//! The primary panel defines the row set: [`align`] never creates or drops a
//! primary row. Secondary payload columns are attached where the canonical
//! key matches and are null elsewhere. Every join reports its match rate,
//! overall and per period, because a silent drop in match rate corrupts
//! everything downstream.

use crate::error::{MergeError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tasman_data::columns::{bool_values, has_column, i32_values, key_values};
use tracing::{info, warn};

/// Temporary column marking rows that found a secondary counterpart.
const MATCH_INDICATOR: &str = "__tasman_matched";

/// Temporary column carrying the primary row order through the join.
const ROW_INDEX: &str = "__tasman_row";

/// What to do when the secondary table is not unique per key and the join
/// inflates the panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanoutPolicy {
    /// Fail with [`MergeError::JoinFanout`]
    #[default]
    Abort,
    /// Return the inflated frame with [`AlignReport::fanout`] set
    Report,
}

/// Restricts match-rate accounting to a period range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchFilter {
    /// Integer period column in the primary panel (fiscal year)
    pub period_column: String,
    /// First period counted, inclusive
    pub from: Option<i32>,
    /// Last period counted, inclusive
    pub to: Option<i32>,
}

impl MatchFilter {
    /// Count every period in `period_column`.
    pub fn all(period_column: impl Into<String>) -> Self {
        Self {
            period_column: period_column.into(),
            from: None,
            to: None,
        }
    }

    /// Count periods from `from` onwards, e.g. the secondary source's coverage start.
    pub fn starting(period_column: impl Into<String>, from: i32) -> Self {
        Self {
            period_column: period_column.into(),
            from: Some(from),
            to: None,
        }
    }

    fn contains(&self, period: Option<i32>) -> bool {
        period.is_some_and(|p| {
            self.from.is_none_or(|from| p >= from) && self.to.is_none_or(|to| p <= to)
        })
    }
}

/// Join specification for one secondary source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignSpec {
    /// Secondary table name, for diagnostics
    pub table: String,
    /// Canonical key columns present in both tables
    pub keys: Vec<String>,
    /// Secondary columns to attach
    pub payload: Vec<String>,
    /// Period restriction for match-rate accounting
    pub match_filter: Option<MatchFilter>,
    /// Fan-out handling
    pub on_fanout: FanoutPolicy,
}

impl AlignSpec {
    /// Create a spec with no match filter that aborts on fan-out.
    pub fn new<K, P, S, T>(table: impl Into<String>, keys: K, payload: P) -> Self
    where
        K: IntoIterator<Item = S>,
        S: Into<String>,
        P: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            table: table.into(),
            keys: keys.into_iter().map(Into::into).collect(),
            payload: payload.into_iter().map(Into::into).collect(),
            match_filter: None,
            on_fanout: FanoutPolicy::Abort,
        }
    }

    /// Set the match-rate filter.
    pub fn with_filter(mut self, filter: MatchFilter) -> Self {
        self.match_filter = Some(filter);
        self
    }

    /// Set the fan-out policy.
    pub const fn with_fanout(mut self, policy: FanoutPolicy) -> Self {
        self.on_fanout = policy;
        self
    }
}

/// Match counts for one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodMatch {
    /// Period value
    pub period: i32,
    /// Primary rows in the period
    pub rows: usize,
    /// Rows that found a counterpart
    pub matched: usize,
}

impl PeriodMatch {
    /// Share of rows matched.
    pub fn match_rate(&self) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.matched as f64 / self.rows as f64
        }
    }
}

/// Diagnostics from one alignment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignReport {
    /// Secondary table name
    pub table: String,
    /// Rows in the primary panel
    pub primary_rows: usize,
    /// Rows after the join (equal to `primary_rows` unless fanned out)
    pub aligned_rows: usize,
    /// Keys occurring more than once in the secondary table
    pub duplicate_keys: usize,
    /// Rows inside the match filter
    pub filtered_rows: usize,
    /// Filtered rows that found a counterpart
    pub matched_rows: usize,
    /// `matched_rows / filtered_rows`; `None` when no row passed the filter
    pub match_rate: Option<f64>,
    /// Match counts per period of the filter column
    pub by_period: Vec<PeriodMatch>,
    /// Whether the join inflated the panel
    pub fanout: bool,
}

impl AlignReport {
    /// Filtered rows with a null secondary payload.
    pub const fn unmatched_rows(&self) -> usize {
        self.filtered_rows - self.matched_rows
    }
}

/// Aligned panel plus diagnostics.
#[derive(Debug, Clone)]
pub struct Alignment {
    /// Primary columns followed by nullable payload columns
    pub frame: DataFrame,
    /// Join diagnostics
    pub report: AlignReport,
}

fn check_spec(primary: &DataFrame, secondary: &DataFrame, spec: &AlignSpec) -> Result<()> {
    if spec.keys.is_empty() {
        return Err(MergeError::InvalidSpec(format!(
            "alignment with {} has no key columns",
            spec.table
        )));
    }

    for key in &spec.keys {
        let left = primary.column(key).map_err(|_| MergeError::MissingColumn {
            table: "primary".to_string(),
            column: key.clone(),
        })?;
        let right = secondary
            .column(key)
            .map_err(|_| MergeError::MissingColumn {
                table: spec.table.clone(),
                column: key.clone(),
            })?;
        if left.dtype() != right.dtype() {
            return Err(MergeError::KeyTypeMismatch {
                table: spec.table.clone(),
                column: key.clone(),
                left: left.dtype().to_string(),
                right: right.dtype().to_string(),
            });
        }
    }

    for column in &spec.payload {
        if !has_column(secondary, column) {
            return Err(MergeError::MissingColumn {
                table: spec.table.clone(),
                column: column.clone(),
            });
        }
        if has_column(primary, column) || spec.keys.contains(column) {
            return Err(MergeError::ColumnConflict {
                table: spec.table.clone(),
                column: column.clone(),
            });
        }
    }

    if let Some(filter) = &spec.match_filter
        && !has_column(primary, &filter.period_column)
    {
        return Err(MergeError::MissingColumn {
            table: "primary".to_string(),
            column: filter.period_column.clone(),
        });
    }
    Ok(())
}

fn count_duplicate_keys(secondary: &DataFrame, keys: &[String]) -> Result<usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for key in key_values(secondary, keys)?.into_iter().flatten() {
        *counts.entry(key).or_default() += 1;
    }
    Ok(counts.values().filter(|&&n| n > 1).count())
}

/// Left-join `secondary`'s payload onto `primary` by the canonical key.
///
/// The output keeps every primary row in its original order. If the join
/// inflates the row count `spec.on_fanout` decides between an
/// error and a flagged report.
pub fn align(primary: &DataFrame, secondary: &DataFrame, spec: &AlignSpec) -> Result<Alignment> {
    check_spec(primary, secondary, spec)?;
    let duplicate_keys = count_duplicate_keys(secondary, &spec.keys)?;

    let on: Vec<Expr> = spec.keys.iter().map(|k| col(k.as_str())).collect();
    let right = secondary
        .clone()
        .lazy()
        .select(
            spec.keys
                .iter()
                .chain(&spec.payload)
                .map(|c| col(c.as_str()))
                .collect::<Vec<_>>(),
        )
        .with_column(lit(true).alias(MATCH_INDICATOR));

    let joined = primary
        .clone()
        .lazy()
        .with_row_index(ROW_INDEX, None)
        .join(right, on.clone(), on, JoinArgs::new(JoinType::Left))
        .sort(
            [ROW_INDEX],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .collect()?;

    let primary_rows = primary.height();
    let aligned_rows = joined.height();
    let fanout = aligned_rows > primary_rows;
    if fanout {
        match spec.on_fanout {
            FanoutPolicy::Abort => {
                return Err(MergeError::JoinFanout {
                    table: spec.table.clone(),
                    primary_rows,
                    aligned_rows,
                    duplicate_keys,
                });
            }
            FanoutPolicy::Report => warn!(
                table = %spec.table,
                primary_rows,
                aligned_rows,
                duplicate_keys,
                "Join fanned out; panel is no longer unique per key"
            ),
        }
    }

    let matched = bool_values(&joined, MATCH_INDICATOR)?;
    let periods = match &spec.match_filter {
        Some(filter) => i32_values(&joined, &filter.period_column)?,
        None => vec![None; joined.height()],
    };

    let mut filtered_rows = 0;
    let mut matched_rows = 0;
    let mut by_period: BTreeMap<i32, PeriodMatch> = BTreeMap::new();
    for (is_matched, period) in matched.iter().zip(&periods) {
        let is_matched = is_matched.unwrap_or(false);
        let counted = spec
            .match_filter
            .as_ref()
            .is_none_or(|f| f.contains(*period));
        if !counted {
            continue;
        }
        filtered_rows += 1;
        matched_rows += usize::from(is_matched);
        if let Some(period) = period {
            let entry = by_period.entry(*period).or_insert(PeriodMatch {
                period: *period,
                rows: 0,
                matched: 0,
            });
            entry.rows += 1;
            entry.matched += usize::from(is_matched);
        }
    }

    let frame = joined
        .lazy()
        .select([col("*").exclude([ROW_INDEX, MATCH_INDICATOR])])
        .collect()?;

    let match_rate = (filtered_rows > 0).then(|| matched_rows as f64 / filtered_rows as f64);
    let report = AlignReport {
        table: spec.table.clone(),
        primary_rows,
        aligned_rows,
        duplicate_keys,
        filtered_rows,
        matched_rows,
        match_rate,
        by_period: by_period.into_values().collect(),
        fanout,
    };

    info!(
        table = %report.table,
        rows = report.aligned_rows,
        matched = report.matched_rows,
        filtered = report.filtered_rows,
        match_rate = report.match_rate.unwrap_or(0.0),
        "Alignment complete"
    );

    Ok(Alignment { frame, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasman_data::columns::{f64_values, str_values};

    fn primary() -> DataFrame {
        DataFrame::new(vec![
            Column::new("gvkey".into(), ["A", "A", "B", "C"]),
            Column::new("fyear".into(), [2003, 2004, 2004, 2005]),
            Column::new("ib".into(), [1.0, 2.0, 3.0, 4.0]),
        ])
        .unwrap()
    }

    fn secondary() -> DataFrame {
        DataFrame::new(vec![
            Column::new("gvkey".into(), [Some("A"), Some("C"), None, Some("Z")]),
            Column::new("fyear".into(), [2004, 2005, 2005, 2005]),
            Column::new("opinion".into(), [10.0, 30.0, 99.0, 77.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_left_join_preserves_rows_and_order() {
        let spec = AlignSpec::new("opinions", ["gvkey", "fyear"], ["opinion"]);
        let out = align(&primary(), &secondary(), &spec).unwrap();

        assert_eq!(out.frame.height(), 4);
        assert_eq!(
            str_values(&out.frame, "gvkey").unwrap(),
            vec![Some("A".into()), Some("A".into()), Some("B".into()), Some("C".into())]
        );
        assert_eq!(
            f64_values(&out.frame, "opinion").unwrap(),
            vec![None, Some(10.0), None, Some(30.0)]
        );
        assert_eq!(out.report.matched_rows, 2);
        assert_eq!(out.report.unmatched_rows(), 2);
        assert!(!has_column(&out.frame, MATCH_INDICATOR));
    }

    #[test]
    fn test_match_rate_respects_filter() {
        let spec = AlignSpec::new("opinions", ["gvkey", "fyear"], ["opinion"])
            .with_filter(MatchFilter::starting("fyear", 2004));
        let report = align(&primary(), &secondary(), &spec).unwrap().report;

        assert_eq!(report.filtered_rows, 3);
        assert_eq!(report.matched_rows, 2);
        approx::assert_relative_eq!(report.match_rate.unwrap(), 2.0 / 3.0);
        assert_eq!(report.by_period.len(), 2);
        assert_eq!(report.by_period[0].period, 2004);
        approx::assert_relative_eq!(report.by_period[0].match_rate(), 0.5);
    }

    #[test]
    fn test_fanout_aborts_by_default() {
        let mut dup = secondary();
        dup.vstack_mut(&secondary()).unwrap();
        let spec = AlignSpec::new("opinions", ["gvkey", "fyear"], ["opinion"]);
        let err = align(&primary(), &dup, &spec).unwrap_err();
        assert!(matches!(
            err,
            MergeError::JoinFanout {
                primary_rows: 4,
                aligned_rows: 6,
                ..
            }
        ));
    }

    #[test]
    fn test_fanout_can_be_reported() {
        let mut dup = secondary();
        dup.vstack_mut(&secondary()).unwrap();
        let spec = AlignSpec::new("opinions", ["gvkey", "fyear"], ["opinion"])
            .with_fanout(FanoutPolicy::Report);
        let out = align(&primary(), &dup, &spec).unwrap();
        assert!(out.report.fanout);
        assert_eq!(out.report.aligned_rows, 6);
        assert_eq!(out.report.duplicate_keys, 3);
    }

    #[test]
    fn test_payload_conflict_rejected() {
        let spec = AlignSpec::new("opinions", ["gvkey", "fyear"], ["ib"]);
        let mut sec = secondary();
        sec.with_column(Series::new("ib".into(), [0.0, 0.0, 0.0, 0.0]))
            .unwrap();
        let err = align(&primary(), &sec, &spec).unwrap_err();
        assert!(matches!(err, MergeError::ColumnConflict { .. }));
    }

    #[test]
    fn test_key_type_mismatch_rejected() {
        let sec = DataFrame::new(vec![
            Column::new("gvkey".into(), ["A"]),
            Column::new("fyear".into(), ["2004"]),
            Column::new("opinion".into(), [1.0]),
        ])
        .unwrap();
        let spec = AlignSpec::new("opinions", ["gvkey", "fyear"], ["opinion"]);
        let err = align(&primary(), &sec, &spec).unwrap_err();
        assert!(matches!(err, MergeError::KeyTypeMismatch { .. }));
    }
}
