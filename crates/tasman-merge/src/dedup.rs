//! Deduplication to one row per key.
//!
//! Source tables do not guarantee one row per (entity, fiscal year): a fiscal
//! year change can leave two period ends in one bucket, and a secondary
//! source can report several opinions for the same firm-year. The
//! [`Deduplicator`] groups rows by key and runs an ordered chain of
//! [`PrecedenceRule`]s over every group with more than one row. A group the
//! chain cannot reduce to a single survivor is excluded from the output and
//! surfaced in [`Dedup::ambiguous`]; it is never resolved by row order.

use crate::align::{AlignSpec, align};
use crate::error::{MergeError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tasman_data::columns::{date_values, has_column, key_values, row_fingerprints, str_values};
use tasman_data::dates::date_to_days;
use tracing::{debug, info, warn};

/// Column added to excluded rows in [`Dedup::ambiguous`].
pub const DEDUP_STATUS: &str = "dedup_status";

/// Column holding a bucket's canonical period end.
pub const CANONICAL_PERIOD_END: &str = "canonical_period_end";

/// One step of the precedence chain.
///
/// Each rule scores rows; within a group the best-scored rows survive. A rule
/// no candidate satisfies leaves the candidates unchanged, except
/// [`PrecedenceRule::MatchCanonicalDate`]: when the bucket has a canonical
/// period end and no candidate matches it, the group is ambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum PrecedenceRule {
    /// Prefer rows whose period end equals the bucket's canonical period end
    MatchCanonicalDate {
        /// Row's own period-end date column
        date_column: String,
        /// Column with the bucket's canonical period end
        canonical_column: String,
    },
    /// Prefer rows whose value ranks earliest in `ranking`
    PreferValues {
        /// Column holding the sub-type (e.g. attestation type)
        column: String,
        /// Values from most to least authoritative
        ranking: Vec<String>,
    },
    /// Prefer the row with the latest date
    LatestDate {
        /// Date column
        column: String,
    },
}

impl PrecedenceRule {
    /// Match the row's period end against the canonical period end column.
    pub fn match_canonical(date_column: impl Into<String>) -> Self {
        Self::MatchCanonicalDate {
            date_column: date_column.into(),
            canonical_column: CANONICAL_PERIOD_END.to_string(),
        }
    }

    /// Prefer values in the given order.
    pub fn prefer<I, S>(column: impl Into<String>, ranking: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::PreferValues {
            column: column.into(),
            ranking: ranking.into_iter().map(Into::into).collect(),
        }
    }

    /// Label used in diagnostics.
    pub fn label(&self) -> String {
        match self {
            Self::MatchCanonicalDate { date_column, .. } => {
                format!("match_canonical_date({})", date_column)
            }
            Self::PreferValues { column, .. } => format!("prefer_values({})", column),
            Self::LatestDate { column } => format!("latest_date({})", column),
        }
    }

    fn columns(&self) -> Vec<&str> {
        match self {
            Self::MatchCanonicalDate {
                date_column,
                canonical_column,
            } => vec![date_column.as_str(), canonical_column.as_str()],
            Self::PreferValues { column, .. } | Self::LatestDate { column } => vec![column.as_str()],
        }
    }

    /// Per row, whether the canonical period end is known. `None` for rules
    /// that do not anchor on a canonical date.
    fn anchored(&self, df: &DataFrame) -> Result<Option<Vec<bool>>> {
        match self {
            Self::MatchCanonicalDate {
                canonical_column, ..
            } => Ok(Some(
                date_values(df, canonical_column)?
                    .iter()
                    .map(Option::is_some)
                    .collect(),
            )),
            _ => Ok(None),
        }
    }

    /// Per-row score; lower wins, `None` never wins.
    fn scores(&self, df: &DataFrame) -> Result<Vec<Option<i64>>> {
        let scores = match self {
            Self::MatchCanonicalDate {
                date_column,
                canonical_column,
            } => {
                let own = date_values(df, date_column)?;
                let canonical = date_values(df, canonical_column)?;
                own.iter()
                    .zip(&canonical)
                    .map(|(a, b)| match (a, b) {
                        (Some(a), Some(b)) if a == b => Some(0),
                        _ => None,
                    })
                    .collect()
            }
            Self::PreferValues { column, ranking } => str_values(df, column)?
                .iter()
                .map(|v| {
                    v.as_deref()
                        .and_then(|v| ranking.iter().position(|r| r == v))
                        .map(|p| p as i64)
                })
                .collect(),
            Self::LatestDate { column } => date_values(df, column)?
                .iter()
                .map(|d| d.map(|d| -i64::from(date_to_days(d))))
                .collect(),
        };
        Ok(scores)
    }
}

/// Keep the best-scored candidates, or all of them if none is scored.
fn narrow(candidates: &[usize], scores: &[Option<i64>]) -> Vec<usize> {
    match candidates.iter().filter_map(|&i| scores[i]).min() {
        Some(best) => candidates
            .iter()
            .copied()
            .filter(|&i| scores[i] == Some(best))
            .collect(),
        None => candidates.to_vec(),
    }
}

/// Number of groups a rule resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCount {
    /// Rule label
    pub rule: String,
    /// Groups reduced to one survivor by this rule
    pub resolved: usize,
}

/// Data-quality counts from one deduplication pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupReport {
    /// Table name
    pub table: String,
    /// Rows before deduplication
    pub rows_in: usize,
    /// Rows kept
    pub rows_out: usize,
    /// Distinct non-null keys
    pub groups: usize,
    /// Rows with a null key part (passed through)
    pub null_key_rows: usize,
    /// Groups with more than one row
    pub duplicate_groups: usize,
    /// Groups whose surviving candidates were identical rows
    pub exact_duplicates: usize,
    /// Groups resolved per rule, in chain order
    pub resolved_by_rule: Vec<RuleCount>,
    /// Groups the chain could not resolve
    pub ambiguous_groups: usize,
    /// Rows excluded because their group was ambiguous
    pub ambiguous_rows: usize,
    /// Ambiguous groups where no period end matched the canonical one
    #[serde(default)]
    pub no_canonical_match: usize,
}

impl DedupReport {
    /// Duplicate groups that ended with a single survivor.
    pub fn resolved_groups(&self) -> usize {
        self.exact_duplicates + self.resolved_by_rule.iter().map(|r| r.resolved).sum::<usize>()
    }
}

/// Result of a deduplication pass.
#[derive(Debug, Clone)]
pub struct Dedup {
    /// One row per key
    pub frame: DataFrame,
    /// Rows of ambiguous groups, marked with [`DEDUP_STATUS`]
    pub ambiguous: DataFrame,
    /// Diagnostic counts
    pub report: DedupReport,
}

/// Collapses rows sharing a key using a precedence rule chain.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    table: String,
    keys: Vec<String>,
    rules: Vec<PrecedenceRule>,
}

impl Deduplicator {
    /// Create a deduplicator for `table` keyed by `keys`, with no rules.
    pub fn new<I, S>(table: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            keys: keys.into_iter().map(Into::into).collect(),
            rules: Vec::new(),
        }
    }

    /// Append a rule to the chain.
    pub fn with_rule(mut self, rule: PrecedenceRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Key columns.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[PrecedenceRule] {
        &self.rules
    }

    fn check_columns(&self, df: &DataFrame) -> Result<()> {
        let needed = self
            .keys
            .iter()
            .map(String::as_str)
            .chain(self.rules.iter().flat_map(|r| r.columns()));
        for column in needed {
            if !has_column(df, column) {
                return Err(MergeError::MissingColumn {
                    table: self.table.clone(),
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Reduce `df` to at most one row per key.
    pub fn run(&self, df: &DataFrame) -> Result<Dedup> {
        if self.keys.is_empty() {
            return Err(MergeError::InvalidSpec(format!(
                "deduplicator for {} has no key columns",
                self.table
            )));
        }
        self.check_columns(df)?;

        let keys = key_values(df, &self.keys)?;
        let scores = self
            .rules
            .iter()
            .map(|r| r.scores(df))
            .collect::<Result<Vec<_>>>()?;
        let anchors = self
            .rules
            .iter()
            .map(|r| r.anchored(df))
            .collect::<Result<Vec<_>>>()?;

        // Groups in first-occurrence order; null-key rows stay singletons.
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut null_key_rows = 0;
        for (row, key) in keys.iter().enumerate() {
            match key {
                Some(key) => match index.get(key.as_str()) {
                    Some(&g) => groups[g].push(row),
                    None => {
                        index.insert(key.as_str(), groups.len());
                        groups.push(vec![row]);
                    }
                },
                None => {
                    null_key_rows += 1;
                    groups.push(vec![row]);
                }
            }
        }

        let mut report = DedupReport {
            table: self.table.clone(),
            rows_in: df.height(),
            groups: index.len(),
            null_key_rows,
            resolved_by_rule: self
                .rules
                .iter()
                .map(|r| RuleCount {
                    rule: r.label(),
                    resolved: 0,
                })
                .collect(),
            ..Default::default()
        };

        let fingerprints = if groups.iter().any(|g| g.len() > 1) {
            row_fingerprints(df)?
        } else {
            Vec::new()
        };
        let mut kept: Vec<IdxSize> = Vec::with_capacity(groups.len());
        let mut excluded: Vec<IdxSize> = Vec::new();

        for group in &groups {
            if let [row] = group.as_slice() {
                kept.push(*row as IdxSize);
                continue;
            }
            report.duplicate_groups += 1;

            let mut candidates = group.clone();
            let mut winner = None;
            let mut unmatched = false;
            for (rule_idx, rule_scores) in scores.iter().enumerate() {
                if let Some(anchored) = &anchors[rule_idx]
                    && candidates.iter().all(|&i| rule_scores[i].is_none())
                    && candidates.iter().any(|&i| anchored[i])
                {
                    unmatched = true;
                    break;
                }
                candidates = narrow(&candidates, rule_scores);
                if let [row] = candidates.as_slice() {
                    report.resolved_by_rule[rule_idx].resolved += 1;
                    winner = Some(*row);
                    break;
                }
            }

            if winner.is_none() {
                let first = &fingerprints[candidates[0]];
                if candidates.iter().all(|&i| &fingerprints[i] == first) {
                    report.exact_duplicates += 1;
                    winner = Some(candidates[0]);
                }
            }

            match winner {
                Some(row) => kept.push(row as IdxSize),
                None => {
                    report.ambiguous_groups += 1;
                    report.ambiguous_rows += group.len();
                    if unmatched {
                        report.no_canonical_match += 1;
                    }
                    excluded.extend(group.iter().map(|&i| i as IdxSize));
                }
            }
        }

        let frame = df.take(&IdxCa::from_vec("idx".into(), kept))?;
        let mut ambiguous = df.take(&IdxCa::from_vec("idx".into(), excluded))?;
        let status = vec!["ambiguous"; ambiguous.height()];
        ambiguous.with_column(Series::new(DEDUP_STATUS.into(), status))?;
        report.rows_out = frame.height();

        if report.ambiguous_groups > 0 {
            warn!(
                table = %self.table,
                groups = report.ambiguous_groups,
                rows = report.ambiguous_rows,
                no_canonical_match = report.no_canonical_match,
                "Duplicate groups left ambiguous and excluded"
            );
        }
        for count in &report.resolved_by_rule {
            debug!(table = %self.table, rule = %count.rule, resolved = count.resolved, "Rule outcome");
        }
        info!(
            table = %self.table,
            rows_in = report.rows_in,
            rows_out = report.rows_out,
            duplicate_groups = report.duplicate_groups,
            "Deduplication complete"
        );

        Ok(Dedup {
            frame,
            ambiguous,
            report,
        })
    }
}

/// Canonical period end per (entity, fiscal year) bucket of the primary panel.
///
/// The latest period end in each bucket is canonical. Returns the entity and
/// year columns plus [`CANONICAL_PERIOD_END`], unique per bucket.
pub fn canonical_period_ends(
    primary: &DataFrame,
    entity: &str,
    year: &str,
    date: &str,
) -> Result<DataFrame> {
    let df = primary
        .clone()
        .lazy()
        .filter(col(entity).is_not_null().and(col(year).is_not_null()))
        .group_by([col(entity), col(year)])
        .agg([col(date).max().alias(CANONICAL_PERIOD_END)])
        .sort([entity, year], SortMultipleOptions::default())
        .collect()?;
    Ok(df)
}

/// Attach [`CANONICAL_PERIOD_END`] to a secondary table keyed like the panel.
///
/// Rows whose bucket is absent from the panel get a null canonical date.
pub fn attach_canonical_period_end(
    secondary: &DataFrame,
    canonical: &DataFrame,
    keys: &[String],
) -> Result<DataFrame> {
    let spec = AlignSpec::new("canonical_period_end", keys.to_vec(), [CANONICAL_PERIOD_END]);
    Ok(align(secondary, canonical, &spec)?.frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tasman_data::columns::date_column;

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    fn opinions() -> DataFrame {
        DataFrame::new(vec![
            Column::new("gvkey".into(), ["E", "E", "F", "F", "G", "G", "H"]),
            Column::new("fyear".into(), [2016, 2016, 2016, 2016, 2016, 2016, 2016]),
            date_column(
                "period_end",
                &[
                    date(2016, 6, 30),
                    date(2016, 12, 31),
                    date(2016, 12, 31),
                    date(2016, 12, 31),
                    date(2016, 3, 31),
                    date(2016, 9, 30),
                    date(2016, 12, 31),
                ],
            )
            .unwrap(),
            date_column(CANONICAL_PERIOD_END, &[date(2016, 12, 31); 7]).unwrap(),
            Column::new(
                "attestation".into(),
                ["auditor", "auditor", "management", "auditor", "auditor", "management", "auditor"],
            ),
        ])
        .unwrap()
    }

    fn dedup() -> Deduplicator {
        Deduplicator::new("opinions", ["gvkey", "fyear"])
            .with_rule(PrecedenceRule::match_canonical("period_end"))
            .with_rule(PrecedenceRule::prefer("attestation", ["auditor", "management"]))
    }

    #[test]
    fn test_rule_chain_attribution() {
        let out = dedup().run(&opinions()).unwrap();
        let report = &out.report;

        assert_eq!(report.rows_in, 7);
        assert_eq!(report.groups, 4);
        assert_eq!(report.duplicate_groups, 3);
        // E: canonical date match. F: tie on date, auditor wins. G: neither
        // date matches the canonical one, so preference is never consulted.
        assert_eq!(report.resolved_by_rule[0].resolved, 1);
        assert_eq!(report.resolved_by_rule[1].resolved, 1);
        assert_eq!(report.ambiguous_groups, 1);
        assert_eq!(report.no_canonical_match, 1);
        assert_eq!(out.frame.height(), 3);
        assert_eq!(
            date_values(&out.ambiguous, "period_end").unwrap(),
            vec![date(2016, 3, 31), date(2016, 9, 30)]
        );
    }

    #[test]
    fn test_unresolvable_group_is_excluded() {
        let df = DataFrame::new(vec![
            Column::new("gvkey".into(), ["E", "E", "F"]),
            Column::new("fyear".into(), [2016, 2016, 2016]),
            date_column("period_end", &[date(2016, 3, 31), date(2016, 9, 30), date(2016, 12, 31)])
                .unwrap(),
            date_column(CANONICAL_PERIOD_END, &[date(2016, 12, 31); 3]).unwrap(),
            Column::new("attestation".into(), ["auditor", "auditor", "auditor"]),
        ])
        .unwrap();

        let out = dedup().run(&df).unwrap();
        assert_eq!(out.frame.height(), 1);
        assert_eq!(out.report.ambiguous_groups, 1);
        assert_eq!(out.report.ambiguous_rows, 2);
        assert_eq!(out.ambiguous.height(), 2);
        assert_eq!(
            str_values(&out.ambiguous, DEDUP_STATUS).unwrap(),
            vec![Some("ambiguous".to_string()); 2]
        );
    }

    #[test]
    fn test_unknown_canonical_date_falls_through() {
        let df = DataFrame::new(vec![
            Column::new("gvkey".into(), ["E", "E"]),
            Column::new("fyear".into(), [2016, 2016]),
            date_column("period_end", &[date(2016, 3, 31), date(2016, 9, 30)]).unwrap(),
            date_column(CANONICAL_PERIOD_END, &[None, None]).unwrap(),
            Column::new("attestation".into(), ["management", "auditor"]),
        ])
        .unwrap();

        let out = dedup().run(&df).unwrap();
        assert_eq!(out.report.resolved_by_rule[1].resolved, 1);
        assert_eq!(out.report.no_canonical_match, 0);
        assert_eq!(
            str_values(&out.frame, "attestation").unwrap(),
            vec![Some("auditor".to_string())]
        );
    }

    #[test]
    fn test_identical_rows_collapse() {
        let df = DataFrame::new(vec![
            Column::new("gvkey".into(), ["E", "E"]),
            Column::new("fyear".into(), [2016, 2016]),
            Column::new("payload".into(), [1.0, 1.0]),
        ])
        .unwrap();
        let out = Deduplicator::new("t", ["gvkey", "fyear"]).run(&df).unwrap();
        assert_eq!(out.frame.height(), 1);
        assert_eq!(out.report.exact_duplicates, 1);
        assert_eq!(out.report.ambiguous_groups, 0);
    }

    #[test]
    fn test_null_keys_pass_through() {
        let df = DataFrame::new(vec![
            Column::new("gvkey".into(), [None, None, Some("E")]),
            Column::new("fyear".into(), [2016, 2016, 2016]),
        ])
        .unwrap();
        let out = Deduplicator::new("t", ["gvkey", "fyear"]).run(&df).unwrap();
        assert_eq!(out.frame.height(), 3);
        assert_eq!(out.report.null_key_rows, 2);
        assert_eq!(out.report.duplicate_groups, 0);
    }

    #[test]
    fn test_latest_date_rule() {
        let df = DataFrame::new(vec![
            Column::new("gvkey".into(), ["E", "E"]),
            Column::new("fyear".into(), [2016, 2016]),
            date_column("datadate", &[date(2016, 6, 30), date(2016, 12, 31)]).unwrap(),
        ])
        .unwrap();
        let out = Deduplicator::new("t", ["gvkey", "fyear"])
            .with_rule(PrecedenceRule::LatestDate {
                column: "datadate".to_string(),
            })
            .run(&df)
            .unwrap();
        assert_eq!(date_values(&out.frame, "datadate").unwrap(), vec![date(2016, 12, 31)]);
    }

    #[test]
    fn test_missing_rule_column() {
        let df = DataFrame::new(vec![
            Column::new("gvkey".into(), ["E"]),
            Column::new("fyear".into(), [2016]),
        ])
        .unwrap();
        let err = dedup().run(&df).unwrap_err();
        assert!(matches!(err, MergeError::MissingColumn { .. }));
    }

    #[test]
    fn test_canonical_period_ends_takes_latest() {
        let primary = DataFrame::new(vec![
            Column::new("gvkey".into(), ["E", "E", "F"]),
            Column::new("fyear".into(), [2016, 2016, 2016]),
            date_column("datadate", &[date(2016, 6, 30), date(2016, 12, 31), date(2016, 9, 30)])
                .unwrap(),
        ])
        .unwrap();
        let canonical = canonical_period_ends(&primary, "gvkey", "fyear", "datadate").unwrap();
        assert_eq!(canonical.height(), 2);
        assert_eq!(
            date_values(&canonical, CANONICAL_PERIOD_END).unwrap(),
            vec![date(2016, 12, 31), date(2016, 9, 30)]
        );
    }
}
