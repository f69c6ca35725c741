//! Per-stage diagnostics collected over one pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tasman_data::ResolutionReport;
use tasman_merge::{AlignReport, DedupReport, WindowReport};
use tasman_vars::WinsorBounds;

/// Counts from sample selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleReport {
    /// Rows entering selection
    pub rows_in: usize,
    /// Rows dropped for a fiscal year outside the sample bounds
    pub outside_years: usize,
    /// Rows dropped for a null scale or one below the minimum
    pub below_min_scale: usize,
    /// Rows kept
    pub rows_out: usize,
}

/// Diagnostics for one secondary source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceDiagnostics {
    /// Source name
    pub name: String,
    /// Alias resolution counts
    pub resolution: ResolutionReport,
    /// Deduplication counts
    pub dedup: DedupReport,
    /// Join counts and match rates
    pub alignment: AlignReport,
}

/// Diagnostics for the time-series source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowDiagnostics {
    /// Window aggregation counts
    pub window: WindowReport,
    /// Join of the aggregates back onto the panel
    pub alignment: AlignReport,
}

/// Everything a run reports, in pipeline order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// When the run finished
    pub generated_at: DateTime<Utc>,
    /// Deduplication of the primary panel per (entity, fiscal year)
    pub primary: DedupReport,
    /// Uniqueness pass per (entity, period end)
    pub primary_periods: DedupReport,
    /// One entry per secondary source
    pub sources: Vec<SourceDiagnostics>,
    /// Time-series aggregation, when configured
    pub window: Option<WindowDiagnostics>,
    /// Sample selection counts
    pub sample: SampleReport,
    /// Bounds applied per winsorized column
    pub winsorization: Vec<WinsorBounds>,
    /// Rows in the final panel
    pub panel_rows: usize,
}

impl Default for PipelineDiagnostics {
    fn default() -> Self {
        Self {
            generated_at: Utc::now(),
            primary: DedupReport::default(),
            primary_periods: DedupReport::default(),
            sources: Vec::new(),
            window: None,
            sample: SampleReport::default(),
            winsorization: Vec::new(),
            panel_rows: 0,
        }
    }
}

/// One flattened metric, for tabular export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Pipeline stage
    pub stage: String,
    /// Table, source or column the metric describes
    pub subject: String,
    /// Metric name
    pub metric: String,
    /// Metric value
    pub value: f64,
}

impl MetricRecord {
    fn new(stage: &str, subject: &str, metric: &str, value: f64) -> Self {
        Self {
            stage: stage.to_string(),
            subject: subject.to_string(),
            metric: metric.to_string(),
            value,
        }
    }

    fn count(stage: &str, subject: &str, metric: &str, value: usize) -> Self {
        Self::new(stage, subject, metric, value as f64)
    }
}

fn dedup_records(subject: &str, report: &DedupReport, out: &mut Vec<MetricRecord>) {
    out.push(MetricRecord::count("dedup", subject, "rows_in", report.rows_in));
    out.push(MetricRecord::count("dedup", subject, "rows_out", report.rows_out));
    out.push(MetricRecord::count(
        "dedup",
        subject,
        "duplicate_groups",
        report.duplicate_groups,
    ));
    out.push(MetricRecord::count(
        "dedup",
        subject,
        "exact_duplicates",
        report.exact_duplicates,
    ));
    for rule in &report.resolved_by_rule {
        out.push(MetricRecord::count(
            "dedup",
            subject,
            &format!("resolved_by:{}", rule.rule),
            rule.resolved,
        ));
    }
    out.push(MetricRecord::count(
        "dedup",
        subject,
        "ambiguous_groups",
        report.ambiguous_groups,
    ));
    out.push(MetricRecord::count(
        "dedup",
        subject,
        "ambiguous_rows",
        report.ambiguous_rows,
    ));
    out.push(MetricRecord::count(
        "dedup",
        subject,
        "no_canonical_match",
        report.no_canonical_match,
    ));
}

fn align_records(subject: &str, report: &AlignReport, out: &mut Vec<MetricRecord>) {
    out.push(MetricRecord::count("align", subject, "primary_rows", report.primary_rows));
    out.push(MetricRecord::count("align", subject, "aligned_rows", report.aligned_rows));
    out.push(MetricRecord::count("align", subject, "filtered_rows", report.filtered_rows));
    out.push(MetricRecord::count("align", subject, "matched_rows", report.matched_rows));
    if let Some(rate) = report.match_rate {
        out.push(MetricRecord::new("align", subject, "match_rate", rate));
    }
    for period in &report.by_period {
        out.push(MetricRecord::new(
            "align",
            subject,
            &format!("match_rate:{}", period.period),
            period.match_rate(),
        ));
    }
}

impl PipelineDiagnostics {
    /// Data-quality problems worth a reviewer's attention.
    ///
    /// Sources whose overall match rate falls below `match_rate_floor` are
    /// reported alongside ambiguity, unresolved aliases and cadence changes.
    pub fn warnings(&self, match_rate_floor: f64) -> Vec<String> {
        let mut warnings = Vec::new();

        for report in [&self.primary, &self.primary_periods] {
            if report.ambiguous_groups > 0 {
                warnings.push(format!(
                    "{}: {} ambiguous groups ({} rows) excluded",
                    report.table, report.ambiguous_groups, report.ambiguous_rows
                ));
            }
        }

        for source in &self.sources {
            let unresolved = source.resolution.unmapped + source.resolution.ambiguous;
            if unresolved > 0 {
                warnings.push(format!(
                    "{}: {} of {} rows had unresolved aliases",
                    source.name, unresolved, source.resolution.rows
                ));
            }
            if source.dedup.ambiguous_groups > 0 {
                warnings.push(format!(
                    "{}: {} ambiguous groups ({} rows) excluded",
                    source.name, source.dedup.ambiguous_groups, source.dedup.ambiguous_rows
                ));
            }
            if let Some(rate) = source.alignment.match_rate
                && rate < match_rate_floor
            {
                warnings.push(format!(
                    "{}: match rate {:.1}% below {:.1}%",
                    source.name,
                    rate * 100.0,
                    match_rate_floor * 100.0
                ));
            }
        }

        if let Some(window) = &self.window
            && window.window.cadence_changed > 0
        {
            warnings.push(format!(
                "time series: {} rows with a changed fiscal cadence",
                window.window.cadence_changed
            ));
        }

        warnings
    }

    /// Flatten every count and rate into `(stage, subject, metric, value)`
    /// records.
    pub fn metric_records(&self) -> Vec<MetricRecord> {
        let mut out = Vec::new();

        dedup_records(&self.primary.table, &self.primary, &mut out);
        dedup_records(&self.primary_periods.table, &self.primary_periods, &mut out);
        for source in &self.sources {
            let r = &source.resolution;
            out.push(MetricRecord::count("resolve", &source.name, "rows", r.rows));
            out.push(MetricRecord::count("resolve", &source.name, "resolved", r.resolved));
            out.push(MetricRecord::count("resolve", &source.name, "unmapped", r.unmapped));
            out.push(MetricRecord::count("resolve", &source.name, "ambiguous", r.ambiguous));
            dedup_records(&source.name, &source.dedup, &mut out);
            align_records(&source.name, &source.alignment, &mut out);
        }

        if let Some(window) = &self.window {
            let w = &window.window;
            out.push(MetricRecord::count("window", &window.alignment.table, "rows", w.rows));
            out.push(MetricRecord::count(
                "window",
                &window.alignment.table,
                "first_observations",
                w.first_observations,
            ));
            out.push(MetricRecord::count(
                "window",
                &window.alignment.table,
                "cadence_changed",
                w.cadence_changed,
            ));
            out.push(MetricRecord::count(
                "window",
                &window.alignment.table,
                "empty_windows",
                w.empty_windows,
            ));
            align_records(&window.alignment.table, &window.alignment, &mut out);
        }

        let s = &self.sample;
        out.push(MetricRecord::count("sample", "panel", "rows_in", s.rows_in));
        out.push(MetricRecord::count("sample", "panel", "outside_years", s.outside_years));
        out.push(MetricRecord::count("sample", "panel", "below_min_scale", s.below_min_scale));
        out.push(MetricRecord::count("sample", "panel", "rows_out", s.rows_out));

        for bounds in &self.winsorization {
            if let (Some(lower), Some(upper)) = (bounds.lower, bounds.upper) {
                out.push(MetricRecord::new("winsorize", &bounds.column, "lower", lower));
                out.push(MetricRecord::new("winsorize", &bounds.column, "upper", upper));
            }
            out.push(MetricRecord::count(
                "winsorize",
                &bounds.column,
                "clipped",
                bounds.clipped_low + bounds.clipped_high,
            ));
        }

        out.push(MetricRecord::count("panel", "panel", "rows", self.panel_rows));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagnostics() -> PipelineDiagnostics {
        PipelineDiagnostics {
            primary: DedupReport {
                table: "funda".to_string(),
                rows_in: 10,
                rows_out: 9,
                duplicate_groups: 1,
                ..Default::default()
            },
            sources: vec![SourceDiagnostics {
                name: "audit".to_string(),
                resolution: ResolutionReport {
                    rows: 8,
                    resolved: 6,
                    unmapped: 2,
                    ambiguous: 0,
                },
                dedup: DedupReport {
                    ambiguous_groups: 1,
                    ambiguous_rows: 2,
                    ..Default::default()
                },
                alignment: AlignReport {
                    table: "audit".to_string(),
                    match_rate: Some(0.5),
                    ..Default::default()
                },
            }],
            window: Some(WindowDiagnostics {
                window: WindowReport {
                    cadence_changed: 3,
                    ..Default::default()
                },
                alignment: AlignReport::default(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_warnings() {
        let warnings = diagnostics().warnings(0.8);
        assert_eq!(warnings.len(), 4);
        assert!(warnings[0].contains("unresolved aliases"));
        assert!(warnings[2].contains("match rate 50.0%"));
        assert!(warnings[3].contains("3 rows"));

        assert_eq!(diagnostics().warnings(0.4).len(), 3);
    }

    #[test]
    fn test_metric_records() {
        let records = diagnostics().metric_records();
        assert!(records.iter().any(|r| r.stage == "dedup"
            && r.subject == "funda"
            && r.metric == "duplicate_groups"
            && r.value == 1.0));
        assert!(records.iter().any(|r| r.metric == "match_rate" && r.value == 0.5));
        assert_eq!(records.last().map(|r| r.metric.as_str()), Some("rows"));
    }

    #[test]
    fn test_json_roundtrip_keeps_window() {
        let diag = diagnostics();
        let json = serde_json::to_string(&diag).unwrap();
        let back: PipelineDiagnostics = serde_json::from_str(&json).unwrap();
        assert_eq!(back, diag);
    }
}
