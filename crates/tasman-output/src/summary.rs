//! Audit summary of a pipeline run.
//!
//! Condenses [`PipelineDiagnostics`] into titled sections of label/value
//! lines plus a list of data-quality warnings, rendered for a terminal or as
//! Markdown.

use crate::diagnostics::PipelineDiagnostics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tasman_merge::{AlignReport, DedupReport};

/// One label/value line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLine {
    /// What is counted
    pub label: String,
    /// Rendered value
    pub value: String,
}

impl AuditLine {
    fn new(label: impl Into<String>, value: impl ToString) -> Self {
        Self {
            label: label.into(),
            value: value.to_string(),
        }
    }
}

/// A titled group of lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSection {
    /// Section title
    pub title: String,
    /// Lines in display order
    pub lines: Vec<AuditLine>,
}

/// Printable digest of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    /// When the run finished
    pub generated_at: DateTime<Utc>,
    /// Sections in pipeline order
    pub sections: Vec<AuditSection>,
    /// Data-quality warnings
    pub warnings: Vec<String>,
}

fn percent(rate: Option<f64>) -> String {
    rate.map_or_else(|| "n/a".to_string(), |r| format!("{:.1}%", r * 100.0))
}

fn dedup_lines(report: &DedupReport) -> Vec<AuditLine> {
    let mut lines = vec![
        AuditLine::new("Rows in / out", format!("{} / {}", report.rows_in, report.rows_out)),
        AuditLine::new("Duplicate groups", report.duplicate_groups),
        AuditLine::new("Exact duplicates", report.exact_duplicates),
    ];
    lines.extend(
        report
            .resolved_by_rule
            .iter()
            .map(|r| AuditLine::new(format!("Resolved by {}", r.rule), r.resolved)),
    );
    lines.push(AuditLine::new(
        "Ambiguous groups (rows)",
        format!("{} ({})", report.ambiguous_groups, report.ambiguous_rows),
    ));
    lines.push(AuditLine::new(
        "No canonical period-end match",
        report.no_canonical_match,
    ));
    lines
}

fn align_lines(report: &AlignReport) -> Vec<AuditLine> {
    let mut lines = vec![
        AuditLine::new(
            "Primary / aligned rows",
            format!("{} / {}", report.primary_rows, report.aligned_rows),
        ),
        AuditLine::new(
            "Matched rows",
            format!("{} of {}", report.matched_rows, report.filtered_rows),
        ),
        AuditLine::new("Match rate", percent(report.match_rate)),
    ];
    lines.extend(report.by_period.iter().map(|p| {
        AuditLine::new(
            format!("  {}", p.period),
            format!("{} / {} ({:.1}%)", p.matched, p.rows, p.match_rate() * 100.0),
        )
    }));
    lines
}

impl AuditSummary {
    /// Build the summary, flagging sources matched below `match_rate_floor`.
    pub fn from_diagnostics(diag: &PipelineDiagnostics, match_rate_floor: f64) -> Self {
        let mut primary = dedup_lines(&diag.primary);
        primary.push(AuditLine::new(
            "Period-end duplicates",
            diag.primary_periods.duplicate_groups,
        ));
        primary.push(AuditLine::new(
            "Period-end ambiguous groups",
            diag.primary_periods.ambiguous_groups,
        ));
        let mut sections = vec![AuditSection {
            title: format!("Primary panel ({})", diag.primary.table),
            lines: primary,
        }];

        for source in &diag.sources {
            let r = &source.resolution;
            let mut lines = vec![
                AuditLine::new("Rows", r.rows),
                AuditLine::new("Resolved", r.resolved),
                AuditLine::new("Unmapped", r.unmapped),
                AuditLine::new("Ambiguous aliases", r.ambiguous),
            ];
            lines.extend(dedup_lines(&source.dedup));
            lines.extend(align_lines(&source.alignment));
            sections.push(AuditSection {
                title: format!("Source {}", source.name),
                lines,
            });
        }

        if let Some(window) = &diag.window {
            let w = &window.window;
            let mut lines = vec![
                AuditLine::new("Rows", w.rows),
                AuditLine::new("First observations", w.first_observations),
                AuditLine::new("Cadence changed", w.cadence_changed),
                AuditLine::new("Empty windows", w.empty_windows),
                AuditLine::new("Skipped rows", w.skipped_rows),
            ];
            lines.extend(align_lines(&window.alignment));
            sections.push(AuditSection {
                title: "Time series window".to_string(),
                lines,
            });
        }

        let s = &diag.sample;
        sections.push(AuditSection {
            title: "Sample selection".to_string(),
            lines: vec![
                AuditLine::new("Rows in", s.rows_in),
                AuditLine::new("Outside year bounds", s.outside_years),
                AuditLine::new("Below minimum scale", s.below_min_scale),
                AuditLine::new("Rows out", s.rows_out),
            ],
        });

        if !diag.winsorization.is_empty() {
            sections.push(AuditSection {
                title: "Winsorization".to_string(),
                lines: diag
                    .winsorization
                    .iter()
                    .map(|b| {
                        let value = match (b.lower, b.upper) {
                            (Some(lo), Some(hi)) => format!(
                                "[{:.4}, {:.4}] clipped {} low, {} high",
                                lo, hi, b.clipped_low, b.clipped_high
                            ),
                            _ => "all null".to_string(),
                        };
                        AuditLine::new(b.column.clone(), value)
                    })
                    .collect(),
            });
        }

        Self {
            generated_at: diag.generated_at,
            sections,
            warnings: diag.warnings(match_rate_floor),
        }
    }

    /// Format as ASCII table for terminal display.
    pub fn to_ascii_table(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "\nPanel Audit ({})\n",
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        output.push_str(&"=".repeat(72));
        output.push('\n');

        for section in &self.sections {
            output.push_str(&format!("\n{}:\n", section.title));
            output.push_str(&"-".repeat(72));
            output.push('\n');
            for line in &section.lines {
                output.push_str(&format!("  {:<32} {:>36}\n", line.label, line.value));
            }
        }

        if !self.warnings.is_empty() {
            output.push_str("\nWarnings:\n");
            output.push_str(&"-".repeat(72));
            output.push('\n');
            for warning in &self.warnings {
                output.push_str(&format!("  ! {}\n", warning));
            }
        }

        output.push_str(&"=".repeat(72));
        output.push('\n');
        output
    }

    /// Format as Markdown for documentation.
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str("# Panel Audit\n\n");
        output.push_str(&format!("**Generated:** {}\n\n", self.generated_at.to_rfc3339()));

        for section in &self.sections {
            output.push_str(&format!("## {}\n\n", section.title));
            output.push_str("| Metric | Value |\n");
            output.push_str("|--------|-------|\n");
            for line in &section.lines {
                output.push_str(&format!("| {} | {} |\n", line.label.trim(), line.value));
            }
            output.push('\n');
        }

        if !self.warnings.is_empty() {
            output.push_str("## Warnings\n\n");
            for warning in &self.warnings {
                output.push_str(&format!("- {}\n", warning));
            }
        }

        output
    }
}

impl fmt::Display for AuditSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Panel Audit: {} sections", self.sections.len())?;
        for section in &self.sections {
            writeln!(f, "  {} ({} lines)", section.title, section.lines.len())?;
        }
        writeln!(f, "  {} warnings", self.warnings.len())
    }
}
