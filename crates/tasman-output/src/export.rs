//! CSV and JSON export of the finished panel and of run diagnostics.

use crate::diagnostics::PipelineDiagnostics;
use polars::prelude::*;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tasman_data::DataError;
use tasman_data::columns::str_values;
use thiserror::Error;
use tracing::info;

/// Errors that can occur during export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV serialization error.
    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Column extraction error.
    #[error(transparent)]
    Data(#[from] DataError),

    /// Invalid format error.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Result type for export operations.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma-separated values format.
    Csv,

    /// Compact JSON format.
    Json,

    /// Pretty-printed JSON format.
    PrettyJson,
}

impl ExportFormat {
    /// Pick a format from a file extension (`.json` exports pretty JSON).
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => Ok(Self::Csv),
            Some("json") => Ok(Self::PrettyJson),
            other => Err(ExportError::InvalidFormat(format!(
                "unsupported extension {:?} for {}",
                other,
                path.display()
            ))),
        }
    }
}

/// Trait for exporting data in various formats.
pub trait Exporter {
    /// Export data to a string in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn export_to_string(&self, format: ExportFormat) -> Result<String>;

    /// Export data to a file in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    fn export_to_file(&self, path: &Path, format: ExportFormat) -> Result<()> {
        let content = self.export_to_string(format)?;
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

fn into_string(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    String::from_utf8(bytes).map_err(|e| ExportError::InvalidFormat(e.to_string()))
}

impl Exporter for PipelineDiagnostics {
    fn export_to_string(&self, format: ExportFormat) -> Result<String> {
        match format {
            ExportFormat::Csv => {
                let mut wtr = csv::Writer::from_writer(vec![]);
                for record in self.metric_records() {
                    wtr.serialize(&record)?;
                }
                into_string(wtr)
            }
            ExportFormat::Json => Ok(serde_json::to_string(self)?),
            ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}

/// Write a panel as CSV with a header row.
///
/// Values are rendered with polars' string cast (ISO dates, shortest float
/// form); nulls become empty fields. Returns the number of data rows.
pub fn write_panel_csv<W: Write>(df: &DataFrame, writer: W) -> Result<usize> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    let columns = names
        .iter()
        .map(|n| str_values(df, n))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(&names)?;
    for row in 0..df.height() {
        wtr.write_record(columns.iter().map(|c| c[row].as_deref().unwrap_or("")))?;
    }
    wtr.flush()?;

    info!(rows = df.height(), columns = names.len(), "Panel exported");
    Ok(df.height())
}

/// Render a panel as a CSV string.
pub fn panel_to_csv(df: &DataFrame) -> Result<String> {
    let mut buffer = Vec::new();
    write_panel_csv(df, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| ExportError::InvalidFormat(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::SampleReport;
    use rstest::rstest;

    #[rstest]
    #[case("panel.csv", Some(ExportFormat::Csv))]
    #[case("diag.json", Some(ExportFormat::PrettyJson))]
    #[case("panel.parquet", None)]
    #[case("panel", None)]
    fn test_format_from_path(#[case] path: &str, #[case] expected: Option<ExportFormat>) {
        assert_eq!(ExportFormat::from_path(Path::new(path)).ok(), expected);
    }

    #[test]
    fn test_panel_to_csv() {
        let df = df! {
            "gvkey" => ["001690", "012141"],
            "fyear" => [2016, 2017],
            "profitability" => [Some(0.25), None],
        }
        .unwrap();

        let csv = panel_to_csv(&df).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "gvkey,fyear,profitability");
        assert_eq!(lines[1], "001690,2016,0.25");
        assert_eq!(lines[2], "012141,2017,");
    }

    #[test]
    fn test_diagnostics_export() {
        let diag = PipelineDiagnostics {
            sample: SampleReport {
                rows_in: 5,
                outside_years: 1,
                below_min_scale: 1,
                rows_out: 3,
            },
            panel_rows: 3,
            ..Default::default()
        };

        let csv = diag.export_to_string(ExportFormat::Csv).unwrap();
        assert!(csv.starts_with("stage,subject,metric,value"));
        assert!(csv.contains("sample,panel,below_min_scale,1.0"));

        let json = diag.export_to_string(ExportFormat::PrettyJson).unwrap();
        assert!(json.contains("\"rows_out\": 3"));
    }
}
