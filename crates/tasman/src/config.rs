//! Pipeline configuration.
//!
//! Every table is described by a [`TableSchema`] so the store loads exactly
//! the declared, typed columns. All fields default, so a config file only
//! needs to name what differs from the built-in layout.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tasman_data::schema::{self, TableSchema};
use tasman_merge::{Aggregation, FanoutPolicy};
use tasman_vars::{DerivedFields, Winsorizer, registry};

/// The primary panel and its key columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimaryConfig {
    /// Table layout; the schema name is the store table name
    pub schema: TableSchema,
    /// Canonical entity id column
    pub entity: String,
    /// Fiscal year column
    pub year: String,
    /// Fiscal period-end column
    pub date: String,
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            schema: schema::primary_panel(),
            entity: "gvkey".to_string(),
            year: "fyear".to_string(),
            date: "datadate".to_string(),
        }
    }
}

/// Preferred sub-type ordering for a secondary source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preference {
    /// Column holding the sub-type
    pub column: String,
    /// Values from most to least authoritative
    pub ranking: Vec<String>,
}

/// One secondary source keyed by a foreign alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Name used in diagnostics
    pub name: String,
    /// Table layout; the schema name is the store table name
    pub schema: TableSchema,
    /// Foreign alias column
    pub alias_column: String,
    /// Fiscal year column
    pub year_column: String,
    /// Period-end column, when the source records one
    pub date_column: Option<String>,
    /// Columns attached to the panel
    pub payload: Vec<String>,
    /// Tie-break after the period-end rule
    pub preferred: Option<Preference>,
    /// First fiscal year the source covers, for match-rate accounting
    pub coverage_start: Option<i32>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: "audit".to_string(),
            schema: schema::audit_opinions(),
            alias_column: "alias".to_string(),
            year_column: "fiscal_year".to_string(),
            date_column: Some("period_end".to_string()),
            payload: vec![
                "attestation".to_string(),
                "material_weakness".to_string(),
                "auditor".to_string(),
            ],
            preferred: Some(Preference {
                column: "attestation".to_string(),
                ranking: vec!["auditor".to_string(), "management".to_string()],
            }),
            coverage_start: Some(2004),
        }
    }
}

/// A monthly time series aggregated over each row's lookback window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesConfig {
    /// Table layout; the schema name is the store table name
    pub schema: TableSchema,
    /// Month column
    pub date_column: String,
    /// Value column
    pub value_column: String,
    /// Name of the aggregate column written to the panel
    pub output: String,
    /// How window values are combined
    pub aggregation: Aggregation,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            schema: schema::monthly_series(),
            date_column: "month".to_string(),
            value_column: "value".to_string(),
            output: "sentiment".to_string(),
            aggregation: Aggregation::Mean,
        }
    }
}

/// Configuration for a full pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Primary panel
    pub primary: PrimaryConfig,
    /// Alias map table name
    pub alias_table: String,
    /// Secondary sources, joined in order
    pub sources: Vec<SourceConfig>,
    /// Optional monthly series
    pub series: Option<SeriesConfig>,
    /// Window length in months
    pub lookback_months: u32,
    /// Inputs of the derived variables
    pub fields: DerivedFields,
    /// First fiscal year kept
    pub year_start: Option<i32>,
    /// Last fiscal year kept
    pub year_end: Option<i32>,
    /// Smallest scale denominator kept; `None` disables the filter
    pub min_scale: Option<f64>,
    /// Bottom tail fraction clipped
    pub winsor_lower: f64,
    /// Top tail fraction clipped
    pub winsor_upper: f64,
    /// Columns to winsorize
    pub winsorize_columns: Vec<String>,
    /// Match rates below this are flagged in diagnostics
    pub match_rate_floor: f64,
    /// Handling of non-unique secondary keys
    pub on_fanout: FanoutPolicy,
    /// Store table the finished panel is written to, if any
    pub output_table: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            primary: PrimaryConfig::default(),
            alias_table: schema::alias_map().name,
            sources: Vec::new(),
            series: None,
            lookback_months: 12,
            fields: DerivedFields::default(),
            year_start: None,
            year_end: None,
            min_scale: Some(10.0),
            winsor_lower: 0.01,
            winsor_upper: 0.01,
            winsorize_columns: registry::ratio_variables()
                .into_iter()
                .map(String::from)
                .collect(),
            match_rate_floor: 0.5,
            on_fanout: FanoutPolicy::Abort,
            output_table: None,
        }
    }
}

fn invalid(message: impl Into<String>) -> PipelineError {
    PipelineError::Config(message.into())
}

fn require_field(schema: &TableSchema, column: &str) -> Result<()> {
    if schema.field(column).is_some() {
        Ok(())
    } else {
        Err(invalid(format!(
            "column {} is not declared in schema {}",
            column, schema.name
        )))
    }
}

impl PipelineConfig {
    /// Defaults plus the built-in audit source and monthly series, as
    /// printed by `tasman init-config`.
    pub fn example() -> Self {
        Self {
            sources: vec![SourceConfig::default()],
            series: Some(SeriesConfig::default()),
            year_start: Some(2004),
            year_end: Some(2020),
            ..Default::default()
        }
    }

    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Pretty JSON rendering.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Configured winsorizer.
    pub fn winsorizer(&self) -> Result<Winsorizer> {
        Ok(Winsorizer::new(self.winsor_lower, self.winsor_upper)?)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.lookback_months == 0 {
            return Err(invalid("lookback_months must be at least 1"));
        }
        self.winsorizer()?;

        if let (Some(start), Some(end)) = (self.year_start, self.year_end)
            && start > end
        {
            return Err(invalid(format!("year_start {start} is after year_end {end}")));
        }
        if let Some(min) = self.min_scale
            && !(min.is_finite() && min >= 0.0)
        {
            return Err(invalid(format!("min_scale must be a non-negative number, got {min}")));
        }
        if !(0.0..=1.0).contains(&self.match_rate_floor) {
            return Err(invalid("match_rate_floor must lie in [0, 1]"));
        }

        let primary = &self.primary;
        for column in [&primary.entity, &primary.year, &primary.date] {
            require_field(&primary.schema, column)?;
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if !names.insert(source.name.as_str()) {
                return Err(invalid(format!("duplicate source name {}", source.name)));
            }
            if source.payload.is_empty() {
                return Err(invalid(format!("source {} has no payload columns", source.name)));
            }
            require_field(&source.schema, &source.alias_column)?;
            require_field(&source.schema, &source.year_column)?;
            if let Some(date) = &source.date_column {
                require_field(&source.schema, date)?;
            }
            if let Some(preferred) = &source.preferred {
                require_field(&source.schema, &preferred.column)?;
            }
            for column in &source.payload {
                require_field(&source.schema, column)?;
                if primary.schema.field(column).is_some() {
                    return Err(invalid(format!(
                        "payload column {} of source {} collides with the primary panel",
                        column, source.name
                    )));
                }
            }
        }

        if let Some(series) = &self.series {
            require_field(&series.schema, &series.date_column)?;
            require_field(&series.schema, &series.value_column)?;
        }

        Ok(())
    }
}
