//! End-to-end panel construction.

use crate::config::{PipelineConfig, SourceConfig};
use crate::error::{PipelineError, Result};
use crate::sample::SampleSelector;
use polars::prelude::*;
use tasman_data::alias::RESOLUTION_COLUMN;
use tasman_data::schema;
use tasman_data::{AliasMap, ExtractStore, ResolveSpec};
use tasman_merge::{
    AlignSpec, Deduplicator, MatchFilter, MonthlySeries, PrecedenceRule, WindowAggregator,
    WindowSpec, align, attach_canonical_period_end, canonical_period_ends,
};
use tasman_output::{PipelineDiagnostics, SourceDiagnostics, WindowDiagnostics};
use tasman_vars::DerivedVariableEngine;
use tracing::{debug, info, warn};

/// Raw inputs of one run.
#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
    /// Primary panel
    pub primary: DataFrame,
    /// Alias lookup for the secondary sources
    pub alias_map: AliasMap,
    /// One frame per configured source, in config order
    pub sources: Vec<DataFrame>,
    /// Monthly series, when configured
    pub series: Option<MonthlySeries>,
}

/// The finished panel and everything reported along the way.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Analysis-ready panel, unique per (entity, period end)
    pub panel: DataFrame,
    /// Rows excluded as ambiguous, per table
    pub ambiguous: Vec<(String, DataFrame)>,
    /// Per-stage diagnostics
    pub diagnostics: PipelineDiagnostics,
}

/// Runs the stages in order: resolve, deduplicate, align each source,
/// aggregate the series window, derive variables, select the sample and
/// winsorize.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline after validating its configuration.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration in use.
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load every configured table from the store.
    pub fn load_inputs(&self, store: &ExtractStore) -> Result<PipelineInputs> {
        let config = &self.config;
        let primary = store.load_table(&config.primary.schema)?;

        let alias_schema = schema::alias_map().renamed(config.alias_table.as_str());
        let alias_map = if config.sources.is_empty() {
            AliasMap::new()
        } else {
            AliasMap::from_frame(&store.load_table(&alias_schema)?)?
        };

        let sources = config
            .sources
            .iter()
            .map(|source| store.load_table(&source.schema))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let series = match &config.series {
            Some(series) => Some(MonthlySeries::from_frame(
                &store.load_table(&series.schema)?,
                &series.date_column,
                &series.value_column,
            )?),
            None => None,
        };

        debug!(
            primary_rows = primary.height(),
            sources = sources.len(),
            aliases = alias_map.len(),
            "Inputs loaded"
        );
        Ok(PipelineInputs {
            primary,
            alias_map,
            sources,
            series,
        })
    }

    /// Load from the store, run, and persist the panel if an output table is
    /// configured.
    pub fn run(&self, store: &ExtractStore) -> Result<PipelineOutput> {
        let output = self.run_frames(self.load_inputs(store)?)?;
        if let Some(table) = &self.config.output_table {
            store.write_panel(table, &output.panel)?;
        }
        Ok(output)
    }

    /// Run the stages over in-memory inputs.
    pub fn run_frames(&self, inputs: PipelineInputs) -> Result<PipelineOutput> {
        let config = &self.config;
        let keys = self.year_keys();
        if inputs.sources.len() != config.sources.len() {
            return Err(PipelineError::MissingInput(format!(
                "{} source frames for {} configured sources",
                inputs.sources.len(),
                config.sources.len()
            )));
        }

        let mut diagnostics = PipelineDiagnostics::default();
        let mut ambiguous = Vec::new();

        // Primary panel: one row per fiscal year, then per period end.
        let primary = config.primary.schema.conform(inputs.primary)?;
        let table = config.primary.schema.name.clone();
        let by_year = Deduplicator::new(table.as_str(), keys.clone())
            .with_rule(PrecedenceRule::LatestDate {
                column: config.primary.date.clone(),
            })
            .run(&primary)?;
        let by_period = Deduplicator::new(
            format!("{}:{}", table, config.primary.date),
            [config.primary.entity.as_str(), config.primary.date.as_str()],
        )
        .run(&by_year.frame)?;

        diagnostics.primary = by_year.report;
        diagnostics.primary_periods = by_period.report;
        push_ambiguous(&mut ambiguous, &table, by_year.ambiguous);
        push_ambiguous(&mut ambiguous, &table, by_period.ambiguous);
        let mut panel = by_period.frame;

        let canonical = canonical_period_ends(
            &panel,
            &config.primary.entity,
            &config.primary.year,
            &config.primary.date,
        )?;

        for (source, frame) in config.sources.iter().zip(inputs.sources) {
            let (aligned, source_diagnostics, excluded) =
                self.merge_source(&panel, &canonical, &inputs.alias_map, source, frame)?;
            panel = aligned;
            push_ambiguous(&mut ambiguous, &source.name, excluded);
            diagnostics.sources.push(source_diagnostics);
        }

        if let Some(series_config) = &config.series {
            let series = inputs.series.as_ref().ok_or_else(|| {
                PipelineError::MissingInput(format!("series {}", series_config.schema.name))
            })?;
            let aggregator = WindowAggregator::new(WindowSpec {
                entity: config.primary.entity.clone(),
                anchor: config.primary.date.clone(),
                lookback_months: config.lookback_months,
                aggregation: series_config.aggregation,
                output: series_config.output.clone(),
            })?;
            let (attached, window, alignment) = aggregator.attach(&panel, series)?;
            panel = attached;
            diagnostics.window = Some(WindowDiagnostics { window, alignment });
        }

        let derived = DerivedVariableEngine::standard(config.fields.clone()).apply(&panel)?;

        let (selected, sample) = SampleSelector::new(&config.primary.year, &config.fields.scale)
            .with_years(config.year_start, config.year_end)
            .with_min_scale(config.min_scale)
            .apply(&derived)?;
        diagnostics.sample = sample;

        let (panel, bounds) = config
            .winsorizer()?
            .apply(&selected, &config.winsorize_columns)?;
        diagnostics.winsorization = bounds;
        diagnostics.panel_rows = panel.height();

        for warning in diagnostics.warnings(config.match_rate_floor) {
            warn!("{}", warning);
        }
        info!(
            rows = panel.height(),
            columns = panel.width(),
            sources = diagnostics.sources.len(),
            "Panel built"
        );

        Ok(PipelineOutput {
            panel,
            ambiguous,
            diagnostics,
        })
    }

    fn year_keys(&self) -> Vec<String> {
        vec![
            self.config.primary.entity.clone(),
            self.config.primary.year.clone(),
        ]
    }

    /// Resolve, deduplicate and left-join one secondary source.
    fn merge_source(
        &self,
        panel: &DataFrame,
        canonical: &DataFrame,
        aliases: &AliasMap,
        source: &SourceConfig,
        frame: DataFrame,
    ) -> Result<(DataFrame, SourceDiagnostics, DataFrame)> {
        let config = &self.config;
        let keys = self.year_keys();
        let frame = source.schema.conform(frame)?;

        let spec = ResolveSpec {
            alias_column: source.alias_column.clone(),
            year_column: source.year_column.clone(),
            entity_column: config.primary.entity.clone(),
        };
        let (resolved, resolution) = aliases.resolve_frame(&frame, &spec)?;

        // Unresolved rows can never match; they are counted, not carried.
        // The year column takes the primary panel's name inside the plan.
        let mut resolved = resolved
            .lazy()
            .filter(col(config.primary.entity.as_str()).is_not_null())
            .select([
                col("*").exclude([RESOLUTION_COLUMN, source.year_column.as_str()]),
                col(source.year_column.as_str()).alias(config.primary.year.as_str()),
            ])
            .collect()?;

        let mut dedup = Deduplicator::new(source.name.as_str(), keys.clone());
        if let Some(date) = &source.date_column {
            resolved = attach_canonical_period_end(&resolved, canonical, &keys)?;
            dedup = dedup.with_rule(PrecedenceRule::match_canonical(date.as_str()));
        }
        if let Some(preferred) = &source.preferred {
            dedup = dedup.with_rule(PrecedenceRule::prefer(
                preferred.column.as_str(),
                preferred.ranking.iter().map(String::as_str),
            ));
        }
        let deduplicated = dedup.run(&resolved)?;

        let filter = match source.coverage_start {
            Some(start) => MatchFilter::starting(config.primary.year.as_str(), start),
            None => MatchFilter::all(config.primary.year.as_str()),
        };
        let align_spec = AlignSpec::new(source.name.as_str(), keys, source.payload.clone())
            .with_filter(filter)
            .with_fanout(config.on_fanout);
        let aligned = align(panel, &deduplicated.frame, &align_spec)?;

        let diagnostics = SourceDiagnostics {
            name: source.name.clone(),
            resolution,
            dedup: deduplicated.report,
            alignment: aligned.report,
        };
        Ok((aligned.frame, diagnostics, deduplicated.ambiguous))
    }
}

fn push_ambiguous(out: &mut Vec<(String, DataFrame)>, table: &str, rows: DataFrame) {
    if rows.height() > 0 {
        out.push((table.to_string(), rows));
    }
}
