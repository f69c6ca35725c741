//! Identifier resolution.
//!
//! Secondary sources identify firms with their own keys (a registry id, a
//! ticker, a vendor surrogate). [`AliasMap`] translates such aliases onto the
//! canonical entity id used by the primary panel. Resolution is a pure lookup:
//! no fuzzy matching, and a missing or ambiguous mapping is a value, not an
//! error.

use crate::columns::{i32_values, str_values};
use crate::error::Result;
use crate::schema;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Column written by [`AliasMap::resolve_frame`] with the per-row outcome.
pub const RESOLUTION_COLUMN: &str = "alias_resolution";

/// Canonical (entity, fiscal year) coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalKey {
    /// Canonical entity id
    pub entity_id: String,
    /// Fiscal year
    pub fiscal_year: i32,
}

/// Outcome of resolving one alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Alias maps to exactly one entity for the year
    Resolved(CanonicalKey),
    /// Alias has no mapping valid for the year
    Unmapped,
    /// Alias maps to several distinct entities for the year
    Ambiguous {
        /// Number of distinct candidate entities
        candidates: usize,
    },
}

impl Resolution {
    /// Short status label.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Resolved(_) => "resolved",
            Self::Unmapped => "unmapped",
            Self::Ambiguous { .. } => "ambiguous",
        }
    }

    /// The canonical key, if resolved.
    pub const fn key(&self) -> Option<&CanonicalKey> {
        match self {
            Self::Resolved(key) => Some(key),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct AliasEntry {
    entity_id: String,
    first_year: Option<i32>,
    last_year: Option<i32>,
}

impl AliasEntry {
    fn covers(&self, year: i32) -> bool {
        self.first_year.is_none_or(|first| year >= first)
            && self.last_year.is_none_or(|last| year <= last)
    }
}

/// Column roles for resolving a whole frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveSpec {
    /// Column holding the foreign alias
    pub alias_column: String,
    /// Column holding the fiscal year
    pub year_column: String,
    /// Name of the canonical entity column to write
    pub entity_column: String,
}

impl Default for ResolveSpec {
    fn default() -> Self {
        Self {
            alias_column: "alias".to_string(),
            year_column: "fiscal_year".to_string(),
            entity_column: "gvkey".to_string(),
        }
    }
}

/// Counts from resolving a frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionReport {
    /// Rows examined
    pub rows: usize,
    /// Rows mapped onto a canonical entity
    pub resolved: usize,
    /// Rows whose alias had no valid mapping
    pub unmapped: usize,
    /// Rows whose alias mapped to several entities
    pub ambiguous: usize,
}

impl ResolutionReport {
    /// Share of rows resolved.
    pub fn resolution_rate(&self) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.resolved as f64 / self.rows as f64
        }
    }
}

/// Lookup from foreign alias to canonical entity id.
#[derive(Debug, Clone, Default)]
pub struct AliasMap {
    entries: HashMap<String, Vec<AliasEntry>>,
}

impl AliasMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map an alias to an entity for all years.
    pub fn insert(&mut self, alias: impl Into<String>, entity_id: impl Into<String>) {
        self.insert_ranged(alias, entity_id, None, None);
    }

    /// Map an alias to an entity for an inclusive range of fiscal years.
    pub fn insert_ranged(
        &mut self,
        alias: impl Into<String>,
        entity_id: impl Into<String>,
        first_year: Option<i32>,
        last_year: Option<i32>,
    ) {
        self.entries
            .entry(alias.into())
            .or_default()
            .push(AliasEntry {
                entity_id: entity_id.into(),
                first_year,
                last_year,
            });
    }

    /// Build the map from an `alias_map` table.
    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        let df = schema::alias_map().conform(df.clone())?;
        let aliases = str_values(&df, "alias")?;
        let entities = str_values(&df, "entity_id")?;
        let first = i32_values(&df, "first_year")?;
        let last = i32_values(&df, "last_year")?;

        let mut map = Self::new();
        for (i, (alias, entity)) in aliases.into_iter().zip(entities).enumerate() {
            if let (Some(alias), Some(entity)) = (alias, entity) {
                map.insert_ranged(alias, entity, first[i], last[i]);
            }
        }
        debug!(aliases = map.len(), "Alias map loaded");
        Ok(map)
    }

    /// Number of distinct aliases.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve an alias for a fiscal year.
    pub fn resolve(&self, alias: &str, fiscal_year: i32) -> Resolution {
        let Some(entries) = self.entries.get(alias) else {
            return Resolution::Unmapped;
        };

        let mut candidates: Vec<&str> = entries
            .iter()
            .filter(|e| e.covers(fiscal_year))
            .map(|e| e.entity_id.as_str())
            .collect();
        candidates.sort_unstable();
        candidates.dedup();

        match candidates.as_slice() {
            [] => Resolution::Unmapped,
            [entity] => Resolution::Resolved(CanonicalKey {
                entity_id: (*entity).to_string(),
                fiscal_year,
            }),
            many => Resolution::Ambiguous {
                candidates: many.len(),
            },
        }
    }

    /// Resolve every row of a secondary frame.
    ///
    /// Writes the canonical entity id into `spec.entity_column` (null when
    /// unresolved) and the outcome label into [`RESOLUTION_COLUMN`]. No row
    /// is dropped; callers decide whether unresolved rows are kept.
    pub fn resolve_frame(
        &self,
        df: &DataFrame,
        spec: &ResolveSpec,
    ) -> Result<(DataFrame, ResolutionReport)> {
        let aliases = str_values(df, &spec.alias_column)?;
        let years = i32_values(df, &spec.year_column)?;

        let mut report = ResolutionReport {
            rows: df.height(),
            ..Default::default()
        };
        let mut entity = Vec::with_capacity(df.height());
        let mut status = Vec::with_capacity(df.height());

        for (alias, year) in aliases.iter().zip(&years) {
            let resolution = match (alias, year) {
                (Some(alias), Some(year)) => self.resolve(alias, *year),
                _ => Resolution::Unmapped,
            };
            match &resolution {
                Resolution::Resolved(_) => report.resolved += 1,
                Resolution::Unmapped => report.unmapped += 1,
                Resolution::Ambiguous { .. } => report.ambiguous += 1,
            }
            status.push(resolution.label());
            entity.push(resolution.key().map(|k| k.entity_id.clone()));
        }

        let mut out = df.clone();
        out.with_column(Series::new(spec.entity_column.as_str().into(), entity))?;
        out.with_column(Series::new(RESOLUTION_COLUMN.into(), status))?;

        if report.unmapped > 0 || report.ambiguous > 0 {
            warn!(
                rows = report.rows,
                unmapped = report.unmapped,
                ambiguous = report.ambiguous,
                "Aliases left unresolved"
            );
        }
        debug!(resolved = report.resolved, "Alias resolution complete");

        Ok((out, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> AliasMap {
        let mut map = AliasMap::new();
        map.insert("0000320193", "001690");
        map.insert_ranged("0000789019", "012141", Some(2000), Some(2010));
        map.insert_ranged("0000789019", "099999", Some(2011), None);
        map.insert("SHARED", "A");
        map.insert("SHARED", "B");
        map.insert("DUP", "C");
        map.insert("DUP", "C");
        map
    }

    #[test]
    fn test_resolve_plain_alias() {
        let key = CanonicalKey {
            entity_id: "001690".to_string(),
            fiscal_year: 2016,
        };
        assert_eq!(map().resolve("0000320193", 2016), Resolution::Resolved(key));
    }

    #[test]
    fn test_resolve_respects_validity_range() {
        let map = map();
        assert_eq!(
            map.resolve("0000789019", 2005).key().unwrap().entity_id,
            "012141"
        );
        assert_eq!(
            map.resolve("0000789019", 2015).key().unwrap().entity_id,
            "099999"
        );
        assert_eq!(map.resolve("0000789019", 1999), Resolution::Unmapped);
    }

    #[test]
    fn test_unknown_alias_is_unmapped() {
        assert_eq!(map().resolve("nope", 2016), Resolution::Unmapped);
    }

    #[test]
    fn test_conflicting_aliases_are_ambiguous() {
        assert_eq!(
            map().resolve("SHARED", 2016),
            Resolution::Ambiguous { candidates: 2 }
        );
        assert!(map().resolve("DUP", 2016).key().is_some());
    }

    #[test]
    fn test_resolve_frame_keeps_every_row() {
        let df = DataFrame::new(vec![
            Column::new("alias".into(), [Some("0000320193"), Some("nope"), Some("SHARED"), None]),
            Column::new("fiscal_year".into(), [2016, 2016, 2016, 2016]),
        ])
        .unwrap();

        let (out, report) = map().resolve_frame(&df, &ResolveSpec::default()).unwrap();
        assert_eq!(out.height(), 4);
        assert_eq!(report.resolved, 1);
        assert_eq!(report.unmapped, 2);
        assert_eq!(report.ambiguous, 1);
        assert_eq!(out.column("gvkey").unwrap().null_count(), 3);

        let status = str_values(&out, RESOLUTION_COLUMN).unwrap();
        assert_eq!(status[2].as_deref(), Some("ambiguous"));
    }

    #[test]
    fn test_from_frame() {
        let df = DataFrame::new(vec![
            Column::new("alias".into(), ["x", "y"]),
            Column::new("entity_id".into(), ["E1", "E2"]),
            Column::new("first_year".into(), [None, Some(2010)]),
            Column::new("last_year".into(), [None::<i32>, None]),
        ])
        .unwrap();
        let map = AliasMap::from_frame(&df).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.resolve("y", 2009), Resolution::Unmapped);
        assert!(map.resolve("y", 2010).key().is_some());
    }
}
