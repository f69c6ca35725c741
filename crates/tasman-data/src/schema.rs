//! Typed table schemas.
//!
//! Every table that crosses a stage boundary is described by a [`TableSchema`]:
//! a named list of typed fields. Frames are conformed (compatible casts) and then
//! validated against their schema before a stage consumes them, so column
//! presence and types are never discovered at run time.

use crate::error::{DataError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// UTF-8 string
    Str,
    /// 32-bit signed integer (fiscal years, counts)
    Int,
    /// 64-bit float
    Float,
    /// Calendar date
    Date,
    /// Boolean flag
    Bool,
}

impl FieldType {
    /// The polars dtype a conformed column has.
    pub fn dtype(&self) -> DataType {
        match self {
            Self::Str => DataType::String,
            Self::Int => DataType::Int32,
            Self::Float => DataType::Float64,
            Self::Date => DataType::Date,
            Self::Bool => DataType::Boolean,
        }
    }

    /// SQLite column affinity.
    pub const fn sql_type(&self) -> &'static str {
        match self {
            Self::Str | Self::Date => "TEXT",
            Self::Int | Self::Bool => "INTEGER",
            Self::Float => "REAL",
        }
    }

    /// Infer the logical type of a polars dtype.
    pub fn from_dtype(dtype: &DataType) -> Option<Self> {
        match dtype {
            DataType::String => Some(Self::Str),
            DataType::Date => Some(Self::Date),
            DataType::Boolean => Some(Self::Bool),
            DataType::Float32 | DataType::Float64 => Some(Self::Float),
            dt if dt.is_integer() => Some(Self::Int),
            _ => None,
        }
    }

    /// Whether a column of `dtype` can be cast losslessly enough to this type.
    fn accepts(&self, dtype: &DataType) -> bool {
        match self {
            Self::Str => matches!(dtype, DataType::String),
            Self::Int => dtype.is_integer(),
            Self::Float => dtype.is_float() || dtype.is_integer(),
            Self::Date => matches!(dtype, DataType::Date | DataType::String),
            Self::Bool => matches!(dtype, DataType::Boolean) || dtype.is_integer(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Date => "date",
            Self::Bool => "bool",
        };
        write!(f, "{}", name)
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Column name
    pub name: String,
    /// Column type
    pub dtype: FieldType,
    /// Whether nulls are allowed
    pub nullable: bool,
}

impl Field {
    /// A column that must be populated on every row.
    pub fn required(name: impl Into<String>, dtype: FieldType) -> Self {
        Self {
            name: name.into(),
            dtype,
            nullable: false,
        }
    }

    /// A column that may hold nulls.
    pub fn optional(name: impl Into<String>, dtype: FieldType) -> Self {
        Self {
            name: name.into(),
            dtype,
            nullable: true,
        }
    }
}

/// Named list of typed fields describing one table.
///
/// Columns not listed in the schema are carried along untouched; the schema
/// only constrains the columns it declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name
    pub name: String,
    /// Declared fields, in storage order
    pub fields: Vec<Field>,
}

impl TableSchema {
    /// Create a schema.
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Add or replace a field.
    pub fn with_field(mut self, field: Field) -> Self {
        if let Some(existing) = self.fields.iter_mut().find(|f| f.name == field.name) {
            *existing = field;
        } else {
            self.fields.push(field);
        }
        self
    }

    /// Rename the table.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Declared column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Derive a schema from a frame's columns. All fields are nullable.
    pub fn infer(name: impl Into<String>, df: &DataFrame) -> Result<Self> {
        let name = name.into();
        let mut fields = Vec::with_capacity(df.width());
        for column in df.get_columns() {
            let dtype = FieldType::from_dtype(column.dtype()).ok_or_else(|| {
                DataError::SchemaMismatch {
                    table: name.clone(),
                    column: column.name().to_string(),
                    expected: "str|int|float|date|bool".to_string(),
                    found: column.dtype().to_string(),
                }
            })?;
            fields.push(Field::optional(column.name().as_str(), dtype));
        }
        Ok(Self { name, fields })
    }

    /// Check that every declared column is present, typed and populated.
    pub fn validate(&self, df: &DataFrame) -> Result<()> {
        for field in &self.fields {
            let column = df
                .column(&field.name)
                .map_err(|_| DataError::MissingColumn {
                    table: self.name.clone(),
                    column: field.name.clone(),
                })?;

            let expected = field.dtype.dtype();
            if column.dtype() != &expected {
                return Err(DataError::SchemaMismatch {
                    table: self.name.clone(),
                    column: field.name.clone(),
                    expected: field.dtype.to_string(),
                    found: column.dtype().to_string(),
                });
            }

            if !field.nullable {
                let count = column.null_count();
                if count > 0 {
                    return Err(DataError::UnexpectedNulls {
                        table: self.name.clone(),
                        column: field.name.clone(),
                        count,
                    });
                }
            }
        }
        Ok(())
    }

    /// Cast declared columns to their logical types, then validate.
    ///
    /// Integers are widened to floats for `Float` fields and ISO date strings
    /// are parsed for `Date` fields.
    pub fn conform(&self, df: DataFrame) -> Result<DataFrame> {
        let mut casts = Vec::new();
        for field in &self.fields {
            let column = df
                .column(&field.name)
                .map_err(|_| DataError::MissingColumn {
                    table: self.name.clone(),
                    column: field.name.clone(),
                })?;
            let target = field.dtype.dtype();
            if column.dtype() == &target {
                continue;
            }
            if !field.dtype.accepts(column.dtype()) {
                return Err(DataError::SchemaMismatch {
                    table: self.name.clone(),
                    column: field.name.clone(),
                    expected: field.dtype.to_string(),
                    found: column.dtype().to_string(),
                });
            }
            casts.push(col(field.name.as_str()).cast(target));
        }

        let df = if casts.is_empty() {
            df
        } else {
            df.lazy().with_columns(casts).collect()?
        };
        self.validate(&df)?;
        Ok(df)
    }
}

impl fmt::Display for TableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        for field in &self.fields {
            let null = if field.nullable { "?" } else { "" };
            writeln!(f, "  {:<24} {}{}", field.name, field.dtype, null)?;
        }
        Ok(())
    }
}

/// Primary firm-year panel: one fundamentals record per firm and period end.
///
/// `gvkey` is the canonical entity id, `fyear` the fiscal year bucket and
/// `datadate` the fiscal period end. `ib` (income before extraordinary items),
/// `spi` (special items), `at` (total assets) and `xrd` (R&D expense) feed the
/// derived variables.
pub fn primary_panel() -> TableSchema {
    TableSchema::new(
        "primary_panel",
        vec![
            Field::required("gvkey", FieldType::Str),
            Field::required("fyear", FieldType::Int),
            Field::required("datadate", FieldType::Date),
            Field::optional("ib", FieldType::Float),
            Field::optional("spi", FieldType::Float),
            Field::optional("at", FieldType::Float),
            Field::optional("xrd", FieldType::Float),
            Field::optional("cik", FieldType::Str),
        ],
    )
}

/// Alias lookup: foreign alias to canonical entity id, optionally bounded to
/// the fiscal years in which the alias was valid.
pub fn alias_map() -> TableSchema {
    TableSchema::new(
        "alias_map",
        vec![
            Field::required("alias", FieldType::Str),
            Field::required("entity_id", FieldType::Str),
            Field::optional("first_year", FieldType::Int),
            Field::optional("last_year", FieldType::Int),
        ],
    )
}

/// Audit opinions keyed by a foreign alias and fiscal year.
///
/// A firm-year can carry several opinions (differing period ends after a
/// fiscal-year change, or an auditor attestation next to a management
/// report).
pub fn audit_opinions() -> TableSchema {
    TableSchema::new(
        "audit_opinions",
        vec![
            Field::required("alias", FieldType::Str),
            Field::required("fiscal_year", FieldType::Int),
            Field::optional("period_end", FieldType::Date),
            Field::optional("attestation", FieldType::Str),
            Field::optional("material_weakness", FieldType::Int),
            Field::optional("auditor", FieldType::Str),
        ],
    )
}

/// Monthly time series: one value per calendar month.
pub fn monthly_series() -> TableSchema {
    TableSchema::new(
        "monthly_series",
        vec![
            Field::required("month", FieldType::Date),
            Field::optional("value", FieldType::Float),
        ],
    )
}

/// All built-in schemas.
pub fn builtin_schemas() -> Vec<TableSchema> {
    vec![
        primary_panel(),
        alias_map(),
        audit_opinions(),
        monthly_series(),
    ]
}
