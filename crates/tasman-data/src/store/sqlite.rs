//! SQLite store for raw extracts and the finished panel.

use crate::columns::{bool_values, f64_values, i64_values, str_values};
use crate::error::{DataError, Result};
use crate::schema::{FieldType, TableSchema};
use polars::prelude::*;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// SQLite store holding raw extract tables.
///
/// The store owns exactly one connection. It is opened explicitly and handed
/// by reference to whatever needs it; dropping the store closes the
/// connection.
#[derive(Debug)]
pub struct ExtractStore {
    conn: Connection,
}

/// Summary of the store's contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of tables
    pub tables: usize,
    /// Rows per table, sorted by table name
    pub rows: Vec<(String, usize)>,
}

/// Buffer for one column while reading rows.
enum ColumnBuffer {
    Str(Vec<Option<String>>),
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Bool(Vec<Option<bool>>),
}

impl ColumnBuffer {
    const fn for_type(dtype: FieldType) -> Self {
        match dtype {
            FieldType::Str | FieldType::Date => Self::Str(Vec::new()),
            FieldType::Int => Self::Int(Vec::new()),
            FieldType::Float => Self::Float(Vec::new()),
            FieldType::Bool => Self::Bool(Vec::new()),
        }
    }

    fn push(&mut self, row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<()> {
        match self {
            Self::Str(v) => v.push(row.get::<_, Option<String>>(idx)?),
            Self::Int(v) => v.push(row.get::<_, Option<i64>>(idx)?),
            Self::Float(v) => v.push(row.get::<_, Option<f64>>(idx)?),
            Self::Bool(v) => v.push(row.get::<_, Option<i64>>(idx)?.map(|b| b != 0)),
        }
        Ok(())
    }

    fn into_column(self, name: &str) -> Column {
        match self {
            Self::Str(v) => Column::new(name.into(), v),
            Self::Int(v) => Column::new(name.into(), v),
            Self::Float(v) => Column::new(name.into(), v),
            Self::Bool(v) => Column::new(name.into(), v),
        }
    }
}

/// Quote an SQL identifier after checking it is a plain name.
fn quote_ident(name: &str) -> Result<String> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(format!("\"{}\"", name))
    } else {
        Err(DataError::InvalidIdentifier(name.to_string()))
    }
}

impl ExtractStore {
    /// Open (or create) a store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Create a table for `schema` if it does not exist.
    pub fn create_table(&self, schema: &TableSchema) -> Result<()> {
        let columns = schema
            .fields
            .iter()
            .map(|f| {
                let null = if f.nullable { "" } else { " NOT NULL" };
                Ok(format!("{} {}{}", quote_ident(&f.name)?, f.dtype.sql_type(), null))
            })
            .collect::<Result<Vec<_>>>()?;

        self.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                quote_ident(&schema.name)?,
                columns.join(", ")
            ),
            [],
        )?;
        Ok(())
    }

    /// Check whether a table exists.
    pub fn has_table(&self, name: &str) -> Result<bool> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Names of all tables, sorted.
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    /// Number of rows in a table.
    pub fn row_count(&self, table: &str) -> Result<usize> {
        if !self.has_table(table)? {
            return Err(DataError::TableNotFound(table.to_string()));
        }
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)?),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Insert the declared columns of `df` into the schema's table.
    ///
    /// The table is created when missing. Returns the number of rows written.
    pub fn put_table(&self, schema: &TableSchema, df: &DataFrame) -> Result<usize> {
        let df = schema.conform(df.clone())?;
        self.create_table(schema)?;

        let columns = schema
            .fields
            .iter()
            .map(|f| {
                let values: Vec<Value> = match f.dtype {
                    FieldType::Str | FieldType::Date => str_values(&df, &f.name)?
                        .into_iter()
                        .map(|v| v.map_or(Value::Null, Value::Text))
                        .collect(),
                    FieldType::Int => i64_values(&df, &f.name)?
                        .into_iter()
                        .map(|v| v.map_or(Value::Null, Value::Integer))
                        .collect(),
                    FieldType::Float => f64_values(&df, &f.name)?
                        .into_iter()
                        .map(|v| v.map_or(Value::Null, Value::Real))
                        .collect(),
                    FieldType::Bool => bool_values(&df, &f.name)?
                        .into_iter()
                        .map(|v| v.map_or(Value::Null, |b| Value::Integer(i64::from(b))))
                        .collect(),
                };
                Ok(values)
            })
            .collect::<Result<Vec<_>>>()?;

        let names = schema
            .fields
            .iter()
            .map(|f| quote_ident(&f.name))
            .collect::<Result<Vec<_>>>()?;
        let placeholders = (1..=names.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&schema.name)?,
            names.join(", "),
            placeholders
        );

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in 0..df.height() {
                stmt.execute(params_from_iter(columns.iter().map(|c| &c[row])))?;
            }
        }
        tx.commit()?;

        debug!(table = %schema.name, rows = df.height(), "Table written");
        Ok(df.height())
    }

    /// Load the declared columns of a table and validate them.
    pub fn load_table(&self, schema: &TableSchema) -> Result<DataFrame> {
        if !self.has_table(&schema.name)? {
            return Err(DataError::TableNotFound(schema.name.clone()));
        }

        let names = schema
            .fields
            .iter()
            .map(|f| quote_ident(&f.name))
            .collect::<Result<Vec<_>>>()?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM {}",
            names.join(", "),
            quote_ident(&schema.name)?
        ))?;

        let mut buffers: Vec<ColumnBuffer> = schema
            .fields
            .iter()
            .map(|f| ColumnBuffer::for_type(f.dtype))
            .collect();

        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            for (idx, buffer) in buffers.iter_mut().enumerate() {
                buffer.push(row, idx)?;
            }
        }

        let columns: Vec<Column> = buffers
            .into_iter()
            .zip(&schema.fields)
            .map(|(buffer, field)| buffer.into_column(&field.name))
            .collect();
        let df = schema.conform(DataFrame::new(columns)?)?;

        debug!(table = %schema.name, rows = df.height(), "Table loaded");
        Ok(df)
    }

    /// Replace `name` with the contents of a finished panel.
    pub fn write_panel(&self, name: &str, df: &DataFrame) -> Result<usize> {
        let schema = TableSchema::infer(name, df)?;
        self.conn
            .execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)?), [])?;
        let rows = self.put_table(&schema, df)?;
        info!(table = name, rows, "Panel persisted");
        Ok(rows)
    }

    /// Row counts for every table.
    pub fn stats(&self) -> Result<StoreStats> {
        let names = self.table_names()?;
        let rows = names
            .into_iter()
            .map(|name| {
                let count = self.row_count(&name)?;
                Ok((name, count))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(StoreStats {
            tables: rows.len(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("at").unwrap(), "\"at\"");
        assert!(quote_ident("x; DROP TABLE y").is_err());
        assert!(quote_ident("1abc").is_err());
        assert!(quote_ident("").is_err());
    }

    #[test]
    fn test_missing_table() {
        let store = ExtractStore::in_memory().unwrap();
        let err = store
            .load_table(&crate::schema::monthly_series())
            .unwrap_err();
        assert!(matches!(err, DataError::TableNotFound(_)));
    }
}
