//! Typed column extraction.
//!
//! Row-level stages (deduplication, window aggregation, store writes) read
//! whole columns into owned vectors through these helpers. Nulls stay `None`.

use crate::dates::days_to_date;
use crate::error::Result;
use chrono::NaiveDate;
use polars::prelude::*;

/// Separator used when joining composite key parts.
const KEY_SEPARATOR: char = '\u{1f}';

/// Column values rendered as strings.
pub fn str_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df.column(name)?.cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_owned))
        .collect())
}

/// Column values as 32-bit integers.
pub fn i32_values(df: &DataFrame, name: &str) -> Result<Vec<Option<i32>>> {
    let column = df.column(name)?.cast(&DataType::Int32)?;
    Ok(column.i32()?.into_iter().collect())
}

/// Column values as 64-bit integers.
pub fn i64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let column = df.column(name)?.cast(&DataType::Int64)?;
    Ok(column.i64()?.into_iter().collect())
}

/// Column values as floats.
pub fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

/// Column values as booleans.
pub fn bool_values(df: &DataFrame, name: &str) -> Result<Vec<Option<bool>>> {
    let column = df.column(name)?.cast(&DataType::Boolean)?;
    Ok(column.bool()?.into_iter().collect())
}

/// Column values as dates. The column must be `Date` typed.
pub fn date_values(df: &DataFrame, name: &str) -> Result<Vec<Option<NaiveDate>>> {
    let column = df.column(name)?.cast(&DataType::Int32)?;
    Ok(column
        .i32()?
        .into_iter()
        .map(|v| v.and_then(days_to_date))
        .collect())
}

/// Composite key per row; `None` when any key part is null.
pub fn key_values(df: &DataFrame, keys: &[String]) -> Result<Vec<Option<String>>> {
    let parts = keys
        .iter()
        .map(|k| str_values(df, k))
        .collect::<Result<Vec<_>>>()?;

    let keyed = (0..df.height())
        .map(|row| {
            let mut key = String::new();
            for (i, part) in parts.iter().enumerate() {
                let value = part[row].as_deref()?;
                if i > 0 {
                    key.push(KEY_SEPARATOR);
                }
                key.push_str(value);
            }
            Some(key)
        })
        .collect();
    Ok(keyed)
}

/// Full-row fingerprint used to detect byte-identical rows.
pub fn row_fingerprints(df: &DataFrame) -> Result<Vec<String>> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    let values = names
        .iter()
        .map(|n| str_values(df, n))
        .collect::<Result<Vec<_>>>()?;

    Ok((0..df.height())
        .map(|row| {
            values
                .iter()
                .map(|column| column[row].as_deref().unwrap_or("\u{0}"))
                .collect::<Vec<_>>()
                .join("\u{1f}")
        })
        .collect())
}

/// Build a `Date` column from optional dates.
pub fn date_column(name: &str, values: &[Option<NaiveDate>]) -> Result<Column> {
    let days: Vec<Option<i32>> = values
        .iter()
        .map(|d| d.map(crate::dates::date_to_days))
        .collect();
    Ok(Series::new(name.into(), days)
        .cast(&DataType::Date)?
        .into())
}

/// Whether a frame has a column.
pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.column(name).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_values_null_when_any_part_missing() {
        let df = DataFrame::new(vec![
            Column::new("e".into(), [Some("a"), Some("b"), None]),
            Column::new("y".into(), [Some(2016), None, Some(2017)]),
        ])
        .unwrap();
        let keys = key_values(&df, &["e".to_string(), "y".to_string()]).unwrap();
        assert_eq!(keys[0].as_deref(), Some("a\u{1f}2016"));
        assert_eq!(keys[1], None);
        assert_eq!(keys[2], None);
    }

    #[test]
    fn test_date_column_round_trip() {
        let dates = vec![NaiveDate::from_ymd_opt(2016, 12, 31), None];
        let column = date_column("d", &dates).unwrap();
        let df = DataFrame::new(vec![column]).unwrap();
        assert_eq!(df.column("d").unwrap().dtype(), &DataType::Date);
        assert_eq!(date_values(&df, "d").unwrap(), dates);
    }

    #[test]
    fn test_row_fingerprints_distinguish_rows() {
        let df = DataFrame::new(vec![
            Column::new("a".into(), [1, 1, 2]),
            Column::new("b".into(), [Some("x"), Some("x"), None]),
        ])
        .unwrap();
        let prints = row_fingerprints(&df).unwrap();
        assert_eq!(prints[0], prints[1]);
        assert_ne!(prints[0], prints[2]);
    }
}
