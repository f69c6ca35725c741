//! Integration tests for the SQLite extract store.

use chrono::NaiveDate;
use polars::prelude::*;
use tasman_data::columns::{date_values, f64_values, str_values};
use tasman_data::schema::{self, Field, FieldType, TableSchema};
use tasman_data::{AliasMap, DataError, ExtractStore};

fn primary_frame() -> DataFrame {
    DataFrame::new(vec![
        Column::new("gvkey".into(), ["001690", "001690", "012141"]),
        Column::new("fyear".into(), [2015i64, 2016, 2016]),
        Column::new("datadate".into(), ["2015-09-30", "2016-09-30", "2016-06-30"]),
        Column::new("ib".into(), [Some(53_394.0), Some(45_687.0), None]),
        Column::new("spi".into(), [None, Some(-1.0), Some(0.0)]),
        Column::new("at".into(), [290_479.0, 321_686.0, 193_694.0]),
        Column::new("xrd".into(), [Some(8_067.0), Some(10_045.0), Some(11_988.0)]),
        Column::new("cik".into(), ["0000320193", "0000320193", "0000789019"]),
    ])
    .unwrap()
}

#[test]
fn test_put_and_load_primary_panel() {
    let store = ExtractStore::in_memory().unwrap();
    let schema = schema::primary_panel();

    let written = store.put_table(&schema, &primary_frame()).unwrap();
    assert_eq!(written, 3);
    assert!(store.has_table("primary_panel").unwrap());

    let loaded = store.load_table(&schema).unwrap();
    schema.validate(&loaded).unwrap();
    assert_eq!(loaded.height(), 3);
    assert_eq!(loaded.column("fyear").unwrap().dtype(), &DataType::Int32);

    let dates = date_values(&loaded, "datadate").unwrap();
    assert_eq!(dates[1], NaiveDate::from_ymd_opt(2016, 9, 30));

    let income = f64_values(&loaded, "ib").unwrap();
    assert_eq!(income[2], None);
}

#[test]
fn test_load_rejects_nulls_in_required_columns() {
    let store = ExtractStore::in_memory().unwrap();
    let loose = TableSchema::new(
        "monthly_series",
        vec![
            Field::optional("month", FieldType::Date),
            Field::optional("value", FieldType::Float),
        ],
    );
    let df = DataFrame::new(vec![
        Column::new("month".into(), [Some("2020-01-01"), None]),
        Column::new("value".into(), [1.0, 2.0]),
    ])
    .unwrap();
    store.put_table(&loose, &df).unwrap();

    let err = store.load_table(&schema::monthly_series()).unwrap_err();
    assert!(matches!(err, DataError::UnexpectedNulls { count: 1, .. }));
}

#[test]
fn test_alias_map_from_store() {
    let store = ExtractStore::in_memory().unwrap();
    let df = DataFrame::new(vec![
        Column::new("alias".into(), ["0000320193", "0000789019"]),
        Column::new("entity_id".into(), ["001690", "012141"]),
        Column::new("first_year".into(), [None::<i32>, None]),
        Column::new("last_year".into(), [None::<i32>, Some(2020)]),
    ])
    .unwrap();
    store.put_table(&schema::alias_map(), &df).unwrap();

    let map = AliasMap::from_frame(&store.load_table(&schema::alias_map()).unwrap()).unwrap();
    assert_eq!(map.len(), 2);
    assert!(map.resolve("0000789019", 2021).key().is_none());
}

#[test]
fn test_write_panel_replaces_table() {
    let store = ExtractStore::in_memory().unwrap();
    let panel = DataFrame::new(vec![
        Column::new("gvkey".into(), ["a", "b"]),
        Column::new("loss".into(), [Some(1i32), Some(0)]),
        Column::new("flag".into(), [true, false]),
    ])
    .unwrap();

    store.write_panel("panel", &panel).unwrap();
    store.write_panel("panel", &panel).unwrap();
    assert_eq!(store.row_count("panel").unwrap(), 2);

    let stats = store.stats().unwrap();
    assert_eq!(stats.tables, 1);
    assert_eq!(stats.rows[0], ("panel".to_string(), 2));

    let schema = TableSchema::infer("panel", &panel).unwrap();
    let loaded = store.load_table(&schema).unwrap();
    assert_eq!(str_values(&loaded, "gvkey").unwrap()[1].as_deref(), Some("b"));
}
