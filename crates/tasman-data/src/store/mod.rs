//! Extract store.
//!
//! Raw extracts arrive as tables in a SQLite database. A store is opened per
//! run and passed explicitly to the loading stages.

pub mod sqlite;

pub use sqlite::{ExtractStore, StoreStats};
