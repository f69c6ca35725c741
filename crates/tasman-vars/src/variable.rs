//! The derived-variable trait.

use crate::error::Result;
use polars::prelude::*;
use std::fmt::Debug;

/// A per-row variable computed from raw panel fields.
///
/// Implementations add exactly one column named [`DerivedVariable::name`] and
/// leave every other column untouched.
pub trait DerivedVariable: Debug + Send + Sync {
    /// Output column name.
    fn name(&self) -> &str;

    /// Input columns that must be present.
    fn required_columns(&self) -> Vec<&str>;

    /// Add the variable's column to `data`.
    fn compute(&self, data: LazyFrame) -> Result<LazyFrame>;
}
