//! Profitability
//!
//! Adjusted earnings scaled by the scale denominator (total assets by
//! default). Null whenever the denominator is null, zero or negative.

use crate::error::Result;
use crate::fields::{DerivedFields, PROFITABILITY};
use crate::variable::DerivedVariable;
use polars::prelude::*;

/// `(income - adjustment) / scale`
#[derive(Debug, Clone, Default)]
pub struct Profitability {
    fields: DerivedFields,
}

impl Profitability {
    /// Create the variable over the given field mapping.
    pub const fn new(fields: DerivedFields) -> Self {
        Self { fields }
    }
}

impl DerivedVariable for Profitability {
    fn name(&self) -> &str {
        PROFITABILITY
    }

    fn required_columns(&self) -> Vec<&str> {
        vec![
            self.fields.income.as_str(),
            self.fields.adjustment.as_str(),
            self.fields.scale.as_str(),
        ]
    }

    fn compute(&self, data: LazyFrame) -> Result<LazyFrame> {
        let ratio = self.fields.scaled(self.fields.adjusted_earnings());
        Ok(data.with_columns([ratio.alias(PROFITABILITY)]))
    }
}
