//! Applies a set of derived variables to a panel.

use crate::adjusted_earnings::AdjustedEarnings;
use crate::error::{Result, VarError};
use crate::fields::DerivedFields;
use crate::loss::LossIndicator;
use crate::profitability::Profitability;
use crate::rd_intensity::RdIntensity;
use crate::variable::DerivedVariable;
use polars::prelude::*;
use tracing::{debug, info, warn};

/// Runs derived variables over a frame.
///
/// Inputs that default to zero (the adjustment term and R&D expense) may be
/// missing from the frame entirely; they are added as all-null columns so the
/// zero-fill policy applies. Every other input must be present.
#[derive(Debug)]
pub struct DerivedVariableEngine {
    fields: DerivedFields,
    variables: Vec<Box<dyn DerivedVariable>>,
}

impl DerivedVariableEngine {
    /// Engine with no variables.
    pub fn new(fields: DerivedFields) -> Self {
        Self {
            fields,
            variables: Vec::new(),
        }
    }

    /// Engine with the four standard variables.
    pub fn standard(fields: DerivedFields) -> Self {
        Self::new(fields.clone())
            .with_variable(AdjustedEarnings::new(fields.clone()))
            .with_variable(Profitability::new(fields.clone()))
            .with_variable(RdIntensity::new(fields.clone()))
            .with_variable(LossIndicator::new(fields))
    }

    /// Append a variable; variables run in insertion order.
    pub fn with_variable(mut self, variable: impl DerivedVariable + 'static) -> Self {
        self.variables.push(Box::new(variable));
        self
    }

    /// Output column names.
    pub fn names(&self) -> Vec<&str> {
        self.variables.iter().map(|v| v.name()).collect()
    }

    /// Field mapping in use.
    pub const fn fields(&self) -> &DerivedFields {
        &self.fields
    }

    /// Compute every variable, returning a new frame.
    pub fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        let present: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|c| c.to_string())
            .collect();
        let has = |name: &str| present.iter().any(|c| c == name);

        let mut lf = df.clone().lazy();
        for defaulted in [&self.fields.adjustment, &self.fields.rd_expense] {
            if !has(defaulted) {
                warn!(column = %defaulted, "Input column absent, treated as zero");
                lf = lf.with_column(lit(NULL).cast(DataType::Float64).alias(defaulted.as_str()));
            }
        }

        for variable in &self.variables {
            for column in variable.required_columns() {
                let defaulted = column == self.fields.adjustment || column == self.fields.rd_expense;
                if !defaulted && !has(column) {
                    return Err(VarError::MissingColumn {
                        variable: variable.name().to_string(),
                        column: column.to_string(),
                    });
                }
            }
            debug!(variable = variable.name(), "Computing derived variable");
            lf = variable.compute(lf)?;
        }

        let out = lf.collect()?;
        info!(
            rows = out.height(),
            variables = self.variables.len(),
            "Derived variables computed"
        );
        Ok(out)
    }
}

impl Default for DerivedVariableEngine {
    fn default() -> Self {
        Self::standard(DerivedFields::default())
    }
}
