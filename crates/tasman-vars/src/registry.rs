//! Variable Registry
//!
//! Static metadata for the derived variables, for listing in the CLI and for
//! resolving winsorization targets by name.

use serde::Serialize;

/// How a variable's values are shaped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    /// Level in the units of the raw fields
    Level,
    /// Ratio over the scale denominator
    Ratio,
    /// 0/1 indicator
    Indicator,
}

/// Variable metadata
#[derive(Debug, Clone, Serialize)]
pub struct VariableInfo {
    /// Output column name
    pub name: &'static str,
    /// Shape of the values
    pub kind: VariableKind,
    /// What the variable measures
    pub description: &'static str,
    /// Logical inputs (see [`crate::DerivedFields`])
    pub inputs: &'static [&'static str],
}

impl VariableInfo {
    /// Whether the variable is a candidate for winsorization.
    pub const fn is_continuous(&self) -> bool {
        !matches!(self.kind, VariableKind::Indicator)
    }
}

/// All derived variables, in dependency order.
pub fn available_variables() -> Vec<VariableInfo> {
    vec![
        VariableInfo {
            name: "adj_earnings",
            kind: VariableKind::Level,
            description: "Income less special items",
            inputs: &["income", "adjustment"],
        },
        VariableInfo {
            name: "profitability",
            kind: VariableKind::Ratio,
            description: "Adjusted earnings over total assets",
            inputs: &["income", "adjustment", "scale"],
        },
        VariableInfo {
            name: "rd_intensity",
            kind: VariableKind::Ratio,
            description: "R&D expense over total assets",
            inputs: &["rd_expense", "scale"],
        },
        VariableInfo {
            name: "loss",
            kind: VariableKind::Indicator,
            description: "1 when adjusted earnings are negative",
            inputs: &["income", "adjustment"],
        },
    ]
}

/// Get variable info by name
pub fn variable_info(name: &str) -> Option<VariableInfo> {
    available_variables().into_iter().find(|v| v.name == name)
}

/// Names of the ratio variables, the default winsorization targets.
pub fn ratio_variables() -> Vec<&'static str> {
    available_variables()
        .into_iter()
        .filter(|v| v.kind == VariableKind::Ratio)
        .map(|v| v.name)
        .collect()
}
