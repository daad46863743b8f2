use serde::{Deserialize, Serialize};

use crate::models::logical_form::{ComparisonType, VariableKey};

/// Slot assignment handed to a rule when it is applied in reverse.
///
/// Each rule accepts exactly one shape; anything else is rejected by
/// `assert_valid_parametrization`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Parametrization {
    /// For rules that take no input
    None,
    Comparison {
        comp_type: ComparisonType,
        subj: VariableKey,
        obj: VariableKey,
    },
    Transfer {
        sender: Option<u32>,
        receiver: Option<u32>,
        attribute: Option<u32>,
        unit: Option<u32>,
    },
    ComparisonEquality {
        comp_type: ComparisonType,
        other_comp_type: ComparisonType,
        subj: VariableKey,
        obj: VariableKey,
        other_subj: VariableKey,
        other_obj: VariableKey,
    },
    PartWhole {
        whole_entity: u32,
        whole_attribute: Option<u32>,
        whole_unit: Option<u32>,
        parts: Vec<VariableKey>,
    },
}

impl Parametrization {
    pub fn kind(&self) -> &'static str {
        match self {
            Parametrization::None => "none",
            Parametrization::Comparison { .. } => "comparison",
            Parametrization::Transfer { .. } => "transfer",
            Parametrization::ComparisonEquality { .. } => "comparison_equality",
            Parametrization::PartWhole { .. } => "part_whole",
        }
    }

    /// Rendering attached to error reports
    pub fn describe(&self) -> String {
        format!("{:?}", self)
    }
}

impl Default for Parametrization {
    fn default() -> Self {
        Parametrization::None
    }
}
