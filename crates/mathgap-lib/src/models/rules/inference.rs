use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GenerationError;
use crate::models::expression::{ExprArena, ExprId};
use crate::models::logical_form::{ComparisonType, LogicalForm};
use crate::models::timing::{SlotTarget, TimeSlot, VariableTime};
use crate::services::proof_tree::{NodeId, ProofTree};

use super::comp::ContContComp;
use super::container::{ContCompCompeqCont, ContCompCont, ContTransferCont};
use super::parametrization::Parametrization;
use super::part_whole::ContPartWhole;

/// Premise pattern that can justify a conclusion.
///
/// Rules are used in reverse while a tree is built (conclusion to premises)
/// and forward once it is complete (premise quantities to conclusion quantity).
pub trait InferenceRule {
    fn name(&self) -> &'static str;

    /// Could this rule have produced the form at `node`? Never mutates.
    fn is_reverse_applicable(&self, node: NodeId, tree: &ProofTree) -> bool;

    fn assert_valid_parametrization(
        &self,
        conclusion: &LogicalForm,
        parametrization: &Parametrization,
    ) -> Result<(), GenerationError>;

    /// Premises that justify `conclusion`, all with their quantity unset.
    /// Their order is not significant.
    fn apply_reverse(
        &self,
        conclusion: &LogicalForm,
        parametrization: &Parametrization,
    ) -> Result<Vec<LogicalForm>, GenerationError>;

    /// Time annotations for each premise, one list per premise.
    fn reverse_variable_times(
        &self,
        premises: &[LogicalForm],
        conclusion: &LogicalForm,
    ) -> Vec<Vec<TimeSlot<SlotTarget>>> {
        default_variable_times(premises, conclusion)
    }

    /// Quantity of `conclusion` composed from the premise quantities.
    fn compose(
        &self,
        premises: &[&LogicalForm],
        conclusion: &LogicalForm,
        exprs: &mut ExprArena,
    ) -> Result<ExprId, GenerationError>;

    /// Set `conclusion.quantity` from premises whose quantities are all known.
    fn infer_knowledge(
        &self,
        premises: &[&LogicalForm],
        conclusion: &mut LogicalForm,
        exprs: &mut ExprArena,
    ) -> Result<(), GenerationError> {
        if let Some(missing) = premises.iter().find(|p| p.has_quantity() && p.quantity().is_none()) {
            return Err(GenerationError::violation(format!(
                "premise {} has no quantity yet",
                missing
            )));
        }
        let quantity = self.compose(premises, conclusion, exprs)?;
        conclusion.set_quantity(quantity)
    }
}

/// Premise slots follow the conclusion when they share its key, otherwise
/// the first earlier premise that has the key. Fresh keys are unconstrained.
pub fn default_variable_times(
    premises: &[LogicalForm],
    conclusion: &LogicalForm,
) -> Vec<Vec<TimeSlot<SlotTarget>>> {
    let conclusion_keys = conclusion.variable_keys();
    let premise_keys: Vec<_> = premises.iter().map(|p| p.variable_keys()).collect();

    premise_keys
        .iter()
        .enumerate()
        .map(|(i, keys)| {
            keys.iter()
                .map(|&key| {
                    let time = if conclusion_keys.contains(&key) {
                        VariableTime::SameAs(SlotTarget::Conclusion(key))
                    } else if let Some(j) = (0..i).find(|&j| premise_keys[j].contains(&key)) {
                        VariableTime::SameAs(SlotTarget::Premise(j, key))
                    } else {
                        VariableTime::Unconstrained
                    };
                    TimeSlot::new(key, time)
                })
                .collect()
        })
        .collect()
}

pub(crate) fn quantity_of(form: &LogicalForm) -> Result<ExprId, GenerationError> {
    form.quantity()
        .ok_or_else(|| GenerationError::violation(format!("premise {} has no quantity yet", form)))
}

pub(crate) fn wrong_conclusion(rule: &str, conclusion: &LogicalForm) -> GenerationError {
    GenerationError::violation(format!(
        "{} cannot conclude a {}",
        rule,
        conclusion.form_type()
    ))
}

pub(crate) fn wrong_parametrization(expected: &str, got: &Parametrization) -> GenerationError {
    GenerationError::violation(format!(
        "expected a {} parametrization, got {}",
        expected,
        got.kind()
    ))
}

/// One side of a comparison from the other side and the difference/ratio.
///
/// `solving_obj` means the known quantity is the subject's.
pub(crate) fn solve_comparison(
    comp_type: ComparisonType,
    solving_obj: bool,
    known: ExprId,
    comparison: ExprId,
    exprs: &mut ExprArena,
) -> ExprId {
    match (comp_type, solving_obj) {
        (ComparisonType::MoreThan, true) => exprs.sub(known, comparison),
        (ComparisonType::LessThan, true) => exprs.add(known, comparison),
        (ComparisonType::TimesAsMany, true) => exprs.div(known, comparison),
        (ComparisonType::FractionOf, true) => exprs.mul(known, comparison),
        (ComparisonType::MoreThan, false) => exprs.add(known, comparison),
        (ComparisonType::LessThan, false) => exprs.sub(known, comparison),
        (ComparisonType::TimesAsMany, false) => exprs.mul(known, comparison),
        (ComparisonType::FractionOf, false) => exprs.div(known, comparison),
    }
}

/// Left fold of additions. Errors on an empty list.
pub(crate) fn sum(terms: &[ExprId], exprs: &mut ExprArena) -> Result<ExprId, GenerationError> {
    let (first, rest) = terms
        .split_first()
        .ok_or_else(|| GenerationError::violation("cannot sum zero quantities"))?;
    Ok(rest.iter().fold(*first, |acc, &term| exprs.add(acc, term)))
}

// ============================================================================
// Closed rule set
// ============================================================================

/// The shipped rules as a closed, enumerable set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RuleKind {
    ContCompCont,
    ContTransferCont,
    ContCompCompeqCont,
    ContContComp,
    ContPartWhole,
}

impl RuleKind {
    pub const ALL: [RuleKind; 5] = [
        RuleKind::ContCompCont,
        RuleKind::ContTransferCont,
        RuleKind::ContCompCompeqCont,
        RuleKind::ContContComp,
        RuleKind::ContPartWhole,
    ];
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

macro_rules! dispatch {
    ($kind:expr, $rule:ident => $body:expr) => {
        match $kind {
            RuleKind::ContCompCont => {
                let $rule = ContCompCont;
                $body
            }
            RuleKind::ContTransferCont => {
                let $rule = ContTransferCont;
                $body
            }
            RuleKind::ContCompCompeqCont => {
                let $rule = ContCompCompeqCont;
                $body
            }
            RuleKind::ContContComp => {
                let $rule = ContContComp;
                $body
            }
            RuleKind::ContPartWhole => {
                let $rule = ContPartWhole;
                $body
            }
        }
    };
}

impl InferenceRule for RuleKind {
    fn name(&self) -> &'static str {
        dispatch!(self, rule => rule.name())
    }

    fn is_reverse_applicable(&self, node: NodeId, tree: &ProofTree) -> bool {
        dispatch!(self, rule => rule.is_reverse_applicable(node, tree))
    }

    fn assert_valid_parametrization(
        &self,
        conclusion: &LogicalForm,
        parametrization: &Parametrization,
    ) -> Result<(), GenerationError> {
        dispatch!(self, rule => rule.assert_valid_parametrization(conclusion, parametrization))
    }

    fn apply_reverse(
        &self,
        conclusion: &LogicalForm,
        parametrization: &Parametrization,
    ) -> Result<Vec<LogicalForm>, GenerationError> {
        dispatch!(self, rule => rule.apply_reverse(conclusion, parametrization))
    }

    fn reverse_variable_times(
        &self,
        premises: &[LogicalForm],
        conclusion: &LogicalForm,
    ) -> Vec<Vec<TimeSlot<SlotTarget>>> {
        dispatch!(self, rule => rule.reverse_variable_times(premises, conclusion))
    }

    fn compose(
        &self,
        premises: &[&LogicalForm],
        conclusion: &LogicalForm,
        exprs: &mut ExprArena,
    ) -> Result<ExprId, GenerationError> {
        dispatch!(self, rule => rule.compose(premises, conclusion, exprs))
    }
}
