use std::collections::BTreeSet;

use crate::error::GenerationError;
use crate::models::expression::{ExprArena, ExprId};
use crate::models::logical_form::{LogicalForm, VariableKey};
use crate::services::proof_tree::{NodeId, ProofTree};

use super::inference::{quantity_of, sum, wrong_conclusion, wrong_parametrization, InferenceRule};
use super::parametrization::Parametrization;

/// Parts and their whole.
///
/// On a `PartWhole` conclusion the premises are one container per part and
/// the whole is their sum. On a `Container` conclusion the premises are a
/// part-whole including it plus the other parts, and the missing part is
/// the whole minus the others.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContPartWhole;

fn container_for<'a>(
    premises: &[&'a LogicalForm],
    key: &VariableKey,
) -> Result<&'a LogicalForm, GenerationError> {
    premises
        .iter()
        .copied()
        .find(|p| matches!(p, LogicalForm::Container { holder, .. } if holder == key))
        .ok_or_else(|| GenerationError::violation(format!("no container premise for part {}", key)))
}

impl InferenceRule for ContPartWhole {
    fn name(&self) -> &'static str {
        "ContPartWhole"
    }

    fn is_reverse_applicable(&self, node: NodeId, tree: &ProofTree) -> bool {
        match tree.form(node) {
            Some(LogicalForm::PartWhole { parts, .. }) => {
                parts.iter().all(|part| !tree.has_container_write_at(node, part))
            }
            Some(LogicalForm::Container { .. }) => true,
            _ => false,
        }
    }

    fn assert_valid_parametrization(
        &self,
        conclusion: &LogicalForm,
        parametrization: &Parametrization,
    ) -> Result<(), GenerationError> {
        match (conclusion, parametrization) {
            (LogicalForm::PartWhole { .. }, Parametrization::None) => Ok(()),
            (LogicalForm::PartWhole { .. }, other) => Err(wrong_parametrization("none", other)),
            (LogicalForm::Container { holder, .. }, Parametrization::PartWhole { parts, .. }) => {
                if parts.len() < 2 {
                    return Err(GenerationError::violation(format!(
                        "a part-whole needs at least two parts, got {}",
                        parts.len()
                    )));
                }
                let distinct: BTreeSet<_> = parts.iter().collect();
                if distinct.len() != parts.len() {
                    return Err(GenerationError::violation("part-whole parts must be distinct"));
                }
                let matching = parts.iter().filter(|p| *p == holder).count();
                if matching != 1 {
                    return Err(GenerationError::violation(format!(
                        "exactly one part must match the conclusion ({}), found {}",
                        holder, matching
                    )));
                }
                Ok(())
            }
            (LogicalForm::Container { .. }, other) => Err(wrong_parametrization("part_whole", other)),
            (other, _) => Err(wrong_conclusion(self.name(), other)),
        }
    }

    fn apply_reverse(
        &self,
        conclusion: &LogicalForm,
        parametrization: &Parametrization,
    ) -> Result<Vec<LogicalForm>, GenerationError> {
        self.assert_valid_parametrization(conclusion, parametrization)?;
        match (conclusion, parametrization) {
            (LogicalForm::PartWhole { parts, .. }, _) => {
                Ok(parts.iter().map(|part| LogicalForm::container(*part)).collect())
            }
            (
                LogicalForm::Container { holder, .. },
                Parametrization::PartWhole { whole_entity, whole_attribute, whole_unit, parts },
            ) => {
                let mut premises = vec![LogicalForm::part_whole(
                    *whole_entity,
                    *whole_attribute,
                    *whole_unit,
                    parts.clone(),
                )];
                premises.extend(
                    parts
                        .iter()
                        .filter(|part| *part != holder)
                        .map(|part| LogicalForm::container(*part)),
                );
                Ok(premises)
            }
            (other, _) => Err(wrong_conclusion(self.name(), other)),
        }
    }

    fn compose(
        &self,
        premises: &[&LogicalForm],
        conclusion: &LogicalForm,
        exprs: &mut ExprArena,
    ) -> Result<ExprId, GenerationError> {
        match conclusion {
            LogicalForm::PartWhole { parts, .. } => {
                let terms = parts
                    .iter()
                    .map(|part| container_for(premises, part).and_then(quantity_of))
                    .collect::<Result<Vec<_>, _>>()?;
                sum(&terms, exprs)
            }
            LogicalForm::Container { holder, .. } => {
                let (whole, parts) = premises
                    .iter()
                    .find_map(|p| match p {
                        LogicalForm::PartWhole { parts, .. } => Some((*p, parts)),
                        _ => None,
                    })
                    .ok_or_else(|| GenerationError::violation("expected a PartWhole premise"))?;

                let others = parts
                    .iter()
                    .filter(|part| *part != holder)
                    .map(|part| container_for(premises, part).and_then(quantity_of))
                    .collect::<Result<Vec<_>, _>>()?;
                let whole_q = quantity_of(whole)?;
                let known = sum(&others, exprs)?;
                Ok(exprs.sub(whole_q, known))
            }
            other => Err(wrong_conclusion(self.name(), other)),
        }
    }
}
