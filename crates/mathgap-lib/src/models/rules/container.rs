//! Rules concluding how much one agent holds.

use crate::error::GenerationError;
use crate::models::expression::{ExprArena, ExprId};
use crate::models::logical_form::{FormType, LogicalForm, VariableKey};
use crate::models::timing::{SlotTarget, TimeSlot, VariableTime};
use crate::services::proof_tree::{NodeId, ProofTree};

use super::inference::{
    quantity_of, solve_comparison, wrong_conclusion, wrong_parametrization, InferenceRule,
};
use super::parametrization::Parametrization;

fn concludes_container(node: NodeId, tree: &ProofTree) -> bool {
    tree.form(node)
        .map(|form| form.form_type() == FormType::Container)
        .unwrap_or(false)
}

fn holder_of(rule: &str, conclusion: &LogicalForm) -> Result<VariableKey, GenerationError> {
    match conclusion {
        LogicalForm::Container { holder, .. } => Ok(*holder),
        other => Err(wrong_conclusion(rule, other)),
    }
}

/// Exactly one of the two sides must be the conclusion's holder.
fn exactly_one_side(holder: &VariableKey, subj: &VariableKey, obj: &VariableKey) -> Result<(), GenerationError> {
    if (subj == holder) == (obj == holder) {
        return Err(GenerationError::violation(format!(
            "exactly one of subj ({}) and obj ({}) must match the conclusion ({})",
            subj, obj, holder
        )));
    }
    Ok(())
}

// ============================================================================
// ContCompCont
// ============================================================================

/// One agent's amount plus how it compares to another gives the other's amount.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContCompCont;

impl InferenceRule for ContCompCont {
    fn name(&self) -> &'static str {
        "ContCompCont"
    }

    fn is_reverse_applicable(&self, node: NodeId, tree: &ProofTree) -> bool {
        // always introduces a fresh agent, nothing in the tree can conflict
        concludes_container(node, tree)
    }

    fn assert_valid_parametrization(
        &self,
        conclusion: &LogicalForm,
        parametrization: &Parametrization,
    ) -> Result<(), GenerationError> {
        let holder = holder_of(self.name(), conclusion)?;
        match parametrization {
            Parametrization::Comparison { subj, obj, .. } => exactly_one_side(&holder, subj, obj),
            other => Err(wrong_parametrization("comparison", other)),
        }
    }

    fn apply_reverse(
        &self,
        conclusion: &LogicalForm,
        parametrization: &Parametrization,
    ) -> Result<Vec<LogicalForm>, GenerationError> {
        self.assert_valid_parametrization(conclusion, parametrization)?;
        let holder = holder_of(self.name(), conclusion)?;
        let (comp_type, subj, obj) = match parametrization {
            Parametrization::Comparison { comp_type, subj, obj } => (*comp_type, *subj, *obj),
            other => return Err(wrong_parametrization("comparison", other)),
        };

        let known = if obj == holder { subj } else { obj };
        Ok(vec![
            LogicalForm::container(known),
            LogicalForm::comp(subj, obj, comp_type),
        ])
    }

    fn compose(
        &self,
        premises: &[&LogicalForm],
        conclusion: &LogicalForm,
        exprs: &mut ExprArena,
    ) -> Result<ExprId, GenerationError> {
        let holder = holder_of(self.name(), conclusion)?;
        let (container, comp) = match premises {
            [c, p] if c.form_type() == FormType::Container && p.form_type() == FormType::Comp => (*c, *p),
            _ => return Err(GenerationError::violation("expected premises [Container, Comp]")),
        };
        let (comp_type, obj) = match comp {
            LogicalForm::Comp { comp_type, obj, .. } => (*comp_type, *obj),
            _ => return Err(GenerationError::violation("expected a Comp premise")),
        };

        let known = quantity_of(container)?;
        let difference = quantity_of(comp)?;
        Ok(solve_comparison(comp_type, obj == holder, known, difference, exprs))
    }
}

// ============================================================================
// ContTransferCont
// ============================================================================

/// An agent's amount before a transfer plus the transfer gives the amount after.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContTransferCont;

impl InferenceRule for ContTransferCont {
    fn name(&self) -> &'static str {
        "ContTransferCont"
    }

    fn is_reverse_applicable(&self, node: NodeId, tree: &ProofTree) -> bool {
        // the pre-transfer state is strictly earlier, so it cannot collide
        concludes_container(node, tree)
    }

    fn assert_valid_parametrization(
        &self,
        conclusion: &LogicalForm,
        parametrization: &Parametrization,
    ) -> Result<(), GenerationError> {
        let holder = holder_of(self.name(), conclusion)?;
        let (sender, receiver, attribute, unit) = match parametrization {
            Parametrization::Transfer { sender, receiver, attribute, unit } => (sender, receiver, attribute, unit),
            other => return Err(wrong_parametrization("transfer", other)),
        };

        if sender.is_none() && receiver.is_none() {
            return Err(GenerationError::violation("a transfer needs a sender or a receiver"));
        }
        if (*receiver == Some(holder.agent)) == (*sender == Some(holder.agent)) {
            return Err(GenerationError::violation(format!(
                "exactly one of sender ({:?}) and receiver ({:?}) must be the conclusion's agent ({})",
                sender, receiver, holder.agent
            )));
        }
        if attribute.is_some() && *attribute != holder.attribute {
            return Err(GenerationError::violation(format!(
                "transfer attribute {:?} differs from the conclusion's {:?}",
                attribute, holder.attribute
            )));
        }
        if unit.is_some() && *unit != holder.unit {
            return Err(GenerationError::violation(format!(
                "transfer unit {:?} differs from the conclusion's {:?}",
                unit, holder.unit
            )));
        }
        Ok(())
    }

    fn apply_reverse(
        &self,
        conclusion: &LogicalForm,
        parametrization: &Parametrization,
    ) -> Result<Vec<LogicalForm>, GenerationError> {
        self.assert_valid_parametrization(conclusion, parametrization)?;
        let holder = holder_of(self.name(), conclusion)?;
        let (sender, receiver) = match parametrization {
            Parametrization::Transfer { sender, receiver, .. } => (*sender, *receiver),
            other => return Err(wrong_parametrization("transfer", other)),
        };

        // the order is fixed, the time annotations refer to the container by position
        Ok(vec![
            LogicalForm::container(holder),
            LogicalForm::Transfer {
                receiver,
                sender,
                entity: holder.entity,
                attribute: holder.attribute,
                unit: holder.unit,
                quantity: None,
            },
        ])
    }

    fn reverse_variable_times(
        &self,
        premises: &[LogicalForm],
        conclusion: &LogicalForm,
    ) -> Vec<Vec<TimeSlot<SlotTarget>>> {
        let holder = match conclusion {
            LogicalForm::Container { holder, .. } => *holder,
            _ => return super::inference::default_variable_times(premises, conclusion),
        };

        premises
            .iter()
            .map(|premise| match premise {
                LogicalForm::Container { holder: key, .. } if *key == holder => {
                    vec![TimeSlot::new(holder, VariableTime::Before(SlotTarget::Conclusion(holder)))]
                }
                LogicalForm::Transfer { .. } => premise
                    .variable_keys()
                    .into_iter()
                    .flat_map(|key| {
                        if key == holder {
                            // reads the state before and writes the state after
                            vec![
                                TimeSlot::new(key, VariableTime::SameAs(SlotTarget::Premise(0, key))),
                                TimeSlot::new(key, VariableTime::SameAs(SlotTarget::Conclusion(key))),
                            ]
                        } else {
                            vec![TimeSlot::new(key, VariableTime::Unconstrained)]
                        }
                    })
                    .collect(),
                other => other
                    .variable_keys()
                    .into_iter()
                    .map(|key| TimeSlot::new(key, VariableTime::Unconstrained))
                    .collect(),
            })
            .collect()
    }

    fn compose(
        &self,
        premises: &[&LogicalForm],
        conclusion: &LogicalForm,
        exprs: &mut ExprArena,
    ) -> Result<ExprId, GenerationError> {
        let holder = holder_of(self.name(), conclusion)?;
        let (container, transfer) = match premises {
            [c, t] if c.form_type() == FormType::Container && t.form_type() == FormType::Transfer => (*c, *t),
            _ => return Err(GenerationError::violation("expected premises [Container, Transfer]")),
        };
        let (receiver, sender) = match transfer {
            LogicalForm::Transfer { receiver, sender, .. } => (*receiver, *sender),
            _ => return Err(GenerationError::violation("expected a Transfer premise")),
        };

        let before = quantity_of(container)?;
        let moved = quantity_of(transfer)?;
        if receiver == Some(holder.agent) {
            Ok(exprs.add(before, moved))
        } else if sender == Some(holder.agent) {
            Ok(exprs.sub(before, moved))
        } else {
            Err(GenerationError::violation(format!(
                "transfer does not involve the conclusion's agent {}",
                holder.agent
            )))
        }
    }
}

// ============================================================================
// ContCompCompeqCont
// ============================================================================

/// One agent's amount, a comparison between two others, and the statement
/// that both comparisons are equal give the fourth agent's amount.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContCompCompeqCont;

impl InferenceRule for ContCompCompeqCont {
    fn name(&self) -> &'static str {
        "ContCompCompeqCont"
    }

    fn is_reverse_applicable(&self, node: NodeId, tree: &ProofTree) -> bool {
        concludes_container(node, tree)
    }

    fn assert_valid_parametrization(
        &self,
        conclusion: &LogicalForm,
        parametrization: &Parametrization,
    ) -> Result<(), GenerationError> {
        let holder = holder_of(self.name(), conclusion)?;
        match parametrization {
            Parametrization::ComparisonEquality {
                comp_type,
                other_comp_type,
                subj,
                obj,
                other_subj,
                other_obj,
            } => {
                exactly_one_side(&holder, subj, obj)?;
                if *other_subj == holder || *other_obj == holder {
                    return Err(GenerationError::violation(format!(
                        "neither other_subj ({}) nor other_obj ({}) may match the conclusion ({})",
                        other_subj, other_obj, holder
                    )));
                }
                if comp_type != other_comp_type {
                    return Err(GenerationError::violation(format!(
                        "equal comparisons need the same type, got {} and {}",
                        comp_type.label(),
                        other_comp_type.label()
                    )));
                }
                Ok(())
            }
            other => Err(wrong_parametrization("comparison_equality", other)),
        }
    }

    fn apply_reverse(
        &self,
        conclusion: &LogicalForm,
        parametrization: &Parametrization,
    ) -> Result<Vec<LogicalForm>, GenerationError> {
        self.assert_valid_parametrization(conclusion, parametrization)?;
        let holder = holder_of(self.name(), conclusion)?;
        let (comp_type, other_comp_type, subj, obj, other_subj, other_obj) = match parametrization {
            Parametrization::ComparisonEquality {
                comp_type,
                other_comp_type,
                subj,
                obj,
                other_subj,
                other_obj,
            } => (*comp_type, *other_comp_type, *subj, *obj, *other_subj, *other_obj),
            other => return Err(wrong_parametrization("comparison_equality", other)),
        };

        let known = if obj == holder { subj } else { obj };
        Ok(vec![
            LogicalForm::container(known),
            LogicalForm::comp(other_subj, other_obj, other_comp_type),
            LogicalForm::CompEq {
                subj,
                obj,
                comp_type,
                other_subj,
                other_obj,
                other_comp_type,
            },
        ])
    }

    fn compose(
        &self,
        premises: &[&LogicalForm],
        conclusion: &LogicalForm,
        exprs: &mut ExprArena,
    ) -> Result<ExprId, GenerationError> {
        let holder = holder_of(self.name(), conclusion)?;
        let (container, comp, compeq) = match premises {
            [c, p, e]
                if c.form_type() == FormType::Container
                    && p.form_type() == FormType::Comp
                    && e.form_type() == FormType::CompEq =>
            {
                (*c, *p, *e)
            }
            _ => {
                return Err(GenerationError::violation(
                    "expected premises [Container, Comp, CompEq]",
                ))
            }
        };
        let (comp_type, obj) = match compeq {
            LogicalForm::CompEq { comp_type, obj, .. } => (*comp_type, *obj),
            _ => return Err(GenerationError::violation("expected a CompEq premise")),
        };

        let known = quantity_of(container)?;
        let difference = quantity_of(comp)?;
        Ok(solve_comparison(comp_type, obj == holder, known, difference, exprs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::logical_form::ComparisonType;
    use crate::models::properties::PropertyKey;
    use std::collections::HashMap;

    fn compute(
        rule: &dyn InferenceRule,
        premises: &mut [LogicalForm],
        conclusion: &mut LogicalForm,
        exprs: &mut ExprArena,
    ) -> ExprId {
        for (i, premise) in premises.iter_mut().enumerate() {
            if premise.has_quantity() {
                let leaf = exprs.placeholder(PropertyKey::quantity(i as u32 + 1));
                premise.set_quantity(leaf).unwrap();
            }
        }
        let refs: Vec<&LogicalForm> = premises.iter().collect();
        rule.infer_knowledge(&refs, conclusion, exprs).unwrap();
        conclusion.quantity().unwrap()
    }

    #[test]
    fn test_cont_comp_cont_more_than_object_side() {
        let a = VariableKey::new(1, 1);
        let b = VariableKey::new(2, 1);
        let mut conclusion = LogicalForm::container(b);
        let param = Parametrization::Comparison { comp_type: ComparisonType::MoreThan, subj: a, obj: b };

        let mut premises = ContCompCont.apply_reverse(&conclusion, &param).unwrap();
        assert_eq!(premises[0], LogicalForm::container(a));
        assert_eq!(premises[1], LogicalForm::comp(a, b, ComparisonType::MoreThan));

        let mut exprs = ExprArena::new();
        let q = compute(&ContCompCont, &mut premises, &mut conclusion, &mut exprs);
        assert_eq!(exprs.render(q), "(quantity_1) - (quantity_2)");

        let values: HashMap<_, _> = [(PropertyKey::quantity(1), 10.0), (PropertyKey::quantity(2), 3.0)]
            .into_iter()
            .collect();
        assert_eq!(exprs.eval(q, &values), Ok(7.0));
    }

    #[test]
    fn test_cont_comp_cont_subject_side_inverts() {
        let a = VariableKey::new(1, 1);
        let b = VariableKey::new(2, 1);
        let mut conclusion = LogicalForm::container(a);
        let param = Parametrization::Comparison { comp_type: ComparisonType::FractionOf, subj: a, obj: b };

        let mut premises = ContCompCont.apply_reverse(&conclusion, &param).unwrap();
        assert_eq!(premises[0], LogicalForm::container(b));

        let mut exprs = ExprArena::new();
        let q = compute(&ContCompCont, &mut premises, &mut conclusion, &mut exprs);
        assert_eq!(exprs.render(q), "(quantity_1) / (quantity_2)");
    }

    #[test]
    fn test_exactly_one_side_must_match() {
        let a = VariableKey::new(1, 1);
        let conclusion = LogicalForm::container(a);

        let both = Parametrization::Comparison { comp_type: ComparisonType::MoreThan, subj: a, obj: a };
        assert!(ContCompCont.assert_valid_parametrization(&conclusion, &both).is_err());

        let neither = Parametrization::Comparison {
            comp_type: ComparisonType::MoreThan,
            subj: VariableKey::new(2, 1),
            obj: VariableKey::new(3, 1),
        };
        assert!(ContCompCont.assert_valid_parametrization(&conclusion, &neither).is_err());
        assert!(ContCompCont.assert_valid_parametrization(&conclusion, &Parametrization::None).is_err());
    }

    #[test]
    fn test_transfer_receiver_adds_sender_subtracts() {
        let a = VariableKey::new(1, 1);
        let mut exprs = ExprArena::new();

        let mut conclusion = LogicalForm::container(a);
        let receive = Parametrization::Transfer { sender: Some(2), receiver: Some(1), attribute: None, unit: None };
        let mut premises = ContTransferCont.apply_reverse(&conclusion, &receive).unwrap();
        let q = compute(&ContTransferCont, &mut premises, &mut conclusion, &mut exprs);
        assert_eq!(exprs.render(q), "(quantity_1) + (quantity_2)");

        let mut conclusion = LogicalForm::container(a);
        let give = Parametrization::Transfer { sender: Some(1), receiver: None, attribute: None, unit: None };
        let mut premises = ContTransferCont.apply_reverse(&conclusion, &give).unwrap();
        let q = compute(&ContTransferCont, &mut premises, &mut conclusion, &mut exprs);
        assert_eq!(exprs.render(q), "(quantity_1) - (quantity_2)");
    }

    #[test]
    fn test_transfer_parametrization_checks() {
        let a = VariableKey::new(1, 1);
        let conclusion = LogicalForm::container(a);

        let nobody = Parametrization::Transfer { sender: None, receiver: None, attribute: None, unit: None };
        assert!(ContTransferCont.assert_valid_parametrization(&conclusion, &nobody).is_err());

        let self_transfer = Parametrization::Transfer { sender: Some(1), receiver: Some(1), attribute: None, unit: None };
        assert!(ContTransferCont.assert_valid_parametrization(&conclusion, &self_transfer).is_err());

        let new_unit = Parametrization::Transfer { sender: Some(2), receiver: Some(1), attribute: None, unit: Some(4) };
        assert!(ContTransferCont.assert_valid_parametrization(&conclusion, &new_unit).is_err());
    }

    #[test]
    fn test_transfer_times() {
        let a = VariableKey::new(1, 1);
        let b = VariableKey::new(2, 1);
        let conclusion = LogicalForm::container(a);
        let param = Parametrization::Transfer { sender: Some(2), receiver: Some(1), attribute: None, unit: None };
        let premises = ContTransferCont.apply_reverse(&conclusion, &param).unwrap();

        let times = ContTransferCont.reverse_variable_times(&premises, &conclusion);
        assert_eq!(times[0], vec![TimeSlot::new(a, VariableTime::Before(SlotTarget::Conclusion(a)))]);
        assert_eq!(
            times[1],
            vec![
                TimeSlot::new(a, VariableTime::SameAs(SlotTarget::Premise(0, a))),
                TimeSlot::new(a, VariableTime::SameAs(SlotTarget::Conclusion(a))),
                TimeSlot::new(b, VariableTime::Unconstrained),
            ]
        );
    }

    #[test]
    fn test_compeq_propagates_comparison() {
        let a = VariableKey::new(1, 1);
        let b = VariableKey::new(2, 1);
        let c = VariableKey::new(3, 1);
        let d = VariableKey::new(4, 1);
        let mut conclusion = LogicalForm::container(b);
        let param = Parametrization::ComparisonEquality {
            comp_type: ComparisonType::MoreThan,
            other_comp_type: ComparisonType::MoreThan,
            subj: a,
            obj: b,
            other_subj: c,
            other_obj: d,
        };

        let mut premises = ContCompCompeqCont.apply_reverse(&conclusion, &param).unwrap();
        assert_eq!(premises.len(), 3);
        assert_eq!(premises[1], LogicalForm::comp(c, d, ComparisonType::MoreThan));

        let mut exprs = ExprArena::new();
        let q = compute(&ContCompCompeqCont, &mut premises, &mut conclusion, &mut exprs);
        assert_eq!(exprs.render(q), "(quantity_1) - (quantity_2)");
    }

    #[test]
    fn test_compeq_rejects_other_side_matching() {
        let a = VariableKey::new(1, 1);
        let conclusion = LogicalForm::container(a);
        let param = Parametrization::ComparisonEquality {
            comp_type: ComparisonType::MoreThan,
            other_comp_type: ComparisonType::MoreThan,
            subj: a,
            obj: VariableKey::new(2, 1),
            other_subj: a,
            other_obj: VariableKey::new(3, 1),
        };
        assert!(ContCompCompeqCont.assert_valid_parametrization(&conclusion, &param).is_err());
    }

    #[test]
    fn test_missing_premise_quantity_is_a_violation() {
        let a = VariableKey::new(1, 1);
        let b = VariableKey::new(2, 1);
        let mut conclusion = LogicalForm::container(b);
        let premises = vec![LogicalForm::container(a), LogicalForm::comp(a, b, ComparisonType::MoreThan)];
        let refs: Vec<&LogicalForm> = premises.iter().collect();
        let mut exprs = ExprArena::new();
        let err = ContCompCont.infer_knowledge(&refs, &mut conclusion, &mut exprs).unwrap_err();
        assert!(matches!(err, GenerationError::ConstraintViolation { .. }));
        assert!(conclusion.quantity().is_none());
    }
}
