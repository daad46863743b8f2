use crate::error::GenerationError;
use crate::models::expression::{ExprArena, ExprId};
use crate::models::logical_form::{ComparisonType, FormType, LogicalForm, VariableKey};
use crate::services::proof_tree::{NodeId, ProofTree};

use super::inference::{quantity_of, wrong_conclusion, wrong_parametrization, InferenceRule};
use super::parametrization::Parametrization;

/// Two agents' amounts give how one compares to the other.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContContComp;

impl InferenceRule for ContContComp {
    fn name(&self) -> &'static str {
        "ContContComp"
    }

    fn is_reverse_applicable(&self, node: NodeId, tree: &ProofTree) -> bool {
        let (subj, obj) = match tree.form(node) {
            Some(LogicalForm::Comp { subj, obj, .. }) => (*subj, *obj),
            _ => return false,
        };
        // a container already stating either side at that moment would be circular
        !tree.has_container_write_at(node, &subj) && !tree.has_container_write_at(node, &obj)
    }

    fn assert_valid_parametrization(
        &self,
        conclusion: &LogicalForm,
        parametrization: &Parametrization,
    ) -> Result<(), GenerationError> {
        if conclusion.form_type() != FormType::Comp {
            return Err(wrong_conclusion(self.name(), conclusion));
        }
        match parametrization {
            Parametrization::None => Ok(()),
            other => Err(wrong_parametrization("none", other)),
        }
    }

    fn apply_reverse(
        &self,
        conclusion: &LogicalForm,
        parametrization: &Parametrization,
    ) -> Result<Vec<LogicalForm>, GenerationError> {
        self.assert_valid_parametrization(conclusion, parametrization)?;
        match conclusion {
            LogicalForm::Comp { subj, obj, .. } => {
                Ok(vec![LogicalForm::container(*subj), LogicalForm::container(*obj)])
            }
            other => Err(wrong_conclusion(self.name(), other)),
        }
    }

    fn compose(
        &self,
        premises: &[&LogicalForm],
        conclusion: &LogicalForm,
        exprs: &mut ExprArena,
    ) -> Result<ExprId, GenerationError> {
        let (subj, obj, comp_type) = match conclusion {
            LogicalForm::Comp { subj, obj, comp_type, .. } => (*subj, *obj, *comp_type),
            other => return Err(wrong_conclusion(self.name(), other)),
        };

        // matched by identity, not by position
        let holding = |key: VariableKey| {
            premises
                .iter()
                .find(|p| matches!(p, LogicalForm::Container { holder, .. } if *holder == key))
                .ok_or_else(|| GenerationError::violation(format!("no container premise for {}", key)))
        };
        let subj_q = quantity_of(holding(subj)?)?;
        let obj_q = quantity_of(holding(obj)?)?;

        Ok(match comp_type {
            ComparisonType::MoreThan => exprs.sub(subj_q, obj_q),
            ComparisonType::LessThan => exprs.sub(obj_q, subj_q),
            ComparisonType::TimesAsMany => exprs.div(subj_q, obj_q),
            ComparisonType::FractionOf => exprs.div(obj_q, subj_q),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::properties::PropertyKey;
    use crate::models::rules::RuleKind;

    #[test]
    fn test_cont_cont_comp_ignores_premise_order() {
        let a = VariableKey::new(1, 1);
        let b = VariableKey::new(2, 1);
        let conclusion = LogicalForm::comp(a, b, ComparisonType::LessThan);
        let mut premises = ContContComp.apply_reverse(&conclusion, &Parametrization::None).unwrap();
        assert_eq!(premises, vec![LogicalForm::container(a), LogicalForm::container(b)]);

        let mut exprs = ExprArena::new();
        for (i, premise) in premises.iter_mut().enumerate() {
            let leaf = exprs.placeholder(PropertyKey::quantity(i as u32 + 1));
            premise.set_quantity(leaf).unwrap();
        }

        let forward: Vec<&LogicalForm> = premises.iter().collect();
        let reversed: Vec<&LogicalForm> = premises.iter().rev().collect();
        let q1 = ContContComp.compose(&forward, &conclusion, &mut exprs).unwrap();
        let q2 = ContContComp.compose(&reversed, &conclusion, &mut exprs).unwrap();
        assert_eq!(q1, q2);
        assert_eq!(exprs.render(q1), "(quantity_2) - (quantity_1)");
    }

    #[test]
    fn test_cont_cont_comp_takes_no_parameters() {
        let conclusion = LogicalForm::comp(VariableKey::new(1, 1), VariableKey::new(2, 1), ComparisonType::MoreThan);
        let param = Parametrization::Transfer { sender: None, receiver: Some(1), attribute: None, unit: None };
        assert!(ContContComp.assert_valid_parametrization(&conclusion, &param).is_err());
        assert!(ContContComp
            .assert_valid_parametrization(&LogicalForm::container(VariableKey::new(1, 1)), &Parametrization::None)
            .is_err());
    }

    #[test]
    fn test_applies_only_to_comparisons() {
        let a = VariableKey::new(1, 1);
        let b = VariableKey::new(2, 1);
        let tree = ProofTree::new(LogicalForm::comp(a, b, ComparisonType::MoreThan));
        assert!(ContContComp.is_reverse_applicable(tree.root(), &tree));

        let tree = ProofTree::new(LogicalForm::container(a));
        assert!(!ContContComp.is_reverse_applicable(tree.root(), &tree));
    }

    #[test]
    fn test_applicable_only_without_conflicting_container() {
        let a = VariableKey::new(1, 1);
        let b = VariableKey::new(2, 1);
        let mut tree = ProofTree::new(LogicalForm::container(b));
        let conclusion = tree.nodes()[0].form.clone();
        let param = Parametrization::Comparison { comp_type: ComparisonType::MoreThan, subj: a, obj: b };
        let premises = RuleKind::ContCompCont.apply_reverse(&conclusion, &param).unwrap();
        let times = RuleKind::ContCompCont.reverse_variable_times(&premises, &conclusion);
        tree.add_derivation(tree.root(), RuleKind::ContCompCont, param, premises, times).unwrap();

        // b is written by the root and a by the container premise, at the moments the comp states them
        assert!(matches!(tree.form(NodeId(2)), Some(LogicalForm::Comp { .. })));
        assert!(tree.has_container_write_at(NodeId(2), &b));
        assert!(!ContContComp.is_reverse_applicable(NodeId(2), &tree));
    }
}
