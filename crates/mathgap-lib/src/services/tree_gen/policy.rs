use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;

use crate::error::GenerationError;
use crate::models::logical_form::FormType;
use crate::models::rules::RuleKind;
use crate::services::proof_tree::{NodeId, ProofTree};

/// Picks which applicable rule expands a node.
pub trait RuleSamplingPolicy: Send + Sync {
    /// Relative weight of each rule in `applicable`, same order.
    fn weights(&self, applicable: &[RuleKind], node: NodeId, tree: &ProofTree) -> Vec<f64>;

    fn choose(
        &self,
        applicable: &[RuleKind],
        node: NodeId,
        tree: &ProofTree,
        rng: &mut StdRng,
    ) -> Result<RuleKind, GenerationError> {
        if applicable.is_empty() {
            return Err(GenerationError::violation("no applicable rule to choose from"));
        }
        let weights = self.weights(applicable, node, tree);
        let index = WeightedIndex::new(&weights).map_err(|e| {
            GenerationError::violation(format!("invalid rule weights {:?}: {}", weights, e))
        })?;
        Ok(applicable[index.sample(rng)])
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UniformPolicy;

impl RuleSamplingPolicy for UniformPolicy {
    fn weights(&self, applicable: &[RuleKind], _node: NodeId, _tree: &ProofTree) -> Vec<f64> {
        vec![1.0; applicable.len()]
    }
}

/// Builds a chain of comp-eqs down to `required_depth - 1`, then closes
/// each container branch with a plain comparison.
#[derive(Debug, Clone, Copy)]
pub struct NonlinearPolicy {
    pub required_depth: usize,
}

impl NonlinearPolicy {
    pub fn new(required_depth: usize) -> Self {
        Self { required_depth }
    }
}

impl RuleSamplingPolicy for NonlinearPolicy {
    fn weights(&self, applicable: &[RuleKind], node: NodeId, tree: &ProofTree) -> Vec<f64> {
        let uniform = vec![1.0; applicable.len()];
        let Some(current) = tree.node(node) else {
            return uniform;
        };
        if current.form.form_type() != FormType::Container {
            return uniform;
        }

        let preferred = if current.depth + 1 < self.required_depth {
            RuleKind::ContCompCompeqCont
        } else {
            RuleKind::ContCompCont
        };
        if !applicable.contains(&preferred) {
            return uniform;
        }
        applicable
            .iter()
            .map(|r| if *r == preferred { 1.0 } else { 0.0 })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::logical_form::{ComparisonType, LogicalForm, VariableKey};
    use rand::SeedableRng;

    #[test]
    fn test_uniform_policy_picks_applicable_rules() {
        let tree = ProofTree::new(LogicalForm::container(VariableKey::new(1, 1)));
        let applicable = [RuleKind::ContCompCont, RuleKind::ContTransferCont];
        let mut seen = std::collections::HashSet::new();
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            seen.insert(UniformPolicy.choose(&applicable, tree.root(), &tree, &mut rng).unwrap());
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_empty_choice_is_an_error() {
        let tree = ProofTree::new(LogicalForm::container(VariableKey::new(1, 1)));
        let mut rng = StdRng::seed_from_u64(0);
        assert!(UniformPolicy.choose(&[], tree.root(), &tree, &mut rng).is_err());
    }

    #[test]
    fn test_nonlinear_prefers_compeq_above_last_level() {
        let tree = ProofTree::new(LogicalForm::container(VariableKey::new(1, 1)));
        let applicable = [RuleKind::ContCompCont, RuleKind::ContCompCompeqCont];
        let mut rng = StdRng::seed_from_u64(3);

        let deep = NonlinearPolicy::new(3);
        assert_eq!(deep.choose(&applicable, tree.root(), &tree, &mut rng).unwrap(), RuleKind::ContCompCompeqCont);

        let shallow = NonlinearPolicy::new(1);
        assert_eq!(shallow.choose(&applicable, tree.root(), &tree, &mut rng).unwrap(), RuleKind::ContCompCont);
    }

    #[test]
    fn test_nonlinear_falls_back_to_uniform() {
        let tree = ProofTree::new(LogicalForm::comp(
            VariableKey::new(1, 1),
            VariableKey::new(2, 1),
            ComparisonType::MoreThan,
        ));
        let weights = NonlinearPolicy::new(3).weights(&[RuleKind::ContContComp], tree.root(), &tree);
        assert_eq!(weights, vec![1.0]);

        let container = ProofTree::new(LogicalForm::container(VariableKey::new(1, 1)));
        let weights = NonlinearPolicy::new(3).weights(&[RuleKind::ContTransferCont], container.root(), &container);
        assert_eq!(weights, vec![1.0]);
    }
}
