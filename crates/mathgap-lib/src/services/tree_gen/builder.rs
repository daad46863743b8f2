use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::VecDeque;
use tracing::debug;

use crate::error::GenerationError;
use crate::models::properties::PropertyTracker;
use crate::models::rules::{InferenceRule, RuleKind};
use crate::services::proof_tree::ProofTree;

use super::context::TreeGenConfig;
use super::criteria::{AnyCriterion, BranchDepthCriterion, ExhaustedCriterion, StoppingCriterion};
use super::params::{GeneralParametrizationSampler, ParametrizationSampler};
use super::policy::{RuleSamplingPolicy, UniformPolicy};

/// Anything that turns a seed into a computed proof tree
pub trait Generator: Send + Sync {
    fn generate(&self, seed: u64) -> Result<ProofTree, GenerationError>;
}

/// Builds proof trees by reverse chaining from a sampled root.
///
/// Frontier nodes are expanded breadth first. Each one either stops (and
/// becomes a base fact) or is expanded by a rule the policy picks among
/// the applicable ones. The same seed and configuration always give the
/// same tree.
pub struct GeneralGenerator {
    config: TreeGenConfig,
    policy: Box<dyn RuleSamplingPolicy>,
    criterion: Box<dyn StoppingCriterion>,
    sampler: Box<dyn ParametrizationSampler>,
}

impl GeneralGenerator {
    pub fn new(
        config: TreeGenConfig,
        policy: Box<dyn RuleSamplingPolicy>,
        criterion: Box<dyn StoppingCriterion>,
    ) -> Result<Self, GenerationError> {
        config.validate()?;
        let sampler = Box::new(GeneralParametrizationSampler::new(config.clone()));
        Ok(Self { config, policy, criterion, sampler })
    }

    /// Uniform rule choice, every branch expanded to `depth` unless no
    /// configured rule applies earlier.
    pub fn with_depth(config: TreeGenConfig, depth: usize) -> Result<Self, GenerationError> {
        let criterion = AnyCriterion::new(vec![
            Box::new(BranchDepthCriterion::new(depth)),
            Box::new(ExhaustedCriterion::new(config.rules.clone())),
        ]);
        Self::new(config, Box::new(UniformPolicy), Box::new(criterion))
    }

    pub fn with_sampler(mut self, sampler: Box<dyn ParametrizationSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn config(&self) -> &TreeGenConfig {
        &self.config
    }

    fn expand_all(&self, tree: &mut ProofTree, rng: &mut StdRng) -> Result<(), GenerationError> {
        let mut frontier = VecDeque::from([tree.root()]);

        while let Some(node) = frontier.pop_front() {
            if self.criterion.should_stop(node, tree) {
                debug!(node = %node, "stopping, node becomes a base fact");
                continue;
            }

            let applicable: Vec<RuleKind> = self
                .config
                .rules
                .iter()
                .copied()
                .filter(|r| r.is_reverse_applicable(node, tree))
                .collect();
            if applicable.is_empty() {
                let form = tree.form(node).map(|f| f.to_string()).unwrap_or_default();
                return Err(GenerationError::UnsatisfiableBranch { node, form });
            }

            let rule = self.policy.choose(&applicable, node, tree, rng)?;
            let parametrization = self
                .sampler
                .sample(rule, node, tree, rng)
                .map_err(|e| e.at(node, rule.name(), None))?;
            let described = parametrization.describe();

            let conclusion = tree
                .form(node)
                .cloned()
                .ok_or_else(|| GenerationError::violation(format!("unknown node {}", node)))?;
            let premises = rule
                .apply_reverse(&conclusion, &parametrization)
                .map_err(|e| e.at(node, rule.name(), Some(described.clone())))?;
            let times = rule.reverse_variable_times(&premises, &conclusion);
            let added = tree
                .add_derivation(node, rule, parametrization, premises, times)
                .map_err(|e| e.at(node, rule.name(), Some(described)))?;

            debug!(node = %node, rule = %rule, premises = added.len(), "expanded node");
            frontier.extend(added);
        }

        Ok(())
    }
}

impl Generator for GeneralGenerator {
    fn generate(&self, seed: u64) -> Result<ProofTree, GenerationError> {
        let mut rng = StdRng::seed_from_u64(seed);

        let start = *self
            .config
            .start_types
            .choose(&mut rng)
            .ok_or_else(|| GenerationError::violation("no start type configured"))?;
        let mut tracker = PropertyTracker::new();
        let root = self.sampler.create_start_form(start, &mut tracker, &mut rng)?;
        let mut tree = ProofTree::with_properties(root, tracker);

        self.expand_all(&mut tree, &mut rng)?;
        tree.compute_symbolically()?;
        tree.validate_properties()?;
        // cycles are a bug in the rules, surface them before anyone orders the tree
        tree.time_dag()?;

        debug!(seed, nodes = tree.len(), depth = tree.depth(), "generated tree");
        Ok(tree)
    }
}

/// Picks one of several generators per seed, by weight.
pub struct MultiGenerator {
    generators: Vec<Box<dyn Generator>>,
    weights: Vec<f64>,
}

impl MultiGenerator {
    pub fn new(weighted: Vec<(Box<dyn Generator>, f64)>) -> Result<Self, GenerationError> {
        if weighted.is_empty() {
            return Err(GenerationError::violation("at least one generator is required"));
        }
        let (generators, weights) = weighted.into_iter().unzip();
        let multi = Self { generators, weights };
        WeightedIndex::new(&multi.weights)
            .map_err(|e| GenerationError::violation(format!("invalid generator weights: {}", e)))?;
        Ok(multi)
    }
}

impl Generator for MultiGenerator {
    fn generate(&self, seed: u64) -> Result<ProofTree, GenerationError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let index = WeightedIndex::new(&self.weights)
            .map_err(|e| GenerationError::violation(format!("invalid generator weights: {}", e)))?;
        let choice = index.sample(&mut rng);
        debug!(seed, generator = choice, "multi generator picked");

        let mut tree = self.generators[choice].generate(seed)?;
        if !tree.is_computed() {
            tree.compute_symbolically()?;
        }
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::logical_form::FormType;
    use crate::services::tree_gen::NonlinearPolicy;

    #[test]
    fn test_generate_depth_one() {
        let generator = GeneralGenerator::with_depth(TreeGenConfig::default(), 1).unwrap();
        let tree = generator.generate(14).unwrap();
        assert!(tree.is_computed());
        assert!(tree.len() >= 2);
        assert_eq!(tree.depth(), 1);
        assert!(tree.validate_properties().is_ok());
    }

    #[test]
    fn test_same_seed_same_tree() {
        let generator = GeneralGenerator::with_depth(TreeGenConfig::default(), 3).unwrap();
        let a = generator.generate(42).unwrap();
        let b = generator.generate(42).unwrap();
        assert_eq!(a.nodes(), b.nodes());
        assert_eq!(a.pretty_print(), b.pretty_print());
    }

    #[test]
    fn test_generator_shared_across_threads() {
        let generator = GeneralGenerator::with_depth(TreeGenConfig::default(), 2).unwrap();
        let expected = generator.generate(7).unwrap();
        let trees: Vec<ProofTree> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4).map(|_| s.spawn(|| generator.generate(7).unwrap())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for tree in trees {
            assert_eq!(tree.nodes(), expected.nodes());
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = TreeGenConfig { use_attribute: true, use_unit: true, ..Default::default() };
        assert!(GeneralGenerator::with_depth(config, 2).is_err());
    }

    #[test]
    fn test_unsatisfiable_branch() {
        // only comparisons can be reversed, but the root is a container
        let config = TreeGenConfig { rules: vec![RuleKind::ContContComp], ..Default::default() };
        let generator =
            GeneralGenerator::new(config, Box::new(UniformPolicy), Box::new(BranchDepthCriterion::new(2))).unwrap();
        match generator.generate(0) {
            Err(GenerationError::UnsatisfiableBranch { node, .. }) => assert_eq!(node.0, 0),
            other => panic!("expected an unsatisfiable branch, got {:?}", other.map(|t| t.len())),
        }
    }

    #[test]
    fn test_nonlinear_policy_builds_compeq_chain() {
        let config = TreeGenConfig {
            rules: vec![RuleKind::ContCompCont, RuleKind::ContCompCompeqCont],
            ..Default::default()
        };
        let criterion = AnyCriterion::new(vec![
            Box::new(BranchDepthCriterion::new(3)),
            Box::new(ExhaustedCriterion::new(config.rules.clone())),
        ]);
        let generator =
            GeneralGenerator::new(config, Box::new(NonlinearPolicy::new(3)), Box::new(criterion)).unwrap();
        let tree = generator.generate(9).unwrap();

        let root = &tree.nodes()[0];
        assert_eq!(root.rule(), Some(RuleKind::ContCompCompeqCont));
        assert_eq!(tree.depth(), 3);
    }

    #[test]
    fn test_multi_generator() {
        let container = TreeGenConfig { start_types: vec![FormType::Container], ..Default::default() };
        let part_whole = TreeGenConfig { start_types: vec![FormType::PartWhole], ..Default::default() };
        let multi = MultiGenerator::new(vec![
            (Box::new(GeneralGenerator::with_depth(container, 2).unwrap()) as Box<dyn Generator>, 1.0),
            (Box::new(GeneralGenerator::with_depth(part_whole, 2).unwrap()), 1.0),
        ])
        .unwrap();

        let mut roots = std::collections::HashSet::new();
        for seed in 0..20 {
            let tree = multi.generate(seed).unwrap();
            assert!(tree.is_computed());
            roots.insert(tree.nodes()[0].form.form_type());
        }
        assert_eq!(roots.len(), 2);

        assert!(MultiGenerator::new(vec![]).is_err());
    }
}
