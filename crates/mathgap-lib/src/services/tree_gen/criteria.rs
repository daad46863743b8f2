use tracing::warn;

use crate::models::rules::{InferenceRule, RuleKind};
use crate::services::proof_tree::{NodeId, ProofTree};

/// Decides whether a frontier node becomes a base fact instead of being expanded.
pub trait StoppingCriterion: Send + Sync {
    fn should_stop(&self, node: NodeId, tree: &ProofTree) -> bool;
}

/// Every branch is expanded to exactly `required_depth`.
#[derive(Debug, Clone, Copy)]
pub struct BranchDepthCriterion {
    pub required_depth: usize,
}

impl BranchDepthCriterion {
    pub fn new(required_depth: usize) -> Self {
        Self { required_depth }
    }
}

impl StoppingCriterion for BranchDepthCriterion {
    fn should_stop(&self, node: NodeId, tree: &ProofTree) -> bool {
        let depth = tree.node(node).map(|n| n.depth).unwrap_or(0);
        if depth > self.required_depth {
            warn!(node = %node, depth, required = self.required_depth, "branch already deeper than required");
        }
        depth >= self.required_depth
    }
}

/// Stops everywhere once any branch reaches `required_depth`.
#[derive(Debug, Clone, Copy)]
pub struct TreeDepthCriterion {
    pub required_depth: usize,
}

impl TreeDepthCriterion {
    pub fn new(required_depth: usize) -> Self {
        Self { required_depth }
    }
}

impl StoppingCriterion for TreeDepthCriterion {
    fn should_stop(&self, _node: NodeId, tree: &ProofTree) -> bool {
        let depth = tree.depth();
        if depth > self.required_depth {
            warn!(depth, required = self.required_depth, "tree already deeper than required");
        }
        depth >= self.required_depth
    }
}

/// Stops once the tree has `preferred_width` leaves.
///
/// The width can still overshoot: one expansion may add several premises.
#[derive(Debug, Clone, Copy)]
pub struct TreeWidthCriterion {
    pub preferred_width: usize,
}

impl TreeWidthCriterion {
    pub fn new(preferred_width: usize) -> Self {
        Self { preferred_width }
    }
}

impl StoppingCriterion for TreeWidthCriterion {
    fn should_stop(&self, _node: NodeId, tree: &ProofTree) -> bool {
        let width = tree.nodes().iter().filter(|n| n.is_leaf()).count();
        if width > self.preferred_width {
            warn!(
                width,
                excess = width - self.preferred_width,
                "tree already wider than preferred"
            );
        }
        width >= self.preferred_width
    }
}

/// Satisfied when any sub-criterion is
pub struct AnyCriterion {
    criteria: Vec<Box<dyn StoppingCriterion>>,
}

impl AnyCriterion {
    pub fn new(criteria: Vec<Box<dyn StoppingCriterion>>) -> Self {
        Self { criteria }
    }
}

impl StoppingCriterion for AnyCriterion {
    fn should_stop(&self, node: NodeId, tree: &ProofTree) -> bool {
        self.criteria.iter().any(|c| c.should_stop(node, tree))
    }
}

/// Stops at nodes none of `rules` can expand, turning them into base
/// facts rather than unsatisfiable branches.
#[derive(Debug, Clone)]
pub struct ExhaustedCriterion {
    pub rules: Vec<RuleKind>,
}

impl ExhaustedCriterion {
    pub fn new(rules: Vec<RuleKind>) -> Self {
        Self { rules }
    }
}

impl StoppingCriterion for ExhaustedCriterion {
    fn should_stop(&self, node: NodeId, tree: &ProofTree) -> bool {
        !self.rules.iter().any(|r| r.is_reverse_applicable(node, tree))
    }
}
