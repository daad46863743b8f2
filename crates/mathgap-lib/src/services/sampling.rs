use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::error::GenerationError;
use crate::models::logical_form::LogicalForm;

use super::proof_tree::{NodeId, ProofTree, TraversalOrder};
use super::time_dag::TimeDag;

/// Which nodes a rendered problem states and which it asks about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub body: Vec<NodeId>,
    pub questions: Vec<NodeId>,
}

/// A linear order of the requested nodes, questions last
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemOrder {
    pub body: Vec<NodeId>,
    pub questions: Vec<NodeId>,
}

impl OrderRequest {
    pub fn new(body: Vec<NodeId>, questions: Vec<NodeId>) -> Self {
        Self { body, questions }
    }

    /// The usual problem: every base fact is stated and the designated
    /// questions are asked.
    pub fn leaves_and_root(tree: &ProofTree) -> Self {
        let questions = tree.questions().to_vec();
        let body = tree.leaves().into_iter().filter(|id| !questions.contains(id)).collect();
        Self { body, questions }
    }

    fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.body.iter().chain(self.questions.iter()).copied()
    }

    /// Check the request against `tree` and return the time DAG induced on it.
    pub fn validate(&self, tree: &ProofTree) -> Result<TimeDag, GenerationError> {
        if self.questions.is_empty() {
            return Err(GenerationError::invalid_order("at least one question is required"));
        }

        let mut seen = BTreeSet::new();
        for id in self.nodes() {
            if tree.node(id).is_none() {
                return Err(GenerationError::invalid_order(format!("node {} is not in the tree", id)));
            }
            if !seen.insert(id) {
                return Err(GenerationError::invalid_order(format!("node {} is requested twice", id)));
            }
        }

        if let Some(missing) = tree.questions().iter().find(|q| !self.questions.contains(q)) {
            return Err(GenerationError::invalid_order(format!(
                "designated question {} is not asked",
                missing
            )));
        }

        let full = tree.time_dag()?;
        for q in &self.questions {
            if let Some(b) = self.body.iter().find(|b| full.reaches(*q, **b)) {
                return Err(GenerationError::invalid_order(format!(
                    "question {} must be stated before body node {}",
                    q, b
                )));
            }
        }
        let subset: Vec<NodeId> = self.nodes().collect();
        Ok(full.restricted(&subset))
    }
}

impl ProblemOrder {
    pub fn body_forms<'a>(&self, tree: &'a ProofTree) -> Vec<&'a LogicalForm> {
        self.body.iter().filter_map(|id| tree.form(*id)).collect()
    }

    pub fn question_forms<'a>(&self, tree: &'a ProofTree) -> Vec<&'a LogicalForm> {
        self.questions.iter().filter_map(|id| tree.form(*id)).collect()
    }

    /// Body then questions
    pub fn sequence(&self) -> Vec<NodeId> {
        self.body.iter().chain(self.questions.iter()).copied().collect()
    }

    /// Does this order cover a valid request exactly once and respect
    /// every temporal constraint between its nodes?
    pub fn is_valid_for(&self, tree: &ProofTree) -> bool {
        let request = OrderRequest::new(self.body.clone(), self.questions.clone());
        match request.validate(tree) {
            Ok(dag) => dag.respects(&self.sequence()),
            Err(_) => false,
        }
    }
}

/// Produces a linear extension of the time DAG over a requested subset.
pub trait OrderSampler {
    fn sample_order(&self, tree: &ProofTree, request: &OrderRequest) -> Result<ProblemOrder, GenerationError>;
}

/// Kahn's algorithm where `pick` chooses among the ready nodes (sorted by id).
fn linearize(dag: &TimeDag, mut pick: impl FnMut(&[NodeId]) -> usize) -> Vec<NodeId> {
    let mut in_degree: HashMap<NodeId, usize> = dag.nodes().map(|n| (n, dag.predecessors(n).len())).collect();
    let mut ready: Vec<NodeId> = dag.nodes().filter(|n| in_degree[n] == 0).collect();
    let mut order = Vec::with_capacity(in_degree.len());

    while !ready.is_empty() {
        let index = pick(&ready).min(ready.len() - 1);
        let node = ready.remove(index);
        order.push(node);
        for succ in dag.successors(node) {
            if let Some(d) = in_degree.get_mut(&succ) {
                *d -= 1;
                if *d == 0 {
                    let at = ready.binary_search(&succ).unwrap_or_else(|i| i);
                    ready.insert(at, succ);
                }
            }
        }
    }
    order
}

/// Orders body and questions separately; the request was validated so
/// every question may follow every body node.
fn split_order(
    tree: &ProofTree,
    request: &OrderRequest,
    mut pick: impl FnMut(&[NodeId]) -> usize,
) -> Result<ProblemOrder, GenerationError> {
    let dag = request.validate(tree)?;
    let body = linearize(&dag.restricted(&request.body), &mut pick);
    let questions = linearize(&dag.restricted(&request.questions), &mut pick);
    Ok(ProblemOrder { body, questions })
}

/// Stable baseline: premises before conclusions, left to right.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalOrderSampler;

impl OrderSampler for CanonicalOrderSampler {
    fn sample_order(&self, tree: &ProofTree, request: &OrderRequest) -> Result<ProblemOrder, GenerationError> {
        let position: HashMap<NodeId, usize> = tree
            .traverse(TraversalOrder::Post)
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect();
        split_order(tree, request, |ready| {
            ready
                .iter()
                .enumerate()
                .min_by_key(|(_, id)| position.get(id).copied().unwrap_or(usize::MAX))
                .map(|(i, _)| i)
                .unwrap_or(0)
        })
    }
}

/// Random linear extension: each step picks uniformly among the nodes
/// whose predecessors are all placed.
#[derive(Debug, Clone, Copy)]
pub struct VariableTimeBasedSampler {
    pub seed: u64,
}

impl VariableTimeBasedSampler {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl OrderSampler for VariableTimeBasedSampler {
    fn sample_order(&self, tree: &ProofTree, request: &OrderRequest) -> Result<ProblemOrder, GenerationError> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let order = split_order(tree, request, |ready| rng.gen_range(0..ready.len()))?;
        debug!(seed = self.seed, body = order.body.len(), "sampled problem order");
        Ok(order)
    }
}

/// Canonical order with the body node at `move_idx` moved to the front.
#[derive(Debug, Clone, Copy)]
pub struct FrontMovementOrderSampler {
    pub move_idx: usize,
}

impl FrontMovementOrderSampler {
    pub fn new(move_idx: usize) -> Self {
        Self { move_idx }
    }
}

impl OrderSampler for FrontMovementOrderSampler {
    fn sample_order(&self, tree: &ProofTree, request: &OrderRequest) -> Result<ProblemOrder, GenerationError> {
        let mut order = CanonicalOrderSampler.sample_order(tree, request)?;
        if self.move_idx >= order.body.len() {
            return Err(GenerationError::invalid_order(format!(
                "cannot move body node {} of {}",
                self.move_idx,
                order.body.len()
            )));
        }

        let moved = order.body.remove(self.move_idx);
        order.body.insert(0, moved);
        let dag = tree.time_dag()?.restricted(&order.body);
        if !dag.predecessors(moved).is_empty() {
            return Err(GenerationError::invalid_order(format!(
                "node {} cannot be stated first, it must follow {:?}",
                moved,
                dag.predecessors(moved)
            )));
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::logical_form::VariableKey;
    use crate::models::properties::PropertyKey;
    use crate::models::rules::{InferenceRule, Parametrization, RuleKind};

    /// Container root reached by a transfer: the pre-transfer container
    /// must be stated before the transfer.
    fn transfer_tree() -> ProofTree {
        let holder = VariableKey::new(1, 1);
        let mut tree = ProofTree::new(crate::models::logical_form::LogicalForm::container(holder));
        tree.properties_mut().register(PropertyKey::agent(2));
        let param = Parametrization::Transfer { sender: Some(2), receiver: Some(1), attribute: None, unit: None };
        let conclusion = tree.nodes()[0].form.clone();
        let premises = RuleKind::ContTransferCont.apply_reverse(&conclusion, &param).unwrap();
        let times = RuleKind::ContTransferCont.reverse_variable_times(&premises, &conclusion);
        tree.add_derivation(NodeId(0), RuleKind::ContTransferCont, param, premises, times).unwrap();
        tree.compute_symbolically().unwrap();
        tree
    }

    #[test]
    fn test_leaves_and_root_request() {
        let tree = transfer_tree();
        let request = OrderRequest::leaves_and_root(&tree);
        assert_eq!(request.body, vec![NodeId(1), NodeId(2)]);
        assert_eq!(request.questions, vec![NodeId(0)]);
    }

    #[test]
    fn test_canonical_order() {
        let tree = transfer_tree();
        let order = CanonicalOrderSampler.sample_order(&tree, &OrderRequest::leaves_and_root(&tree)).unwrap();
        assert_eq!(order.body, vec![NodeId(1), NodeId(2)]);
        assert_eq!(order.questions, vec![NodeId(0)]);
        assert!(order.is_valid_for(&tree));
        assert_eq!(order.body_forms(&tree).len(), 2);
        assert_eq!(order.question_forms(&tree)[0], &tree.nodes()[0].form);
    }

    #[test]
    fn test_random_order_respects_transfer() {
        let tree = transfer_tree();
        let request = OrderRequest::leaves_and_root(&tree);
        for seed in 0..20 {
            let order = VariableTimeBasedSampler::new(seed).sample_order(&tree, &request).unwrap();
            assert_eq!(order.body, vec![NodeId(1), NodeId(2)]);
        }
    }

    #[test]
    fn test_front_movement() {
        let tree = transfer_tree();
        let request = OrderRequest::leaves_and_root(&tree);
        let order = FrontMovementOrderSampler::new(0).sample_order(&tree, &request).unwrap();
        assert_eq!(order.body[0], NodeId(1));

        // the transfer cannot precede the state it changes
        let err = FrontMovementOrderSampler::new(1).sample_order(&tree, &request).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidOrderRequest { .. }));
        assert!(FrontMovementOrderSampler::new(5).sample_order(&tree, &request).is_err());
    }

    #[test]
    fn test_missing_question_is_rejected() {
        let tree = transfer_tree();
        let request = OrderRequest::new(vec![NodeId(1)], vec![NodeId(2)]);
        let err = CanonicalOrderSampler.sample_order(&tree, &request).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidOrderRequest { .. }));
    }

    #[test]
    fn test_inconsistent_requests() {
        let tree = transfer_tree();
        let duplicate = OrderRequest::new(vec![NodeId(1), NodeId(1)], vec![NodeId(0)]);
        assert!(duplicate.validate(&tree).is_err());

        let unknown = OrderRequest::new(vec![NodeId(9)], vec![NodeId(0)]);
        assert!(unknown.validate(&tree).is_err());

        let overlapping = OrderRequest::new(vec![NodeId(0)], vec![NodeId(0)]);
        assert!(overlapping.validate(&tree).is_err());

        let no_questions = OrderRequest::new(vec![NodeId(1)], vec![]);
        assert!(no_questions.validate(&tree).is_err());
    }

    #[test]
    fn test_question_before_body_is_rejected() {
        let mut tree = transfer_tree();
        tree.designate_questions(vec![NodeId(1)]).unwrap();
        // node 1 is earlier than the transfer, asking it after would be wrong
        let request = OrderRequest::new(vec![NodeId(2)], vec![NodeId(1)]);
        let err = request.validate(&tree).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidOrderRequest { .. }));
    }

    #[test]
    fn test_tampered_order_is_invalid() {
        let tree = transfer_tree();
        let order = ProblemOrder { body: vec![NodeId(2), NodeId(1)], questions: vec![NodeId(0)] };
        assert!(!order.is_valid_for(&tree));
    }
}
