use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;
use tracing::debug;

use crate::error::GenerationError;
use crate::models::expression::{ExprArena, ExprId};
use crate::models::logical_form::{FormType, LogicalForm, VariableKey};
use crate::models::properties::{PropertyTracker, PropertyType};
use crate::models::rules::{InferenceRule, Parametrization, RuleKind};
use crate::models::timing::{SlotTarget, TimeRef, TimeSlot, VariableTime};

use super::time_dag::TimeDag;

/// Stable index of a node in its tree. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a non-leaf node was justified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Derivation {
    pub rule: RuleKind,
    pub parametrization: Parametrization,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: NodeId,
    pub form: LogicalForm,
    /// Empty for leaves (base facts)
    pub premises: Vec<NodeId>,
    pub derivation: Option<Derivation>,
    pub depth: usize,
    pub parent: Option<NodeId>,
    /// Moments at which this node states something, per variable key
    pub times: Vec<TimeSlot<TimeRef>>,
}

impl TreeNode {
    pub fn is_leaf(&self) -> bool {
        self.derivation.is_none()
    }

    pub fn rule(&self) -> Option<RuleKind> {
        self.derivation.as_ref().map(|d| d.rule)
    }

    /// Index of the first slot about `key`
    pub fn slot_index(&self, key: &VariableKey) -> Option<usize> {
        self.times.iter().position(|slot| slot.key == *key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalOrder {
    /// Conclusion first, then its premises left to right
    Dfs,
    /// Every premise before the conclusion it justifies
    Post,
}

/// A slot after following every `SameAs` link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimePoint {
    Fixed(VariableKey, i64),
    Slot(NodeId, usize),
}

/// Proof tree stored as an id-indexed node arena.
///
/// The tree owns every node, the property ids handed out while it was
/// built and the expressions of its quantities. Once computed it is never
/// mutated again; its time DAG is built on first request and cached.
#[derive(Debug, Clone, Serialize)]
pub struct ProofTree {
    nodes: Vec<TreeNode>,
    root: NodeId,
    properties: PropertyTracker,
    exprs: ExprArena,
    questions: Vec<NodeId>,
    computed: bool,
    #[serde(skip)]
    time_dag: OnceLock<TimeDag>,
}

impl ProofTree {
    pub fn new(root: LogicalForm) -> Self {
        let mut properties = PropertyTracker::new();
        for key in root.property_keys() {
            properties.register(key);
        }
        Self::with_properties(root, properties)
    }

    /// Tree rooted at `root`, whose property ids come from `properties`.
    /// The root's slots are all at time 0.
    pub fn with_properties(root: LogicalForm, properties: PropertyTracker) -> Self {
        let times = root
            .variable_keys()
            .into_iter()
            .map(|key| TimeSlot::new(key, VariableTime::Fixed(0)))
            .collect();
        let root_node = TreeNode {
            id: NodeId(0),
            form: root,
            premises: Vec::new(),
            derivation: None,
            depth: 0,
            parent: None,
            times,
        };

        Self {
            nodes: vec![root_node],
            root: NodeId(0),
            properties,
            exprs: ExprArena::new(),
            questions: vec![NodeId(0)],
            computed: false,
            time_dag: OnceLock::new(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id.0)
    }

    pub fn form(&self, id: NodeId) -> Option<&LogicalForm> {
        self.node(id).map(|n| &n.form)
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn properties(&self) -> &PropertyTracker {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut PropertyTracker {
        &mut self.properties
    }

    pub fn exprs(&self) -> &ExprArena {
        &self.exprs
    }

    pub fn questions(&self) -> &[NodeId] {
        &self.questions
    }

    pub fn is_computed(&self) -> bool {
        self.computed
    }

    /// Maximum node depth, the root being at depth 0
    pub fn depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    pub fn leaves(&self) -> Vec<NodeId> {
        self.traverse(TraversalOrder::Dfs)
            .into_iter()
            .filter(|id| self.nodes[id.0].is_leaf())
            .collect()
    }

    /// Symbolic quantity of a node, once computed.
    pub fn quantity(&self, id: NodeId) -> Option<ExprId> {
        self.form(id).and_then(|f| f.quantity())
    }

    pub fn render_quantity(&self, id: NodeId) -> Option<String> {
        self.quantity(id).map(|q| self.exprs.render(q))
    }

    pub fn premise_forms(&self, id: NodeId) -> Vec<&LogicalForm> {
        self.node(id)
            .map(|n| n.premises.iter().map(|p| &self.nodes[p.0].form).collect())
            .unwrap_or_default()
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Expand a leaf with the premises of one rule application.
    ///
    /// `times` holds one annotation list per premise; rule-relative targets
    /// are resolved to node references here. Returns the new premise ids.
    pub fn add_derivation(
        &mut self,
        conclusion: NodeId,
        rule: RuleKind,
        parametrization: Parametrization,
        premises: Vec<LogicalForm>,
        times: Vec<Vec<TimeSlot<SlotTarget>>>,
    ) -> Result<Vec<NodeId>, GenerationError> {
        if self.computed {
            return Err(GenerationError::violation("cannot expand a computed tree"));
        }
        let parent = self
            .node(conclusion)
            .ok_or_else(|| GenerationError::violation(format!("unknown node {}", conclusion)))?;
        if !parent.is_leaf() {
            return Err(GenerationError::violation(format!("node {} is already expanded", conclusion)));
        }
        if premises.is_empty() {
            return Err(GenerationError::violation("a derivation needs at least one premise"));
        }
        if times.len() != premises.len() {
            return Err(GenerationError::violation(format!(
                "{} premises but {} time annotation lists",
                premises.len(),
                times.len()
            )));
        }

        let base = self.nodes.len();
        let depth = parent.depth + 1;
        let resolve = |target: SlotTarget| -> Result<TimeRef, GenerationError> {
            let (node, key, known) = match target {
                SlotTarget::Conclusion(key) => (conclusion, key, parent.slot_index(&key).is_some()),
                SlotTarget::Premise(j, key) => {
                    let known = times.get(j).map(|slots| slots.iter().any(|s| s.key == key)).unwrap_or(false);
                    (NodeId(base + j), key, known)
                }
            };
            if !known {
                return Err(GenerationError::violation(format!(
                    "time annotation refers to {} which node {} does not state",
                    key, node
                )));
            }
            Ok(TimeRef::new(node, key))
        };

        let mut new_nodes = Vec::with_capacity(premises.len());
        for (i, (form, slots)) in premises.into_iter().zip(times.iter()).enumerate() {
            let resolved = slots
                .iter()
                .map(|slot| {
                    let time = match slot.time {
                        VariableTime::SameAs(t) => VariableTime::SameAs(resolve(t)?),
                        VariableTime::Before(t) => VariableTime::Before(resolve(t)?),
                        VariableTime::Fixed(t) => VariableTime::Fixed(t),
                        VariableTime::Unconstrained => VariableTime::Unconstrained,
                    };
                    Ok(TimeSlot::new(slot.key, time))
                })
                .collect::<Result<Vec<_>, GenerationError>>()?;

            new_nodes.push(TreeNode {
                id: NodeId(base + i),
                form,
                premises: Vec::new(),
                derivation: None,
                depth,
                parent: Some(conclusion),
                times: resolved,
            });
        }

        let ids: Vec<NodeId> = new_nodes.iter().map(|n| n.id).collect();
        self.nodes.extend(new_nodes);
        let parent = &mut self.nodes[conclusion.0];
        parent.premises = ids.clone();
        parent.derivation = Some(Derivation { rule, parametrization });
        self.time_dag = OnceLock::new();

        if let Err(e) = self.validate_container_writes() {
            self.nodes.truncate(base);
            let parent = &mut self.nodes[conclusion.0];
            parent.premises.clear();
            parent.derivation = None;
            return Err(e);
        }

        Ok(ids)
    }

    /// Designate the nodes a rendered problem asks about. Defaults to the root.
    pub fn designate_questions(&mut self, questions: Vec<NodeId>) -> Result<(), GenerationError> {
        if questions.is_empty() {
            return Err(GenerationError::violation("at least one question is required"));
        }
        if let Some(unknown) = questions.iter().find(|id| self.node(**id).is_none()) {
            return Err(GenerationError::violation(format!("unknown question node {}", unknown)));
        }
        self.questions = questions;
        Ok(())
    }

    // ========================================================================
    // Symbolic computation
    // ========================================================================

    /// Fill every quantity bottom-up: leaves get fresh placeholders and
    /// every other node is composed by its rule from its premises.
    pub fn compute_symbolically(&mut self) -> Result<(), GenerationError> {
        if self.computed {
            return Ok(());
        }

        for id in self.traverse(TraversalOrder::Post) {
            let node = &self.nodes[id.0];
            match node.derivation.clone() {
                None => {
                    if !node.form.has_quantity() {
                        continue;
                    }
                    let key = self.properties.request_key(PropertyType::Quantity);
                    let leaf = self.exprs.placeholder(key);
                    self.nodes[id.0].form.set_quantity(leaf)?;
                }
                Some(Derivation { rule, parametrization }) => {
                    let premises: Vec<LogicalForm> =
                        node.premises.iter().map(|p| self.nodes[p.0].form.clone()).collect();
                    let refs: Vec<&LogicalForm> = premises.iter().collect();
                    let mut form = node.form.clone();
                    rule.infer_knowledge(&refs, &mut form, &mut self.exprs)
                        .map_err(|e| e.at(id, rule.name(), Some(parametrization.describe())))?;
                    self.nodes[id.0].form = form;
                }
            }
        }

        self.computed = self.quantity(self.root).is_some();
        debug!(nodes = self.nodes.len(), computed = self.computed, "symbolic computation finished");
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn traverse(&self, order: TraversalOrder) -> Vec<NodeId> {
        let mut result = Vec::with_capacity(self.nodes.len());
        match order {
            TraversalOrder::Dfs => {
                let mut stack = vec![self.root];
                while let Some(id) = stack.pop() {
                    result.push(id);
                    stack.extend(self.nodes[id.0].premises.iter().rev());
                }
            }
            TraversalOrder::Post => {
                let mut stack = vec![(self.root, false)];
                while let Some((id, expanded)) = stack.pop() {
                    if expanded {
                        result.push(id);
                        continue;
                    }
                    stack.push((id, true));
                    stack.extend(self.nodes[id.0].premises.iter().rev().map(|p| (*p, false)));
                }
            }
        }
        result
    }

    /// Resolve a relative path such as `conclusion.conclusion` from `start`.
    pub fn ancestor_query(&self, start: NodeId, query: &str) -> Result<NodeId, GenerationError> {
        let mut current = start;
        if self.node(current).is_none() {
            return Err(GenerationError::violation(format!("unknown node {}", start)));
        }
        for step in query.split('.').filter(|s| !s.is_empty()) {
            current = match step {
                "self" => current,
                "conclusion" => self.parent(current).ok_or_else(|| {
                    GenerationError::violation(format!("node {} has no conclusion", current))
                })?,
                other => {
                    return Err(GenerationError::violation(format!(
                        "unsupported tree query step {:?}",
                        other
                    )))
                }
            };
        }
        Ok(current)
    }

    /// Follow `SameAs` links from a slot to the point it denotes.
    pub fn canonical_point(&self, node: NodeId, slot: usize) -> Option<TimePoint> {
        let limit: usize = self.nodes.iter().map(|n| n.times.len()).sum();
        let (mut node, mut slot) = (node, slot);

        for _ in 0..=limit {
            let current = self.node(node)?.times.get(slot)?;
            match current.time {
                VariableTime::SameAs(target) => {
                    let target_node = self.node(target.node)?;
                    slot = target_node.slot_index(&target.key)?;
                    node = target.node;
                }
                VariableTime::Fixed(t) => return Some(TimePoint::Fixed(current.key, t)),
                VariableTime::Before(_) | VariableTime::Unconstrained => {
                    return Some(TimePoint::Slot(node, slot))
                }
            }
        }
        None
    }

    /// Does a container other than `node` state `key` at a moment `node` states it?
    pub fn has_container_write_at(&self, node: NodeId, key: &VariableKey) -> bool {
        let Some(this) = self.node(node) else {
            return false;
        };
        let points: Vec<TimePoint> = this
            .times
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.key == *key)
            .filter_map(|(i, _)| self.canonical_point(node, i))
            .collect();

        self.nodes
            .iter()
            .filter(|other| other.id != node && other.form.form_type() == FormType::Container)
            .any(|other| {
                other.times.iter().enumerate().any(|(i, slot)| {
                    slot.key == *key
                        && self
                            .canonical_point(other.id, i)
                            .map(|p| points.contains(&p))
                            .unwrap_or(false)
                })
            })
    }

    /// A variable holds one amount per moment: no two containers may state
    /// the same holder at the same point.
    pub fn validate_container_writes(&self) -> Result<(), GenerationError> {
        let mut writers: HashMap<(VariableKey, TimePoint), NodeId> = HashMap::new();
        for node in &self.nodes {
            let LogicalForm::Container { holder, .. } = &node.form else {
                continue;
            };
            let Some(point) = node.slot_index(holder).and_then(|i| self.canonical_point(node.id, i)) else {
                continue;
            };
            if let Some(first) = writers.insert((*holder, point), node.id) {
                return Err(GenerationError::violation(format!(
                    "containers {} and {} both state {} at the same moment",
                    first, node.id, holder
                )));
            }
        }
        Ok(())
    }

    /// Every property referenced by a node, and every leaf placeholder,
    /// must have been handed out by this tree's tracker.
    pub fn validate_properties(&self) -> Result<(), GenerationError> {
        for node in &self.nodes {
            let mut keys = node.form.property_keys();
            if node.is_leaf() {
                if let Some(q) = node.form.quantity() {
                    keys.extend(self.exprs.placeholders(q));
                }
            }
            if let Some(missing) = keys.iter().find(|k| !self.properties.is_registered(k)) {
                return Err(GenerationError::ConstraintViolation {
                    node: Some(node.id),
                    rule: None,
                    parametrization: None,
                    reason: format!("property {} is not registered", missing),
                });
            }
        }
        Ok(())
    }

    /// Partial temporal order of the nodes, built once and cached.
    pub fn time_dag(&self) -> Result<&TimeDag, GenerationError> {
        if let Some(dag) = self.time_dag.get() {
            return Ok(dag);
        }
        let structural: Vec<(NodeId, NodeId)> = self
            .nodes
            .iter()
            .flat_map(|n| n.premises.iter().map(move |p| (*p, n.id)))
            .collect();
        let slots: Vec<Vec<TimeSlot<TimeRef>>> = self.nodes.iter().map(|n| n.times.clone()).collect();
        let dag = TimeDag::build(&slots, &structural)?;
        Ok(self.time_dag.get_or_init(|| dag))
    }

    /// How often each rule was applied
    pub fn rule_counts(&self) -> HashMap<RuleKind, usize> {
        let mut counts = HashMap::new();
        for rule in self.nodes.iter().filter_map(|n| n.rule()) {
            *counts.entry(rule).or_insert(0) += 1;
        }
        counts
    }

    /// Pretty print the tree for debugging, premises above their conclusion
    pub fn pretty_print(&self) -> String {
        let mut lines = Vec::new();
        self.pretty_print_inner(self.root, 0, &mut lines);
        lines.join("\n")
    }

    fn pretty_print_inner(&self, id: NodeId, indent: usize, lines: &mut Vec<String>) {
        let node = &self.nodes[id.0];
        for premise in &node.premises {
            self.pretty_print_inner(*premise, indent + 1, lines);
        }
        let label = node.rule().map(|r| r.name()).unwrap_or("Axiom");
        let quantity = self
            .render_quantity(id)
            .map(|q| format!(" = {}", q))
            .unwrap_or_default();
        lines.push(format!("{}[{}] {}: {}{}", "  ".repeat(indent), id, label, node.form, quantity));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::logical_form::ComparisonType;
    use crate::models::properties::PropertyKey;

    fn comp_tree() -> (ProofTree, VariableKey, VariableKey) {
        let a = VariableKey::new(1, 1);
        let b = VariableKey::new(2, 1);
        let mut tree = ProofTree::new(LogicalForm::container(b));
        tree.properties_mut().register(PropertyKey::agent(a.agent));
        let param = Parametrization::Comparison { comp_type: ComparisonType::MoreThan, subj: a, obj: b };
        let root = tree.root();
        let premises = RuleKind::ContCompCont.apply_reverse(&tree.nodes[0].form, &param).unwrap();
        let times = RuleKind::ContCompCont.reverse_variable_times(&premises, &tree.nodes[0].form);
        tree.add_derivation(root, RuleKind::ContCompCont, param, premises, times).unwrap();
        (tree, a, b)
    }

    #[test]
    fn test_new_tree_has_fixed_root() {
        let tree = ProofTree::new(LogicalForm::container(VariableKey::new(1, 1)));
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.questions(), &[NodeId(0)]);
        assert_eq!(tree.nodes()[0].times[0].time, VariableTime::Fixed(0));
        assert!(tree.validate_properties().is_ok());
    }

    #[test]
    fn test_add_derivation_and_compute() {
        let (mut tree, _, _) = comp_tree();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.leaves(), vec![NodeId(1), NodeId(2)]);
        assert_eq!(tree.traverse(TraversalOrder::Post), vec![NodeId(1), NodeId(2), NodeId(0)]);
        assert_eq!(tree.depth(), 1);

        tree.compute_symbolically().unwrap();
        assert!(tree.is_computed());
        assert_eq!(
            tree.render_quantity(tree.root()).unwrap(),
            "(quantity_1) - (quantity_2)"
        );
        assert!(tree.properties().is_registered(&PropertyKey::quantity(2)));
        assert!(tree.validate_properties().is_ok());
    }

    #[test]
    fn test_cannot_expand_twice() {
        let (mut tree, a, _) = comp_tree();
        let err = tree
            .add_derivation(
                NodeId(0),
                RuleKind::ContCompCont,
                Parametrization::None,
                vec![LogicalForm::container(a)],
                vec![vec![]],
            )
            .unwrap_err();
        assert!(matches!(err, GenerationError::ConstraintViolation { .. }));
    }

    #[test]
    fn test_second_container_write_rolled_back() {
        let a = VariableKey::new(1, 1);
        let mut tree = ProofTree::new(LogicalForm::container(a));
        let err = tree
            .add_derivation(
                NodeId(0),
                RuleKind::ContTransferCont,
                Parametrization::None,
                vec![LogicalForm::container(a)],
                vec![vec![TimeSlot::new(a, VariableTime::SameAs(SlotTarget::Conclusion(a)))]],
            )
            .unwrap_err();
        assert!(matches!(err, GenerationError::ConstraintViolation { .. }));
        assert_eq!(tree.len(), 1);
        assert!(tree.nodes()[0].is_leaf());
        assert!(tree.nodes()[0].premises.is_empty());

        // an earlier moment of the same holder is a different write
        tree.add_derivation(
            NodeId(0),
            RuleKind::ContTransferCont,
            Parametrization::None,
            vec![LogicalForm::container(a)],
            vec![vec![TimeSlot::new(a, VariableTime::Before(SlotTarget::Conclusion(a)))]],
        )
        .unwrap();
        assert!(tree.validate_container_writes().is_ok());
    }

    #[test]
    fn test_dangling_time_reference_rejected() {
        let mut tree = ProofTree::new(LogicalForm::container(VariableKey::new(1, 1)));
        let other = VariableKey::new(5, 5);
        let err = tree
            .add_derivation(
                NodeId(0),
                RuleKind::ContCompCont,
                Parametrization::None,
                vec![LogicalForm::container(other)],
                vec![vec![TimeSlot::new(other, VariableTime::SameAs(SlotTarget::Conclusion(other)))]],
            )
            .unwrap_err();
        assert!(matches!(err, GenerationError::ConstraintViolation { .. }));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_container_write_detection() {
        let (tree, a, b) = comp_tree();
        // the comp premise states b at the root's moment, where the root container writes it
        assert!(tree.has_container_write_at(NodeId(2), &b));
        // and a at the moment the container premise states it
        assert!(tree.has_container_write_at(NodeId(2), &a));
        assert!(!tree.has_container_write_at(NodeId(0), &b));
    }

    #[test]
    fn test_ancestor_query() {
        let (tree, _, _) = comp_tree();
        assert_eq!(tree.ancestor_query(NodeId(2), "conclusion").unwrap(), NodeId(0));
        assert_eq!(tree.ancestor_query(NodeId(2), "self.conclusion").unwrap(), NodeId(0));
        assert!(tree.ancestor_query(NodeId(2), "conclusion.conclusion").is_err());
        assert!(tree.ancestor_query(NodeId(2), "sibling").is_err());
    }

    #[test]
    fn test_pretty_print_lists_premises_first() {
        let (mut tree, _, _) = comp_tree();
        tree.compute_symbolically().unwrap();
        let printed = tree.pretty_print();
        let lines: Vec<&str> = printed.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].contains("ContCompCont"));
        assert!(lines[0].starts_with("  [1] Axiom"));
    }

    #[test]
    fn test_designate_questions() {
        let (mut tree, _, _) = comp_tree();
        assert!(tree.designate_questions(vec![]).is_err());
        assert!(tree.designate_questions(vec![NodeId(9)]).is_err());
        tree.designate_questions(vec![NodeId(0), NodeId(1)]).unwrap();
        assert_eq!(tree.questions().len(), 2);
    }
}
