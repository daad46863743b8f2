use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::GenerationError;
use crate::models::logical_form::VariableKey;
use crate::models::timing::{TimeRef, TimeSlot, VariableTime};

use super::proof_tree::NodeId;

/// Partial temporal order over the nodes of a proof tree.
///
/// An edge `u -> v` means `u` must be stated no later than `v`. Slots that
/// are linked by `SameAs` (or share a fixed time) are unified into a single
/// moment first; node `u` precedes node `v` when some moment of `u` is
/// strictly earlier than some moment of `v`, or when `u` is a premise of `v`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeDag {
    nodes: BTreeSet<NodeId>,
    /// Maps each node to the nodes that must come after it
    successors: BTreeMap<NodeId, BTreeSet<NodeId>>,
    /// Maps each node to the nodes that must come before it
    predecessors: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

/// Minimal union-find over slot indices
struct Moments {
    parent: Vec<usize>,
}

impl Moments {
    fn new(size: usize) -> Self {
        Self { parent: (0..size).collect() }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // smaller index wins, keeps representatives deterministic
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

impl TimeDag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from per-node slot annotations (indexed by node id) and the
    /// structural premise -> conclusion edges.
    ///
    /// Fails with `CyclicTimeConstraint` if the annotations cannot be
    /// ordered; no partial graph is returned.
    pub fn build(
        slots: &[Vec<TimeSlot<TimeRef>>],
        structural: &[(NodeId, NodeId)],
    ) -> Result<Self, GenerationError> {
        // flatten slots
        let mut owner: Vec<NodeId> = Vec::new();
        let mut first_slot: HashMap<(NodeId, VariableKey), usize> = HashMap::new();
        for (n, node_slots) in slots.iter().enumerate() {
            for slot in node_slots {
                first_slot.entry((NodeId(n), slot.key)).or_insert(owner.len());
                owner.push(NodeId(n));
            }
        }
        let flat: Vec<&TimeSlot<TimeRef>> = slots.iter().flatten().collect();

        let lookup = |r: &TimeRef| -> Result<usize, GenerationError> {
            first_slot.get(&(r.node, r.key)).copied().ok_or_else(|| {
                GenerationError::violation(format!(
                    "time annotation refers to {} at node {}, which does not state it",
                    r.key, r.node
                ))
            })
        };

        // unify moments
        let mut moments = Moments::new(flat.len());
        let mut fixed: BTreeMap<VariableKey, BTreeMap<i64, usize>> = BTreeMap::new();
        for (i, slot) in flat.iter().enumerate() {
            match &slot.time {
                VariableTime::SameAs(r) => moments.union(i, lookup(r)?),
                VariableTime::Fixed(t) => {
                    let first = *fixed.entry(slot.key).or_default().entry(*t).or_insert(i);
                    moments.union(i, first);
                }
                VariableTime::Before(r) => {
                    lookup(r)?;
                }
                VariableTime::Unconstrained => {}
            }
        }

        // strict edges between moments
        let mut later: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        for (i, slot) in flat.iter().enumerate() {
            if let VariableTime::Before(r) = &slot.time {
                let (from, to) = (moments.find(i), moments.find(lookup(r)?));
                later.entry(from).or_default().insert(to);
            }
        }
        for times in fixed.values() {
            let points: Vec<usize> = times.values().copied().collect();
            for pair in points.windows(2) {
                let (from, to) = (moments.find(pair[0]), moments.find(pair[1]));
                later.entry(from).or_default().insert(to);
            }
        }

        let mut moment_of_slot: Vec<usize> = Vec::with_capacity(flat.len());
        for i in 0..flat.len() {
            moment_of_slot.push(moments.find(i));
        }
        let mut owners: BTreeMap<usize, BTreeSet<NodeId>> = BTreeMap::new();
        for (i, moment) in moment_of_slot.iter().enumerate() {
            owners.entry(*moment).or_default().insert(owner[i]);
        }

        let all_moments: BTreeSet<usize> = moment_of_slot.iter().copied().collect();
        if let Some(stuck) = Self::cycle_remainder(&all_moments, &later) {
            let nodes: BTreeSet<NodeId> = stuck
                .iter()
                .flat_map(|m| owners.get(m).into_iter().flatten().copied())
                .collect();
            return Err(GenerationError::CyclicTimeConstraint { nodes: nodes.into_iter().collect() });
        }

        // node edges from strictly earlier moments
        let mut dag = TimeDag::new();
        for n in 0..slots.len() {
            dag.nodes.insert(NodeId(n));
        }
        let mut node_moments: BTreeMap<NodeId, BTreeSet<usize>> = BTreeMap::new();
        for (i, moment) in moment_of_slot.iter().enumerate() {
            node_moments.entry(owner[i]).or_default().insert(*moment);
        }
        for (node, own) in &node_moments {
            let mut reached = BTreeSet::new();
            for m in own {
                Self::collect_reachable(*m, &later, &mut reached);
            }
            for m in reached {
                for other in owners.get(&m).into_iter().flatten() {
                    if other != node {
                        dag.add_edge(*node, *other);
                    }
                }
            }
        }

        for (premise, conclusion) in structural {
            dag.nodes.insert(*premise);
            dag.nodes.insert(*conclusion);
            dag.add_edge(*premise, *conclusion);
        }

        if let Some(stuck) = Self::cycle_remainder(&dag.nodes, &dag.successors) {
            return Err(GenerationError::CyclicTimeConstraint { nodes: stuck.into_iter().collect() });
        }
        Ok(dag)
    }

    /// Kahn's algorithm; returns the vertices left over if there is a cycle.
    fn cycle_remainder<T: Ord + Copy>(
        vertices: &BTreeSet<T>,
        edges: &BTreeMap<T, BTreeSet<T>>,
    ) -> Option<BTreeSet<T>> {
        let mut in_degree: BTreeMap<T, usize> = vertices.iter().map(|v| (*v, 0)).collect();
        for targets in edges.values() {
            for t in targets {
                *in_degree.entry(*t).or_insert(0) += 1;
            }
        }

        let mut queue: Vec<T> = in_degree.iter().filter(|(_, &d)| d == 0).map(|(v, _)| *v).collect();
        let mut removed = BTreeSet::new();
        while let Some(v) = queue.pop() {
            removed.insert(v);
            for t in edges.get(&v).into_iter().flatten() {
                if let Some(d) = in_degree.get_mut(t) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push(*t);
                    }
                }
            }
        }

        let remaining: BTreeSet<T> = in_degree.keys().filter(|v| !removed.contains(v)).copied().collect();
        if remaining.is_empty() {
            None
        } else {
            Some(remaining)
        }
    }

    fn collect_reachable(start: usize, edges: &BTreeMap<usize, BTreeSet<usize>>, reached: &mut BTreeSet<usize>) {
        let mut to_visit = vec![start];
        while let Some(current) = to_visit.pop() {
            for next in edges.get(&current).into_iter().flatten() {
                if reached.insert(*next) {
                    to_visit.push(*next);
                }
            }
        }
    }

    /// Add a constraint: `before` must come no later than `after`
    pub fn add_edge(&mut self, before: NodeId, after: NodeId) {
        self.nodes.insert(before);
        self.nodes.insert(after);
        self.successors.entry(before).or_default().insert(after);
        self.predecessors.entry(after).or_default().insert(before);
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    pub fn has_edge(&self, before: NodeId, after: NodeId) -> bool {
        self.successors.get(&before).map(|s| s.contains(&after)).unwrap_or(false)
    }

    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        self.successors
            .iter()
            .flat_map(|(u, vs)| vs.iter().map(move |v| (*u, *v)))
            .collect()
    }

    /// Direct successors only
    pub fn successors(&self, node: NodeId) -> BTreeSet<NodeId> {
        self.successors.get(&node).cloned().unwrap_or_default()
    }

    /// Direct predecessors only
    pub fn predecessors(&self, node: NodeId) -> BTreeSet<NodeId> {
        self.predecessors.get(&node).cloned().unwrap_or_default()
    }

    /// Every node that must come after `node` (transitively)
    pub fn all_successors(&self, node: NodeId) -> BTreeSet<NodeId> {
        let mut result = BTreeSet::new();
        let mut to_visit = vec![node];

        while let Some(current) = to_visit.pop() {
            if let Some(next) = self.successors.get(&current) {
                for &n in next {
                    if result.insert(n) {
                        to_visit.push(n);
                    }
                }
            }
        }

        result
    }

    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        self.all_successors(from).contains(&to)
    }

    /// The order induced on `subset`: `u -> v` iff `u` reaches `v` in the
    /// full graph, so constraints through excluded nodes survive.
    pub fn restricted(&self, subset: &[NodeId]) -> TimeDag {
        let keep: BTreeSet<NodeId> = subset.iter().copied().collect();
        let mut dag = TimeDag::new();
        for &u in &keep {
            dag.nodes.insert(u);
            for v in self.all_successors(u).intersection(&keep) {
                dag.add_edge(u, *v);
            }
        }
        dag
    }

    /// Deterministic topological order, smallest id first among the ready nodes
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut in_degree: BTreeMap<NodeId, usize> = self
            .nodes
            .iter()
            .map(|n| (*n, self.predecessors.get(n).map(|p| p.len()).unwrap_or(0)))
            .collect();

        let mut ready: BTreeSet<NodeId> = in_degree.iter().filter(|(_, &d)| d == 0).map(|(n, _)| *n).collect();
        let mut result = Vec::with_capacity(self.nodes.len());

        while let Some(node) = ready.pop_first() {
            result.push(node);
            for succ in self.successors.get(&node).into_iter().flatten() {
                if let Some(d) = in_degree.get_mut(succ) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(*succ);
                    }
                }
            }
        }

        result
    }

    /// True if `order` never places a node before one of its predecessors.
    /// Nodes missing from `order` are ignored.
    pub fn respects(&self, order: &[NodeId]) -> bool {
        let position: HashMap<NodeId, usize> = order.iter().enumerate().map(|(i, n)| (*n, i)).collect();
        self.edges().iter().all(|(u, v)| match (position.get(u), position.get(v)) {
            (Some(pu), Some(pv)) => pu < pv,
            _ => true,
        })
    }
}
