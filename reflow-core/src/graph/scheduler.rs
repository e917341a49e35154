//! Update Scheduler
//!
//! The scheduler owns every node of the dependency graph and determines the
//! order in which affected nodes are brought up to date. Dependencies are
//! always processed before their dependents.
//!
//! # Algorithm
//!
//! 1. When a signal is written, every computed transitively downstream of it
//!    is marked dirty immediately (`mark_stale`).
//! 2. When the outermost transaction closes, collect the forward reachable
//!    set of all written signals (`reachable_from`).
//! 3. Sort that set topologically with Kahn's algorithm. Ready nodes are
//!    taken in registration order, which makes unrelated siblings run in the
//!    order they were created. A sort that cannot finish reports the nodes on
//!    the cycle.
//! 4. Computeds feeding a reached effect are refreshed in order, then every
//!    reached effect runs once.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use indexmap::{IndexMap, IndexSet};

use super::node::{Node, NodeId, NodeKind, NodeState};
use crate::error::{ReactiveError, Result};
use crate::reactive::OwnerId;

/// The update scheduler manages the dependency graph and coordinates updates.
pub struct UpdateScheduler {
    /// All nodes in the graph, in registration order.
    nodes: IndexMap<NodeId, Node>,

    /// Next id to hand out.
    next_id: u64,
}

impl UpdateScheduler {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
            next_id: 0,
        }
    }

    /// Add a node to the graph.
    pub(crate) fn add_node(&mut self, state: NodeState, owner: Option<OwnerId>) -> NodeId {
        let id = NodeId::from(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node::new(id, state, owner));
        id
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node, so no remaining node keeps
    /// a subscription to it.
    pub(crate) fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let mut node = self.nodes.shift_remove(&node_id)?;

        // Remove this node from its dependencies' dependent lists
        for dep_id in node.take_dependencies() {
            if let Some(dep) = self.nodes.get_mut(&dep_id) {
                dep.remove_dependent(node_id);
            }
        }

        // Remove this node from its dependents' dependency lists
        for dependent_id in node.take_dependents() {
            if let Some(dependent) = self.nodes.get_mut(&dependent_id) {
                dependent.remove_dependency(node_id);
            }
        }

        Some(node)
    }

    /// Whether the node is still registered.
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Get a reference to a node.
    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable reference to a node.
    pub(crate) fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Iterate over all nodes in registration order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Add a dependency edge: `dependent` depends on `dependency`.
    ///
    /// This means when `dependency` changes, `dependent` may need to update.
    pub(crate) fn add_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if !self.contains(dependency) || !self.contains(dependent) {
            return;
        }
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.add_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.add_dependency(dependency);
        }
    }

    /// Remove a dependency edge.
    pub(crate) fn remove_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.remove_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.remove_dependency(dependency);
        }
    }

    /// Replace the dependency set of `node_id` in one step.
    ///
    /// Edges absent from `dependencies` are removed, new ones are added.
    /// Dependencies that were disposed in the meantime are skipped.
    pub(crate) fn replace_dependencies(&mut self, node_id: NodeId, dependencies: IndexSet<NodeId>) {
        let Some(node) = self.nodes.get(&node_id) else {
            return;
        };

        let stale: Vec<NodeId> = node
            .dependencies()
            .iter()
            .filter(|dep| !dependencies.contains(*dep))
            .copied()
            .collect();

        for dep in stale {
            self.remove_edge(dep, node_id);
        }
        for dep in dependencies {
            self.add_edge(dep, node_id);
        }
    }

    /// Mark every computed downstream of `source_id` dirty.
    ///
    /// Returns the number of computeds that flipped from clean to dirty.
    pub(crate) fn mark_stale(&mut self, source_id: NodeId) -> usize {
        let mut flipped = 0;
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        if let Some(source) = self.nodes.get(&source_id) {
            queue.extend(source.dependents().iter().copied());
        }

        while let Some(node_id) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }
            let Some(node) = self.nodes.get_mut(&node_id) else {
                continue;
            };
            if let NodeState::Derived(state) = &mut node.state {
                if !state.dirty {
                    state.dirty = true;
                    flipped += 1;
                }
                queue.extend(node.dependents().iter().copied());
            }
        }

        flipped
    }

    /// Collect every node reachable from `sources` over dependent edges.
    ///
    /// The sources themselves are not part of the result.
    pub fn reachable_from(&self, sources: impl IntoIterator<Item = NodeId>) -> Vec<NodeId> {
        let mut visited: IndexSet<NodeId> = IndexSet::new();
        let mut queue: VecDeque<NodeId> = VecDeque::new();

        for source in sources {
            if let Some(node) = self.nodes.get(&source) {
                queue.extend(node.dependents().iter().copied());
            }
        }

        // BFS over "depended on by" edges
        while let Some(node_id) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&node_id) {
                queue.extend(node.dependents().iter().copied());
            }
        }

        visited.into_iter().collect()
    }

    /// Perform a topological sort of the given nodes.
    ///
    /// Returns nodes in order such that dependencies come before dependents,
    /// breaking ties by registration order. Only edges inside `nodes` count.
    pub fn topological_order(&self, nodes: &[NodeId]) -> Result<Vec<NodeId>> {
        let node_set: HashSet<NodeId> = nodes.iter().copied().collect();
        let mut in_degree: HashMap<NodeId, usize> = HashMap::with_capacity(nodes.len());
        let mut ready: BTreeSet<NodeId> = BTreeSet::new();
        let mut result = Vec::with_capacity(nodes.len());

        // Calculate in-degrees (only counting edges within the node set)
        for &node_id in &node_set {
            if let Some(node) = self.nodes.get(&node_id) {
                let degree = node
                    .dependencies()
                    .iter()
                    .filter(|d| node_set.contains(*d))
                    .count();
                in_degree.insert(node_id, degree);
                if degree == 0 {
                    ready.insert(node_id);
                }
            }
        }

        // Kahn's algorithm
        while let Some(node_id) = ready.pop_first() {
            result.push(node_id);

            if let Some(node) = self.nodes.get(&node_id) {
                for dependent_id in node.dependents() {
                    if let Some(degree) = in_degree.get_mut(dependent_id) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            ready.insert(*dependent_id);
                        }
                    }
                }
            }
        }

        if result.len() < in_degree.len() {
            let sorted: HashSet<NodeId> = result.iter().copied().collect();
            let remaining: HashSet<NodeId> = in_degree
                .keys()
                .filter(|id| !sorted.contains(*id))
                .copied()
                .collect();
            return Err(ReactiveError::CyclicDependency {
                nodes: self.cycle_members(remaining),
            });
        }

        Ok(result)
    }

    /// Narrow the unsorted remainder of a failed sort to the nodes that lie
    /// on a cycle by repeatedly trimming nodes with no dependent left in the
    /// set.
    fn cycle_members(&self, mut remaining: HashSet<NodeId>) -> Vec<NodeId> {
        loop {
            let sinks: Vec<NodeId> = remaining
                .iter()
                .filter(|id| {
                    self.nodes.get(*id).map_or(true, |node| {
                        !node.dependents().iter().any(|d| remaining.contains(d))
                    })
                })
                .copied()
                .collect();
            if sinks.is_empty() {
                break;
            }
            for sink in sinks {
                remaining.remove(&sink);
            }
        }

        let mut members: Vec<NodeId> = remaining.into_iter().collect();
        members.sort();
        members
    }

    /// Select the nodes of `order` that are effects, or computeds with an
    /// effect downstream inside `order`.
    pub fn active_nodes(&self, order: &[NodeId]) -> HashSet<NodeId> {
        let mut active = HashSet::new();

        for &node_id in order.iter().rev() {
            let Some(node) = self.nodes.get(&node_id) else {
                continue;
            };
            let is_active = match node.kind() {
                NodeKind::Effect => true,
                NodeKind::Derived => node.dependents().iter().any(|d| active.contains(d)),
                NodeKind::Source => false,
            };
            if is_active {
                active.insert(node_id);
            }
        }

        active
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::graph::node::{AnyValue, ComputeFn, EffectFn, EqualityFn};

    fn source(scheduler: &mut UpdateScheduler) -> NodeId {
        let equals: EqualityFn = Rc::new(|_, _| false);
        scheduler.add_node(NodeState::source(Box::new(0_i32), equals), None)
    }

    fn derived(scheduler: &mut UpdateScheduler) -> NodeId {
        let compute: ComputeFn = Rc::new(|_| Ok(Box::new(0_i32) as AnyValue));
        scheduler.add_node(NodeState::derived(compute), None)
    }

    fn effect(scheduler: &mut UpdateScheduler) -> NodeId {
        let run: EffectFn = Rc::new(|_| Ok(()));
        scheduler.add_node(NodeState::effect(run), None)
    }

    fn clean(scheduler: &mut UpdateScheduler, id: NodeId) {
        if let Some(NodeState::Derived(state)) =
            scheduler.get_node_mut(id).map(|node| &mut node.state)
        {
            state.dirty = false;
        }
    }

    #[test]
    fn add_and_remove_nodes() {
        let mut scheduler = UpdateScheduler::new();

        let id1 = source(&mut scheduler);
        let id2 = derived(&mut scheduler);

        assert_eq!(scheduler.node_count(), 2);

        scheduler.remove_node(id1);
        assert_eq!(scheduler.node_count(), 1);
        assert!(scheduler.get_node(id1).is_none());
        assert!(scheduler.get_node(id2).is_some());
    }

    #[test]
    fn add_and_remove_edges() {
        let mut scheduler = UpdateScheduler::new();

        let source_id = source(&mut scheduler);
        let derived_id = derived(&mut scheduler);

        scheduler.add_edge(source_id, derived_id);

        assert!(scheduler
            .get_node(source_id)
            .unwrap()
            .dependents()
            .contains(&derived_id));
        assert!(scheduler
            .get_node(derived_id)
            .unwrap()
            .dependencies()
            .contains(&source_id));

        scheduler.remove_edge(source_id, derived_id);

        assert!(scheduler.get_node(source_id).unwrap().dependents().is_empty());
        assert!(scheduler.get_node(derived_id).unwrap().dependencies().is_empty());
    }

    #[test]
    fn removing_a_node_detaches_both_directions() {
        let mut scheduler = UpdateScheduler::new();
        let s = source(&mut scheduler);
        let c = derived(&mut scheduler);
        let e = effect(&mut scheduler);
        scheduler.add_edge(s, c);
        scheduler.add_edge(c, e);

        scheduler.remove_node(c);

        assert!(scheduler.get_node(s).unwrap().dependents().is_empty());
        assert!(scheduler.get_node(e).unwrap().dependencies().is_empty());
    }

    #[test]
    fn replace_dependencies_drops_stale_edges() {
        let mut scheduler = UpdateScheduler::new();
        let a = source(&mut scheduler);
        let b = source(&mut scheduler);
        let c = derived(&mut scheduler);
        scheduler.add_edge(a, c);
        scheduler.add_edge(b, c);

        scheduler.replace_dependencies(c, IndexSet::from([b]));

        assert!(scheduler.get_node(a).unwrap().dependents().is_empty());
        assert!(scheduler.get_node(b).unwrap().dependents().contains(&c));
        assert_eq!(scheduler.get_node(c).unwrap().dependencies().len(), 1);
    }

    #[test]
    fn mark_stale_propagates_through_computeds() {
        let mut scheduler = UpdateScheduler::new();

        // Create a chain: source -> derived1 -> derived2 -> effect
        let source_id = source(&mut scheduler);
        let derived1 = derived(&mut scheduler);
        let derived2 = derived(&mut scheduler);
        let effect_id = effect(&mut scheduler);

        scheduler.add_edge(source_id, derived1);
        scheduler.add_edge(derived1, derived2);
        scheduler.add_edge(derived2, effect_id);
        clean(&mut scheduler, derived1);
        clean(&mut scheduler, derived2);

        assert_eq!(scheduler.mark_stale(source_id), 2);
        assert!(scheduler.get_node(derived1).unwrap().is_dirty());
        assert!(scheduler.get_node(derived2).unwrap().is_dirty());

        // Already dirty nodes do not flip again
        assert_eq!(scheduler.mark_stale(source_id), 0);
    }

    #[test]
    fn reachable_nodes_are_sorted_topologically() {
        let mut scheduler = UpdateScheduler::new();

        // Diamond: s -> (a, b) -> e
        let s = source(&mut scheduler);
        let e = effect(&mut scheduler);
        let b = derived(&mut scheduler);
        let a = derived(&mut scheduler);
        scheduler.add_edge(s, a);
        scheduler.add_edge(s, b);
        scheduler.add_edge(a, e);
        scheduler.add_edge(b, e);

        let reached = scheduler.reachable_from([s]);
        assert_eq!(reached.len(), 3);

        let order = scheduler.topological_order(&reached).unwrap();
        // Registration order breaks the tie between the two computeds
        assert_eq!(order, vec![b, a, e]);
    }

    #[test]
    fn unrelated_effects_run_in_registration_order() {
        let mut scheduler = UpdateScheduler::new();
        let s = source(&mut scheduler);
        let first = effect(&mut scheduler);
        let second = effect(&mut scheduler);
        let third = effect(&mut scheduler);
        scheduler.add_edge(s, third);
        scheduler.add_edge(s, first);
        scheduler.add_edge(s, second);

        let reached = scheduler.reachable_from([s]);
        let order = scheduler.topological_order(&reached).unwrap();
        assert_eq!(order, vec![first, second, third]);
    }

    #[test]
    fn cycles_are_reported_with_their_members() {
        let mut scheduler = UpdateScheduler::new();
        let s = source(&mut scheduler);
        let a = derived(&mut scheduler);
        let b = derived(&mut scheduler);
        let e = effect(&mut scheduler);
        scheduler.add_edge(s, a);
        scheduler.add_edge(a, b);
        scheduler.add_edge(b, a);
        scheduler.add_edge(b, e);

        let reached = scheduler.reachable_from([s]);
        let err = scheduler.topological_order(&reached).unwrap_err();
        assert_eq!(err, ReactiveError::CyclicDependency { nodes: vec![a, b] });
    }

    #[test]
    fn active_nodes_skip_computeds_without_effects() {
        let mut scheduler = UpdateScheduler::new();
        let s = source(&mut scheduler);
        let feeding = derived(&mut scheduler);
        let idle = derived(&mut scheduler);
        let e = effect(&mut scheduler);
        scheduler.add_edge(s, feeding);
        scheduler.add_edge(s, idle);
        scheduler.add_edge(feeding, e);

        let reached = scheduler.reachable_from([s]);
        let order = scheduler.topological_order(&reached).unwrap();
        let active = scheduler.active_nodes(&order);

        assert!(active.contains(&feeding));
        assert!(active.contains(&e));
        assert!(!active.contains(&idle));
    }
}
