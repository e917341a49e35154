//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.
//! Signals, computeds and effects are three distinct kinds with their own
//! state; the scheduler matches on the kind instead of consulting a flag.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;

use crate::error::Result;
use crate::reactive::{OwnerId, Runtime};

/// Unique identifier for a node in the dependency graph.
///
/// Ids are allocated from a per-runtime counter and never reused, so their
/// ordering is also the registration order of the nodes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A source node (signal). These are the roots of the graph.
    /// They have no dependencies, only dependents.
    Source,

    /// A derived node (computed). These have dependencies and may have
    /// dependents. They cache their value and recompute lazily.
    Derived,

    /// An effect node. These are leaves of the graph and run eagerly.
    Effect,
}

pub(crate) type AnyValue = Box<dyn Any>;
pub(crate) type EqualityFn = Rc<dyn Fn(&dyn Any, &dyn Any) -> bool>;
pub(crate) type ComputeFn = Rc<dyn Fn(&Runtime) -> Result<AnyValue>>;
pub(crate) type EffectFn = Rc<dyn Fn(&Runtime) -> Result<()>>;

/// State of a signal.
pub(crate) struct SourceState {
    pub(crate) value: AnyValue,
    pub(crate) version: u64,
    pub(crate) equals: EqualityFn,
}

/// State of a computed value.
pub(crate) struct DerivedState {
    /// `None` until the first successful evaluation.
    pub(crate) value: Option<AnyValue>,
    pub(crate) dirty: bool,
    pub(crate) evaluating: bool,
    /// Bumped on every successful evaluation.
    pub(crate) version: u64,
    pub(crate) compute: ComputeFn,
}

/// State of an effect.
pub(crate) struct EffectState {
    pub(crate) run: EffectFn,
    pub(crate) running: bool,
    pub(crate) run_count: usize,
}

/// Kind-specific node state.
pub(crate) enum NodeState {
    Source(SourceState),
    Derived(DerivedState),
    Effect(EffectState),
}

impl NodeState {
    pub(crate) fn source(value: AnyValue, equals: EqualityFn) -> Self {
        Self::Source(SourceState {
            value,
            version: 0,
            equals,
        })
    }

    pub(crate) fn derived(compute: ComputeFn) -> Self {
        // Start dirty to ensure first computation
        Self::Derived(DerivedState {
            value: None,
            dirty: true,
            evaluating: false,
            version: 0,
            compute,
        })
    }

    pub(crate) fn effect(run: EffectFn) -> Self {
        Self::Effect(EffectState {
            run,
            running: false,
            run_count: 0,
        })
    }
}

/// A node in the dependency graph.
pub struct Node {
    /// Unique identifier for this node.
    id: NodeId,

    /// Kind-specific state.
    pub(crate) state: NodeState,

    /// Nodes that this node depends on (parents in the DAG).
    /// For a computed, these are the signals/computeds it read during its
    /// last evaluation.
    dependencies: IndexSet<NodeId>,

    /// Nodes that depend on this node (children in the DAG).
    /// For a signal, these are the computeds/effects that read from it.
    dependents: IndexSet<NodeId>,

    /// Owner scope that disposes this node.
    owner: Option<OwnerId>,

    /// Scope that owns the nodes a computed or effect creates while it
    /// runs. Cleared before every run.
    scope: Option<OwnerId>,
}

impl Node {
    pub(crate) fn new(id: NodeId, state: NodeState, owner: Option<OwnerId>) -> Self {
        Self {
            id,
            state,
            dependencies: IndexSet::new(),
            dependents: IndexSet::new(),
            owner,
            scope: None,
        }
    }

    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        match self.state {
            NodeState::Source(_) => NodeKind::Source,
            NodeState::Derived(_) => NodeKind::Derived,
            NodeState::Effect(_) => NodeKind::Effect,
        }
    }

    /// The owner scope this node was created under.
    pub fn owner(&self) -> Option<OwnerId> {
        self.owner
    }

    /// The scope for nodes created while this node runs. `None` for
    /// signals.
    pub fn scope(&self) -> Option<OwnerId> {
        self.scope
    }

    pub(crate) fn set_scope(&mut self, scope: OwnerId) {
        self.scope = Some(scope);
    }

    /// Whether a computed node needs re-evaluation. Always false for
    /// signals and effects.
    pub fn is_dirty(&self) -> bool {
        match &self.state {
            NodeState::Derived(state) => state.dirty,
            _ => false,
        }
    }

    /// Version of the node's value: write count for signals, evaluation
    /// count for computeds, run count for effects.
    pub fn version(&self) -> u64 {
        match &self.state {
            NodeState::Source(state) => state.version,
            NodeState::Derived(state) => state.version,
            NodeState::Effect(state) => state.run_count as u64,
        }
    }

    /// Get all dependencies.
    pub fn dependencies(&self) -> &IndexSet<NodeId> {
        &self.dependencies
    }

    /// Get all dependents.
    pub fn dependents(&self) -> &IndexSet<NodeId> {
        &self.dependents
    }

    pub(crate) fn add_dependency(&mut self, node_id: NodeId) {
        self.dependencies.insert(node_id);
    }

    pub(crate) fn remove_dependency(&mut self, node_id: NodeId) {
        self.dependencies.shift_remove(&node_id);
    }

    pub(crate) fn add_dependent(&mut self, node_id: NodeId) {
        self.dependents.insert(node_id);
    }

    pub(crate) fn remove_dependent(&mut self, node_id: NodeId) {
        self.dependents.shift_remove(&node_id);
    }

    pub(crate) fn take_dependencies(&mut self) -> IndexSet<NodeId> {
        std::mem::take(&mut self.dependencies)
    }

    pub(crate) fn take_dependents(&mut self) -> IndexSet<NodeId> {
        std::mem::take(&mut self.dependents)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("dirty", &self.is_dirty())
            .field("dependencies", &self.dependencies)
            .field("dependents", &self.dependents)
            .finish()
    }
}
