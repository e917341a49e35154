//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds,
//! and effects. It owns the dependency graph and schedules updates when
//! signals change.
//!
//! # How It Works
//!
//! 1. When a signal, computed or effect is created, it registers a node with
//!    the runtime (and with the current owner scope, if any).
//!
//! 2. When a computed or effect reads a node, the runtime records the
//!    dependency in the current tracking frame.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Marks every downstream computed dirty
//!    b. Queues the signal in the current transaction
//!    c. When the outermost transaction closes, runs the affected effects
//!    d. Computeds are lazy - they recompute on next access
//!
//! # Threading
//!
//! A runtime belongs to one UI thread. It is deliberately `!Send`: all state
//! lives in `RefCell`/`Cell` and there is no locking. Background work hands
//! results back through a [`RemoteWriter`](crate::frame::RemoteWriter).
//! Several runtimes can coexist in one process, which keeps tests isolated.

use std::cell::{Cell, RefCell};
use std::fmt;

use tracing::{debug, trace, warn};

use super::context::TrackingFrame;
use super::owner::OwnerTree;
use super::transaction::Transaction;
use crate::config::RuntimeConfig;
use crate::error::ReactiveError;
use crate::graph::{NodeId, NodeKind, NodeState, UpdateScheduler};

/// A handle to a node of the reactive graph.
pub trait Reactive {
    /// The graph node behind this handle.
    fn node_id(&self) -> NodeId;
}

/// The reactive runtime.
///
/// Every signal, computed and effect belongs to exactly one runtime, and is
/// only usable through a reference to it.
pub struct Runtime {
    pub(super) graph: RefCell<UpdateScheduler>,
    pub(super) tracking: RefCell<Vec<TrackingFrame>>,
    pub(super) transaction: RefCell<Transaction>,
    pub(super) owners: RefCell<OwnerTree>,
    pub(super) failures: RefCell<Vec<ReactiveError>>,
    pub(super) write_epoch: Cell<u64>,
    config: RuntimeConfig,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with the given configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        debug!(
            max_reentrancy_depth = config.max_reentrancy_depth,
            "reactive runtime created"
        );
        Self {
            graph: RefCell::new(UpdateScheduler::new()),
            tracking: RefCell::new(Vec::new()),
            transaction: RefCell::new(Transaction::default()),
            owners: RefCell::new(OwnerTree::default()),
            failures: RefCell::new(Vec::new()),
            write_epoch: Cell::new(0),
            config,
        }
    }

    /// The configuration this runtime was created with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.graph.borrow().node_count()
    }

    /// Whether `node` is still registered.
    pub fn contains(&self, node: NodeId) -> bool {
        self.graph.borrow().contains(node)
    }

    /// The kind of a live node.
    pub fn node_kind(&self, node: NodeId) -> Option<NodeKind> {
        self.graph.borrow().get_node(node).map(|n| n.kind())
    }

    /// The nodes `node` read during its last evaluation.
    pub fn dependencies_of(&self, node: NodeId) -> Vec<NodeId> {
        self.graph
            .borrow()
            .get_node(node)
            .map(|n| n.dependencies().iter().copied().collect())
            .unwrap_or_default()
    }

    /// The computeds and effects subscribed to `node`.
    pub fn subscribers_of(&self, node: NodeId) -> Vec<NodeId> {
        self.graph
            .borrow()
            .get_node(node)
            .map(|n| n.dependents().iter().copied().collect())
            .unwrap_or_default()
    }

    /// Count of effective signal writes since the runtime was created.
    ///
    /// Writes short-circuited by the equality policy do not count.
    pub fn write_epoch(&self) -> u64 {
        self.write_epoch.get()
    }

    /// Drain the effect failures recorded since the last call.
    pub fn take_effect_failures(&self) -> Vec<ReactiveError> {
        std::mem::take(&mut *self.failures.borrow_mut())
    }

    /// Dispose the node behind `handle`.
    ///
    /// Returns false if it was already disposed.
    pub fn dispose(&self, handle: &impl Reactive) -> bool {
        self.dispose_node(handle.node_id())
    }

    /// Dispose a node by id, detaching it from every neighbour.
    pub fn dispose_node(&self, node: NodeId) -> bool {
        let removed = self.graph.borrow_mut().remove_node(node);
        let Some(removed) = removed else {
            return false;
        };

        if let Some(owner) = removed.owner() {
            self.owners.borrow_mut().forget_node(owner, node);
        }
        self.transaction.borrow_mut().forget(node);
        if let Some(scope) = removed.scope() {
            self.dispose_owner(scope);
        }
        trace!(node = %node, kind = ?removed.kind(), "node disposed");
        true
    }

    /// Dispose every node and owner. Returns the number of nodes disposed.
    pub fn teardown(self) -> usize {
        let ids: Vec<NodeId> = self.graph.borrow().nodes().map(|n| n.id()).collect();
        let disposed = ids.len();
        for id in ids.into_iter().rev() {
            self.dispose_node(id);
        }
        self.owners.borrow_mut().clear();
        debug!(disposed, "reactive runtime torn down");
        disposed
    }

    /// Register a new node under the current owner.
    ///
    /// Computeds and effects also get a scope of their own, nested under
    /// that owner, for the nodes they create while running.
    pub(super) fn register_node(&self, state: NodeState) -> NodeId {
        let owner = self.current_owner();
        let scope = match state {
            NodeState::Source(_) => None,
            NodeState::Derived(_) | NodeState::Effect(_) => Some(self.create_owner(owner)),
        };

        let id = {
            let mut graph = self.graph.borrow_mut();
            let id = graph.add_node(state, owner);
            if let (Some(scope), Some(node)) = (scope, graph.get_node_mut(id)) {
                node.set_scope(scope);
            }
            id
        };
        if let Some(owner) = owner {
            self.owners.borrow_mut().adopt(owner, id);
        }
        id
    }

    /// Record an isolated effect failure.
    pub(super) fn report_effect_failure(&self, effect: NodeId, error: &ReactiveError) {
        warn!(effect = %effect, error = %error, "effect failed");
        self.failures.borrow_mut().push(ReactiveError::EffectFailure {
            effect,
            message: error.to_string(),
        });
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("nodes", &self.node_count())
            .field("transaction_depth", &self.transaction_depth())
            .field("write_epoch", &self.write_epoch())
            .finish()
    }
}
