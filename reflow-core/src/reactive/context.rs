//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we can register the current computation as a dependent.
//!
//! # Implementation
//!
//! Each runtime keeps a stack of tracking frames. When a computed or effect
//! starts evaluating, we push a frame for it; every read records its node in
//! the top frame. When the evaluation completes, the frame is popped and its
//! dependency set is committed to the graph in one step.
//!
//! This design supports nested reactive contexts (e.g., a computed that reads
//! from another computed).

use indexmap::IndexSet;

use super::Runtime;
use crate::graph::NodeId;

/// An entry in the tracking stack.
#[derive(Debug, Clone)]
pub(crate) struct TrackingFrame {
    /// The node being evaluated, or `None` for an untracked scope.
    observer: Option<NodeId>,
    /// Nodes read during this evaluation.
    dependencies: IndexSet<NodeId>,
}

/// Guard that pops the tracking frame when dropped.
///
/// This ensures the stack is properly maintained even if the computation
/// panics.
pub struct ReactiveContext<'rt> {
    runtime: &'rt Runtime,
    observer: Option<NodeId>,
    finished: bool,
}

impl<'rt> ReactiveContext<'rt> {
    /// Enter a new reactive context for the given observer.
    ///
    /// While this context is active, any node that is read is recorded as a
    /// dependency of the observer.
    pub fn enter(runtime: &'rt Runtime, observer: NodeId) -> Self {
        Self::push(runtime, Some(observer))
    }

    /// Enter a scope in which reads are not tracked.
    pub fn untracked(runtime: &'rt Runtime) -> Self {
        Self::push(runtime, None)
    }

    fn push(runtime: &'rt Runtime, observer: Option<NodeId>) -> Self {
        runtime.tracking.borrow_mut().push(TrackingFrame {
            observer,
            dependencies: IndexSet::new(),
        });

        Self {
            runtime,
            observer,
            finished: false,
        }
    }

    /// Leave the context and return the dependencies it collected.
    pub fn finish(mut self) -> IndexSet<NodeId> {
        self.finished = true;
        self.pop()
            .map(|frame| frame.dependencies)
            .unwrap_or_default()
    }

    fn pop(&self) -> Option<TrackingFrame> {
        let popped = self.runtime.tracking.borrow_mut().pop();

        // Verify we're popping the right context.
        // This helps catch bugs where contexts are mismatched.
        if let Some(frame) = &popped {
            debug_assert_eq!(
                frame.observer, self.observer,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.observer, frame.observer
            );
        }
        popped
    }
}

impl Drop for ReactiveContext<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.pop();
        }
    }
}

impl Runtime {
    /// Check if a tracked computation is currently running.
    pub fn is_tracking(&self) -> bool {
        self.current_observer().is_some()
    }

    /// Get the node currently being evaluated, if any.
    pub fn current_observer(&self) -> Option<NodeId> {
        self.tracking
            .borrow()
            .last()
            .and_then(|frame| frame.observer)
    }

    /// Run `f` without recording any dependency for the current observer.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        let ctx = ReactiveContext::untracked(self);
        let out = f();
        ctx.finish();
        out
    }

    /// Record a read of `node` by the current observer.
    pub(crate) fn track_dependency(&self, node: NodeId) {
        let mut stack = self.tracking.borrow_mut();
        if let Some(frame) = stack.last_mut() {
            if frame.observer.is_some_and(|observer| observer != node) {
                frame.dependencies.insert(node);
            }
        }
    }

    /// The observers on the stack from `node`'s own frame to the top.
    ///
    /// Used to name the members of an evaluation-time cycle.
    pub(crate) fn evaluation_chain_from(&self, node: NodeId) -> Vec<NodeId> {
        let stack = self.tracking.borrow();
        let mut chain: Vec<NodeId> = stack
            .iter()
            .filter_map(|frame| frame.observer)
            .skip_while(|observer| *observer != node)
            .collect();
        if chain.is_empty() {
            chain.push(node);
        }
        chain.sort();
        chain.dedup();
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_observer() {
        let rt = Runtime::new();
        let id = NodeId::from(1);

        assert!(!rt.is_tracking());
        assert!(rt.current_observer().is_none());

        {
            let _ctx = ReactiveContext::enter(&rt, id);

            assert!(rt.is_tracking());
            assert_eq!(rt.current_observer(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!rt.is_tracking());
        assert!(rt.current_observer().is_none());
    }

    #[test]
    fn context_tracks_dependencies() {
        let rt = Runtime::new();
        let ctx = ReactiveContext::enter(&rt, NodeId::from(0));

        rt.track_dependency(NodeId::from(1));
        rt.track_dependency(NodeId::from(2));
        rt.track_dependency(NodeId::from(1));
        // Self-reads are never recorded
        rt.track_dependency(NodeId::from(0));

        let deps: Vec<NodeId> = ctx.finish().into_iter().collect();
        assert_eq!(deps, vec![NodeId::from(1), NodeId::from(2)]);
    }

    #[test]
    fn nested_contexts() {
        let rt = Runtime::new();
        let id1 = NodeId::from(1);
        let id2 = NodeId::from(2);

        {
            let _ctx1 = ReactiveContext::enter(&rt, id1);
            assert_eq!(rt.current_observer(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(&rt, id2);
                assert_eq!(rt.current_observer(), Some(id2));
                assert_eq!(rt.evaluation_chain_from(id1), vec![id1, id2]);
            }

            // After inner context drops, outer should be current
            assert_eq!(rt.current_observer(), Some(id1));
        }

        assert!(rt.current_observer().is_none());
    }

    #[test]
    fn untracked_scope_hides_the_observer() {
        let rt = Runtime::new();
        let ctx = ReactiveContext::enter(&rt, NodeId::from(5));

        rt.untrack(|| {
            assert!(!rt.is_tracking());
            rt.track_dependency(NodeId::from(6));
        });
        rt.track_dependency(NodeId::from(7));

        let deps: Vec<NodeId> = ctx.finish().into_iter().collect();
        assert_eq!(deps, vec![NodeId::from(7)]);
    }
}
