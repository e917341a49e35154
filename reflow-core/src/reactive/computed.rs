//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. On first access, the computed runs its computation and caches the
//!    result.
//!
//! 2. When accessed again, if nothing upstream has changed, the cached value
//!    is returned.
//!
//! 3. When a transitive dependency is written, the computed is marked dirty
//!    immediately.
//!
//! 4. On next access (or when the scheduler refreshes it because an effect
//!    depends on it), it recomputes and becomes clean.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 computeds depend on it
//! - Only the computeds actually read (directly or by an effect) recompute
//! - Computeds that are never read stay dirty
//!
//! # Failure
//!
//! A computation that returns an error leaves the computed dirty with its
//! previous value and edges, so the next read retries it. Reading a computed
//! that is already evaluating further up the stack is a cycle.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;

use tracing::trace;

use super::context::ReactiveContext;
use super::runtime::{Reactive, Runtime};
use crate::error::{ReactiveError, Result};
use crate::graph::{AnyValue, ComputeFn, Node, NodeId, NodeKind, NodeState};

/// A cached derived value that recomputes only when dependencies change.
///
/// # Example
///
/// ```rust
/// use reflow_core::reactive::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.create_signal(2);
/// let doubled = rt.create_computed(move |rt| Ok(count.get(rt)? * 2));
///
/// assert_eq!(doubled.get(&rt).unwrap(), 4);
/// count.set(&rt, 5).unwrap();
/// assert_eq!(doubled.get(&rt).unwrap(), 10);
/// ```
pub struct Computed<T> {
    id: NodeId,
    _marker: PhantomData<fn() -> T>,
}

impl Runtime {
    /// Create a new computed with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn create_computed<T, F>(&self, compute: F) -> Computed<T>
    where
        T: Clone + 'static,
        F: Fn(&Runtime) -> Result<T> + 'static,
    {
        let compute: ComputeFn = Rc::new(move |rt| compute(rt).map(|v| Box::new(v) as AnyValue));
        let id = self.register_node(NodeState::derived(compute));
        trace!(computed = %id, "computed created");
        Computed {
            id,
            _marker: PhantomData,
        }
    }

    fn read_computed<T: Clone + 'static>(&self, id: NodeId, tracked: bool) -> Result<T> {
        if tracked {
            self.track_dependency(id);
        }
        self.refresh_computed(id)?;

        let graph = self.graph.borrow();
        let node = graph.get_node(id).ok_or(ReactiveError::Disposed(id))?;
        match &node.state {
            NodeState::Derived(state) => state
                .value
                .as_ref()
                .and_then(|value| value.downcast_ref::<T>())
                .cloned()
                .ok_or(ReactiveError::TypeMismatch(id)),
            _ => Err(ReactiveError::TypeMismatch(id)),
        }
    }

    /// Re-evaluate a computed if it is dirty.
    ///
    /// Dependencies read during the evaluation replace the old edge set in
    /// one step once the computation succeeds.
    pub(crate) fn refresh_computed(&self, id: NodeId) -> Result<()> {
        let compute = {
            let mut graph = self.graph.borrow_mut();
            let node = graph.get_node_mut(id).ok_or(ReactiveError::Disposed(id))?;
            let scope = node.scope();
            let NodeState::Derived(state) = &mut node.state else {
                return Err(ReactiveError::TypeMismatch(id));
            };
            if !state.dirty && state.value.is_some() {
                return Ok(());
            }
            if state.evaluating {
                None
            } else {
                state.evaluating = true;
                Some((state.compute.clone(), scope))
            }
        };

        let Some((compute, scope)) = compute else {
            let error = ReactiveError::CyclicDependency {
                nodes: self.evaluation_chain_from(id),
            };
            self.poison(&error);
            return Err(error);
        };

        let ctx = ReactiveContext::enter(self, id);
        let result = self.run_in_scope(scope, || compute(self));
        let dependencies = ctx.finish();

        let mut graph = self.graph.borrow_mut();
        let version = {
            // The computation may have disposed its own node
            let node = graph.get_node_mut(id).ok_or(ReactiveError::Disposed(id))?;
            let NodeState::Derived(state) = &mut node.state else {
                return Err(ReactiveError::TypeMismatch(id));
            };
            state.evaluating = false;
            match result {
                Ok(value) => {
                    state.value = Some(value);
                    state.dirty = false;
                    state.version += 1;
                    state.version
                }
                Err(error) => {
                    trace!(computed = %id, error = %error, "computation failed");
                    return Err(error);
                }
            }
        };
        graph.replace_dependencies(id, dependencies);
        trace!(computed = %id, version, "computed re-evaluated");
        Ok(())
    }

    fn computed_state<R>(&self, id: NodeId, f: impl FnOnce(&Node) -> R) -> Option<R> {
        let graph = self.graph.borrow();
        graph
            .get_node(id)
            .filter(|node| node.kind() == NodeKind::Derived)
            .map(f)
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Get the computed's unique ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Inside a reactive context this also subscribes the current
    /// computation to this computed.
    pub fn get(&self, rt: &Runtime) -> Result<T> {
        rt.read_computed(self.id, true)
    }

    /// Get the value without subscribing the current computation.
    pub fn get_untracked(&self, rt: &Runtime) -> Result<T> {
        rt.read_computed(self.id, false)
    }

    /// Whether the next read will recompute. False once disposed.
    pub fn is_dirty(&self, rt: &Runtime) -> bool {
        rt.computed_state(self.id, |node| node.is_dirty())
            .unwrap_or(false)
    }

    /// Whether a value has been computed at least once.
    pub fn has_value(&self, rt: &Runtime) -> bool {
        rt.computed_state(self.id, |node| node.version() > 0)
            .unwrap_or(false)
    }

    /// Number of successful evaluations so far.
    pub fn version(&self, rt: &Runtime) -> Result<u64> {
        rt.computed_state(self.id, |node| node.version())
            .ok_or(ReactiveError::Disposed(self.id))
    }

    /// Get the number of dependencies recorded by the last evaluation.
    pub fn dependency_count(&self, rt: &Runtime) -> usize {
        rt.dependencies_of(self.id).len()
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self, rt: &Runtime) -> usize {
        rt.subscribers_of(self.id).len()
    }

    /// Dispose the computed, detaching it from both sides.
    pub fn dispose(self, rt: &Runtime) -> bool {
        rt.dispose_node(self.id)
    }
}

impl<T> Reactive for Computed<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Computed<T> {}

impl<T> PartialEq for Computed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Computed<T> {}

impl<T> Hash for Computed<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn computed_is_lazy() {
        let rt = Runtime::new();
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();

        let computed = rt.create_computed(move |_| {
            calls_clone.set(calls_clone.get() + 1);
            Ok(42)
        });

        // Not computed yet
        assert_eq!(calls.get(), 0);
        assert!(!computed.has_value(&rt));

        // First access computes
        assert_eq!(computed.get(&rt).unwrap(), 42);
        assert_eq!(calls.get(), 1);

        // Second access uses cache
        assert_eq!(computed.get(&rt).unwrap(), 42);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn computed_recomputes_after_a_write() {
        let rt = Runtime::new();
        let count = rt.create_signal(1);
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let doubled = rt.create_computed(move |rt| {
            calls_clone.set(calls_clone.get() + 1);
            Ok(count.get(rt)? * 2)
        });

        assert_eq!(doubled.get(&rt).unwrap(), 2);
        count.set(&rt, 4).unwrap();
        assert!(doubled.is_dirty(&rt));
        assert_eq!(doubled.get(&rt).unwrap(), 8);
        assert_eq!(calls.get(), 2);
        assert_eq!(doubled.version(&rt).unwrap(), 2);
    }

    #[test]
    fn computed_chain_marks_every_level_dirty() {
        let rt = Runtime::new();
        let base = rt.create_signal(1);
        let plus_one = rt.create_computed(move |rt| Ok(base.get(rt)? + 1));
        let times_ten = rt.create_computed(move |rt| Ok(plus_one.get(rt)? * 10));

        assert_eq!(times_ten.get(&rt).unwrap(), 20);
        base.set(&rt, 2).unwrap();
        assert!(plus_one.is_dirty(&rt));
        assert!(times_ten.is_dirty(&rt));
        assert_eq!(times_ten.get(&rt).unwrap(), 30);
    }

    #[test]
    fn dynamic_dependencies_are_replaced() {
        let rt = Runtime::new();
        let use_left = rt.create_signal(true);
        let left = rt.create_signal(1);
        let right = rt.create_signal(2);
        let pick = rt.create_computed(move |rt| {
            if use_left.get(rt)? {
                left.get(rt)
            } else {
                right.get(rt)
            }
        });

        assert_eq!(pick.get(&rt).unwrap(), 1);
        assert_eq!(left.subscriber_count(&rt), 1);
        assert_eq!(right.subscriber_count(&rt), 0);

        use_left.set(&rt, false).unwrap();
        assert_eq!(pick.get(&rt).unwrap(), 2);
        assert_eq!(pick.dependency_count(&rt), 2);
        assert_eq!(left.subscriber_count(&rt), 0);
        assert_eq!(right.subscriber_count(&rt), 1);
    }

    #[test]
    fn failed_computation_stays_dirty_and_retries() {
        let rt = Runtime::new();
        let input = rt.create_signal(1);
        let checked = rt.create_computed(move |rt| {
            let value = input.get(rt)?;
            if value < 0 {
                return Err(ReactiveError::callback("negative input"));
            }
            Ok(value)
        });

        assert_eq!(checked.get(&rt).unwrap(), 1);
        input.set(&rt, -1).unwrap();
        assert_eq!(
            checked.get(&rt),
            Err(ReactiveError::Callback("negative input".into()))
        );
        assert!(checked.is_dirty(&rt));
        // The old edge survives, so the next write is still seen
        assert_eq!(input.subscriber_count(&rt), 1);

        input.set(&rt, 3).unwrap();
        assert_eq!(checked.get(&rt).unwrap(), 3);
    }

    #[test]
    fn self_read_through_another_computed_is_a_cycle() {
        let rt = Runtime::new();
        let slot: Rc<Cell<Option<Computed<i32>>>> = Rc::new(Cell::new(None));
        let slot_a = slot.clone();
        let a = rt.create_computed(move |rt| match slot_a.get() {
            Some(b) => Ok(b.get(rt)? + 1),
            None => Ok(0),
        });
        let b = rt.create_computed(move |rt| Ok(a.get(rt)? + 1));
        slot.set(Some(b));

        let err = a.get(&rt).unwrap_err();
        assert_eq!(
            err,
            ReactiveError::CyclicDependency {
                nodes: vec![a.id(), b.id()]
            }
        );
        // Nothing is left half-evaluated
        assert!(!rt.is_tracking());
        assert!(a.is_dirty(&rt));
    }

    #[test]
    fn reading_a_signal_as_a_computed_is_a_type_mismatch() {
        let rt = Runtime::new();
        let signal = rt.create_signal(1);
        let fake: Computed<i32> = Computed {
            id: signal.id(),
            _marker: PhantomData,
        };
        assert_eq!(fake.get(&rt), Err(ReactiveError::TypeMismatch(signal.id())));
    }
}
