//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect runs once when the transaction
//!    that changed it closes.
//!
//! 3. Each run tracks a fresh dependency set; when the run finishes the new
//!    set replaces the old one in a single step.
//!
//! # Use Cases
//!
//! Effects are used to synchronize reactive state with the outside world:
//!
//! - Invalidating widgets when state changes
//! - Logging state changes
//! - Mirroring one signal into another
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not.
//! - Computeds are lazy (compute on access); effects are eager (run when deps change).
//! - Computeds cache results; effects just run their side effect.
//!
//! # Failure
//!
//! An effect that returns an error is reported and skipped; sibling effects
//! still run. It keeps its previous dependencies plus whatever it read
//! before failing, so the next write to any of them retries it.

use std::fmt;
use std::rc::Rc;

use tracing::trace;

use super::context::ReactiveContext;
use super::runtime::{Reactive, Runtime};
use crate::error::{ReactiveError, Result};
use crate::graph::{NodeId, NodeState};

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use reflow_core::reactive::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.create_signal(0);
/// let seen = Rc::new(Cell::new(-1));
///
/// let seen_clone = seen.clone();
/// let _effect = rt
///     .create_effect(move |rt| {
///         seen_clone.set(count.get(rt)?);
///         Ok(())
///     })
///     .unwrap();
///
/// count.set(&rt, 5).unwrap();
/// assert_eq!(seen.get(), 5);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Effect {
    id: NodeId,
}

impl Runtime {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately, inside a transaction, to establish
    /// initial dependencies. If that first run fails the effect is disposed
    /// and the error returned.
    pub fn create_effect<F>(&self, run: F) -> Result<Effect>
    where
        F: Fn(&Runtime) -> Result<()> + 'static,
    {
        let id = self.register_node(NodeState::effect(Rc::new(run)));
        trace!(effect = %id, "effect created");

        match self.run_in_transaction(|| self.run_effect(id)) {
            Ok(Ok(())) => Ok(Effect { id }),
            Ok(Err(error)) | Err(error) => {
                self.dispose_node(id);
                Err(error)
            }
        }
    }

    /// Run an effect once, replacing its dependency set.
    pub(crate) fn run_effect(&self, id: NodeId) -> Result<()> {
        let run = {
            let mut graph = self.graph.borrow_mut();
            let node = graph.get_node_mut(id).ok_or(ReactiveError::Disposed(id))?;
            let scope = node.scope();
            let NodeState::Effect(state) = &mut node.state else {
                return Err(ReactiveError::TypeMismatch(id));
            };
            if state.running {
                None
            } else {
                state.running = true;
                Some((state.run.clone(), scope))
            }
        };

        let Some((run, scope)) = run else {
            let error = ReactiveError::CyclicDependency {
                nodes: self.evaluation_chain_from(id),
            };
            self.poison(&error);
            return Err(error);
        };

        let ctx = ReactiveContext::enter(self, id);
        let result = self.run_in_scope(scope, || run(self));
        let observed = ctx.finish();

        let mut graph = self.graph.borrow_mut();
        let dependencies = {
            // The callback may have disposed its own effect
            let Some(node) = graph.get_node_mut(id) else {
                return result;
            };
            if let NodeState::Effect(state) = &mut node.state {
                state.running = false;
                state.run_count += 1;
            }
            match &result {
                Ok(()) => observed,
                Err(_) => {
                    let mut merged = node.dependencies().clone();
                    merged.extend(observed);
                    merged
                }
            }
        };
        graph.replace_dependencies(id, dependencies);
        trace!(effect = %id, ok = result.is_ok(), "effect ran");
        result
    }

    fn effect_run_count(&self, id: NodeId) -> Option<usize> {
        let graph = self.graph.borrow();
        match &graph.get_node(id)?.state {
            NodeState::Effect(state) => Some(state.run_count),
            _ => None,
        }
    }
}

impl Effect {
    /// Get the effect's unique ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Run the effect now, outside the normal propagation.
    ///
    /// Writes it performs are batched and propagated when it returns.
    pub fn run(&self, rt: &Runtime) -> Result<()> {
        rt.run_in_transaction(|| rt.run_effect(self.id))?
    }

    /// Get the number of times the effect has run. Zero once disposed.
    pub fn run_count(&self, rt: &Runtime) -> usize {
        rt.effect_run_count(self.id).unwrap_or(0)
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self, rt: &Runtime) -> usize {
        rt.dependencies_of(self.id).len()
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self, rt: &Runtime) -> bool {
        !rt.contains(self.id)
    }

    /// Dispose of the effect.
    ///
    /// After disposal, the effect will not run again.
    pub fn dispose(self, rt: &Runtime) -> bool {
        rt.dispose_node(self.id)
    }
}

impl Reactive for Effect {
    fn node_id(&self) -> NodeId {
        self.id
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect").field("id", &self.id).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;

    fn counter() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let count = Rc::new(Cell::new(0));
        (count.clone(), count)
    }

    #[test]
    fn effect_runs_on_creation() {
        let rt = Runtime::new();
        let (runs, runs_clone) = counter();

        let effect = rt
            .create_effect(move |_| {
                runs_clone.set(runs_clone.get() + 1);
                Ok(())
            })
            .unwrap();

        // Effect should have run once on creation
        assert_eq!(runs.get(), 1);
        assert_eq!(effect.run_count(&rt), 1);
    }

    #[test]
    fn effect_reruns_when_a_dependency_changes() {
        let rt = Runtime::new();
        let count = rt.create_signal(0);
        let effect = rt
            .create_effect(move |rt| {
                count.get(rt)?;
                Ok(())
            })
            .unwrap();

        count.set(&rt, 1).unwrap();
        count.set(&rt, 2).unwrap();
        assert_eq!(effect.run_count(&rt), 3);
        assert_eq!(effect.dependency_count(&rt), 1);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let rt = Runtime::new();
        let count = rt.create_signal(0);
        let (runs, runs_clone) = counter();
        let effect = rt
            .create_effect(move |rt| {
                count.get(rt)?;
                runs_clone.set(runs_clone.get() + 1);
                Ok(())
            })
            .unwrap();

        assert!(effect.dispose(&rt));
        assert!(effect.is_disposed(&rt));
        assert_eq!(count.subscriber_count(&rt), 0);

        count.set(&rt, 1).unwrap();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn effect_replaces_stale_dependencies() {
        let rt = Runtime::new();
        let flag = rt.create_signal(true);
        let a = rt.create_signal(0);
        let b = rt.create_signal(0);
        let effect = rt
            .create_effect(move |rt| {
                if flag.get(rt)? {
                    a.get(rt)?;
                    b.get(rt)?;
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(effect.dependency_count(&rt), 3);

        flag.set(&rt, false).unwrap();
        assert_eq!(effect.dependency_count(&rt), 1);
        assert_eq!(a.subscriber_count(&rt), 0);

        // No longer observed
        a.set(&rt, 5).unwrap();
        assert_eq!(effect.run_count(&rt), 2);
    }

    #[test]
    fn failing_first_run_disposes_the_effect() {
        let rt = Runtime::new();
        let count = rt.create_signal(0);
        let err = rt
            .create_effect(move |rt| {
                count.get(rt)?;
                Err(ReactiveError::callback("boom"))
            })
            .unwrap_err();

        assert_eq!(err, ReactiveError::Callback("boom".into()));
        assert_eq!(count.subscriber_count(&rt), 0);
        assert_eq!(rt.node_count(), 1);
    }

    #[test]
    fn failing_effect_is_isolated_and_retried() {
        let rt = Runtime::new();
        let count = rt.create_signal(0);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let failing = rt
            .create_effect(move |rt| {
                if count.get(rt)? == 1 {
                    return Err(ReactiveError::callback("odd state"));
                }
                Ok(())
            })
            .unwrap();
        let seen_clone = seen.clone();
        let _sibling = rt
            .create_effect(move |rt| {
                seen_clone.borrow_mut().push(count.get(rt)?);
                Ok(())
            })
            .unwrap();

        count.set(&rt, 1).unwrap();
        assert_eq!(*seen.borrow(), vec![0, 1]);
        let failures = rt.take_effect_failures();
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            &failures[0],
            ReactiveError::EffectFailure { effect, .. } if *effect == failing.id()
        ));

        // Dependencies survive the failure, so the next write retries it
        assert_eq!(failing.dependency_count(&rt), 1);
        count.set(&rt, 2).unwrap();
        assert_eq!(failing.run_count(&rt), 3);
        assert!(rt.take_effect_failures().is_empty());
    }

    #[test]
    fn manual_run_tracks_run_count() {
        let rt = Runtime::new();
        let effect = rt.create_effect(|_| Ok(())).unwrap();
        effect.run(&rt).unwrap();
        effect.run(&rt).unwrap();
        assert_eq!(effect.run_count(&rt), 3);
    }
}
