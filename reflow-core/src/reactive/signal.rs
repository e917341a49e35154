//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (computed/effect), the
//!    signal registers that context as a subscriber.
//!
//! 2. When a signal's value changes, every computed downstream of it is
//!    marked dirty and the signal joins the current transaction.
//!
//! 3. When the transaction closes, dependent effects re-run.
//!
//! # Equality
//!
//! A write that is observably equal to the current value is dropped before
//! it reaches the graph. The default policy is `PartialEq`; signals over
//! types without a useful `PartialEq` can supply their own.
//!
//! # Memory Layout
//!
//! A `Signal<T>` is only an id: the value, version and subscriber set live
//! in the runtime's graph. Handles are `Copy` and can be captured freely by
//! closures, including ones sent to other threads.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;

use tracing::trace;

use super::runtime::{Reactive, Runtime};
use crate::error::{ReactiveError, Result};
use crate::graph::{EqualityFn, NodeId, NodeKind, NodeState};

/// A reactive signal holding a value of type T.
///
/// # Example
///
/// ```rust
/// use reflow_core::reactive::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.create_signal(0);
///
/// // Read the value
/// assert_eq!(count.get(&rt).unwrap(), 0);
///
/// // Update the value (notifies subscribers)
/// count.set(&rt, 5).unwrap();
/// assert_eq!(count.get(&rt).unwrap(), 5);
/// ```
pub struct Signal<T> {
    id: NodeId,
    _marker: PhantomData<fn() -> T>,
}

impl Runtime {
    /// Create a new signal with the given initial value.
    ///
    /// Writes equal to the current value (by `PartialEq`) are ignored.
    pub fn create_signal<T>(&self, value: T) -> Signal<T>
    where
        T: Clone + PartialEq + 'static,
    {
        self.create_signal_with_equality(value, T::eq)
    }

    /// Create a new signal with a custom equality policy.
    ///
    /// `equals(current, new)` returning true drops the write. Pass
    /// `|_, _| false` to notify on every write.
    pub fn create_signal_with_equality<T, F>(&self, value: T, equals: F) -> Signal<T>
    where
        T: Clone + 'static,
        F: Fn(&T, &T) -> bool + 'static,
    {
        let equals: EqualityFn = Rc::new(move |current: &dyn Any, new: &dyn Any| {
            match (current.downcast_ref::<T>(), new.downcast_ref::<T>()) {
                (Some(current), Some(new)) => equals(current, new),
                _ => false,
            }
        });
        let id = self.register_node(NodeState::source(Box::new(value), equals));
        trace!(signal = %id, "signal created");
        Signal {
            id,
            _marker: PhantomData,
        }
    }

    fn read_signal<T: Clone + 'static>(&self, id: NodeId, tracked: bool) -> Result<T> {
        if tracked {
            self.track_dependency(id);
        }

        let graph = self.graph.borrow();
        let node = graph.get_node(id).ok_or(ReactiveError::Disposed(id))?;
        match &node.state {
            NodeState::Source(state) => state
                .value
                .downcast_ref::<T>()
                .cloned()
                .ok_or(ReactiveError::TypeMismatch(id)),
            _ => Err(ReactiveError::TypeMismatch(id)),
        }
    }

    fn write_signal<T: 'static>(&self, id: NodeId, value: T) -> Result<()> {
        // A write outside any transaction is a transaction of one write
        if !self.is_batching() {
            return self.run_in_transaction(|| self.write_signal(id, value))?;
        }

        let version = {
            let mut graph = self.graph.borrow_mut();
            let node = graph.get_node_mut(id).ok_or(ReactiveError::Disposed(id))?;
            let NodeState::Source(state) = &mut node.state else {
                return Err(ReactiveError::TypeMismatch(id));
            };
            if !state.value.is::<T>() {
                return Err(ReactiveError::TypeMismatch(id));
            }
            if (state.equals)(state.value.as_ref(), &value) {
                trace!(signal = %id, "write skipped, value unchanged");
                return Ok(());
            }
            state.value = Box::new(value);
            state.version += 1;
            state.version
        };

        self.write_epoch.set(self.write_epoch.get() + 1);
        let invalidated = self.graph.borrow_mut().mark_stale(id);
        self.enqueue_write(id);
        trace!(signal = %id, version, invalidated, "signal written");
        Ok(())
    }

    fn signal_version(&self, id: NodeId) -> Result<u64> {
        let graph = self.graph.borrow();
        let node = graph.get_node(id).ok_or(ReactiveError::Disposed(id))?;
        match node.kind() {
            NodeKind::Source => Ok(node.version()),
            _ => Err(ReactiveError::TypeMismatch(id)),
        }
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self, rt: &Runtime) -> Result<T> {
        rt.read_signal(self.id, true)
    }

    /// Get the current value without tracking dependencies.
    ///
    /// Use this when you need to read the value without establishing
    /// a reactive dependency.
    pub fn get_untracked(&self, rt: &Runtime) -> Result<T> {
        rt.read_signal(self.id, false)
    }

    /// Set a new value.
    ///
    /// Outside a transaction this propagates immediately; inside one the
    /// write is batched until the outermost transaction closes.
    pub fn set(&self, rt: &Runtime, value: T) -> Result<()> {
        rt.write_signal(self.id, value)
    }

    /// Update the value using a function.
    ///
    /// This is useful for updates that depend on the current value. The
    /// read is untracked.
    pub fn update<F>(&self, rt: &Runtime, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.get_untracked(rt)?;
        self.set(rt, f(&current))
    }

    /// Number of effective writes so far.
    pub fn version(&self, rt: &Runtime) -> Result<u64> {
        rt.signal_version(self.id)
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self, rt: &Runtime) -> usize {
        rt.subscribers_of(self.id).len()
    }

    /// Dispose the signal, detaching every subscriber.
    pub fn dispose(self, rt: &Runtime) -> bool {
        rt.dispose_node(self.id)
    }
}

impl<T> Reactive for Signal<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Signal<T> {}

impl<T> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Signal<T> {}

impl<T> Hash for Signal<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal").field("id", &self.id).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
