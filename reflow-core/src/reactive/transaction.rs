//! Transactions
//!
//! A transaction batches signal writes so that dependents observe them as
//! one coherent update. Transactions nest: only closing the outermost one
//! propagates the batch.
//!
//! # Propagation
//!
//! Propagation runs in rounds. Each round takes the signals written so far,
//! sorts everything downstream of them, refreshes the computeds that feed an
//! effect and then runs each effect once. Writes made by those effects land
//! in the next round. A run of rounds longer than the configured re-entrancy
//! depth is treated as a feedback loop and aborted.

use std::collections::HashSet;

use indexmap::IndexSet;
use tracing::{debug, trace, warn};

use super::Runtime;
use crate::error::{ReactiveError, Result};
use crate::graph::{NodeId, NodeKind};

/// Transaction-scoped state of a runtime.
#[derive(Debug, Default)]
pub(crate) struct Transaction {
    /// Nesting depth of open `run_in_transaction` calls.
    depth: usize,
    /// Set while the outermost transaction is propagating.
    flushing: bool,
    /// Signals written since the last propagation round.
    pending: IndexSet<NodeId>,
    /// Structural error hit while flushing, even if user code swallowed it.
    poisoned: Option<ReactiveError>,
}

impl Transaction {
    fn is_open(&self) -> bool {
        self.depth > 0 || self.flushing
    }

    pub(crate) fn forget(&mut self, node: NodeId) {
        self.pending.shift_remove(&node);
    }
}

/// Decrements the depth when the body returns or unwinds.
struct DepthGuard<'rt>(&'rt Runtime);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        let mut tx = self.0.transaction.borrow_mut();
        tx.depth = tx.depth.saturating_sub(1);
    }
}

/// Clears the flushing state when propagation ends, successfully or not.
struct FlushGuard<'rt>(&'rt Runtime);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        let mut tx = self.0.transaction.borrow_mut();
        tx.flushing = false;
        tx.poisoned = None;
    }
}

impl Runtime {
    /// Run `body` as one batch of writes.
    ///
    /// Transactions nest; effects run only when the outermost transaction
    /// closes. Structural errors (`CyclicDependency`, `MaxDepthExceeded`)
    /// abort propagation and are returned here. Writes already applied stay
    /// applied; effects that did not run yet are skipped.
    pub fn run_in_transaction<R>(&self, body: impl FnOnce() -> R) -> Result<R> {
        self.transaction.borrow_mut().depth += 1;
        let guard = DepthGuard(self);
        let out = body();
        drop(guard);

        let outermost = {
            let tx = self.transaction.borrow();
            tx.depth == 0 && !tx.flushing
        };
        if outermost {
            self.flush()?;
        }
        Ok(out)
    }

    /// Whether writes are currently being batched.
    pub fn is_batching(&self) -> bool {
        self.transaction.borrow().is_open()
    }

    /// Nesting depth of open transactions.
    pub fn transaction_depth(&self) -> usize {
        self.transaction.borrow().depth
    }

    /// Number of signals waiting for propagation.
    pub fn pending_writes(&self) -> usize {
        self.transaction.borrow().pending.len()
    }

    /// Queue a written signal for the next propagation round.
    pub(super) fn enqueue_write(&self, signal: NodeId) {
        self.transaction.borrow_mut().pending.insert(signal);
    }

    /// Record a structural error so the current flush aborts even if the
    /// caller that observed it did not propagate it.
    pub(super) fn poison(&self, error: &ReactiveError) {
        let mut tx = self.transaction.borrow_mut();
        if tx.flushing && tx.poisoned.is_none() {
            tx.poisoned = Some(error.clone());
        }
    }

    fn take_poison(&self) -> Option<ReactiveError> {
        self.transaction.borrow_mut().poisoned.take()
    }

    fn flush(&self) -> Result<()> {
        {
            let mut tx = self.transaction.borrow_mut();
            tx.flushing = true;
            tx.poisoned = None;
        }
        let guard = FlushGuard(self);

        let limit = self.config().max_reentrancy_depth;
        let mut round = 0_usize;
        let result = loop {
            let written = std::mem::take(&mut self.transaction.borrow_mut().pending);
            if written.is_empty() {
                break Ok(());
            }
            if round > limit {
                break Err(ReactiveError::MaxDepthExceeded { limit });
            }

            debug!(round, writes = written.len(), "propagating transaction");
            if let Err(error) = self.propagate(&written) {
                break Err(error);
            }
            round += 1;
        };

        if let Err(error) = &result {
            warn!(error = %error, "transaction aborted");
            self.transaction.borrow_mut().pending.clear();
        }
        drop(guard);
        result
    }

    /// One propagation round. Returns the number of effects that ran.
    fn propagate(&self, written: &IndexSet<NodeId>) -> Result<usize> {
        let (order, active) = {
            let graph = self.graph.borrow();
            let reached = graph.reachable_from(written.iter().copied());
            let order = graph.topological_order(&reached)?;
            let active: HashSet<NodeId> = graph.active_nodes(&order);
            (order, active)
        };

        // Bring every computed an effect may observe up to date first, so a
        // cycle surfaces before any effect has produced output.
        for &node in &order {
            if !active.contains(&node) || self.node_kind(node) != Some(NodeKind::Derived) {
                continue;
            }
            if let Err(error) = self.refresh_computed(node) {
                if error.is_structural() {
                    return Err(error);
                }
                // Left dirty; the effect reading it reports the failure.
                trace!(node = %node, error = %error, "computed refresh failed");
            }
        }
        if let Some(error) = self.take_poison() {
            return Err(error);
        }

        let mut ran = 0;
        for &node in &order {
            if self.node_kind(node) != Some(NodeKind::Effect) {
                continue;
            }
            match self.run_effect(node) {
                Ok(()) => ran += 1,
                Err(error) if error.is_structural() => return Err(error),
                Err(error) => self.report_effect_failure(node, &error),
            }
            if let Some(error) = self.take_poison() {
                return Err(error);
            }
        }

        trace!(reached = order.len(), effects = ran, "propagation round finished");
        Ok(ran)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::config::RuntimeConfig;
    use crate::reactive::Computed;

    #[test]
    fn nested_transactions_flush_once() {
        let rt = Runtime::new();
        let count = rt.create_signal(0);
        let runs = Rc::new(RefCell::new(Vec::new()));
        let runs_clone = runs.clone();
        let _effect = rt
            .create_effect(move |rt| {
                runs_clone.borrow_mut().push(count.get(rt)?);
                Ok(())
            })
            .unwrap();

        rt.run_in_transaction(|| {
            count.set(&rt, 1).unwrap();
            rt.run_in_transaction(|| count.set(&rt, 2).unwrap()).unwrap();
            assert_eq!(rt.transaction_depth(), 1);
            assert_eq!(rt.pending_writes(), 1);
            count.set(&rt, 3).unwrap();
        })
        .unwrap();

        assert_eq!(*runs.borrow(), vec![0, 3]);
        assert!(!rt.is_batching());
    }

    #[test]
    fn transaction_returns_body_value() {
        let rt = Runtime::new();
        assert_eq!(rt.run_in_transaction(|| 41 + 1).unwrap(), 42);
    }

    #[test]
    fn effect_writes_run_in_a_later_round() {
        let rt = Runtime::new();
        let input = rt.create_signal(1);
        let mirror = rt.create_signal(0);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let _copy = rt
            .create_effect(move |rt| {
                let value = input.get(rt)?;
                mirror.set(rt, value * 10)
            })
            .unwrap();
        let seen_clone = seen.clone();
        let _observe = rt
            .create_effect(move |rt| {
                seen_clone.borrow_mut().push(mirror.get(rt)?);
                Ok(())
            })
            .unwrap();

        input.set(&rt, 2).unwrap();
        assert_eq!(mirror.get(&rt).unwrap(), 20);
        assert_eq!(*seen.borrow(), vec![10, 20]);
    }

    #[test]
    fn runaway_feedback_hits_the_depth_limit() {
        let rt = Runtime::with_config(RuntimeConfig {
            max_reentrancy_depth: 5,
        });
        let counter = rt.create_signal(0_u32);
        let _feedback = rt
            .create_effect(move |rt| {
                let value = counter.get(rt)?;
                if value > 0 {
                    counter.set(rt, value + 1)?;
                }
                Ok(())
            })
            .unwrap();

        let err = counter.set(&rt, 1).unwrap_err();
        assert_eq!(err, ReactiveError::MaxDepthExceeded { limit: 5 });
        assert_eq!(rt.pending_writes(), 0);
        assert!(!rt.is_batching());

        // The runtime is still usable after an aborted transaction
        let other = rt.create_signal(0);
        other.set(&rt, 1).unwrap();
    }

    #[test]
    fn cycle_swallowed_by_a_computed_still_aborts() {
        let rt = Runtime::new();
        let gate = rt.create_signal(false);
        let slot: Rc<RefCell<Option<Computed<i32>>>> = Rc::new(RefCell::new(None));

        let slot_a = slot.clone();
        let a = rt.create_computed(move |rt| {
            if gate.get(rt)? {
                if let Some(b) = *slot_a.borrow() {
                    // Deliberately ignores the error
                    return Ok(b.get(rt).unwrap_or(0) + 1);
                }
            }
            Ok(0)
        });
        let b = rt.create_computed(move |rt| Ok(a.get(rt)? + 1));
        *slot.borrow_mut() = Some(b);

        let runs = Rc::new(RefCell::new(0));
        let runs_clone = runs.clone();
        let _observer = rt
            .create_effect(move |rt| {
                b.get(rt)?;
                *runs_clone.borrow_mut() += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(*runs.borrow(), 1);

        let err = gate.set(&rt, true).unwrap_err();
        assert!(matches!(err, ReactiveError::CyclicDependency { .. }));
        assert_eq!(*runs.borrow(), 1);
    }
}
