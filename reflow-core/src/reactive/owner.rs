//! Owner Scopes
//!
//! An owner groups the reactive nodes created on behalf of one piece of UI
//! (typically a widget) so they can be disposed together. Owners form a
//! tree: disposing an owner disposes its child owners first, then its own
//! nodes in reverse creation order.
//!
//! Every computed and effect also gets a scope of its own. Nodes created
//! while it runs land there, and the scope is reset before the next run.

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace};

use super::Runtime;
use crate::graph::NodeId;

/// Identifier of an owner scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
struct OwnerScope {
    parent: Option<OwnerId>,
    children: IndexSet<OwnerId>,
    nodes: IndexSet<NodeId>,
}

/// The owner tree of a runtime plus the stack of active scopes.
#[derive(Debug, Default)]
pub(crate) struct OwnerTree {
    next_id: u64,
    scopes: IndexMap<OwnerId, OwnerScope>,
    active: Vec<OwnerId>,
}

impl OwnerTree {
    fn create(&mut self, parent: Option<OwnerId>) -> OwnerId {
        let id = OwnerId(self.next_id);
        self.next_id += 1;

        let parent = parent.filter(|p| self.scopes.contains_key(p));
        if let Some(parent) = parent {
            if let Some(scope) = self.scopes.get_mut(&parent) {
                scope.children.insert(id);
            }
        }
        self.scopes.insert(
            id,
            OwnerScope {
                parent,
                ..OwnerScope::default()
            },
        );
        id
    }

    pub(crate) fn adopt(&mut self, owner: OwnerId, node: NodeId) {
        if let Some(scope) = self.scopes.get_mut(&owner) {
            scope.nodes.insert(node);
        }
    }

    pub(crate) fn forget_node(&mut self, owner: OwnerId, node: NodeId) {
        if let Some(scope) = self.scopes.get_mut(&owner) {
            scope.nodes.shift_remove(&node);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.scopes.clear();
        self.active.clear();
    }
}

/// Pops the active owner when the scope body returns or unwinds.
struct ActiveOwnerGuard<'rt>(&'rt Runtime);

impl Drop for ActiveOwnerGuard<'_> {
    fn drop(&mut self) {
        self.0.owners.borrow_mut().active.pop();
    }
}

impl Runtime {
    /// Create an owner scope, optionally nested under `parent`.
    pub fn create_owner(&self, parent: Option<OwnerId>) -> OwnerId {
        self.owners.borrow_mut().create(parent)
    }

    /// Run `f` with `owner` as the current owner: every node created inside
    /// is disposed along with it.
    pub fn with_owner<R>(&self, owner: OwnerId, f: impl FnOnce() -> R) -> R {
        self.owners.borrow_mut().active.push(owner);
        let _guard = ActiveOwnerGuard(self);
        f()
    }

    /// The innermost owner entered with [`with_owner`](Self::with_owner).
    pub fn current_owner(&self) -> Option<OwnerId> {
        self.owners.borrow().active.last().copied()
    }

    /// Whether `owner` is still alive.
    pub fn owner_exists(&self, owner: OwnerId) -> bool {
        self.owners.borrow().scopes.contains_key(&owner)
    }

    /// Nodes owned directly by `owner`, in creation order.
    pub fn owned_nodes(&self, owner: OwnerId) -> Vec<NodeId> {
        self.owners
            .borrow()
            .scopes
            .get(&owner)
            .map(|scope| scope.nodes.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Dispose `owner`, its descendants and every node they own.
    ///
    /// Child owners go first; within an owner, nodes are disposed in reverse
    /// creation order. Returns the number of nodes disposed.
    pub fn dispose_owner(&self, owner: OwnerId) -> usize {
        if !self.owner_exists(owner) {
            return 0;
        }
        let disposed = self.reset_owner(owner);

        let mut owners = self.owners.borrow_mut();
        if let Some(scope) = owners.scopes.shift_remove(&owner) {
            if let Some(parent) = scope.parent.and_then(|p| owners.scopes.get_mut(&p)) {
                parent.children.shift_remove(&owner);
            }
        }
        debug!(owner = owner.raw(), disposed, "owner disposed");
        disposed
    }

    /// Dispose the child owners and nodes of `owner`, keeping the scope
    /// itself alive. Returns the number of nodes disposed.
    pub(crate) fn reset_owner(&self, owner: OwnerId) -> usize {
        let (children, nodes) = {
            let owners = self.owners.borrow();
            let Some(scope) = owners.scopes.get(&owner) else {
                return 0;
            };
            let children: Vec<OwnerId> = scope.children.iter().copied().collect();
            let nodes: Vec<NodeId> = scope.nodes.iter().copied().collect();
            (children, nodes)
        };

        let mut disposed = 0;
        // Later children are disposed first
        for child in children.into_iter().rev() {
            disposed += self.dispose_owner(child);
        }
        for node in nodes.into_iter().rev() {
            if self.dispose_node(node) {
                disposed += 1;
            }
        }
        if disposed > 0 {
            trace!(owner = owner.raw(), disposed, "owner reset");
        }
        disposed
    }

    /// Run `f` with `scope` cleared and active, so nodes left over from the
    /// previous run are released and new ones are adopted by it.
    pub(crate) fn run_in_scope<R>(&self, scope: Option<OwnerId>, f: impl FnOnce() -> R) -> R {
        match scope {
            Some(scope) => {
                self.reset_owner(scope);
                self.with_owner(scope, f)
            }
            None => f(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn nodes_created_under_an_owner_are_adopted() {
        let rt = Runtime::new();
        let owner = rt.create_owner(None);

        let (signal, computed) = rt.with_owner(owner, || {
            assert_eq!(rt.current_owner(), Some(owner));
            let signal = rt.create_signal(1);
            let computed = rt.create_computed(move |rt| Ok(signal.get(rt)? + 1));
            (signal, computed)
        });
        assert_eq!(rt.current_owner(), None);

        assert_eq!(rt.owned_nodes(owner), vec![signal.id(), computed.id()]);
    }

    #[test]
    fn dispose_owner_removes_children_first() {
        let rt = Runtime::new();
        let parent = rt.create_owner(None);
        let child = rt.create_owner(Some(parent));
        let count = rt.create_signal(0);
        let runs = Rc::new(RefCell::new(0));

        let parent_effect = rt.with_owner(parent, || {
            let runs = runs.clone();
            rt.create_effect(move |rt| {
                count.get(rt)?;
                *runs.borrow_mut() += 1;
                Ok(())
            })
            .unwrap()
        });
        let child_effect = rt.with_owner(child, || {
            rt.create_effect(move |rt| {
                count.get(rt)?;
                Ok(())
            })
            .unwrap()
        });
        assert_eq!(count.subscriber_count(&rt), 2);

        assert_eq!(rt.dispose_owner(parent), 2);
        assert!(parent_effect.is_disposed(&rt));
        assert!(child_effect.is_disposed(&rt));
        assert!(!rt.owner_exists(child));
        assert_eq!(count.subscriber_count(&rt), 0);

        count.set(&rt, 1).unwrap();
        assert_eq!(*runs.borrow(), 1);
        assert_eq!(rt.dispose_owner(parent), 0);
    }

    #[test]
    fn disposing_a_child_owner_detaches_it_from_the_parent() {
        let rt = Runtime::new();
        let parent = rt.create_owner(None);
        let child = rt.create_owner(Some(parent));
        rt.with_owner(child, || rt.create_signal(0));

        assert_eq!(rt.dispose_owner(child), 1);
        assert!(rt.owner_exists(parent));
        assert!(rt.owners.borrow().scopes[&parent].children.is_empty());
    }

    #[test]
    fn disposing_a_node_directly_forgets_it() {
        let rt = Runtime::new();
        let owner = rt.create_owner(None);
        let signal = rt.with_owner(owner, || rt.create_signal(0));
        signal.dispose(&rt);
        assert!(rt.owned_nodes(owner).is_empty());
    }

    #[test]
    fn rerunning_an_effect_releases_what_it_created() {
        let rt = Runtime::new();
        let toggle = rt.create_signal(0);
        let upstream = rt.create_signal(0);
        let inner_runs = Rc::new(RefCell::new(0));

        let runs = inner_runs.clone();
        let _outer = rt
            .create_effect(move |rt| {
                toggle.get(rt)?;
                let runs = runs.clone();
                rt.create_effect(move |rt| {
                    upstream.get(rt)?;
                    *runs.borrow_mut() += 1;
                    Ok(())
                })?;
                Ok(())
            })
            .unwrap();
        assert_eq!(upstream.subscriber_count(&rt), 1);

        toggle.set(&rt, 1).unwrap();
        toggle.set(&rt, 2).unwrap();
        assert_eq!(upstream.subscriber_count(&rt), 1);
        assert_eq!(*inner_runs.borrow(), 3);

        upstream.set(&rt, 1).unwrap();
        assert_eq!(*inner_runs.borrow(), 4);
    }

    #[test]
    fn computed_scope_is_disposed_with_the_computed() {
        let rt = Runtime::new();
        let owner = rt.create_owner(None);
        let upstream = rt.create_signal(1);

        let computed = rt.with_owner(owner, || {
            rt.create_computed(move |rt| {
                let inner = rt.create_computed(move |rt| upstream.get(rt));
                inner.get(rt)
            })
        });
        assert_eq!(computed.get(&rt).unwrap(), 1);
        assert_eq!(upstream.subscriber_count(&rt), 1);

        // The outer computed plus the one its evaluation created
        assert_eq!(rt.dispose_owner(owner), 2);
        assert_eq!(upstream.subscriber_count(&rt), 0);
    }

    #[test]
    fn owner_scopes_nest() {
        let rt = Runtime::new();
        let outer = rt.create_owner(None);
        let inner = rt.create_owner(Some(outer));
        rt.with_owner(outer, || {
            rt.with_owner(inner, || assert_eq!(rt.current_owner(), Some(inner)));
            assert_eq!(rt.current_owner(), Some(outer));
        });
    }
}
