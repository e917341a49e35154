//! Dependency Graph
//!
//! This module implements the computational dependency graph that tracks
//! relationships between reactive values and computations.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes represent reactive values (signals) or computations (computeds,
//!   effects)
//! - Edges represent dependencies: if A depends on B, there is an edge from B
//!   to A
//!
//! When a signal changes, we traverse the graph to find all affected nodes
//! and mark them as dirty. The runtime then re-evaluates what is actually
//! observed.
//!
//! # Layout
//!
//! The graph is centralized and indexed by node ID. Each node stores both
//! directions of every edge (dependencies and dependents), so staleness walks
//! forward and disposal detaches a node from both sides in one place.

mod node;
mod scheduler;

pub use node::{Node, NodeId, NodeKind};
pub use scheduler::UpdateScheduler;

pub(crate) use node::{AnyValue, ComputeFn, EffectFn, EqualityFn, NodeState};
