//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds, and
//! effects. These primitives form the foundation of Reflow's fine-grained
//! reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a computed or effect), the signal
//! automatically registers that context as a dependent. When the signal's
//! value changes, all dependents are notified.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates only
//! when one of its dependencies changes, and only when something reads it.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects are how reactive state reaches the widget
//! tree.
//!
//! ## Transactions and owners
//!
//! Writes are batched into transactions; effects run once when the outermost
//! transaction closes. Owners group nodes so a widget's reactive state can be
//! disposed in one call.
//!
//! # Implementation Notes
//!
//! The runtime is an explicit value rather than a global. Every handle is a
//! small `Copy` id that is only meaningful together with the `&Runtime` it
//! was created by.

mod computed;
mod context;
mod effect;
mod owner;
mod runtime;
mod signal;
mod transaction;

pub use computed::Computed;
pub use context::ReactiveContext;
pub use effect::Effect;
pub use owner::OwnerId;
pub use runtime::{Reactive, Runtime};
pub use signal::Signal;

pub(crate) use owner::OwnerTree;
