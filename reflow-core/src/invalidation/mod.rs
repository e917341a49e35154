//! Invalidation Tree
//!
//! This module tracks which widgets need layout or paint. It mirrors the
//! widget hierarchy and implements the propagation rules:
//!
//! - `needs_layout` flows upward to the root (or the nearest relayout
//!   boundary), since a child's size can change its parent's.
//! - `needs_paint` stays on the node that changed.
//!
//! The frame driver collects the minimal set of layout roots, lays them out
//! and clears the flags once each pass completes.

mod flags;
mod tree;

pub use flags::InvalidationFlags;
pub use tree::{InvalidationTree, WidgetId};
