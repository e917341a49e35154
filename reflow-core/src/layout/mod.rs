//! Layout
//!
//! Geometry types and the per-node layout cache. Measurement is driven by
//! the frame driver's layout pass; widgets see only [`Constraints`] and a
//! [`MeasureCtx`] for reaching their children.

mod cache;
mod geometry;

pub use cache::{LayoutEntry, LayoutStats, MeasureCtx};
pub use geometry::{coalesce_rects, Constraints, Point, Rect, Size};
