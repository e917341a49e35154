//! Geometry Types
//!
//! Sizes and positions are `f32` logical pixels. Offsets are relative to the
//! parent widget; absolute bounds are resolved by the invalidation tree.

use serde::{Deserialize, Serialize};

use crate::error::MeasureError;

/// Two-dimensional size.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    /// The width in pixels.
    pub width: f32,
    /// The height in pixels.
    pub height: f32,
}

impl Size {
    /// A size with zero width and height.
    pub const ZERO: Self = Self::new(0.0, 0.0);

    /// Constructs a [`Size`] with the given `width` and `height`.
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Returns true if either dimension is zero or negative.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// A position relative to some origin.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// The x-coordinate in pixels.
    pub x: f32,
    /// The y-coordinate in pixels.
    pub y: f32,
}

impl Point {
    /// The origin.
    pub const ZERO: Self = Self::new(0.0, 0.0);

    /// Constructs a [`Point`] at the given `x` and `y`.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Component-wise sum.
    #[must_use]
    pub fn offset_by(self, other: Point) -> Self {
        Self::new(self.x + other.x, self.y + other.y)
    }
}

/// Axis-aligned rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Top-left corner.
    pub origin: Point,
    /// Extent from the origin.
    pub size: Size,
}

impl Rect {
    /// Creates a new [`Rect`] with the provided `origin` and `size`.
    #[must_use]
    pub const fn new(origin: Point, size: Size) -> Self {
        Self { origin, size }
    }

    /// Creates a rectangle from its coordinates.
    #[must_use]
    pub const fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(Point::new(x, y), Size::new(width, height))
    }

    /// Returns the minimum x-coordinate (left edge).
    #[must_use]
    pub fn min_x(&self) -> f32 {
        self.origin.x
    }

    /// Returns the minimum y-coordinate (top edge).
    #[must_use]
    pub fn min_y(&self) -> f32 {
        self.origin.y
    }

    /// Returns the maximum x-coordinate (right edge).
    #[must_use]
    pub fn max_x(&self) -> f32 {
        self.origin.x + self.size.width
    }

    /// Returns the maximum y-coordinate (bottom edge).
    #[must_use]
    pub fn max_y(&self) -> f32 {
        self.origin.y + self.size.height
    }

    /// Returns true if the rectangle covers no area.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size.is_empty()
    }

    /// Whether the two rectangles share any area.
    #[must_use]
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min_x() < other.max_x()
            && other.min_x() < self.max_x()
            && self.min_y() < other.max_y()
            && other.min_y() < self.max_y()
    }

    /// Smallest rectangle containing both.
    #[must_use]
    pub fn union(&self, other: &Rect) -> Rect {
        let min_x = self.min_x().min(other.min_x());
        let min_y = self.min_y().min(other.min_y());
        let max_x = self.max_x().max(other.max_x());
        let max_y = self.max_y().max(other.max_y());
        Rect::from_xywh(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    /// The same rectangle moved by `offset`.
    #[must_use]
    pub fn translate(&self, offset: Point) -> Rect {
        Rect::new(self.origin.offset_by(offset), self.size)
    }
}

/// Merge overlapping rectangles until no two of the result overlap.
///
/// Empty rectangles are dropped.
pub fn coalesce_rects(rects: &[Rect]) -> Vec<Rect> {
    let mut out: Vec<Rect> = Vec::with_capacity(rects.len());
    for rect in rects.iter().filter(|r| !r.is_empty()) {
        let mut merged = *rect;
        // Each merge can grow the rect into others already kept
        loop {
            let Some(pos) = out.iter().position(|r| r.intersects(&merged)) else {
                break;
            };
            merged = merged.union(&out.swap_remove(pos));
        }
        out.push(merged);
    }
    out
}

/// Layout constraints passed from parent to child.
///
/// A child must pick a size with `min <= size <= max` on both axes. `max`
/// may be infinite.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    /// Smallest allowed size.
    pub min: Size,
    /// Largest allowed size.
    pub max: Size,
}

impl Constraints {
    /// Constraints between `min` and `max`.
    #[must_use]
    pub const fn new(min: Size, max: Size) -> Self {
        Self { min, max }
    }

    /// Constraints that only admit `size`.
    #[must_use]
    pub const fn tight(size: Size) -> Self {
        Self::new(size, size)
    }

    /// Constraints from zero up to `max`.
    #[must_use]
    pub const fn loose(max: Size) -> Self {
        Self::new(Size::ZERO, max)
    }

    /// Constraints that admit any size.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self::new(Size::ZERO, Size::new(f32::INFINITY, f32::INFINITY))
    }

    /// Reject constraints no size can satisfy.
    pub fn validate(&self) -> Result<(), MeasureError> {
        let bounds = [self.min.width, self.min.height, self.max.width, self.max.height];
        if bounds.iter().any(|v| v.is_nan()) {
            return Err(MeasureError::InvalidConstraints(format!(
                "NaN bound in {self:?}"
            )));
        }
        if self.max.width < self.min.width || self.max.height < self.min.height {
            return Err(MeasureError::InvalidConstraints(format!(
                "max below min in {self:?}"
            )));
        }
        Ok(())
    }

    /// Clamp `size` into these constraints. NaN components become the
    /// minimum.
    #[must_use]
    pub fn constrain(&self, size: Size) -> Size {
        Size::new(
            clamp_axis(size.width, self.min.width, self.max.width),
            clamp_axis(size.height, self.min.height, self.max.height),
        )
    }

    /// The same maximum with the minimum relaxed to zero.
    #[must_use]
    pub fn loosen(&self) -> Self {
        Self::loose(self.max)
    }
}

fn clamp_axis(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        return min;
    }
    value.max(min).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constrain_clamps_each_axis() {
        let c = Constraints::new(Size::new(10.0, 10.0), Size::new(100.0, 50.0));
        assert_eq!(c.constrain(Size::new(5.0, 80.0)), Size::new(10.0, 50.0));
        assert_eq!(c.constrain(Size::new(42.0, 20.0)), Size::new(42.0, 20.0));
    }

    #[test]
    fn nan_sizes_clamp_to_the_minimum() {
        let c = Constraints::new(Size::new(3.0, 4.0), Size::new(10.0, 10.0));
        assert_eq!(c.constrain(Size::new(f32::NAN, f32::NAN)), Size::new(3.0, 4.0));
    }

    #[test]
    fn unbounded_keeps_large_sizes() {
        let c = Constraints::unbounded();
        assert_eq!(c.constrain(Size::new(1e9, 2.0)), Size::new(1e9, 2.0));
    }

    #[test]
    fn validate_rejects_inverted_and_nan_bounds() {
        let inverted = Constraints::new(Size::new(10.0, 0.0), Size::new(5.0, 5.0));
        assert!(matches!(
            inverted.validate(),
            Err(MeasureError::InvalidConstraints(_))
        ));
        let nan = Constraints::loose(Size::new(f32::NAN, 1.0));
        assert!(nan.validate().is_err());
        assert!(Constraints::tight(Size::new(4.0, 4.0)).validate().is_ok());
        assert!(Constraints::unbounded().validate().is_ok());
    }

    #[test]
    fn rect_intersection_and_union() {
        let a = Rect::from_xywh(0.0, 0.0, 10.0, 10.0);
        let b = Rect::from_xywh(5.0, 5.0, 10.0, 10.0);
        let c = Rect::from_xywh(10.0, 0.0, 5.0, 5.0);
        assert!(a.intersects(&b));
        // Touching edges do not overlap
        assert!(!a.intersects(&c));
        assert_eq!(a.union(&b), Rect::from_xywh(0.0, 0.0, 15.0, 15.0));
    }

    #[test]
    fn coalescing_merges_chains_of_overlaps() {
        let rects = [
            Rect::from_xywh(0.0, 0.0, 10.0, 10.0),
            Rect::from_xywh(50.0, 50.0, 5.0, 5.0),
            Rect::from_xywh(20.0, 0.0, 10.0, 10.0),
            // Bridges the first and third
            Rect::from_xywh(5.0, 2.0, 20.0, 2.0),
            Rect::from_xywh(0.0, 0.0, 0.0, 0.0),
        ];
        let merged = coalesce_rects(&rects);
        assert_eq!(merged.len(), 2);
        assert!(merged.contains(&Rect::from_xywh(0.0, 0.0, 30.0, 10.0)));
        assert!(merged.contains(&Rect::from_xywh(50.0, 50.0, 5.0, 5.0)));
    }
}
