//! Layout Cache
//!
//! Every widget node keeps a single cache entry: the constraints it was last
//! measured with and the size that came out. A node that does not need
//! layout and is asked again with the same constraints answers from the
//! entry without touching the widget.
//!
//! Containers reach their children only through [`MeasureCtx`], so child
//! measurements hit the same cache.

use serde::Serialize;
use tracing::{trace, warn};

use super::{Constraints, Point, Size};
use crate::error::{MeasureError, TreeError};
use crate::invalidation::{InvalidationTree, WidgetId};

/// A node's last measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayoutEntry {
    /// Constraints the node was measured with.
    pub constraints: Constraints,
    /// The clamped size it reported.
    pub size: Size,
}

/// Counters for the measurements since the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LayoutStats {
    /// Widgets whose `measure` was invoked.
    pub measured: usize,
    /// Requests answered from the cache.
    pub cache_hits: usize,
    /// Measurements that failed and were replaced by a zero size.
    pub failures: usize,
}

impl InvalidationTree {
    /// Measure `id` under `constraints`, using the cached entry when the
    /// node is clean and the constraints are unchanged.
    ///
    /// A fresh measurement is clamped into `constraints`, stored, and clears
    /// `needs_layout`. If the size changed the node also needs paint.
    pub fn measure(&mut self, id: WidgetId, constraints: Constraints) -> Result<Size, MeasureError> {
        constraints.validate()?;

        let node = self.node_mut(id)?;
        if !node.flags.needs_layout() {
            if let Some(entry) = node.layout.filter(|e| e.constraints == constraints) {
                self.stats.cache_hits += 1;
                trace!(widget = ?id, "layout cache hit");
                return Ok(entry.size);
            }
        }

        let Some(mut widget) = node.widget.take() else {
            return Err(MeasureError::Widget(format!(
                "{} is already being measured",
                node.name
            )));
        };
        let result = widget.measure(&constraints, &mut MeasureCtx { tree: self, node: id });
        self.node_mut(id)?.widget = Some(widget);

        let size = constraints.constrain(result?);
        self.store_layout(id, constraints, size)?;
        self.stats.measured += 1;
        trace!(widget = ?id, width = size.width, height = size.height, "measured");
        Ok(size)
    }

    /// [`measure`](Self::measure), substituting `Size::ZERO` on failure.
    ///
    /// The failure is logged and kept for
    /// [`take_measure_failures`](Self::take_measure_failures); the node is
    /// considered laid out so the next frame does not retry it forever.
    pub fn measure_or_zero(&mut self, id: WidgetId, constraints: Constraints) -> Size {
        match self.measure(id, constraints) {
            Ok(size) => size,
            Err(error) => {
                warn!(widget = ?id, error = %error, "measurement failed, using zero size");
                self.stats.failures += 1;
                // A stale id has no node to store into
                if !matches!(error, MeasureError::Tree(_)) {
                    let _ = self.store_layout(id, constraints, Size::ZERO);
                }
                self.failures.push((id, error));
                Size::ZERO
            }
        }
    }

    fn store_layout(
        &mut self,
        id: WidgetId,
        constraints: Constraints,
        size: Size,
    ) -> Result<(), TreeError> {
        let node = self.node_mut(id)?;
        let previous = node.layout.map(|entry| entry.size);
        node.layout = Some(LayoutEntry { constraints, size });
        self.clear_needs_layout(id)?;
        if previous != Some(size) {
            self.mark_needs_paint(id)?;
        }
        Ok(())
    }

    /// Counters accumulated since the last [`take_layout_stats`](Self::take_layout_stats).
    pub fn layout_stats(&self) -> LayoutStats {
        self.stats
    }

    /// Return and reset the counters.
    pub fn take_layout_stats(&mut self) -> LayoutStats {
        std::mem::take(&mut self.stats)
    }

    /// Drain the measurement failures recorded so far.
    pub fn take_measure_failures(&mut self) -> Vec<(WidgetId, MeasureError)> {
        std::mem::take(&mut self.failures)
    }
}

/// Access to a widget's children while it is being measured.
pub struct MeasureCtx<'a> {
    tree: &'a mut InvalidationTree,
    node: WidgetId,
}

impl MeasureCtx<'_> {
    /// The widget being measured.
    pub fn node(&self) -> WidgetId {
        self.node
    }

    /// Children of the widget being measured, in order.
    pub fn children(&self) -> Vec<WidgetId> {
        self.tree
            .children(self.node)
            .map(<[WidgetId]>::to_vec)
            .unwrap_or_default()
    }

    /// Measure a child through the cache.
    ///
    /// A child whose own measurement fails reports `Size::ZERO`; only
    /// passing a node that is not a child is an error.
    pub fn measure_child(
        &mut self,
        child: WidgetId,
        constraints: Constraints,
    ) -> Result<Size, MeasureError> {
        self.check_child(child)?;
        Ok(self.tree.measure_or_zero(child, constraints))
    }

    /// Position a child relative to the widget being measured.
    ///
    /// Moving a child repaints its whole subtree.
    pub fn place_child(&mut self, child: WidgetId, offset: Point) -> Result<(), MeasureError> {
        self.check_child(child)?;
        let node = self.tree.node_mut(child)?;
        if node.offset != offset {
            node.offset = offset;
            self.tree.mark_subtree_needs_paint(child)?;
        }
        Ok(())
    }

    fn check_child(&self, child: WidgetId) -> Result<(), MeasureError> {
        if self.tree.parent(child)? != Some(self.node) {
            return Err(TreeError::InvalidParent {
                parent: self.node,
                child,
            }
            .into());
        }
        Ok(())
    }
}
