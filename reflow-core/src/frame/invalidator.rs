//! Invalidation requests from effects.
//!
//! Effects run inside the reactive runtime and cannot borrow the widget
//! tree. They record what to invalidate in an [`Invalidator`] instead; the
//! frame driver applies the queue once the transaction has drained.

use std::cell::RefCell;
use std::rc::Rc;

use crate::invalidation::{InvalidationFlags, WidgetId};

/// A shared queue of pending widget invalidations.
#[derive(Debug, Clone, Default)]
pub struct Invalidator {
    queue: Rc<RefCell<Vec<(WidgetId, InvalidationFlags)>>>,
}

impl Invalidator {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request `flags` on `widget`.
    pub fn invalidate(&self, widget: WidgetId, flags: InvalidationFlags) {
        self.queue.borrow_mut().push((widget, flags));
    }

    /// Request layout (and, through layout, possibly paint) on `widget`.
    pub fn needs_layout(&self, widget: WidgetId) {
        self.invalidate(widget, InvalidationFlags::LAYOUT);
    }

    /// Request paint on `widget`.
    pub fn needs_paint(&self, widget: WidgetId) {
        self.invalidate(widget, InvalidationFlags::PAINT);
    }

    /// Number of queued requests.
    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Take the queued requests in order.
    pub(crate) fn drain(&self) -> Vec<(WidgetId, InvalidationFlags)> {
        std::mem::take(&mut *self.queue.borrow_mut())
    }
}
