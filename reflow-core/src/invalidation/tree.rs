//! Invalidation Tree
//!
//! Mirrors the widget hierarchy in a generational arena. Each node records
//! whether it needs layout or paint, its cached layout entry and where it was
//! last painted.
//!
//! # Propagation
//!
//! `needs_layout` travels upward: a child's size change may change its
//! parent's size. The walk stops at an ancestor that is already marked, or at
//! a relayout boundary that has been laid out before. `needs_paint` is local.
//!
//! # Handles
//!
//! A [`WidgetId`] is an index plus a generation. Removing a node bumps the
//! generation of its slot, so a stale id is detected instead of aliasing the
//! slot's next occupant.

use std::fmt;

use indexmap::IndexSet;
use smallvec::SmallVec;
use tracing::trace;

use super::InvalidationFlags;
use crate::error::{MeasureError, TreeError};
use crate::layout::{LayoutEntry, LayoutStats, Point, Rect};
use crate::reactive::OwnerId;
use crate::widget::{Capabilities, Widget};

/// Generational handle to a widget node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WidgetId {
    index: u32,
    generation: u32,
}

impl WidgetId {
    /// Slot index in the arena.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when this id was issued.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}v{}", self.index, self.generation)
    }
}

pub(crate) type ChildList = SmallVec<[WidgetId; 4]>;

pub(crate) struct WidgetNode {
    /// `None` while the widget is being measured.
    pub(crate) widget: Option<Box<dyn Widget>>,
    pub(crate) name: String,
    pub(crate) capabilities: Capabilities,
    pub(crate) parent: Option<WidgetId>,
    pub(crate) children: ChildList,
    pub(crate) flags: InvalidationFlags,
    pub(crate) layout: Option<LayoutEntry>,
    /// Offset from the parent's origin.
    pub(crate) offset: Point,
    /// Absolute bounds at the last paint.
    pub(crate) painted: Option<Rect>,
    pub(crate) owner: Option<OwnerId>,
}

struct Slot {
    generation: u32,
    node: Option<WidgetNode>,
}

/// The widget hierarchy plus its pending layout and paint work.
#[derive(Default)]
pub struct InvalidationTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    roots: ChildList,
    len: usize,
    /// Nodes with `LAYOUT` set, in marking order.
    pub(crate) layout_dirty: IndexSet<WidgetId>,
    /// Nodes with `PAINT` set, in marking order.
    pub(crate) pending_paint: IndexSet<WidgetId>,
    /// Areas uncovered by removed widgets.
    damage: Vec<Rect>,
    pub(crate) stats: LayoutStats,
    pub(crate) failures: Vec<(WidgetId, MeasureError)>,
}

impl InvalidationTree {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live widgets.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree holds no widget.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether `id` refers to a live widget.
    pub fn contains(&self, id: WidgetId) -> bool {
        self.node(id).is_ok()
    }

    pub(crate) fn node(&self, id: WidgetId) -> Result<&WidgetNode, TreeError> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
            .ok_or(TreeError::StaleWidget(id))
    }

    pub(crate) fn node_mut(&mut self, id: WidgetId) -> Result<&mut WidgetNode, TreeError> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(TreeError::StaleWidget(id))
    }

    /// Insert `widget` as the last child of `parent`, or as a new top-level
    /// root.
    ///
    /// The new node needs layout and paint; its parent needs layout.
    pub fn insert(
        &mut self,
        parent: Option<WidgetId>,
        widget: impl Widget,
    ) -> Result<WidgetId, TreeError> {
        self.insert_boxed(parent, Box::new(widget))
    }

    /// [`insert`](Self::insert) for an already boxed widget.
    pub fn insert_boxed(
        &mut self,
        parent: Option<WidgetId>,
        widget: Box<dyn Widget>,
    ) -> Result<WidgetId, TreeError> {
        if let Some(parent) = parent {
            self.node(parent)?;
        }

        let node = WidgetNode {
            name: widget.debug_name().to_owned(),
            capabilities: widget.capabilities(),
            widget: Some(widget),
            parent,
            children: ChildList::new(),
            flags: InvalidationFlags::empty(),
            layout: None,
            offset: Point::ZERO,
            painted: None,
            owner: None,
        };

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                WidgetId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                WidgetId {
                    index,
                    generation: 0,
                }
            }
        };
        self.len += 1;

        match parent {
            Some(parent) => self.node_mut(parent)?.children.push(id),
            None => self.roots.push(id),
        }
        trace!(widget = ?id, parent = ?parent, "widget inserted");

        self.mark_needs_paint(id)?;
        self.mark_needs_layout(id)?;
        Ok(id)
    }

    /// Remove `id` and its whole subtree.
    ///
    /// Returns the removed widgets with their owners, children before
    /// parents. Their last painted bounds become damage, and the parent
    /// needs layout.
    pub fn remove_subtree(
        &mut self,
        id: WidgetId,
    ) -> Result<Vec<(WidgetId, Option<OwnerId>)>, TreeError> {
        let parent = self.node(id)?.parent;
        let order = self.post_order(id);

        let mut removed = Vec::with_capacity(order.len());
        for node_id in order {
            let slot = &mut self.slots[node_id.index as usize];
            let Some(node) = slot.node.take() else {
                continue;
            };
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(node_id.index);
            self.len -= 1;

            if let Some(painted) = node.painted {
                self.damage.push(painted);
            }
            self.layout_dirty.shift_remove(&node_id);
            self.pending_paint.shift_remove(&node_id);
            removed.push((node_id, node.owner));
        }

        match parent {
            Some(parent) => {
                if let Ok(node) = self.node_mut(parent) {
                    node.children.retain(|child| *child != id);
                }
                self.mark_needs_layout(parent)?;
            }
            None => self.roots.retain(|root| *root != id),
        }
        trace!(widget = ?id, removed = removed.len(), "subtree removed");
        Ok(removed)
    }

    /// Nodes of the subtree rooted at `id`, children before parents.
    fn post_order(&self, id: WidgetId) -> Vec<WidgetId> {
        let mut out = Vec::new();
        let mut stack = vec![(id, false)];
        while let Some((node_id, expanded)) = stack.pop() {
            if expanded {
                out.push(node_id);
                continue;
            }
            let Ok(node) = self.node(node_id) else {
                continue;
            };
            stack.push((node_id, true));
            for child in node.children.iter().rev() {
                stack.push((*child, false));
            }
        }
        out
    }

    /// Nodes of the subtree rooted at `id`, parents before children, in
    /// child order.
    pub fn pre_order(&self, id: WidgetId) -> Vec<WidgetId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(node_id) = stack.pop() {
            let Ok(node) = self.node(node_id) else {
                continue;
            };
            out.push(node_id);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Top-level widgets, in insertion order.
    pub fn roots(&self) -> &[WidgetId] {
        &self.roots
    }

    /// Parent of `id`, `None` for a top-level widget.
    pub fn parent(&self, id: WidgetId) -> Result<Option<WidgetId>, TreeError> {
        Ok(self.node(id)?.parent)
    }

    /// Children of `id`, in order.
    pub fn children(&self, id: WidgetId) -> Result<&[WidgetId], TreeError> {
        Ok(&self.node(id)?.children)
    }

    /// The widget stored at `id`. `None` while it is being measured.
    pub fn widget(&self, id: WidgetId) -> Result<Option<&dyn Widget>, TreeError> {
        Ok(self.node(id)?.widget.as_deref())
    }

    /// Mutable access to the widget at `id`.
    ///
    /// The caller is responsible for invalidating the node after changing
    /// anything that affects layout or paint.
    pub fn widget_mut(&mut self, id: WidgetId) -> Result<Option<&mut dyn Widget>, TreeError> {
        Ok(self.node_mut(id)?.widget.as_deref_mut())
    }

    /// The name the widget reported on insertion.
    pub fn debug_name(&self, id: WidgetId) -> Result<&str, TreeError> {
        Ok(&self.node(id)?.name)
    }

    /// The capabilities the widget reported on insertion.
    pub fn capabilities(&self, id: WidgetId) -> Result<Capabilities, TreeError> {
        Ok(self.node(id)?.capabilities)
    }

    /// Associate a reactive owner with the widget.
    pub fn set_owner(&mut self, id: WidgetId, owner: OwnerId) -> Result<(), TreeError> {
        self.node_mut(id)?.owner = Some(owner);
        Ok(())
    }

    /// The reactive owner of the widget.
    pub fn owner(&self, id: WidgetId) -> Result<Option<OwnerId>, TreeError> {
        Ok(self.node(id)?.owner)
    }

    /// Current flags of `id`.
    pub fn flags(&self, id: WidgetId) -> Result<InvalidationFlags, TreeError> {
        Ok(self.node(id)?.flags)
    }

    /// Whether `id` needs layout. False for stale ids.
    pub fn needs_layout(&self, id: WidgetId) -> bool {
        self.node(id).is_ok_and(|node| node.flags.needs_layout())
    }

    /// Whether `id` needs paint. False for stale ids.
    pub fn needs_paint(&self, id: WidgetId) -> bool {
        self.node(id).is_ok_and(|node| node.flags.needs_paint())
    }

    /// Whether any layout, paint or damage is pending.
    pub fn is_dirty(&self) -> bool {
        !self.layout_dirty.is_empty() || !self.pending_paint.is_empty() || !self.damage.is_empty()
    }

    /// Apply `flags` to `id` with their propagation rules.
    pub fn invalidate(&mut self, id: WidgetId, flags: InvalidationFlags) -> Result<(), TreeError> {
        if flags.needs_paint() {
            self.mark_needs_paint(id)?;
        }
        if flags.needs_layout() {
            self.mark_needs_layout(id)?;
        }
        Ok(())
    }

    /// Flag `id` for layout, together with every ancestor up to the root.
    ///
    /// The upward walk stops at an ancestor that already needs layout, and
    /// at a relayout boundary that has a cached layout (including `id`
    /// itself).
    pub fn mark_needs_layout(&mut self, id: WidgetId) -> Result<(), TreeError> {
        let mut current = Some(id);
        let mut marked = 0_usize;
        while let Some(node_id) = current {
            let node = self.node_mut(node_id)?;
            if node_id != id && node.flags.needs_layout() {
                break;
            }
            node.flags.insert(InvalidationFlags::LAYOUT);
            let stop = node.capabilities.contains(Capabilities::LAYOUT_BOUNDARY)
                && node.layout.is_some();
            let parent = node.parent;
            self.layout_dirty.insert(node_id);
            marked += 1;
            if stop {
                break;
            }
            current = parent;
        }
        trace!(widget = ?id, marked, "needs layout");
        Ok(())
    }

    /// Flag `id` for paint. Does not propagate.
    pub fn mark_needs_paint(&mut self, id: WidgetId) -> Result<(), TreeError> {
        self.node_mut(id)?.flags.insert(InvalidationFlags::PAINT);
        self.pending_paint.insert(id);
        Ok(())
    }

    /// Flag `id` and all its descendants for paint.
    pub fn mark_subtree_needs_paint(&mut self, id: WidgetId) -> Result<(), TreeError> {
        for node_id in self.pre_order(id) {
            self.mark_needs_paint(node_id)?;
        }
        Ok(())
    }

    /// The minimal set of nodes needing layout: those with no ancestor that
    /// needs layout. No returned node is an ancestor of another.
    pub fn collect_layout_roots(&self) -> Vec<WidgetId> {
        self.layout_dirty
            .iter()
            .copied()
            .filter(|id| !self.has_dirty_ancestor(*id))
            .collect()
    }

    fn has_dirty_ancestor(&self, id: WidgetId) -> bool {
        let mut current = self.node(id).ok().and_then(|node| node.parent);
        while let Some(node_id) = current {
            let Ok(node) = self.node(node_id) else {
                return false;
            };
            if node.flags.needs_layout() {
                return true;
            }
            current = node.parent;
        }
        false
    }

    /// Clear `LAYOUT` on `id` without measuring it.
    pub(crate) fn clear_needs_layout(&mut self, id: WidgetId) -> Result<(), TreeError> {
        self.node_mut(id)?.flags.remove(InvalidationFlags::LAYOUT);
        self.layout_dirty.shift_remove(&id);
        Ok(())
    }

    /// Clear `PAINT` on `id`, recording where it was painted.
    pub(crate) fn clear_needs_paint(
        &mut self,
        id: WidgetId,
        painted: Option<Rect>,
    ) -> Result<(), TreeError> {
        let node = self.node_mut(id)?;
        node.flags.remove(InvalidationFlags::PAINT);
        node.painted = painted;
        self.pending_paint.shift_remove(&id);
        Ok(())
    }

    /// Take the damage left behind by removed widgets.
    pub(crate) fn take_damage(&mut self) -> Vec<Rect> {
        std::mem::take(&mut self.damage)
    }

    /// Cached layout of `id`, if it was ever measured.
    pub fn layout_entry(&self, id: WidgetId) -> Result<Option<LayoutEntry>, TreeError> {
        Ok(self.node(id)?.layout)
    }

    /// Offset of `id` from its parent's origin.
    pub fn offset(&self, id: WidgetId) -> Result<Point, TreeError> {
        Ok(self.node(id)?.offset)
    }

    /// Absolute bounds at the last paint.
    pub fn painted_bounds(&self, id: WidgetId) -> Result<Option<Rect>, TreeError> {
        Ok(self.node(id)?.painted)
    }

    /// Absolute rectangle of `id`: the sum of offsets up to the root and the
    /// cached size. `None` until the widget has been measured.
    pub fn absolute_bounds(&self, id: WidgetId) -> Result<Option<Rect>, TreeError> {
        let node = self.node(id)?;
        let Some(entry) = node.layout else {
            return Ok(None);
        };
        let mut bounds = Rect::new(node.offset, entry.size);
        let mut current = node.parent;
        while let Some(parent_id) = current {
            let parent = self.node(parent_id)?;
            bounds = bounds.translate(parent.offset);
            current = parent.parent;
        }
        Ok(Some(bounds))
    }

    /// Widgets needing paint, parents before children and siblings in
    /// child order.
    ///
    /// Sorts the pending set by tree path, so only pending widgets and
    /// their ancestors are visited.
    pub(crate) fn paint_order(&self) -> Vec<WidgetId> {
        let mut order: Vec<WidgetId> = self.pending_paint.iter().copied().collect();
        order.sort_by_cached_key(|id| self.path(*id));
        order
    }

    /// Sibling index at each level, from the top-level widget down to `id`.
    fn path(&self, id: WidgetId) -> SmallVec<[u32; 8]> {
        let mut path = SmallVec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let Ok(node) = self.node(node_id) else {
                break;
            };
            let siblings: &[WidgetId] = match node.parent {
                Some(parent) => self.node(parent).map(|p| p.children.as_slice()).unwrap_or_default(),
                None => self.roots.as_slice(),
            };
            let index = siblings.iter().position(|sibling| *sibling == node_id);
            path.push(index.map_or(u32::MAX, |i| i as u32));
            current = node.parent;
        }
        path.reverse();
        path
    }
}

impl fmt::Debug for InvalidationTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidationTree")
            .field("len", &self.len)
            .field("roots", &self.roots)
            .field("layout_dirty", &self.layout_dirty)
            .field("pending_paint", &self.pending_paint)
            .finish()
    }
}
