//! Widget Collaborator
//!
//! The core never knows concrete widget types. It measures and paints them
//! through [`Widget`], and asks optional questions (is it focusable? does it
//! bound relayout?) through a [`Capabilities`] set and checked lookups
//! instead of downcasts.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::MeasureError;
use crate::layout::{Constraints, MeasureCtx, Point, Rect, Size};

bitflags! {
    /// Optional abilities a widget advertises.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Takes keyboard focus; `as_focusable` returns `Some`.
        const FOCUSABLE       = 1 << 0;
        /// Exposes itself to the accessibility tree.
        const ACCESSIBLE      = 1 << 1;
        /// Its size depends only on the constraints it receives, never on
        /// its children. Relayout of its subtree stops here.
        const LAYOUT_BOUNDARY = 1 << 2;
        /// Emits draw commands.
        const PAINTS          = 1 << 3;
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::PAINTS
    }
}

/// A widget as seen by the layout and paint passes.
pub trait Widget: 'static {
    /// Name used in logs.
    fn debug_name(&self) -> &str {
        "widget"
    }

    /// The abilities this widget advertises. Read once, on insertion.
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Pick a size within `constraints`.
    ///
    /// Containers measure and position children through `ctx`; the result
    /// is clamped into `constraints` by the caller.
    fn measure(
        &mut self,
        constraints: &Constraints,
        ctx: &mut MeasureCtx<'_>,
    ) -> Result<Size, MeasureError>;

    /// Emit draw commands for `bounds`, the widget's absolute rectangle.
    fn paint(&self, bounds: Rect, out: &mut DrawList) {
        let _ = (bounds, out);
    }

    /// Focus access, for widgets with [`Capabilities::FOCUSABLE`].
    fn as_focusable(&self) -> Option<&dyn Focusable> {
        None
    }

    /// Mutable focus access.
    fn as_focusable_mut(&mut self) -> Option<&mut dyn Focusable> {
        None
    }
}

/// Keyboard focus.
pub trait Focusable {
    /// Whether the widget currently holds focus.
    fn is_focused(&self) -> bool;

    /// Give or take focus.
    fn set_focused(&mut self, focused: bool);
}

/// A single drawing instruction handed to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DrawCommand {
    /// Fill a rectangle with a colour, packed as `0xRRGGBBAA`.
    FillRect {
        /// Absolute rectangle.
        rect: Rect,
        /// Packed colour.
        rgba: u32,
    },
    /// Draw a run of text with its top-left corner at `origin`.
    Text {
        /// Absolute origin.
        origin: Point,
        /// The text to draw; shaping is the renderer's job.
        text: String,
        /// Font size in pixels.
        size: f32,
        /// Packed colour.
        rgba: u32,
    },
    /// Restrict subsequent commands to `rect`.
    PushClip(Rect),
    /// Undo the matching `PushClip`.
    PopClip,
}

/// Draw commands collected during a paint pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawList {
    commands: Vec<DrawCommand>,
}

impl DrawList {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command.
    pub fn push(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }

    /// Append a filled rectangle.
    pub fn fill_rect(&mut self, rect: Rect, rgba: u32) {
        self.push(DrawCommand::FillRect { rect, rgba });
    }

    /// Append a text run.
    pub fn text(&mut self, origin: Point, text: impl Into<String>, size: f32, rgba: u32) {
        self.push(DrawCommand::Text {
            origin,
            text: text.into(),
            size,
            rgba,
        });
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether no command was recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// The recorded commands, in order.
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Take the recorded commands.
    pub fn into_commands(self) -> Vec<DrawCommand> {
        self.commands
    }
}
