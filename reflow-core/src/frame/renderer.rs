//! Renderer collaborator.

use crate::layout::Rect;
use crate::widget::DrawCommand;

/// Receives the output of each presented frame.
///
/// `dirty` lists the absolute areas that changed; `commands` are the draw
/// commands of the widgets repainted this frame, parents before children.
pub trait Renderer {
    /// Present one frame.
    fn present(&mut self, dirty: &[Rect], commands: &[DrawCommand]);
}

/// One frame as seen by a [`RecordingRenderer`].
#[derive(Debug, Clone, PartialEq)]
pub struct PresentedFrame {
    /// Dirty rectangles passed to `present`.
    pub dirty: Vec<Rect>,
    /// Draw commands passed to `present`.
    pub commands: Vec<DrawCommand>,
}

/// A renderer that keeps every presented frame, for tests and headless use.
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    /// Frames in presentation order.
    pub frames: Vec<PresentedFrame>,
}

impl RecordingRenderer {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent frame.
    pub fn last(&self) -> Option<&PresentedFrame> {
        self.frames.last()
    }
}

impl Renderer for RecordingRenderer {
    fn present(&mut self, dirty: &[Rect], commands: &[DrawCommand]) {
        self.frames.push(PresentedFrame {
            dirty: dirty.to_vec(),
            commands: commands.to_vec(),
        });
    }
}
