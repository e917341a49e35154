//! Frame loop: drains queued writes, lays out what changed, repaints what
//! moved or was invalidated and hands the result to a [`Renderer`].

mod driver;
mod invalidator;
mod remote;
mod renderer;

pub use driver::{FrameDriver, FramePhase, FrameReport};
pub use invalidator::Invalidator;
pub use remote::{RemoteWrite, RemoteWriter};
pub use renderer::{PresentedFrame, RecordingRenderer, Renderer};
