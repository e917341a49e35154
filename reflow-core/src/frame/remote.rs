//! Remote Writes
//!
//! The runtime lives on the UI thread. Background tasks hand their results
//! back as closures over a `tokio` channel; the frame driver applies
//! everything queued at the start of the next frame, in one transaction.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::{RemoteClosed, Result};
use crate::reactive::{Runtime, Signal};

/// A write to apply on the UI thread.
pub type RemoteWrite = Box<dyn FnOnce(&Runtime) -> Result<()> + Send>;

/// Sends writes to a frame driver from any thread.
#[derive(Clone)]
pub struct RemoteWriter {
    tx: UnboundedSender<RemoteWrite>,
}

impl RemoteWriter {
    /// Set `signal` to `value` at the start of the next frame.
    pub fn write<T>(&self, signal: Signal<T>, value: T) -> std::result::Result<(), RemoteClosed>
    where
        T: Clone + Send + 'static,
    {
        self.send(move |rt| signal.set(rt, value))
    }

    /// Run `write` against the runtime at the start of the next frame.
    pub fn send<F>(&self, write: F) -> std::result::Result<(), RemoteClosed>
    where
        F: FnOnce(&Runtime) -> Result<()> + Send + 'static,
    {
        self.tx.send(Box::new(write)).map_err(|_| RemoteClosed)
    }

    /// Whether the receiving frame driver is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for RemoteWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteWriter")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The receiving end, owned by the frame driver.
pub(crate) struct Inbox {
    tx: UnboundedSender<RemoteWrite>,
    rx: UnboundedReceiver<RemoteWrite>,
}

impl Inbox {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub(crate) fn writer(&self) -> RemoteWriter {
        RemoteWriter {
            tx: self.tx.clone(),
        }
    }

    /// Everything received so far, without waiting.
    pub(crate) fn drain(&mut self) -> Vec<RemoteWrite> {
        let mut writes = Vec::new();
        while let Ok(write) = self.rx.try_recv() {
            writes.push(write);
        }
        writes
    }
}
