//! Deferred commands executed on the rendering thread.
//!
//! Producer threads record work (a lock/fill/unlock sequence, a release)
//! as closures; the rendering thread drains them FIFO once per frame,
//! before advancing the pools. Buffer state changes when a command
//! executes, not when it is recorded.

use crossbeam::channel::{unbounded, Receiver, Sender};

/// A unit of deferred rendering work.
pub type RenderCommand = Box<dyn FnOnce() + Send + 'static>;

/// Cloneable producer handle for recording commands.
#[derive(Clone)]
pub struct RenderCommandSender {
    tx: Sender<RenderCommand>,
}

impl RenderCommandSender {
    /// Record a command for the next drain.
    pub fn record<F>(&self, command: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // Send fails only if the queue itself is gone; the command is
        // dropped with it
        let _ = self.tx.send(Box::new(command));
    }
}

/// Single-consumer command queue owned by the rendering thread.
pub struct RenderQueue {
    tx: Sender<RenderCommand>,
    rx: Receiver<RenderCommand>,
}

impl RenderQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Create a producer handle for other threads.
    pub fn sender(&self) -> RenderCommandSender {
        RenderCommandSender {
            tx: self.tx.clone(),
        }
    }

    /// Execute every pending command in recording order.
    ///
    /// Returns the number of commands executed.
    pub fn drain(&self) -> usize {
        let mut executed = 0;
        while let Ok(command) = self.rx.try_recv() {
            command();
            executed += 1;
        }
        executed
    }

    /// Number of commands waiting to execute.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Default for RenderQueue {
    fn default() -> Self {
        Self::new()
    }
}
