// SPDX-License-Identifier: MPL-2.0

//! Bounded-wait MPMC frame queues
//!
//! Thin wrapper over a crossbeam channel giving the pipeline exactly the
//! three operations it needs: a producer-side enqueue that never blocks, a
//! timed dequeue so consumers can re-check the running flag, and a
//! non-blocking drain for shutdown. FIFO holds per producer; concurrent
//! producers may interleave.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

pub struct FrameQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> FrameQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Push without blocking. The channel is unbounded, so this only fails
    /// if every receiver is gone, which cannot happen while the queue
    /// itself is alive.
    pub fn enqueue(&self, item: T) {
        let _ = self.tx.send(item);
    }

    /// Block up to `timeout` for an item; `None` on timeout so the caller
    /// can re-check its running flag.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Non-blocking dequeue used while draining at shutdown
    pub fn try_dequeue(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }
}

impl<T> Default for FrameQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
