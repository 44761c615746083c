//! Bounded single-producer / single-consumer hand-off between the stream
//! consumer and the log writer.
//!
//! Enqueue never blocks and never drops: when the queue is at capacity it
//! fails with [`EnqueueError::Full`] and the producer is expected to treat
//! that as fatal for its current connection. Closing is explicit; the
//! consumer sees every item enqueued before the close, then
//! [`Dequeued::Closed`].

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use thiserror::Error;

use crate::types::WriteItem;

/// Default queue capacity in items.
pub const DEFAULT_QUEUE_CAPACITY: usize = 500_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnqueueError {
    #[error("write queue full ({capacity} items): disk throughput insufficient, refusing to drop data")]
    Full { capacity: usize },

    #[error("write queue closed")]
    Closed,
}

/// Result of a dequeue attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Dequeued {
    Item(WriteItem),
    /// Nothing arrived within the timeout.
    Idle,
    /// Producer closed and every earlier item has been delivered.
    Closed,
}

/// Create a queue of the given capacity (at least 1).
pub fn write_queue(capacity: usize) -> (WriteQueue, QueueReceiver) {
    let capacity = capacity.max(1);
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (WriteQueue { tx: Some(tx), capacity }, QueueReceiver { rx })
}

/// Producer half. Not `Clone`: one producer per stream.
#[derive(Debug)]
pub struct WriteQueue {
    tx: Option<Sender<WriteItem>>,
    capacity: usize,
}

impl WriteQueue {
    /// Hand an item to the writer without blocking.
    pub fn enqueue(&self, item: WriteItem) -> Result<(), EnqueueError> {
        let tx = self.tx.as_ref().ok_or(EnqueueError::Closed)?;
        tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(_) => EnqueueError::Full { capacity: self.capacity },
            TrySendError::Disconnected(_) => EnqueueError::Closed,
        })
    }

    /// Signal end of stream. Idempotent.
    pub fn close(&mut self) {
        self.tx.take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    /// Items currently waiting for the writer.
    pub fn len(&self) -> usize {
        self.tx.as_ref().map_or(0, |tx| tx.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Consumer half, owned by the writer thread.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: Receiver<WriteItem>,
}

impl QueueReceiver {
    /// Block until an item arrives or the queue is closed and drained.
    pub fn dequeue(&self) -> Dequeued {
        match self.rx.recv() {
            Ok(item) => Dequeued::Item(item),
            Err(_) => Dequeued::Closed,
        }
    }

    /// Like [`dequeue`](Self::dequeue) but gives up after `timeout`.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Dequeued {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Dequeued::Item(item),
            Err(RecvTimeoutError::Timeout) => Dequeued::Idle,
            Err(RecvTimeoutError::Disconnected) => Dequeued::Closed,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
