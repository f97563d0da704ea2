//! The bounded queue between producer and consumer.
//!
//! A thin typed layer over a tokio `mpsc` channel. The channel's capacity
//! is the buffer's capacity, and its blocking `send` is the only
//! backpressure there is.

use std::num::NonZeroUsize;
use std::task::{Context, Poll};

use tokio::sync::mpsc;

/// What actually travels through the queue.
///
/// End of stream and failure are variants of their own, so no item value
/// can ever be mistaken for a control signal.
#[derive(Debug, PartialEq, Eq)]
pub enum Slot<T, E> {
    /// A value produced by the wrapped stream
    Item(T),
    /// The wrapped stream finished cleanly
    EndOfStream,
    /// The wrapped stream failed; carries its error untouched
    Failure(E),
}

impl<T, E> Slot<T, E> {
    /// Whether nothing may follow this slot
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Slot::Item(_))
    }
}

/// Producer half of the queue.
#[derive(Debug)]
pub struct SlotSender<T, E> {
    tx: mpsc::Sender<Slot<T, E>>,
}

/// Consumer half of the queue.
#[derive(Debug)]
pub struct SlotReceiver<T, E> {
    rx: mpsc::Receiver<Slot<T, E>>,
}

/// The consumer half went away before the slot could be delivered.
#[derive(Debug)]
pub struct Disconnected<T, E>(pub Slot<T, E>);

/// Create a queue holding at most `capacity` undelivered slots.
pub fn bounded<T, E>(capacity: NonZeroUsize) -> (SlotSender<T, E>, SlotReceiver<T, E>) {
    let (tx, rx) = mpsc::channel(capacity.get());
    (SlotSender { tx }, SlotReceiver { rx })
}

impl<T, E> SlotSender<T, E> {
    /// Enqueue a slot, waiting while the queue is full.
    pub async fn push(&self, slot: Slot<T, E>) -> Result<(), Disconnected<T, E>> {
        self.tx.send(slot).await.map_err(|err| Disconnected(err.0))
    }

    /// Free space right now.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}

impl<T, E> SlotReceiver<T, E> {
    /// Dequeue the next slot in FIFO order, waiting while the queue is empty.
    ///
    /// `None` means the producer half is gone without a terminal slot.
    pub async fn pop(&mut self) -> Option<Slot<T, E>> {
        self.rx.recv().await
    }

    pub fn poll_pop(&mut self, cx: &mut Context<'_>) -> Poll<Option<Slot<T, E>>> {
        self.rx.poll_recv(cx)
    }

    /// Number of slots waiting to be consumed.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
