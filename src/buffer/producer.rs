//! The producer task: drains the wrapped stream into the queue.

use futures::{StreamExt, TryStream, TryStreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::queue::{Slot, SlotSender};
use super::BufferConfig;
use crate::tracing_support::{log_debug, log_trace};

/// How a producer task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerExit {
    /// Pushed `EndOfStream`
    Exhausted,
    /// Pushed the stream's failure
    Failed,
    /// Stopped by the consumer's token
    Cancelled,
    /// The consumer dropped the queue before the producer finished
    Disconnected,
}

/// A running producer, owned by the consumer.
pub(crate) struct ProducerHandle {
    pub(crate) token: CancellationToken,
    pub(crate) task: JoinHandle<ProducerExit>,
}

impl ProducerHandle {
    /// Spawn the producer onto the current tokio runtime.
    ///
    /// The stream is moved into the task, which from then on is the only
    /// thing able to advance it.
    pub(crate) fn spawn<S>(
        stream: S,
        tx: SlotSender<S::Ok, S::Error>,
        config: &BufferConfig,
    ) -> Self
    where
        S: TryStream + Send + 'static,
        S::Ok: Send + 'static,
        S::Error: Send + 'static,
    {
        let token = CancellationToken::new();
        let task = tokio::spawn(run(stream, tx, token.clone(), config.label().to_owned()));
        Self { token, task }
    }
}

#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
async fn run<S>(
    stream: S,
    tx: SlotSender<S::Ok, S::Error>,
    token: CancellationToken,
    stage: String,
) -> ProducerExit
where
    S: TryStream,
{
    log_debug!(stage = %stage, "producer started");
    let stream = stream.into_stream();
    tokio::pin!(stream);

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => {
                log_debug!(stage = %stage, "producer cancelled while fetching");
                return ProducerExit::Cancelled;
            }
            next = stream.next() => next,
        };

        // Failure and end of stream are both terminal: push them and stop.
        let (slot, exit) = match next {
            Some(Ok(item)) => (Slot::Item(item), None),
            Some(Err(err)) => (Slot::Failure(err), Some(ProducerExit::Failed)),
            None => (Slot::EndOfStream, Some(ProducerExit::Exhausted)),
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                log_debug!(stage = %stage, "producer cancelled while waiting for room");
                return ProducerExit::Cancelled;
            }
            pushed = tx.push(slot) => {
                if pushed.is_err() {
                    log_debug!(stage = %stage, "consumer went away");
                    return ProducerExit::Disconnected;
                }
            }
        }

        match exit {
            None => {
                log_trace!(stage = %stage, "item buffered");
                #[cfg(feature = "metrics")]
                crate::metrics::record_produced(&stage);
            }
            Some(exit) => {
                log_debug!(stage = %stage, ?exit, "producer finished");
                return exit;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::queue::bounded;
    use futures::stream;
    use std::num::NonZeroUsize;
    use std::time::Duration;

    fn config(capacity: usize) -> BufferConfig {
        BufferConfig::new(capacity).unwrap()
    }

    #[tokio::test]
    async fn pushes_items_then_end_of_stream() {
        let (tx, mut rx) = bounded(NonZeroUsize::new(8).unwrap());
        let source = stream::iter(vec![Ok::<_, ()>(1), Ok(2)]);
        let handle = ProducerHandle::spawn(source, tx, &config(8));

        assert_eq!(handle.task.await.unwrap(), ProducerExit::Exhausted);
        assert_eq!(rx.pop().await, Some(Slot::Item(1)));
        assert_eq!(rx.pop().await, Some(Slot::Item(2)));
        assert_eq!(rx.pop().await, Some(Slot::EndOfStream));
        assert_eq!(rx.pop().await, None);
    }

    #[tokio::test]
    async fn failure_is_the_last_slot() {
        let (tx, mut rx) = bounded(NonZeroUsize::new(8).unwrap());
        let source = stream::iter(vec![Ok(1), Err("bad"), Ok(3)]);
        let handle = ProducerHandle::spawn(source, tx, &config(8));

        assert_eq!(handle.task.await.unwrap(), ProducerExit::Failed);
        assert_eq!(rx.pop().await, Some(Slot::Item(1)));
        assert_eq!(rx.pop().await, Some(Slot::Failure("bad")));
        assert_eq!(rx.pop().await, None);
    }

    #[tokio::test]
    async fn cancel_unblocks_a_full_queue() {
        let (tx, mut rx) = bounded(NonZeroUsize::new(1).unwrap());
        let source = stream::iter(0..).map(Ok::<_, ()>);
        let handle = ProducerHandle::spawn(source, tx, &config(1));

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.token.cancel();
        assert_eq!(handle.task.await.unwrap(), ProducerExit::Cancelled);

        assert_eq!(rx.pop().await, Some(Slot::Item(0)));
        assert_eq!(rx.pop().await, None, "nothing is owed after cancellation");
    }

    #[tokio::test]
    async fn cancel_interrupts_a_pending_fetch() {
        let (tx, _rx) = bounded::<u8, ()>(NonZeroUsize::new(1).unwrap());
        let handle = ProducerHandle::spawn(stream::pending::<Result<u8, ()>>(), tx, &config(1));

        handle.token.cancel();
        assert_eq!(handle.task.await.unwrap(), ProducerExit::Cancelled);
    }

    #[tokio::test]
    async fn dropped_receiver_stops_the_producer() {
        let (tx, rx) = bounded(NonZeroUsize::new(1).unwrap());
        drop(rx);
        let source = stream::iter(0..).map(Ok::<_, ()>);
        let handle = ProducerHandle::spawn(source, tx, &config(1));

        assert_eq!(handle.task.await.unwrap(), ProducerExit::Disconnected);
    }
}
