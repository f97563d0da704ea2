//! The consumer side: a stream that reads from the queue and owns the producer.

use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::TryStream;
use futures_core::stream::{FusedStream, Stream};
use tokio::task::JoinError;

use super::producer::{ProducerExit, ProducerHandle};
use super::queue::{self, Slot, SlotReceiver};
use super::BufferConfig;
use crate::error::{Error, Result};
use crate::tracing_support::{log_debug, log_warn};

/// Where an iteration of a [`Buffered`] stream currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterState {
    /// Not polled yet; no producer exists
    Pending,
    /// Waiting on the queue
    Running,
    /// An item was handed out and the next one has not been requested
    Yielding,
    /// The wrapped stream ended and the producer has stopped
    Done,
    /// The wrapped stream failed and the error was handed out, or the
    /// producer died before the end; either way the producer has stopped
    Failed,
    /// The caller stopped before the end
    Abandoned,
}

impl IterState {
    /// Whether the iteration reached an exit state
    pub fn is_terminal(self) -> bool {
        matches!(self, IterState::Done | IterState::Failed | IterState::Abandoned)
    }
}

/// Why the consumer stopped reading the queue.
enum Outcome<E> {
    Exhausted,
    Failed(E),
    /// The queue closed without a terminal slot
    Disconnected,
}

enum Phase<S: TryStream> {
    Idle(S),
    Running {
        rx: SlotReceiver<S::Ok, S::Error>,
        producer: ProducerHandle,
    },
    /// Waiting for the producer to stop before reporting `outcome`.
    Stopping {
        producer: ProducerHandle,
        outcome: Outcome<S::Error>,
    },
    Finished,
}

/// A stream that runs its wrapped stream ahead in a background task.
///
/// Yields exactly what the wrapped stream yields, in the same order, and
/// ends or fails exactly where it does. The wrapped stream is moved into a
/// producer task on first poll, which fills a bounded queue while the
/// caller is busy with earlier items.
///
/// Before reporting the end of the stream or its failure, `Buffered` waits
/// for the producer task to stop.
///
/// When stopping early, [`close`](Buffered::close) is the only way to wait
/// for the producer. Dropping a `Buffered` mid-stream (leaving a loop with
/// `break` or `?`, say) cancels the producer and returns at once; the
/// producer then stops at its next suspension point.
///
/// # Panics
///
/// Polling panics if the producer task panicked before the stream ended,
/// resuming that panic, or if the task was torn down by its runtime, since
/// the items it never delivered cannot be reported as a clean end.
pub struct Buffered<S: TryStream> {
    config: BufferConfig,
    phase: Phase<S>,
    state: IterState,
}

// The wrapped stream is never pinned in place: it is moved into the producer task.
impl<S: TryStream> Unpin for Buffered<S> {}

impl<S: TryStream> Buffered<S> {
    pub(crate) fn new(config: BufferConfig, stream: S) -> Self {
        Self {
            config,
            phase: Phase::Idle(stream),
            state: IterState::Pending,
        }
    }

    /// Current iteration state.
    pub fn state(&self) -> IterState {
        self.state
    }

    /// The configuration this stream was built with.
    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Items waiting in the queue right now.
    pub fn buffered_len(&self) -> usize {
        match &self.phase {
            Phase::Running { rx, .. } => rx.len(),
            _ => 0,
        }
    }

    /// Stop iterating and wait for the producer task to stop.
    ///
    /// Items still in the queue are discarded. Returns an error only if the
    /// producer task panicked or was torn down by the runtime.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub async fn close(mut self) -> Result<()> {
        let producer = match mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Idle(_) | Phase::Finished => None,
            Phase::Running { rx, producer } => {
                drop(rx);
                Some(producer)
            }
            Phase::Stopping { producer, .. } => Some(producer),
        };
        if !self.state.is_terminal() {
            self.state = IterState::Abandoned;
            self.record_abandoned();
        }

        match producer {
            Some(producer) => {
                producer.token.cancel();
                let exit = producer.task.await?;
                log_debug!(stage = %self.config.label(), ?exit, "closed");
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn record_abandoned(&self) {
        log_debug!(stage = %self.config.label(), "abandoned before the end");
        #[cfg(feature = "metrics")]
        crate::metrics::record_abandoned(self.config.label());
    }

    /// Turn the producer's final state into what the caller sees.
    ///
    /// The outcome read from the queue always wins over anything that went
    /// wrong while the producer was shutting down, except for a panic that
    /// never got to push a terminal slot: that one is resumed here. A task
    /// torn down by its runtime before that point is reported the same way,
    /// as a panic carrying the [`Error::Producer`] text.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn settle(
        &mut self,
        outcome: Outcome<S::Error>,
        joined: std::result::Result<ProducerExit, JoinError>,
    ) -> Option<std::result::Result<S::Ok, S::Error>> {
        let stage = self.config.label();
        match (&outcome, joined) {
            (Outcome::Disconnected, Err(err)) if err.is_panic() => {
                self.state = IterState::Failed;
                std::panic::resume_unwind(err.into_panic());
            }
            (Outcome::Disconnected, Err(err)) => {
                self.state = IterState::Failed;
                panic!("{}", Error::from(err));
            }
            (_, Err(err)) if err.is_panic() => {
                log_warn!(
                    stage = %stage,
                    panic = %crate::error::panic_message(err.into_panic()),
                    "producer panicked during shutdown"
                );
            }
            (_, Err(err)) => {
                log_warn!(stage = %stage, error = %err, "producer did not stop cleanly");
            }
            (_, Ok(exit)) => {
                log_debug!(stage = %stage, ?exit, "producer stopped");
            }
        }

        match outcome {
            Outcome::Exhausted => {
                self.state = IterState::Done;
                None
            }
            Outcome::Failed(err) => {
                self.state = IterState::Failed;
                #[cfg(feature = "metrics")]
                crate::metrics::record_failure(stage);
                Some(Err(err))
            }
            Outcome::Disconnected => {
                log_warn!(stage = %stage, "queue closed without a terminal slot");
                self.state = IterState::Done;
                None
            }
        }
    }
}

impl<S> Stream for Buffered<S>
where
    S: TryStream + Send + 'static,
    S::Ok: Send + 'static,
    S::Error: Send + 'static,
{
    type Item = std::result::Result<S::Ok, S::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match mem::replace(&mut this.phase, Phase::Finished) {
                Phase::Idle(stream) => {
                    let (tx, rx) = queue::bounded(this.config.capacity());
                    let producer = ProducerHandle::spawn(stream, tx, &this.config);
                    log_debug!(
                        stage = %this.config.label(),
                        capacity = this.config.capacity().get(),
                        "iteration started"
                    );
                    this.phase = Phase::Running { rx, producer };
                    this.state = IterState::Running;
                }
                Phase::Running { mut rx, producer } => {
                    this.state = IterState::Running;
                    let outcome = match rx.poll_pop(cx) {
                        Poll::Pending => {
                            this.phase = Phase::Running { rx, producer };
                            return Poll::Pending;
                        }
                        Poll::Ready(Some(Slot::Item(item))) => {
                            this.phase = Phase::Running { rx, producer };
                            this.state = IterState::Yielding;
                            #[cfg(feature = "metrics")]
                            crate::metrics::record_consumed(this.config.label());
                            return Poll::Ready(Some(Ok(item)));
                        }
                        Poll::Ready(Some(Slot::EndOfStream)) => Outcome::Exhausted,
                        Poll::Ready(Some(Slot::Failure(err))) => Outcome::Failed(err),
                        Poll::Ready(None) => Outcome::Disconnected,
                    };
                    // A no-op if the producer already returned.
                    producer.token.cancel();
                    drop(rx);
                    this.phase = Phase::Stopping { producer, outcome };
                }
                Phase::Stopping {
                    mut producer,
                    outcome,
                } => match Pin::new(&mut producer.task).poll(cx) {
                    Poll::Pending => {
                        this.phase = Phase::Stopping { producer, outcome };
                        return Poll::Pending;
                    }
                    Poll::Ready(joined) => return Poll::Ready(this.settle(outcome, joined)),
                },
                Phase::Finished => return Poll::Ready(None),
            }
        }
    }
}

impl<S> FusedStream for Buffered<S>
where
    S: TryStream + Send + 'static,
    S::Ok: Send + 'static,
    S::Error: Send + 'static,
{
    fn is_terminated(&self) -> bool {
        matches!(self.phase, Phase::Finished)
    }
}

impl<S: TryStream> Drop for Buffered<S> {
    fn drop(&mut self) {
        if let Phase::Running { producer, .. } = &self.phase {
            producer.token.cancel();
            if !self.state.is_terminal() {
                self.state = IterState::Abandoned;
                self.record_abandoned();
            }
        }
    }
}

impl<S: TryStream> std::fmt::Debug for Buffered<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffered")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream::{self, StreamExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready, task};

    fn buffered<S: TryStream>(capacity: usize, stream: S) -> Buffered<S> {
        Buffered::new(BufferConfig::new(capacity).unwrap(), stream)
    }

    #[tokio::test]
    async fn producer_starts_on_first_poll() {
        let fetched = Arc::new(AtomicUsize::new(0));
        let counter = fetched.clone();
        let source = stream::iter(0..3).map(move |i| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ()>(i)
        });

        let mut wrapped = buffered(2, source);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(wrapped.state(), IterState::Pending);
        assert_eq!(fetched.load(Ordering::SeqCst), 0);

        assert_eq!(wrapped.next().await, Some(Ok(0)));
        assert_eq!(wrapped.state(), IterState::Yielding);
        assert!(fetched.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn pending_until_the_producer_delivers() {
        let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<u8>();
        let source = stream::once(async move { Ok::<_, ()>(gate_rx.await.unwrap()) });
        let mut next = task::spawn(buffered(1, source));

        assert_pending!(next.poll_next());
        assert_eq!(next.state(), IterState::Running);

        gate_tx.send(9).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(next.is_woken());
        assert_eq!(assert_ready!(next.poll_next()), Some(Ok(9)));
    }

    #[tokio::test]
    async fn done_only_after_the_producer_stopped() {
        let mut wrapped = buffered(4, stream::iter(vec![Ok::<_, ()>("a"), Ok("b")]));
        assert_eq!(wrapped.next().await, Some(Ok("a")));
        assert_eq!(wrapped.next().await, Some(Ok("b")));
        assert_eq!(wrapped.next().await, None);
        assert_eq!(wrapped.state(), IterState::Done);
        assert!(wrapped.is_terminated());
        assert_eq!(wrapped.next().await, None);
    }

    #[tokio::test]
    async fn failure_ends_the_stream() {
        let source = stream::iter(vec![Ok(1), Err("upstream down"), Ok(3)]);
        let mut wrapped = buffered(4, source);

        assert_eq!(wrapped.next().await, Some(Ok(1)));
        assert_eq!(wrapped.next().await, Some(Err("upstream down")));
        assert_eq!(wrapped.state(), IterState::Failed);
        assert_eq!(wrapped.next().await, None);
    }

    #[tokio::test]
    async fn close_before_first_poll_spawns_nothing() {
        let wrapped = buffered(1, stream::iter(vec![Ok::<_, ()>(1)]));
        wrapped.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_mid_stream_waits_for_the_producer() {
        let fetched = Arc::new(AtomicUsize::new(0));
        let counter = fetched.clone();
        let source = stream::iter(0..).map(move |i| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ()>(i)
        });

        let mut wrapped = buffered(1, source);
        assert_eq!(wrapped.next().await, Some(Ok(0)));
        wrapped.close().await.unwrap();

        let stopped_at = fetched.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fetched.load(Ordering::SeqCst), stopped_at);
    }

    #[tokio::test]
    async fn shutdown_panic_does_not_mask_the_end() {
        struct PanicsOnDrop;
        impl Drop for PanicsOnDrop {
            fn drop(&mut self) {
                panic!("cleanup failed");
            }
        }

        let guard = PanicsOnDrop;
        let source = stream::iter(vec![Ok::<_, ()>(1)]).map(move |item| {
            let _held = &guard;
            item
        });

        let mut wrapped = buffered(2, source);
        assert_eq!(wrapped.next().await, Some(Ok(1)));
        assert_eq!(wrapped.next().await, None);
        assert_eq!(wrapped.state(), IterState::Done);
    }

    #[test]
    #[should_panic(expected = "producer task failed")]
    fn runtime_teardown_is_not_a_clean_end() {
        let first = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let source = stream::iter(0..100).then(|i| async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            Ok::<_, ()>(i)
        });
        let mut wrapped = first.block_on(async {
            let mut wrapped = buffered(2, source);
            assert_eq!(wrapped.next().await, Some(Ok(0)));
            wrapped
        });
        // Shutting the runtime down drops the producer task mid-stream.
        drop(first);

        let second = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        second.block_on(async {
            // Whatever was already queued is still delivered in order.
            let mut expected = 1;
            while let Some(item) = wrapped.next().await {
                assert_eq!(item, Ok(expected));
                expected += 1;
            }
            unreachable!("a truncated stream must not end cleanly");
        });
    }

    #[tokio::test]
    #[should_panic(expected = "fetch exploded")]
    async fn producer_panic_resumes_in_the_consumer() {
        let source = stream::iter(0..3).map(|i| {
            if i == 1 {
                panic!("fetch exploded");
            }
            Ok::<_, ()>(i)
        });

        let mut wrapped = buffered(1, source);
        assert_eq!(wrapped.next().await, Some(Ok(0)));
        let _ = wrapped.next().await;
    }
}
