//! Bounded lookahead buffering for async streams.
//!
//! Wrapping a stream in a [`Buffered`] moves it into a producer task that
//! runs up to `capacity` items ahead of the caller, so the latency of
//! producing the next item overlaps with the time spent consuming the
//! current one. Order, values, end of stream and failures are unchanged.
//!
//! Any `Stream<Item = Result<T, E>>` can be wrapped. An infallible stream
//! can be wrapped after `.map(Ok::<_, Infallible>)`.

pub mod consumer;
mod producer;
pub mod queue;

use std::num::NonZeroUsize;

use futures::TryStream;

use crate::error::{Error, Result};

pub use consumer::{Buffered, IterState};
pub use producer::ProducerExit;

const DEFAULT_LABEL: &str = "lookahead";

/// Largest accepted capacity: the most permits a tokio channel can hold.
pub const MAX_CAPACITY: usize = usize::MAX >> 3;

/// Configuration for a lookahead buffer
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "RawBufferConfig")
)]
pub struct BufferConfig {
    /// Maximum number of items buffered ahead of the consumer
    capacity: NonZeroUsize,
    /// Stage name used in logs and metrics
    label: Option<String>,
}

/// Unchecked form read by serde, validated through [`BufferConfig::new`].
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct RawBufferConfig {
    capacity: usize,
    #[serde(default)]
    label: Option<String>,
}

#[cfg(feature = "serde")]
impl TryFrom<RawBufferConfig> for BufferConfig {
    type Error = Error;

    fn try_from(raw: RawBufferConfig) -> Result<Self> {
        let config = BufferConfig::new(raw.capacity)?;
        Ok(match raw.label {
            Some(label) => config.with_label(label),
            None => config,
        })
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: NonZeroUsize::MIN,
            label: None,
        }
    }
}

impl BufferConfig {
    /// Create a configuration buffering up to `capacity` items.
    ///
    /// A capacity of zero is rejected: the producer would block on its
    /// very first push. So is anything above [`MAX_CAPACITY`], which the
    /// queue could not be built with.
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .filter(|c| c.get() <= MAX_CAPACITY)
            .ok_or_else(|| Error::configuration(capacity))?;
        Ok(Self {
            capacity,
            label: None,
        })
    }

    /// Name the stage in logs and metrics
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    /// Stage name, `"lookahead"` unless one was set
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(DEFAULT_LABEL)
    }

    /// Wrap a stream factory so that every stream it makes is buffered.
    pub fn wrap<F>(self, factory: F) -> Bufferable<F> {
        Bufferable::new(self, factory)
    }
}

/// A stream factory whose streams all come out buffered.
///
/// Nothing is shared between the streams it makes: each call builds a new
/// queue and, once polled, its own producer task.
///
/// ```rust
/// use futures::{stream, StreamExt};
/// use lookahead::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() -> Result<()> {
/// let pages = bufferable(2, |start: u32| {
///     stream::iter(start..start + 3).map(Ok::<_, std::io::Error>)
/// })?;
///
/// let items: Vec<_> = pages.stream_with(10).collect().await;
/// assert_eq!(items.len(), 3);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Bufferable<F> {
    config: BufferConfig,
    factory: F,
}

impl<F> Bufferable<F> {
    pub fn new(config: BufferConfig, factory: F) -> Self {
        Self { config, factory }
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Build a buffered stream from a zero-argument factory.
    pub fn stream<S>(&self) -> Buffered<S>
    where
        F: Fn() -> S,
        S: TryStream,
    {
        Buffered::new(self.config.clone(), (self.factory)())
    }

    /// Build a buffered stream, forwarding `args` to the factory.
    pub fn stream_with<A, S>(&self, args: A) -> Buffered<S>
    where
        F: Fn(A) -> S,
        S: TryStream,
    {
        Buffered::new(self.config.clone(), (self.factory)(args))
    }
}

/// Wrap `factory` so each stream it makes buffers up to `capacity` items.
pub fn bufferable<F>(capacity: usize, factory: F) -> Result<Bufferable<F>> {
    Ok(BufferConfig::new(capacity)?.wrap(factory))
}

/// Buffer up to `capacity` items of a single stream.
pub fn lookahead<S: TryStream>(capacity: usize, stream: S) -> Result<Buffered<S>> {
    Ok(Buffered::new(BufferConfig::new(capacity)?, stream))
}

/// Extension trait for buffering any fallible stream
pub trait LookaheadExt: TryStream + Sized {
    /// Buffer up to `capacity` items ahead of the caller
    fn lookahead(self, capacity: usize) -> Result<Buffered<Self>> {
        lookahead(capacity, self)
    }

    /// Buffer with a prepared configuration
    fn lookahead_with(self, config: BufferConfig) -> Buffered<Self> {
        Buffered::new(config, self)
    }
}

impl<S: TryStream> LookaheadExt for S {}
