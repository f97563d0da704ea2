//! Core traits for pull-based sources.
//!
//! A [`Source`] is the crate's own notion of an asynchronous sequence: ask
//! for the next item, get it, learn that there are none left, or get an
//! error. Turn one into a stream with
//! [`source_stream`](crate::util::source_stream) to buffer it.

use crate::error::Result;
use async_trait::async_trait;

/// A source produces items one at a time on request.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use lookahead::error::Result;
/// use lookahead::traits::Source;
///
/// struct Pages {
///     next: u32,
///     last: u32,
/// }
///
/// #[async_trait]
/// impl Source for Pages {
///     type Item = u32;
///
///     async fn produce(&mut self) -> Result<Option<Self::Item>> {
///         if self.next > self.last {
///             return Ok(None); // exhausted
///         }
///         self.next += 1;
///         Ok(Some(self.next - 1))
///     }
/// }
/// ```
#[async_trait]
pub trait Source {
    /// The type of items this source generates
    type Item: Send + 'static;

    /// Produce the next item, or `None` once the source is exhausted.
    ///
    /// After returning `Ok(None)` or an error the source is not polled again
    /// by this crate.
    async fn produce(&mut self) -> Result<Option<Self::Item>>;

    /// Hint of how many items are left, if known.
    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, None)
    }
}

#[async_trait]
impl<S> Source for Box<S>
where
    S: Source + Send + ?Sized,
{
    type Item = S::Item;

    async fn produce(&mut self) -> Result<Option<Self::Item>> {
        (**self).produce().await
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (**self).size_hint()
    }
}
