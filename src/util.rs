//! Utility functions and helper types.

use futures::stream;
use std::future::Future;
use tokio_stream::{Stream, StreamExt};

use crate::error::Result;
use crate::traits::Source;

/// Build a fallible stream by calling an async closure until it runs dry.
///
/// Each call yields `Ok(Some(item))` for another item or `Ok(None)` at the
/// end. The stream stops after the first error, like [`source_stream`].
pub fn from_fn<F, Fut, T>(f: F) -> impl Stream<Item = Result<T>> + Send + 'static
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    T: Send + 'static,
{
    stream::unfold(Some(f), |state| async move {
        let mut f = state?;
        match f().await {
            Ok(Some(item)) => Some((Ok(item), Some(f))),
            Ok(None) => None,
            Err(e) => Some((Err(e), None)),
        }
    })
}

/// Turn a [`Source`] into a stream of results.
///
/// The stream ends after the source reports exhaustion or yields its first
/// error, so the source is never asked for more after it failed.
pub fn source_stream<P>(source: P) -> impl Stream<Item = Result<P::Item>> + Send + 'static
where
    P: Source + Send + 'static,
{
    stream::unfold(Some(source), |state| async move {
        let mut source = state?;
        match source.produce().await {
            Ok(Some(item)) => Some((Ok(item), Some(source))),
            Ok(None) => None,
            Err(e) => Some((Err(e), None)),
        }
    })
}

/// Drain a fallible stream into a vector, stopping at the first error.
pub async fn collect_all<S, T, E>(stream: S) -> std::result::Result<Vec<T>, E>
where
    S: Stream<Item = std::result::Result<T, E>>,
{
    let mut items = Vec::new();
    tokio::pin!(stream);
    while let Some(item) = stream.next().await {
        items.push(item?);
    }
    Ok(items)
}
