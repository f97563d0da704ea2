//! # Bounded lookahead buffering for async streams
//!
//! This crate lets a slow stage of an async pipeline (one issuing a network
//! request per element, say) run ahead of whoever consumes it, so that the
//! time spent producing the next element overlaps with the time spent
//! consuming the current one.
//!
//! ## Core Concepts
//!
//! - **Buffered**: a stream that drains its wrapped stream in a background
//!   task, up to `capacity` items ahead
//! - **Bufferable**: a stream factory whose every stream comes out buffered
//! - **Slot**: what travels through the queue: an item, the end of the
//!   stream, or the stream's failure
//! - **Source**: a pull-based producer that can be turned into a stream
//!
//! A buffered stream yields the same items in the same order as the stream
//! it wraps, and ends or fails at the same point. Only the timing changes.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use futures::{stream, StreamExt};
//! use lookahead::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let fetched = stream::iter(0..10).then(|id| async move {
//!         tokio::time::sleep(Duration::from_millis(1)).await;
//!         Ok::<_, std::io::Error>(id * 2)
//!     });
//!
//!     let mut buffered = fetched.lookahead(4)?;
//!     while let Some(value) = buffered.next().await {
//!         println!("{}", value.map_err(Error::source_error)?);
//!     }
//!     Ok(())
//! }
//! ```

mod tracing_support;

pub mod buffer;
pub mod error;
pub mod traits;
pub mod util;

// Re-export commonly used items
pub mod prelude {
    pub use crate::buffer::{
        bufferable, lookahead, BufferConfig, Bufferable, Buffered, IterState, LookaheadExt,
    };
    pub use crate::error::{Error, Result};
    pub use crate::traits::Source;
    pub use crate::util::{collect_all, from_fn, source_stream};
}

// Re-export main error type
pub use error::{Error, Result};

// Feature flags for optional dependencies
#[cfg(feature = "metrics")]
pub mod metrics;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
