//! Error types for the lookahead buffer.
//!
//! Failures raised by a wrapped stream are never converted into [`Error`]:
//! they travel through the buffer with their own type and reach the caller
//! unchanged. This type covers what the buffer itself can get wrong.

use tokio::task::JoinError;

/// The main error type for the lookahead buffer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The buffer was configured with an unusable capacity
    #[error(
        "invalid buffer capacity {capacity}: must be between 1 and {max}",
        max = crate::buffer::MAX_CAPACITY
    )]
    Configuration { capacity: usize },

    /// A [`Source`](crate::traits::Source) failed to produce an item
    #[error("source error: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The producer task did not stop cleanly (panicked or was torn down by the runtime)
    #[error("producer task failed: {0}")]
    Producer(String),

    /// A custom error with a message
    #[error("{0}")]
    Custom(String),
}

// Convenience constructors
impl Error {
    /// Create a configuration error for the rejected capacity
    pub fn configuration(capacity: usize) -> Self {
        Error::Configuration { capacity }
    }

    /// Create a source error from any error type
    pub fn source_error<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Error::Source(Box::new(error))
    }

    /// Create a custom error with a message
    pub fn custom<S: Into<String>>(message: S) -> Self {
        Error::Custom(message.into())
    }

    /// Whether this error was raised while building a buffer
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration { .. })
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        if err.is_panic() {
            Error::Producer(format!("panicked: {}", panic_message(err.into_panic())))
        } else {
            Error::Producer(err.to_string())
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Custom(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Custom(s.to_string())
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Helper trait for converting foreign errors into a source failure
pub trait IntoSourceError<T> {
    fn into_source_error(self) -> Result<T>;
}

impl<T, E> IntoSourceError<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn into_source_error(self) -> Result<T> {
        self.map_err(Error::source_error)
    }
}

pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug, thiserror::Error)]
    #[error("connection reset")]
    struct Reset;

    #[test]
    fn configuration_error_names_capacity() {
        let err = Error::configuration(0);
        assert!(err.is_configuration());
        assert_eq!(
            err.to_string(),
            format!(
                "invalid buffer capacity 0: must be between 1 and {}",
                crate::buffer::MAX_CAPACITY
            )
        );
    }

    #[test]
    fn source_error_keeps_its_cause() {
        let result: std::result::Result<(), Reset> = Err(Reset);
        let err = result.into_source_error().unwrap_err();
        assert_eq!(err.to_string(), "source error: connection reset");
        assert_eq!(err.source().unwrap().to_string(), "connection reset");
    }

    #[tokio::test]
    async fn join_panic_becomes_producer_error() {
        let handle = tokio::spawn(async { panic!("boom") });
        let err = Error::from(handle.await.unwrap_err());
        assert!(matches!(err, Error::Producer(ref msg) if msg.contains("boom")));
    }
}
