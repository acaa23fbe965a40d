//! Error types for checksummed streams.

use std::io;
use thiserror::Error;

/// The main error type for checkstream operations.
#[derive(Debug, Error)]
pub enum CheckstreamError {
    /// An I/O error occurred in the underlying source or sink.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The sink failed part way through a write.
    ///
    /// `written` counts the content bytes the sink confirmed before failing.
    /// The writer is poisoned afterwards.
    #[error("I/O error after writing {written} content bytes: {source}")]
    WriteFailed {
        written: usize,
        #[source]
        source: io::Error,
    },

    /// The stream was closed, or poisoned by an earlier sink failure.
    #[error("Stream is closed")]
    Closed,

    /// The checksum interval is zero or larger than [`MAX_INTERVAL`](crate::blocks::utils::MAX_INTERVAL).
    #[error("Invalid checksum interval: {0}")]
    InvalidInterval(u64),

    /// A seek resolved to a position outside the content.
    #[error("Invalid seek: {0}")]
    InvalidSeek(String),

    /// A raw whence value was not one of start, current or end.
    #[error("Invalid whence {whence} at physical position {position}")]
    InvalidWhence { whence: i32, position: u64 },
}

/// A specialized Result type for checkstream operations.
pub type Result<T> = std::result::Result<T, CheckstreamError>;

impl From<CheckstreamError> for io::Error {
    fn from(err: CheckstreamError) -> Self {
        match err {
            CheckstreamError::Io(e) => e,
            CheckstreamError::WriteFailed { source, .. } => source,
            CheckstreamError::InvalidInterval(_)
            | CheckstreamError::InvalidSeek(_)
            | CheckstreamError::InvalidWhence { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            CheckstreamError::Closed => io::Error::other(err),
        }
    }
}
