use std::fmt;
use std::io;
use std::sync::Arc;

/// A failure cause, shared between every thread and notification that
/// observes it.
///
/// One request failure fans out to several places: the `failure`
/// notification, the request side of the [`ExchangeResult`][crate::ExchangeResult],
/// and possibly a synthesized response failure. They all carry clones of
/// the same cause.
pub type Cause = Arc<Error>;

/// Errors this crate originates or carries on behalf of its callers.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The application gave up on the request.
    Aborted(String),

    /// The transport failed to write request bytes.
    Io(io::Error),

    /// The content source failed to produce a chunk.
    ///
    /// Surfaced by transports that read a failing source while writing;
    /// the sender treats it like any other transport failure.
    Content(String),
}

impl Error {
    /// Wrap `reason` as an abort cause.
    pub fn aborted(reason: impl Into<String>) -> Cause {
        Arc::new(Error::Aborted(reason.into()))
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Error::Io(value)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Aborted(reason) => write!(f, "request aborted: {}", reason),
            Error::Io(e) => write!(f, "transport write failed: {}", e),
            Error::Content(reason) => write!(f, "content source failed: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_aborted() {
        let cause = Error::aborted("too slow");
        assert_eq!(cause.to_string(), "request aborted: too slow");
    }

    #[test]
    fn io_source_is_preserved() {
        let io = io::Error::new(io::ErrorKind::BrokenPipe, "peer closed");
        let error = Error::from(io);
        assert!(std::error::Error::source(&error).is_some());
        assert_eq!(error.to_string(), "transport write failed: peer closed");
    }
}
