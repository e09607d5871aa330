//! Byte streams for the long-lived event stream endpoint

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use smol_str::SmolStr;

/// Boxed error type for streaming operations
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure while opening or reading the event stream
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum StreamError {
    /// The connection failed mid-stream
    #[error("stream transport error: {0}")]
    #[diagnostic(code(van::stream::transport))]
    Transport(#[source] BoxError),

    /// The server would not open the stream
    #[error("stream rejected: {0}")]
    #[diagnostic(
        code(van::stream::rejected),
        help("the stream endpoint needs an authenticated request")
    )]
    Rejected(SmolStr),
}

impl StreamError {
    /// Wrap a transport-level failure
    pub fn transport(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        StreamError::Transport(Box::new(source))
    }

    /// A stream the server refused to open
    pub fn rejected(msg: impl Into<SmolStr>) -> Self {
        StreamError::Rejected(msg.into())
    }
}

/// Response body of the event stream, chunked however the network delivers it
pub struct ByteStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>,
}

impl ByteStream {
    /// Box any sendable stream of chunks
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, StreamError>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }
}

impl Stream for ByteStream {
    type Item = Result<Bytes, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStream").finish_non_exhaustive()
    }
}
