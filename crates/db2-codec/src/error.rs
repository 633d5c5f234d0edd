//! Codec error types.

use drda_protocol::ProtocolError;
use thiserror::Error;

/// Errors raised while framing DSS chains.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// IO error on the transport.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte stream is not valid DSS framing.
    #[error("framing error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A reply chain exceeds the configured limit.
    #[error("reply of {size} bytes exceeds the limit of {max}")]
    ReplyTooLarge {
        /// Bytes buffered so far.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// The server closed the connection before a reply was complete.
    #[error("connection closed")]
    ConnectionClosed,
}

impl CodecError {
    /// Whether the connection is unusable after this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Protocol(e) => e.is_fatal(),
            Self::Io(_) | Self::ReplyTooLarge { .. } | Self::ConnectionClosed => true,
        }
    }
}
