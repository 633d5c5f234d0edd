//! Client error types.

use db2_codec::CodecError;
use drda_protocol::{NetSqlca, ProtocolError};
use thiserror::Error;

use crate::section::SectionError;
use crate::state::HandshakeState;

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Connection closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// TCP connection was not established in time.
    #[error("connection timed out")]
    ConnectionTimeout,

    /// The handshake did not complete in time.
    #[error("login timed out")]
    LoginTimeout,

    /// A command did not complete in time.
    #[error("command timed out")]
    CommandTimeout,

    /// Credentials are missing or unusable for the security mechanism.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Protocol error, including server error replies and SQL errors.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A reply arrived in a state that does not expect it.
    #[error("unexpected handshake transition from {from} to {to}")]
    UnexpectedState {
        /// State the handshake was in.
        from: HandshakeState,
        /// State the reply would have moved it to.
        to: HandshakeState,
    },

    /// Section allocation error.
    #[error("section error: {0}")]
    Section(#[from] SectionError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is transient and may succeed on retry.
    ///
    /// Transient errors include timeouts, dropped connections and section
    /// exhaustion, which clears once another statement releases its section.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionTimeout
            | Self::LoginTimeout
            | Self::CommandTimeout
            | Self::ConnectionClosed
            | Self::Io(_) => true,
            Self::Codec(CodecError::Io(_) | CodecError::ConnectionClosed) => true,
            Self::Section(e) => e.is_exhausted(),
            _ => false,
        }
    }

    /// Check if the connection can no longer be used.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Protocol(e) => e.is_fatal(),
            Self::Codec(e) => e.is_fatal(),
            Self::ConnectionClosed
            | Self::Authentication(_)
            | Self::UnexpectedState { .. }
            | Self::Io(_) => true,
            _ => false,
        }
    }

    /// Check if every section of every package is in use.
    #[must_use]
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, Self::Section(e) if e.is_exhausted())
    }

    /// Check if this error indicates a protocol/driver bug or a stream the
    /// driver could not understand.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Codec(CodecError::Protocol(_)))
    }

    /// SQLCA attached to the error, if the server sent one.
    #[must_use]
    pub fn sqlca(&self) -> Option<&NetSqlca> {
        match self {
            Self::Protocol(e) => e.sqlca(),
            _ => None,
        }
    }

    /// SQLCODE of the attached SQLCA.
    #[must_use]
    pub fn sql_code(&self) -> Option<i32> {
        self.sqlca().map(NetSqlca::code)
    }

    /// SQLSTATE of the attached SQLCA.
    #[must_use]
    pub fn sql_state(&self) -> Option<&str> {
        self.sqlca().map(NetSqlca::state)
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_error_exposes_code_and_state() {
        let err = Error::from(ProtocolError::Sql(Box::new(NetSqlca::new(-204, "42704"))));
        assert_eq!(err.sql_code(), Some(-204));
        assert_eq!(err.sql_state(), Some("42704"));
        assert!(err.is_terminal());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_exhausted_is_retryable() {
        let err = Error::from(SectionError::Exhausted { packages: 6 });
        assert!(err.is_resource_exhausted());
        assert!(err.is_transient());
        assert!(!err.is_terminal());
    }

    #[test]
    fn test_double_release_is_not_exhaustion() {
        let err = Error::from(SectionError::AlreadyReleased {
            package: "SYSSH200".into(),
            number: 1,
        });
        assert!(!err.is_resource_exhausted());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_value_range_is_recoverable() {
        let err = Error::from(ProtocolError::value_range("RDBNAM", "too long"));
        assert!(!err.is_terminal());
        assert!(err.is_protocol_error());
    }

    #[test]
    fn test_timeouts_are_transient() {
        assert!(Error::ConnectionTimeout.is_transient());
        assert!(Error::LoginTimeout.is_transient());
        assert!(Error::Codec(CodecError::ConnectionClosed).is_transient());
    }
}
