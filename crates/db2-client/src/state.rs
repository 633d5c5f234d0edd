//! Connection state types.
//!
//! The client uses the type-state pattern for what callers can do with a
//! connection, and a runtime [`HandshakeState`] for the steps of the DRDA
//! connect sequence.
//!
//! ## Handshake Transitions
//!
//! ```text
//! Disconnected -> ExcsatSent -> AccsecSent -> SecchkSent -> AccrdbSent -> Ready
//!                                          \______________/
//!                                  (SECCHK skipped without credentials)
//! any state -> Failed
//! ```

use std::fmt;

use crate::error::{Error, Result};

/// Marker trait for connection states.
///
/// This trait is sealed to prevent external implementations,
/// ensuring that only the states defined in this crate are valid.
pub trait ConnectionState: private::Sealed {}

/// Connection is not yet established.
///
/// In this state, only `connect()` can be called.
pub struct Disconnected;

/// The handshake completed and the database is accessed.
pub struct Ready;

impl ConnectionState for Disconnected {}
impl ConnectionState for Ready {}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Disconnected {}
    impl Sealed for super::Ready {}
}

/// Step of the DRDA connect sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    /// Nothing sent yet.
    #[default]
    Disconnected,
    /// EXCSAT sent, awaiting EXCSATRD.
    ExcsatSent,
    /// ACCSEC sent, awaiting ACCSECRD.
    AccsecSent,
    /// SECCHK sent, awaiting SECCHKRM.
    SecchkSent,
    /// ACCRDB sent, awaiting ACCRDBRM.
    AccrdbSent,
    /// Database accessed.
    Ready,
    /// The handshake failed; the connection is unusable.
    Failed,
}

impl HandshakeState {
    /// Whether `next` may follow this state.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Failed, _) => false,
            (_, Self::Failed) => true,
            (Self::Disconnected, Self::ExcsatSent)
            | (Self::ExcsatSent, Self::AccsecSent)
            | (Self::AccsecSent, Self::SecchkSent | Self::AccrdbSent)
            | (Self::SecchkSent, Self::AccrdbSent)
            | (Self::AccrdbSent, Self::Ready) => true,
            _ => false,
        }
    }

    /// Move to `next`, failing on an out-of-sequence step.
    pub fn advance(&mut self, next: Self) -> Result<()> {
        if !self.can_advance_to(next) {
            let from = *self;
            *self = Self::Failed;
            return Err(Error::UnexpectedState { from, to: next });
        }
        tracing::trace!(from = %self, to = %next, "handshake step");
        *self = next;
        Ok(())
    }

    /// Mark the handshake failed.
    pub fn fail(&mut self) {
        *self = Self::Failed;
    }

    /// Whether the handshake completed.
    #[must_use]
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }

    /// Whether the connection is unusable.
    #[must_use]
    pub fn is_failed(self) -> bool {
        self == Self::Failed
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "DISCONNECTED",
            Self::ExcsatSent => "EXCSAT_SENT",
            Self::AccsecSent => "ACCSEC_SENT",
            Self::SecchkSent => "SECCHK_SENT",
            Self::AccrdbSent => "ACCRDB_SENT",
            Self::Ready => "READY",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_full_sequence() {
        let mut state = HandshakeState::default();
        for next in [
            HandshakeState::ExcsatSent,
            HandshakeState::AccsecSent,
            HandshakeState::SecchkSent,
            HandshakeState::AccrdbSent,
            HandshakeState::Ready,
        ] {
            state.advance(next).unwrap();
        }
        assert!(state.is_ready());
    }

    #[test]
    fn test_secchk_can_be_skipped() {
        let mut state = HandshakeState::AccsecSent;
        state.advance(HandshakeState::AccrdbSent).unwrap();
        assert_eq!(state, HandshakeState::AccrdbSent);
    }

    #[test]
    fn test_out_of_sequence_fails() {
        let mut state = HandshakeState::ExcsatSent;
        let err = state.advance(HandshakeState::AccrdbSent).unwrap_err();
        assert!(matches!(
            err,
            Error::UnexpectedState {
                from: HandshakeState::ExcsatSent,
                to: HandshakeState::AccrdbSent,
            }
        ));
        assert!(state.is_failed());
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut state = HandshakeState::Failed;
        assert!(state.advance(HandshakeState::ExcsatSent).is_err());
        assert!(!state.can_advance_to(HandshakeState::Failed));
    }

    #[test]
    fn test_display() {
        assert_eq!(HandshakeState::SecchkSent.to_string(), "SECCHK_SENT");
    }
}
