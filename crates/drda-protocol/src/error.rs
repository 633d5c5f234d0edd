//! Protocol-level error types.

use std::fmt;

use thiserror::Error;

use crate::codepoint;
use crate::sqlca::NetSqlca;

/// DDM syntax error codes (SYNERRCD) identifying the framing rule that was
/// broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u8)]
pub enum SyntaxErrorCode {
    /// DSS header length less than 6.
    DssLessThan6 = 0x01,
    /// DSS header length does not match the number of bytes available.
    DssLengthByteNumberMismatch = 0x02,
    /// DSS header magic byte is not 0xD0.
    CByteNotD0 = 0x03,
    /// DSS header format byte not recognized or not supported.
    FByteNotSupported = 0x04,
    /// Object length does not match the enclosing length.
    ObjLenNotAllowed = 0x0B,
    /// Incorrect extended length field.
    IncorrectExtendedLen = 0x0C,
    /// Required object not found.
    ReqObjNotFound = 0x0E,
    /// Duplicate object present.
    DupObjPresent = 0x12,
    /// Invalid request correlator.
    InvalidCorrelator = 0x13,
    /// DSS continuation length less than or equal to 2.
    DssContLessOrEqual2 = 0x16,
    /// Chaining bit off but "next has same correlator" set.
    ChainOffSameNextCorrelator = 0x18,
    /// Chaining bit off but "continue on error" set.
    ChainOffErrorContinue = 0x1A,
}

impl SyntaxErrorCode {
    /// Map a SYNERRCD value received from a server.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x01 => Self::DssLessThan6,
            0x02 => Self::DssLengthByteNumberMismatch,
            0x03 => Self::CByteNotD0,
            0x04 => Self::FByteNotSupported,
            0x0B => Self::ObjLenNotAllowed,
            0x0C => Self::IncorrectExtendedLen,
            0x0E => Self::ReqObjNotFound,
            0x12 => Self::DupObjPresent,
            0x13 => Self::InvalidCorrelator,
            0x16 => Self::DssContLessOrEqual2,
            0x18 => Self::ChainOffSameNextCorrelator,
            0x1A => Self::ChainOffErrorContinue,
            _ => return None,
        })
    }

    /// The raw SYNERRCD value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for SyntaxErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SYNERRCD {:#04X}", self.as_u8())
    }
}

/// Severity code (SVRCOD) attached to reply messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum Severity {
    /// Informational.
    Info = 0,
    /// Warning.
    Warning = 4,
    /// Error.
    Error = 8,
    /// Severe error.
    Severe = 16,
    /// Access damage.
    AccessDamage = 32,
    /// Permanent agent damage.
    PermanentDamage = 64,
    /// Session damage.
    SessionDamage = 128,
}

impl Severity {
    /// Decode a SVRCOD value.
    pub fn from_u16(value: u16) -> Result<Self, ProtocolError> {
        Ok(match value {
            0 => Self::Info,
            4 => Self::Warning,
            8 => Self::Error,
            16 => Self::Severe,
            32 => Self::AccessDamage,
            64 => Self::PermanentDamage,
            128 => Self::SessionDamage,
            other => {
                return Err(ProtocolError::framing(
                    SyntaxErrorCode::ObjLenNotAllowed,
                    format!("invalid SVRCOD value {other}"),
                ));
            }
        })
    }

    /// The raw SVRCOD value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Whether this severity means the request failed.
    #[must_use]
    pub const fn is_error(self) -> bool {
        self as u16 >= Self::Error as u16
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Severe => "SEVERE",
            Self::AccessDamage => "ACCDMG",
            Self::PermanentDamage => "PRMDMG",
            Self::SessionDamage => "SESDMG",
        };
        f.write_str(name)
    }
}

/// Security check code (SECCHKCD) returned by ACCSECRD or SECCHKRM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SecurityCheckCode {
    /// Security check succeeded.
    Ok,
    /// Security mechanism not supported.
    MechanismNotSupported,
    /// Local security service error.
    LocalServiceError,
    /// Security token missing or invalid.
    TokenInvalid,
    /// Password expired.
    PasswordExpired,
    /// Password invalid.
    PasswordInvalid,
    /// Password missing.
    PasswordMissing,
    /// User ID missing.
    UserIdMissing,
    /// User ID invalid.
    UserIdInvalid,
    /// User ID revoked.
    UserIdRevoked,
    /// New password invalid.
    NewPasswordInvalid,
    /// Any other non-zero code.
    Other(u8),
}

impl SecurityCheckCode {
    /// Decode a SECCHKCD value.
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Ok,
            0x01 => Self::MechanismNotSupported,
            0x0A => Self::LocalServiceError,
            0x0B => Self::TokenInvalid,
            0x0E => Self::PasswordExpired,
            0x0F => Self::PasswordInvalid,
            0x10 => Self::PasswordMissing,
            0x12 => Self::UserIdMissing,
            0x13 => Self::UserIdInvalid,
            0x14 => Self::UserIdRevoked,
            0x15 => Self::NewPasswordInvalid,
            other => Self::Other(other),
        }
    }

    /// Whether the code reports rejected credentials, as opposed to a
    /// missing value or a server-side failure.
    #[must_use]
    pub fn is_invalid_credentials(self) -> bool {
        matches!(
            self,
            Self::PasswordExpired
                | Self::PasswordInvalid
                | Self::UserIdInvalid
                | Self::UserIdRevoked
                | Self::NewPasswordInvalid
        )
    }
}

impl fmt::Display for SecurityCheckCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("security check succeeded"),
            Self::MechanismNotSupported => f.write_str("security mechanism not supported"),
            Self::LocalServiceError => f.write_str("local security service error"),
            Self::TokenInvalid => f.write_str("security token missing or invalid"),
            Self::PasswordExpired => f.write_str("password expired"),
            Self::PasswordInvalid => f.write_str("password invalid"),
            Self::PasswordMissing => f.write_str("password missing"),
            Self::UserIdMissing => f.write_str("user id missing"),
            Self::UserIdInvalid => f.write_str("user id invalid"),
            Self::UserIdRevoked => f.write_str("user id revoked"),
            Self::NewPasswordInvalid => f.write_str("new password invalid"),
            Self::Other(code) => write!(f, "authentication failed (SECCHKCD {code:#04X})"),
        }
    }
}

/// Reasons the security negotiation can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SecurityFailure {
    /// The server did not accept the requested mechanism.
    #[error("security mechanism {requested} not accepted, server offers {offered:?}")]
    MechanismNotAccepted {
        /// Mechanism the client asked for.
        requested: u16,
        /// Mechanisms returned in ACCSECRD.
        offered: Vec<u16>,
    },

    /// The mechanism needs a security token the server did not send.
    #[error("security mechanism {mechanism} requires a security token")]
    TokenRequired {
        /// The negotiated mechanism.
        mechanism: u16,
    },

    /// The server accepted a mechanism whose exchange this client does not
    /// implement.
    #[error("security mechanism {mechanism} is not supported by this client")]
    Unsupported {
        /// The negotiated mechanism.
        mechanism: u16,
    },

    /// ACCSECRD or SECCHKRM carried a non-zero SECCHKCD.
    #[error("{0}")]
    CheckFailed(SecurityCheckCode),
}

/// An error reply message returned by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerError {
    /// Code point of the reply message (for example CMDCHKRM).
    pub code_point: u16,
    /// Severity code carried by the reply.
    pub severity: Severity,
    /// Database name, when the reply carried RDBNAM.
    pub rdb_name: Option<String>,
    /// Message-specific reason: SYNERRCD, PRCCNVCD or the rejected CODPNT.
    pub reason: Option<u16>,
    /// Server diagnostic text (SRVDGN).
    pub diagnostic: Option<String>,
    /// SQLCA that followed the reply, if any.
    pub sqlca: Option<Box<NetSqlca>>,
}

impl ServerError {
    /// Create a server error for a reply message.
    #[must_use]
    pub fn new(code_point: u16, severity: Severity) -> Self {
        Self {
            code_point,
            severity,
            rdb_name: None,
            reason: None,
            diagnostic: None,
            sqlca: None,
        }
    }

    /// Name of the reply message.
    #[must_use]
    pub fn message_name(&self) -> &'static str {
        codepoint::name(self.code_point)
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (SVRCOD {})", self.message_name(), self.severity)?;
        if let Some(rdb) = &self.rdb_name {
            write!(f, " for database {rdb}")?;
        }
        if let Some(reason) = self.reason {
            write!(f, ", reason {reason:#06X}")?;
        }
        if let Some(sqlca) = &self.sqlca {
            write!(f, ", SQLCODE={} SQLSTATE={}", sqlca.code(), sqlca.state())?;
        }
        if let Some(diagnostic) = &self.diagnostic {
            write!(f, ": {diagnostic}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ServerError {}

/// Errors that can occur while encoding or decoding DRDA data.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The byte stream violated DSS/DDM framing rules.
    #[error("DRDA framing violation ({code}): {detail}")]
    Framing {
        /// Syntax rule that was violated.
        code: SyntaxErrorCode,
        /// What was observed.
        detail: String,
    },

    /// A read needed more bytes than are buffered.
    #[error("need {needed} bytes, only {available} available")]
    NeedMoreData {
        /// Bytes the read required.
        needed: usize,
        /// Bytes that were available.
        available: usize,
    },

    /// A code point appeared where the current grammar does not allow it.
    #[error("code point {code_point:#06X} ({}) not valid in {context}", codepoint::name(*code_point))]
    UnexpectedCodePoint {
        /// Grammar being parsed.
        context: &'static str,
        /// Offending code point.
        code_point: u16,
    },

    /// A reply carried a value its code point does not allow.
    #[error("value {value:#X} not supported for {}", codepoint::name(*code_point))]
    InvalidValue {
        /// Code point of the offending parameter.
        code_point: u16,
        /// The received value.
        value: u32,
    },

    /// The server returned an error reply message.
    #[error("server error: {0}")]
    Server(Box<ServerError>),

    /// A SQLCARD reported a negative SQLCODE.
    #[error("SQL error: SQLCODE={}, SQLSTATE={}", .0.code(), .0.state())]
    Sql(Box<NetSqlca>),

    /// Security negotiation failed.
    #[error("security failure: {0}")]
    Security(#[from] SecurityFailure),

    /// A value does not fit the wire representation.
    #[error("value out of range for {field}: {detail}")]
    ValueRange {
        /// Field or codec that rejected the value.
        field: &'static str,
        /// Why it was rejected.
        detail: String,
    },
}

impl ProtocolError {
    /// Create a framing error.
    pub fn framing(code: SyntaxErrorCode, detail: impl Into<String>) -> Self {
        Self::Framing {
            code,
            detail: detail.into(),
        }
    }

    /// Create a value range error.
    pub fn value_range(field: &'static str, detail: impl Into<String>) -> Self {
        Self::ValueRange {
            field,
            detail: detail.into(),
        }
    }

    /// Whether the connection must be abandoned after this error.
    ///
    /// Value range errors are raised before anything is written, so the
    /// connection stays usable.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ValueRange { .. })
    }

    /// Whether this error reports a buffer underrun.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::NeedMoreData { .. })
    }

    /// The SQLCA attached to this error, if any.
    #[must_use]
    pub fn sqlca(&self) -> Option<&NetSqlca> {
        match self {
            Self::Sql(sqlca) => Some(sqlca),
            Self::Server(err) => err.sqlca.as_deref(),
            _ => None,
        }
    }
}

impl From<ServerError> for ProtocolError {
    fn from(err: ServerError) -> Self {
        Self::Server(Box::new(err))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_decoding() {
        assert_eq!(Severity::from_u16(0).unwrap(), Severity::Info);
        assert_eq!(Severity::from_u16(4).unwrap(), Severity::Warning);
        assert_eq!(Severity::from_u16(128).unwrap(), Severity::SessionDamage);
        assert!(Severity::from_u16(3).is_err());
        assert!(!Severity::Warning.is_error());
        assert!(Severity::Error.is_error());
    }

    #[test]
    fn test_security_check_code_classification() {
        assert_eq!(SecurityCheckCode::from_u8(0), SecurityCheckCode::Ok);
        assert!(SecurityCheckCode::from_u8(0x0F).is_invalid_credentials());
        assert!(SecurityCheckCode::from_u8(0x15).is_invalid_credentials());
        assert!(!SecurityCheckCode::from_u8(0x10).is_invalid_credentials());
        assert_eq!(
            SecurityCheckCode::from_u8(0x42),
            SecurityCheckCode::Other(0x42)
        );
    }

    #[test]
    fn test_value_range_is_not_fatal() {
        let err = ProtocolError::value_range("PASSWORD", "empty");
        assert!(!err.is_fatal());
        let err = ProtocolError::framing(SyntaxErrorCode::CByteNotD0, "magic 0x00");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_server_error_display() {
        let mut err = ServerError::new(codepoint::RDBNACRM, Severity::Error);
        err.rdb_name = Some("SAMPLE".into());
        let text = err.to_string();
        assert!(text.contains("RDBNACRM"));
        assert!(text.contains("SAMPLE"));
    }
}
