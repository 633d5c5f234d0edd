//! Declarative reply grammars.
//!
//! A reply message is a collection whose members may arrive in any order.
//! Each message is described by a static [`Grammar`]: a table of member code
//! points, whether each is required, and the handler that consumes it into
//! a state value. [`Grammar::parse`] enforces the table:
//!
//! - a member seen twice fails with `DupObjPresent`;
//! - a required member never seen fails with `ReqObjNotFound`;
//! - a code point missing from the table fails as
//!   [`ProtocolError::UnexpectedCodePoint`] naming the message.

use crate::codepoint;
use crate::error::{ProtocolError, Severity, SyntaxErrorCode};
use crate::parser::{Peek, ReplyParser};

/// Consumes one member object into the reply state.
pub type Handler<S> = fn(&mut ReplyParser, &mut S) -> Result<(), ProtocolError>;

/// One member of a reply grammar.
pub struct Field<S> {
    /// Code point of the member.
    pub code_point: u16,
    /// Whether the member must be present.
    pub required: bool,
    /// Handler that consumes the member, header included.
    pub handler: Handler<S>,
}

impl<S> Field<S> {
    /// A member that must be present.
    pub const fn required(code_point: u16, handler: Handler<S>) -> Self {
        Self {
            code_point,
            required: true,
            handler,
        }
    }

    /// A member that may be absent.
    pub const fn optional(code_point: u16, handler: Handler<S>) -> Self {
        Self {
            code_point,
            required: false,
            handler,
        }
    }
}

/// Member table of one collection-valued reply object.
pub struct Grammar<S: 'static> {
    /// Code point of the collection.
    pub code_point: u16,
    /// Members, at most 64.
    pub fields: &'static [Field<S>],
}

impl<S> Grammar<S> {
    /// Name of the collection, for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        codepoint::name(self.code_point)
    }

    /// Consume the collection header and every member.
    pub fn parse(&self, parser: &mut ReplyParser, state: &mut S) -> Result<(), ProtocolError> {
        parser.parse_length_and_match_code_point(self.code_point)?;
        parser.push_length_on_collection_stack();
        self.parse_members(parser, state)?;
        parser.pop_collection_stack()
    }

    /// Consume members until the innermost collection or the same-ID chain
    /// ends.
    pub fn parse_members(&self, parser: &mut ReplyParser, state: &mut S) -> Result<(), ProtocolError> {
        debug_assert!(self.fields.len() <= 64);
        let mut seen = 0u64;

        while let Peek::CodePoint(code_point) = parser.peek_code_point()? {
            let Some(index) = self.fields.iter().position(|f| f.code_point == code_point) else {
                return Err(ProtocolError::UnexpectedCodePoint {
                    context: self.name(),
                    code_point,
                });
            };
            let bit = 1u64 << index;
            if seen & bit != 0 {
                return Err(ProtocolError::framing(
                    SyntaxErrorCode::DupObjPresent,
                    format!(
                        "{} appears twice in {}",
                        codepoint::name(code_point),
                        self.name()
                    ),
                ));
            }
            seen |= bit;
            (self.fields[index].handler)(parser, state)?;
        }

        for (index, field) in self.fields.iter().enumerate() {
            if field.required && seen & (1u64 << index) == 0 {
                return Err(ProtocolError::framing(
                    SyntaxErrorCode::ReqObjNotFound,
                    format!(
                        "{} missing from {}",
                        codepoint::name(field.code_point),
                        self.name()
                    ),
                ));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Shared member readers
// =============================================================================

/// Read a SVRCOD and check it lies in `min..=max`.
pub fn read_svrcod(
    parser: &mut ReplyParser,
    min: Severity,
    max: Severity,
) -> Result<Severity, ProtocolError> {
    parser.parse_length_and_match_code_point(codepoint::SVRCOD)?;
    let raw = parser.read_unsigned_short()?;
    let severity = Severity::from_u16(raw).map_err(|_| invalid(codepoint::SVRCOD, raw))?;
    if severity < min || severity > max {
        return Err(invalid(codepoint::SVRCOD, raw));
    }
    Ok(severity)
}

/// Read a character scalar in the connection CCSID.
pub fn read_string_scalar(parser: &mut ReplyParser, code_point: u16) -> Result<String, ProtocolError> {
    parser.parse_length_and_match_code_point(code_point)?;
    parser.read_string()
}

/// Read an RDBNAM, dropping the blank padding.
pub fn read_rdbnam(parser: &mut ReplyParser) -> Result<String, ProtocolError> {
    let name = read_string_scalar(parser, codepoint::RDBNAM)?;
    Ok(name.trim_end().to_owned())
}

/// Read a CODPNT value.
pub fn read_codpnt(parser: &mut ReplyParser) -> Result<u16, ProtocolError> {
    parser.parse_length_and_match_code_point(codepoint::CODPNT)?;
    parser.read_unsigned_short()
}

/// Read a SRVDGN, whose content is server-defined diagnostic text.
pub fn read_srvdgn(parser: &mut ReplyParser) -> Result<String, ProtocolError> {
    read_string_scalar(parser, codepoint::SRVDGN)
}

/// Read a MGRLVLLS: pairs of manager code point and level.
pub fn read_mgrlvlls(parser: &mut ReplyParser) -> Result<Vec<(u16, u16)>, ProtocolError> {
    parser.parse_length_and_match_code_point(codepoint::MGRLVLLS)?;
    let length = parser.scalar_length();
    if length == 0 || length % 4 != 0 {
        return Err(ProtocolError::framing(
            SyntaxErrorCode::ObjLenNotAllowed,
            format!("MGRLVLLS length {length} is not a non-zero multiple of 4"),
        ));
    }
    let mut levels = Vec::with_capacity(length / 4);
    for _ in 0..length / 4 {
        let manager = parser.read_unsigned_short()?;
        let level = parser.read_unsigned_short()?;
        levels.push((manager, level));
    }
    Ok(levels)
}

/// Skip a member the client does not use.
pub fn skip_member(parser: &mut ReplyParser, code_point: u16) -> Result<(), ProtocolError> {
    parser.parse_length_and_match_code_point(code_point)?;
    parser.skip_scalar()
}

pub(crate) fn invalid(code_point: u16, value: impl Into<u32>) -> ProtocolError {
    ProtocolError::InvalidValue {
        code_point,
        value: value.into(),
    }
}
