//! DSS (Data Stream Structure) header definitions.

use bitflags::bitflags;
use bytes::{Buf, BufMut};

use crate::constants::{DSS_HEADER_SIZE, DSS_MAX_LENGTH};
use crate::error::{ProtocolError, SyntaxErrorCode};

/// Magic byte present in every DSS header.
pub const DSS_MAGIC: u8 = 0xD0;

/// Length value that flags a continued DSS.
pub const DSS_CONTINUATION_BIT: u16 = 0x8000;

/// Correlation ID some servers return on error replies instead of the
/// expected value.
pub const CORRELATION_ID_ANY: u16 = 0xFFFF;

/// DSS type carried in the low nibble of the format byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DssType {
    /// Request DSS (RQSDSS).
    Request = 0x01,
    /// Reply DSS (RPYDSS).
    Reply = 0x02,
    /// Object DSS (OBJDSS).
    Object = 0x03,
    /// Encrypted object DSS.
    EncryptedObject = 0x04,
}

impl DssType {
    /// Extract the DSS type from a format byte.
    pub fn from_format(format: u8) -> Result<Self, ProtocolError> {
        match format & 0x0F {
            0x01 => Ok(Self::Request),
            0x02 => Ok(Self::Reply),
            0x03 => Ok(Self::Object),
            0x04 => Ok(Self::EncryptedObject),
            other => Err(ProtocolError::framing(
                SyntaxErrorCode::FByteNotSupported,
                format!("DSS type {other:#04X}"),
            )),
        }
    }

    /// Whether a server may send this type in a reply chain.
    #[must_use]
    pub const fn is_reply_type(self) -> bool {
        !matches!(self, Self::Request)
    }
}

bitflags! {
    /// Chaining flags in the high nibble of the DSS format byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DssFlags: u8 {
        /// Another DSS follows this one.
        const CHAINED = 0x40;
        /// Continue processing the chain if this DSS fails.
        const CONTINUE_ON_ERROR = 0x20;
        /// The next DSS carries the same correlation ID.
        const SAME_CORRELATOR = 0x10;
    }
}

/// A 6-byte DSS header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DssHeader {
    /// Raw length field, continuation bit included.
    pub length: u16,
    /// DSS type.
    pub dss_type: DssType,
    /// Chaining flags.
    pub flags: DssFlags,
    /// Request correlation ID.
    pub correlation_id: u16,
}

impl DssHeader {
    /// Create a header.
    #[must_use]
    pub const fn new(dss_type: DssType, length: u16, correlation_id: u16) -> Self {
        Self {
            length,
            dss_type,
            flags: DssFlags::empty(),
            correlation_id,
        }
    }

    /// Set chaining flags.
    #[must_use]
    pub const fn with_flags(mut self, flags: DssFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Parse a header, validating length, magic and format byte.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        if src.remaining() < DSS_HEADER_SIZE {
            return Err(ProtocolError::NeedMoreData {
                needed: DSS_HEADER_SIZE,
                available: src.remaining(),
            });
        }

        let length = src.get_u16();
        let effective = effective_length(length);
        if effective < DSS_HEADER_SIZE {
            return Err(ProtocolError::framing(
                SyntaxErrorCode::DssLessThan6,
                format!("DSS length {effective}"),
            ));
        }

        let magic = src.get_u8();
        if magic != DSS_MAGIC {
            return Err(ProtocolError::framing(
                SyntaxErrorCode::CByteNotD0,
                format!("magic byte {magic:#04X}"),
            ));
        }

        let format = src.get_u8();
        let dss_type = DssType::from_format(format)?;
        let flags = DssFlags::from_bits_truncate(format);
        let correlation_id = src.get_u16();

        Ok(Self {
            length,
            dss_type,
            flags,
            correlation_id,
        })
    }

    /// Encode the header.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u16(self.length);
        dst.put_u8(DSS_MAGIC);
        dst.put_u8(self.format_byte());
        dst.put_u16(self.correlation_id);
    }

    /// Format byte combining type and flags.
    #[must_use]
    pub const fn format_byte(&self) -> u8 {
        self.dss_type as u8 | self.flags.bits()
    }

    /// Whether continuation headers follow this segment.
    #[must_use]
    pub const fn is_continued(&self) -> bool {
        self.length & DSS_CONTINUATION_BIT != 0
    }

    /// Whether another DSS follows in the chain.
    #[must_use]
    pub const fn is_chained(&self) -> bool {
        self.flags.contains(DssFlags::CHAINED)
    }

    /// Whether the next DSS shares this correlation ID.
    #[must_use]
    pub const fn is_same_correlator(&self) -> bool {
        self.flags.contains(DssFlags::SAME_CORRELATOR)
    }

    /// Segment length, header included, with the continuation bit folded in.
    #[must_use]
    pub const fn segment_length(&self) -> usize {
        effective_length(self.length)
    }

    /// Payload bytes in this segment.
    #[must_use]
    pub const fn payload_length(&self) -> usize {
        self.segment_length().saturating_sub(DSS_HEADER_SIZE)
    }

    /// Validate the chaining flags and return the correlation ID the next
    /// DSS must carry.
    ///
    /// The next ID follows from `expected`, the ID this DSS was supposed to
    /// carry, so a wildcard `0xFFFF` in the middle of a chain does not shift
    /// the sequence.
    pub fn next_correlation_id(&self, expected: u16) -> Result<u16, ProtocolError> {
        if self.is_chained() {
            if self.is_same_correlator() {
                Ok(expected)
            } else {
                Ok(expected.wrapping_add(1))
            }
        } else if self.is_same_correlator() {
            Err(ProtocolError::framing(
                SyntaxErrorCode::ChainOffSameNextCorrelator,
                "same-correlator flag set on the last DSS of a chain",
            ))
        } else if self.flags.contains(DssFlags::CONTINUE_ON_ERROR) {
            Err(ProtocolError::framing(
                SyntaxErrorCode::ChainOffErrorContinue,
                "continue-on-error flag set on the last DSS of a chain",
            ))
        } else {
            Ok(1)
        }
    }
}

/// Length represented by a DSS or continuation length field.
#[must_use]
pub const fn effective_length(raw: u16) -> usize {
    if raw & DSS_CONTINUATION_BIT != 0 {
        DSS_MAX_LENGTH
    } else {
        raw as usize
    }
}

/// Scan buffered bytes for a complete DSS chain.
///
/// Returns the number of bytes that make up the chain, through the first DSS
/// whose chaining bit is off, or `None` if more bytes are needed. Only
/// lengths, magic bytes and continuation headers are checked here; the
/// reply parser validates everything else.
pub fn scan_chain(src: &[u8]) -> Result<Option<usize>, ProtocolError> {
    let mut pos = 0usize;
    loop {
        let Some(header) = src.get(pos..pos + DSS_HEADER_SIZE) else {
            return Ok(None);
        };
        let raw = u16::from_be_bytes([header[0], header[1]]);
        let length = effective_length(raw);
        if length < DSS_HEADER_SIZE {
            return Err(ProtocolError::framing(
                SyntaxErrorCode::DssLessThan6,
                format!("DSS length {length} at offset {pos}"),
            ));
        }
        if header[2] != DSS_MAGIC {
            return Err(ProtocolError::framing(
                SyntaxErrorCode::CByteNotD0,
                format!("magic byte {:#04X} at offset {}", header[2], pos + 2),
            ));
        }
        let chained = header[3] & DssFlags::CHAINED.bits() != 0;

        pos += length;
        let mut continued = raw & DSS_CONTINUATION_BIT != 0;
        while continued {
            let Some(cont) = src.get(pos..pos + 2) else {
                return Ok(None);
            };
            let raw = u16::from_be_bytes([cont[0], cont[1]]);
            let length = effective_length(raw);
            if length <= 2 {
                return Err(ProtocolError::framing(
                    SyntaxErrorCode::DssContLessOrEqual2,
                    format!("continuation length {length} at offset {pos}"),
                ));
            }
            continued = raw & DSS_CONTINUATION_BIT != 0;
            pos += length;
        }

        if pos > src.len() {
            return Ok(None);
        }
        if !chained {
            return Ok(Some(pos));
        }
    }
}
