//! Reply parser: walks DSS-framed DDM objects.
//!
//! The parser owns one complete reply chain. Continued DSS segments are
//! reassembled when their header is read, so every reader below sees a
//! contiguous payload. Lengths are tracked at three levels (current scalar,
//! every open collection, current DSS) and each consumed byte is charged
//! against all of them; any level going negative is a framing error.

use bytes::{Buf, Bytes, BytesMut};

use crate::ccsid::{ByteOrder, Ccsid, Typdef};
use crate::constants::{DDM_HEADER_SIZE, DSS_HEADER_SIZE, DSS_MAX_LENGTH};
use crate::dss::{CORRELATION_ID_ANY, DSS_CONTINUATION_BIT, DssHeader, effective_length};
use crate::error::{ProtocolError, SyntaxErrorCode};

/// Result of looking at the next object without consuming it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peek {
    /// The next object has this code point.
    CodePoint(u16),
    /// The innermost open collection is exhausted.
    EndOfCollection,
    /// The current DSS is exhausted and the next one has a new correlator.
    EndOfSameIdChain,
    /// No bytes remain in the reply.
    EndOfBuffer,
}

impl Peek {
    /// The code point, if one was peeked.
    #[must_use]
    pub const fn code_point(self) -> Option<u16> {
        match self {
            Self::CodePoint(cp) => Some(cp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Peeked {
    code_point: u16,
    /// Content length for extended objects, total length otherwise. `None`
    /// for streamed objects.
    length: Option<usize>,
    extended_bytes: usize,
}

/// Parser over one reply chain.
#[derive(Debug)]
pub struct ReplyParser {
    src: Bytes,
    payload: Bytes,
    dss_length: usize,
    chained_with_same_id: bool,
    expected_correlation_id: u16,
    current_correlation_id: u16,
    collection_stack: Vec<usize>,
    peeked: Option<Peeked>,
    scalar_length: usize,
    scalar_streamed: bool,
    ccsid: Ccsid,
    data_ccsid: Ccsid,
    byte_order: ByteOrder,
}

impl ReplyParser {
    /// Create a parser over a complete reply chain.
    #[must_use]
    pub fn new(src: Bytes, typdef: &Typdef) -> Self {
        Self {
            src,
            payload: Bytes::new(),
            dss_length: 0,
            chained_with_same_id: false,
            expected_correlation_id: 1,
            current_correlation_id: 0,
            collection_stack: Vec::with_capacity(4),
            peeked: None,
            scalar_length: 0,
            scalar_streamed: false,
            ccsid: typdef.ccsid(),
            data_ccsid: typdef.data_ccsid(),
            byte_order: typdef.byte_order(),
        }
    }

    /// Adopt a changed data representation for the rest of the reply.
    pub fn set_typdef(&mut self, typdef: &Typdef) {
        self.ccsid = typdef.ccsid();
        self.data_ccsid = typdef.data_ccsid();
        self.byte_order = typdef.byte_order();
    }

    /// Character encoding used by [`ReplyParser::read_string`].
    #[must_use]
    pub fn ccsid(&self) -> Ccsid {
        self.ccsid
    }

    /// Byte order used by the integer readers.
    #[must_use]
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Bytes left in the current DSS.
    #[must_use]
    pub fn dss_length(&self) -> usize {
        self.dss_length
    }

    /// Bytes left in the current scalar.
    #[must_use]
    pub fn scalar_length(&self) -> usize {
        self.scalar_length
    }

    /// Correlation ID of the DSS being parsed.
    #[must_use]
    pub fn correlation_id(&self) -> u16 {
        self.current_correlation_id
    }

    /// Whether every byte of the reply has been consumed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.dss_length == 0 && !self.payload.has_remaining() && self.src.is_empty()
    }

    // =========================================================================
    // DSS layer
    // =========================================================================

    /// Read the header of the next DSS and reassemble its payload.
    pub fn read_dss_header(&mut self) -> Result<(), ProtocolError> {
        if self.payload.has_remaining() {
            return Err(ProtocolError::framing(
                SyntaxErrorCode::DssLengthByteNumberMismatch,
                format!("{} unread bytes left in the previous DSS", self.payload.remaining()),
            ));
        }

        let header = DssHeader::decode(&mut self.src.clone())?;
        if !header.dss_type.is_reply_type() {
            return Err(ProtocolError::framing(
                SyntaxErrorCode::FByteNotSupported,
                format!("format byte {:#04X} in a reply", header.format_byte()),
            ));
        }
        let next_id = header.next_correlation_id(self.expected_correlation_id)?;
        if header.correlation_id != self.expected_correlation_id
            && header.correlation_id != CORRELATION_ID_ANY
        {
            return Err(ProtocolError::framing(
                SyntaxErrorCode::InvalidCorrelator,
                format!(
                    "correlation ID {} where {} was expected",
                    header.correlation_id, self.expected_correlation_id
                ),
            ));
        }

        let segment = header.segment_length();
        if self.src.len() < segment {
            return Err(ProtocolError::NeedMoreData {
                needed: segment,
                available: self.src.len(),
            });
        }
        self.src.advance(DSS_HEADER_SIZE);
        let first = self.src.split_to(segment - DSS_HEADER_SIZE);

        self.payload = if header.is_continued() {
            let mut joined = BytesMut::with_capacity(DSS_MAX_LENGTH * 2);
            joined.extend_from_slice(&first);
            let mut continued = true;
            while continued {
                let (chunk, more) = self.read_continuation_header()?;
                joined.extend_from_slice(&chunk);
                continued = more;
            }
            joined.freeze()
        } else {
            first
        };

        self.dss_length = self.payload.len();
        self.chained_with_same_id = header.is_chained() && header.is_same_correlator();
        self.current_correlation_id = header.correlation_id;
        self.expected_correlation_id = next_id;

        tracing::trace!(
            dss_length = self.dss_length,
            correlation_id = header.correlation_id,
            dss_type = ?header.dss_type,
            chained = header.is_chained(),
            "read reply DSS"
        );
        Ok(())
    }

    /// Read a continuation header and the data it covers. Returns the data
    /// and whether another continuation follows.
    fn read_continuation_header(&mut self) -> Result<(Bytes, bool), ProtocolError> {
        if self.src.len() < 2 {
            return Err(ProtocolError::NeedMoreData {
                needed: 2,
                available: self.src.len(),
            });
        }
        let raw = self.src.get_u16();
        let length = effective_length(raw);
        if length <= 2 {
            return Err(ProtocolError::framing(
                SyntaxErrorCode::DssContLessOrEqual2,
                format!("continuation header length {length}"),
            ));
        }
        let data = length - 2;
        if self.src.len() < data {
            return Err(ProtocolError::NeedMoreData {
                needed: data,
                available: self.src.len(),
            });
        }
        Ok((self.src.split_to(data), raw & DSS_CONTINUATION_BIT != 0))
    }

    /// Begin parsing a same-ID chain by reading its first DSS header.
    pub fn start_same_id_chain_parse(&mut self) -> Result<(), ProtocolError> {
        self.read_dss_header()
    }

    /// Verify that the same-ID chain was consumed completely.
    pub fn end_of_same_id_chain_data(&self) -> Result<(), ProtocolError> {
        if !self.collection_stack.is_empty() {
            return Err(ProtocolError::framing(
                SyntaxErrorCode::ObjLenNotAllowed,
                format!("{} collections still open", self.collection_stack.len()),
            ));
        }
        if self.dss_length != 0 {
            return Err(ProtocolError::framing(
                SyntaxErrorCode::DssLengthByteNumberMismatch,
                format!("{} bytes left in the DSS", self.dss_length),
            ));
        }
        if self.chained_with_same_id {
            return Err(ProtocolError::framing(
                SyntaxErrorCode::ChainOffSameNextCorrelator,
                "DSS chained with the same ID but the reply ended",
            ));
        }
        Ok(())
    }

    // =========================================================================
    // DDM layer
    // =========================================================================

    /// Look at the next object without consuming it.
    pub fn peek_code_point(&mut self) -> Result<Peek, ProtocolError> {
        if let Some(&top) = self.collection_stack.last() {
            if top == 0 {
                return Ok(Peek::EndOfCollection);
            }
            if top < DDM_HEADER_SIZE {
                return Err(ProtocolError::framing(
                    SyntaxErrorCode::ObjLenNotAllowed,
                    format!("collection has {top} bytes left, less than an object header"),
                ));
            }
        }
        if let Some(peeked) = self.peeked {
            return Ok(Peek::CodePoint(peeked.code_point));
        }

        if self.dss_length == 0 {
            if !self.chained_with_same_id {
                return Ok(Peek::EndOfSameIdChain);
            }
            if self.src.is_empty() {
                return Ok(Peek::EndOfBuffer);
            }
            self.read_dss_header()?;
        }

        self.ensure(DDM_HEADER_SIZE)?;
        let length = usize::from(u16::from_be_bytes([self.payload[0], self.payload[1]]));
        let code_point = u16::from_be_bytes([self.payload[2], self.payload[3]]);

        let peeked = if length & 0x8000 != 0 {
            let extended_bytes = length.checked_sub(0x8004).ok_or_else(|| {
                ProtocolError::framing(
                    SyntaxErrorCode::IncorrectExtendedLen,
                    format!("length field {length:#06X} for {code_point:#06X}"),
                )
            })?;
            match extended_bytes {
                4 => {
                    self.ensure(DDM_HEADER_SIZE + 4)?;
                    let content = u32::from_be_bytes([
                        self.payload[4],
                        self.payload[5],
                        self.payload[6],
                        self.payload[7],
                    ]);
                    Peeked {
                        code_point,
                        length: Some(content as usize),
                        extended_bytes,
                    }
                }
                0 => Peeked {
                    code_point,
                    length: None,
                    extended_bytes,
                },
                other => {
                    return Err(ProtocolError::framing(
                        SyntaxErrorCode::IncorrectExtendedLen,
                        format!("{other} extended length bytes for {code_point:#06X}"),
                    ));
                }
            }
        } else {
            if length < DDM_HEADER_SIZE {
                return Err(ProtocolError::framing(
                    SyntaxErrorCode::ObjLenNotAllowed,
                    format!("object length {length} for {code_point:#06X}"),
                ));
            }
            Peeked {
                code_point,
                length: Some(length),
                extended_bytes: 0,
            }
        };

        self.peeked = Some(peeked);
        Ok(Peek::CodePoint(code_point))
    }

    /// Consume the next object header, failing unless it carries `expected`.
    /// The object's content length becomes the current scalar length.
    pub fn parse_length_and_match_code_point(&mut self, expected: u16) -> Result<(), ProtocolError> {
        let actual = self.peek_code_point()?;
        let Some(peeked) = self.peeked.take() else {
            return Err(ProtocolError::framing(
                SyntaxErrorCode::ReqObjNotFound,
                format!(
                    "expected {} but reached {actual:?}",
                    crate::codepoint::name(expected)
                ),
            ));
        };
        if peeked.code_point != expected {
            // Leave the object unconsumed for diagnostics.
            self.peeked = Some(peeked);
            return Err(ProtocolError::framing(
                SyntaxErrorCode::ReqObjNotFound,
                format!(
                    "expected {} ({expected:#06X}), found {} ({:#06X})",
                    crate::codepoint::name(expected),
                    crate::codepoint::name(peeked.code_point),
                    peeked.code_point
                ),
            ));
        }

        let header = DDM_HEADER_SIZE + peeked.extended_bytes;
        self.payload.advance(header);
        match peeked.length {
            Some(length) if peeked.extended_bytes == 0 => {
                self.scalar_length = length;
                self.scalar_streamed = false;
                self.adjust_lengths(DDM_HEADER_SIZE)?;
            }
            Some(length) => {
                self.scalar_length = length;
                self.scalar_streamed = false;
                self.adjust_collection_and_dss_lengths(header)?;
            }
            None => {
                self.scalar_length = 0;
                self.scalar_streamed = true;
                self.adjust_collection_and_dss_lengths(header)?;
            }
        }
        Ok(())
    }

    /// Open the object just matched as a collection of nested objects.
    pub fn push_length_on_collection_stack(&mut self) {
        self.collection_stack.push(self.scalar_length);
        self.scalar_length = 0;
    }

    /// Close the innermost collection.
    pub fn pop_collection_stack(&mut self) -> Result<(), ProtocolError> {
        match self.collection_stack.pop() {
            Some(0) => Ok(()),
            Some(left) => Err(ProtocolError::framing(
                SyntaxErrorCode::ObjLenNotAllowed,
                format!("collection closed with {left} bytes unread"),
            )),
            None => Err(ProtocolError::framing(
                SyntaxErrorCode::ObjLenNotAllowed,
                "no open collection",
            )),
        }
    }

    /// Depth of the collection stack.
    #[must_use]
    pub fn collection_depth(&self) -> usize {
        self.collection_stack.len()
    }

    /// Charge `n` consumed bytes against the scalar, every open collection
    /// and the DSS.
    pub fn adjust_lengths(&mut self, n: usize) -> Result<(), ProtocolError> {
        if !self.scalar_streamed {
            self.scalar_length = self.scalar_length.checked_sub(n).ok_or_else(|| {
                ProtocolError::framing(
                    SyntaxErrorCode::ObjLenNotAllowed,
                    format!("read {n} bytes with {} left in the object", self.scalar_length),
                )
            })?;
        }
        self.adjust_collection_and_dss_lengths(n)
    }

    fn adjust_collection_and_dss_lengths(&mut self, n: usize) -> Result<(), ProtocolError> {
        for entry in &mut self.collection_stack {
            *entry = entry.checked_sub(n).ok_or_else(|| {
                ProtocolError::framing(
                    SyntaxErrorCode::ObjLenNotAllowed,
                    format!("object overruns its collection by {n} bytes"),
                )
            })?;
        }
        self.dss_length = self.dss_length.checked_sub(n).ok_or_else(|| {
            ProtocolError::framing(
                SyntaxErrorCode::DssLengthByteNumberMismatch,
                format!("object overruns the DSS by {n} bytes"),
            )
        })?;
        Ok(())
    }

    fn ensure(&self, n: usize) -> Result<(), ProtocolError> {
        if self.payload.remaining() < n {
            return Err(ProtocolError::NeedMoreData {
                needed: n,
                available: self.payload.remaining(),
            });
        }
        Ok(())
    }

    fn consume(&mut self, n: usize) -> Result<Bytes, ProtocolError> {
        self.ensure(n)?;
        self.adjust_lengths(n)?;
        Ok(self.payload.split_to(n))
    }

    // =========================================================================
    // Scalar readers (charge lengths)
    // =========================================================================

    /// Read one byte.
    pub fn read_unsigned_byte(&mut self) -> Result<u8, ProtocolError> {
        self.ensure(1)?;
        self.adjust_lengths(1)?;
        Ok(self.payload.get_u8())
    }

    /// Read a big-endian unsigned 2-byte value.
    pub fn read_unsigned_short(&mut self) -> Result<u16, ProtocolError> {
        self.ensure(2)?;
        self.adjust_lengths(2)?;
        Ok(self.payload.get_u16())
    }

    /// Read the rest of the scalar as big-endian 2-byte values.
    pub fn read_unsigned_short_list(&mut self) -> Result<Vec<u16>, ProtocolError> {
        let mut bytes = self.consume(self.scalar_length)?;
        let mut list = Vec::with_capacity(bytes.len() / 2);
        while bytes.remaining() >= 2 {
            list.push(bytes.get_u16());
        }
        Ok(list)
    }

    /// Read a 2-byte integer in the negotiated byte order.
    pub fn read_short(&mut self) -> Result<i16, ProtocolError> {
        self.ensure(2)?;
        self.adjust_lengths(2)?;
        Ok(match self.byte_order {
            ByteOrder::BigEndian => self.payload.get_i16(),
            ByteOrder::LittleEndian => self.payload.get_i16_le(),
        })
    }

    /// Read a 4-byte integer in the negotiated byte order.
    pub fn read_int(&mut self) -> Result<i32, ProtocolError> {
        self.ensure(4)?;
        self.adjust_lengths(4)?;
        Ok(match self.byte_order {
            ByteOrder::BigEndian => self.payload.get_i32(),
            ByteOrder::LittleEndian => self.payload.get_i32_le(),
        })
    }

    /// Read an 8-byte integer in the negotiated byte order.
    pub fn read_long(&mut self) -> Result<i64, ProtocolError> {
        self.ensure(8)?;
        self.adjust_lengths(8)?;
        Ok(match self.byte_order {
            ByteOrder::BigEndian => self.payload.get_i64(),
            ByteOrder::LittleEndian => self.payload.get_i64_le(),
        })
    }

    /// Read `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<Bytes, ProtocolError> {
        self.consume(n)
    }

    /// Read the rest of the scalar.
    pub fn read_scalar_bytes(&mut self) -> Result<Bytes, ProtocolError> {
        self.consume(self.scalar_length)
    }

    /// Skip `n` bytes.
    pub fn skip_bytes(&mut self, n: usize) -> Result<(), ProtocolError> {
        self.consume(n).map(|_| ())
    }

    /// Skip the rest of the scalar.
    pub fn skip_scalar(&mut self) -> Result<(), ProtocolError> {
        self.consume(self.scalar_length).map(|_| ())
    }

    /// Read the rest of the scalar as a string in the connection CCSID.
    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        let ccsid = self.ccsid;
        self.read_string_with(self.scalar_length, ccsid)
    }

    /// Read `n` bytes as a string in the given CCSID.
    pub fn read_string_with(&mut self, n: usize, ccsid: Ccsid) -> Result<String, ProtocolError> {
        let bytes = self.consume(n)?;
        Ok(ccsid.decode(&bytes))
    }

    /// Hand the rest of the scalar to an FD:OCA reader and charge it as
    /// consumed once `f` returns, whatever `f` read.
    pub fn read_fdoca<T>(
        &mut self,
        f: impl FnOnce(&mut FdocaReader) -> Result<T, ProtocolError>,
    ) -> Result<T, ProtocolError> {
        if self.scalar_streamed {
            return Err(ProtocolError::framing(
                SyntaxErrorCode::ObjLenNotAllowed,
                "FD:OCA data in a streamed object",
            ));
        }
        let bytes = self.consume(self.scalar_length)?;
        let mut reader = FdocaReader::new(bytes, self.data_ccsid, self.byte_order);
        f(&mut reader)
    }
}

/// Cursor over FD:OCA data inside one scalar.
///
/// These are the unchecked-length ("fast") reads: the enclosing scalar has
/// already been charged, so only buffer underrun is detected.
#[derive(Debug, Clone)]
pub struct FdocaReader {
    data: Bytes,
    ccsid: Ccsid,
    byte_order: ByteOrder,
}

impl FdocaReader {
    /// Create a reader over raw FD:OCA bytes.
    #[must_use]
    pub fn new(data: Bytes, ccsid: Ccsid, byte_order: ByteOrder) -> Self {
        Self {
            data,
            ccsid,
            byte_order,
        }
    }

    /// Bytes left.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.remaining()
    }

    /// Encoding of character data in this reader.
    #[must_use]
    pub fn ccsid(&self) -> Ccsid {
        self.ccsid
    }

    fn ensure(&self, n: usize) -> Result<(), ProtocolError> {
        if self.data.remaining() < n {
            return Err(ProtocolError::NeedMoreData {
                needed: n,
                available: self.data.remaining(),
            });
        }
        Ok(())
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        self.ensure(1)?;
        Ok(self.data.get_u8())
    }

    /// Read a big-endian unsigned 2-byte value (FD:OCA lengths and counts).
    pub fn read_unsigned_short(&mut self) -> Result<u16, ProtocolError> {
        self.ensure(2)?;
        Ok(self.data.get_u16())
    }

    /// Read a 2-byte integer in the negotiated byte order.
    pub fn read_short(&mut self) -> Result<i16, ProtocolError> {
        self.ensure(2)?;
        Ok(match self.byte_order {
            ByteOrder::BigEndian => self.data.get_i16(),
            ByteOrder::LittleEndian => self.data.get_i16_le(),
        })
    }

    /// Read a 4-byte integer in the negotiated byte order.
    pub fn read_int(&mut self) -> Result<i32, ProtocolError> {
        self.ensure(4)?;
        Ok(match self.byte_order {
            ByteOrder::BigEndian => self.data.get_i32(),
            ByteOrder::LittleEndian => self.data.get_i32_le(),
        })
    }

    /// Read an 8-byte integer in the negotiated byte order.
    pub fn read_long(&mut self) -> Result<i64, ProtocolError> {
        self.ensure(8)?;
        Ok(match self.byte_order {
            ByteOrder::BigEndian => self.data.get_i64(),
            ByteOrder::LittleEndian => self.data.get_i64_le(),
        })
    }

    /// Fill `out` with consecutive 4-byte integers.
    pub fn read_int_array(&mut self, out: &mut [i32]) -> Result<(), ProtocolError> {
        for slot in out {
            *slot = self.read_int()?;
        }
        Ok(())
    }

    /// Read `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<Bytes, ProtocolError> {
        self.ensure(n)?;
        Ok(self.data.split_to(n))
    }

    /// Skip `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<(), ProtocolError> {
        self.ensure(n)?;
        self.data.advance(n);
        Ok(())
    }

    /// Read `n` bytes as a string in the given CCSID.
    pub fn read_string(&mut self, n: usize, ccsid: Ccsid) -> Result<String, ProtocolError> {
        let bytes = self.read_bytes(n)?;
        Ok(ccsid.decode(&bytes))
    }

    /// Read a 2-byte length followed by that many bytes. A zero length
    /// yields `None`.
    pub fn read_ld_bytes(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        let length = usize::from(self.read_unsigned_short()?);
        if length == 0 {
            return Ok(None);
        }
        self.read_bytes(length).map(Some)
    }

    /// Read a variable character string (2-byte length + data).
    pub fn read_vcs(&mut self, ccsid: Ccsid) -> Result<String, ProtocolError> {
        let length = usize::from(self.read_unsigned_short()?);
        self.read_string(length, ccsid)
    }
}
