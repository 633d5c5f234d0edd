//! Request builder: serializes DDM commands into chained DSS frames.
//!
//! Objects of unknown length are bracketed with
//! [`RequestBuilder::mark_length_bytes`] / [`RequestBuilder::update_length_bytes`].
//! When a DSS grows past 32767 bytes, [`RequestBuilder::complete_command`]
//! splits it with continuation headers in a single backward pass.
//!
//! A builder that returned an error must be discarded; its buffer may hold a
//! partially written object.

use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};

use crate::ccsid::{ByteOrder, Ccsid, Typdef};
use crate::constants::{
    DDM_HEADER_SIZE, DDM_MAX_SHORT_LENGTH, DSS_CONTINUATION_DATA_MAX, DSS_MAX_LENGTH,
};
use crate::decimal::{self, PackedDecimal};
use crate::dss::{DSS_MAGIC, DssFlags, DssType};
use crate::error::ProtocolError;

/// Default initial buffer capacity.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Builds one request chain.
#[derive(Debug)]
pub struct RequestBuilder {
    buf: BytesMut,
    marks: Vec<usize>,
    dss_location: Option<usize>,
    correlation_id: u16,
    ccsid: Ccsid,
    byte_order: ByteOrder,
}

/// Number of extended length bytes needed for a DDM object of `length`
/// bytes, header included.
#[must_use]
pub const fn extended_length_byte_count(length: u64) -> usize {
    if length <= 0x7FFF {
        0
    } else if length <= 0x7FFF_FFFF {
        4
    } else if length <= 0x7FFF_FFFF_FFFF {
        6
    } else {
        8
    }
}

impl RequestBuilder {
    /// Create a builder using the connection's negotiated representation.
    #[must_use]
    pub fn new(typdef: &Typdef) -> Self {
        Self::with_capacity(typdef, DEFAULT_CAPACITY)
    }

    /// Create a builder with a specific initial capacity.
    #[must_use]
    pub fn with_capacity(typdef: &Typdef, capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            marks: Vec::with_capacity(4),
            dss_location: None,
            correlation_id: 0,
            ccsid: typdef.ccsid(),
            byte_order: typdef.byte_order(),
        }
    }

    /// Character encoding used for string parameters.
    #[must_use]
    pub fn ccsid(&self) -> Ccsid {
        self.ccsid
    }

    /// Correlation ID of the DSS currently being built (0 before the first
    /// command).
    #[must_use]
    pub fn correlation_id(&self) -> u16 {
        self.correlation_id
    }

    /// Bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The bytes written so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Start a new request DSS with the next correlation ID.
    ///
    /// A DSS already in progress is completed and chained to the new one.
    pub fn create_command(&mut self) -> Result<(), ProtocolError> {
        self.chain_previous(DssFlags::empty())?;
        self.correlation_id = self.correlation_id.wrapping_add(1);
        self.open_dss(DssType::Request);
        Ok(())
    }

    /// Start an object DSS carrying data for the current command, sharing
    /// its correlation ID.
    pub fn create_object(&mut self) -> Result<(), ProtocolError> {
        if self.dss_location.is_none() {
            return Err(ProtocolError::value_range(
                "OBJDSS",
                "an object DSS must follow a command",
            ));
        }
        self.chain_previous(DssFlags::SAME_CORRELATOR)?;
        self.open_dss(DssType::Object);
        Ok(())
    }

    fn chain_previous(&mut self, extra: DssFlags) -> Result<(), ProtocolError> {
        if let Some(location) = self.complete_dss()? {
            self.buf[location + 3] |= (DssFlags::CHAINED | extra).bits();
        }
        Ok(())
    }

    fn open_dss(&mut self, dss_type: DssType) {
        self.dss_location = Some(self.buf.len());
        self.buf.put_u16(0xFFFF);
        self.buf.put_u8(DSS_MAGIC);
        self.buf.put_u8(dss_type as u8);
        self.buf.put_u16(self.correlation_id);
    }

    /// Complete the DSS in progress, writing its length and inserting
    /// continuation headers as needed.
    pub fn complete_command(&mut self) -> Result<(), ProtocolError> {
        self.complete_dss().map(|_| ())
    }

    fn complete_dss(&mut self) -> Result<Option<usize>, ProtocolError> {
        let Some(location) = self.dss_location.take() else {
            return Ok(None);
        };
        if !self.marks.is_empty() {
            return Err(ProtocolError::value_range(
                "DSS",
                format!("{} DDM objects still open", self.marks.len()),
            ));
        }

        let total = self.buf.len() - location;
        let length_field = if total > DSS_MAX_LENGTH {
            self.insert_continuation_headers(total);
            0xFFFF
        } else {
            total as u16
        };
        self.buf[location..location + 2].copy_from_slice(&length_field.to_be_bytes());

        tracing::trace!(
            dss_length = total,
            correlation_id = self.correlation_id,
            continued = total > DSS_MAX_LENGTH,
            "completed request DSS"
        );
        Ok(Some(location))
    }

    /// Shift data right to open room for continuation headers, from the last
    /// segment backwards. Only the last segment may be shorter than a full
    /// continuation; every earlier header is flagged as continued.
    fn insert_continuation_headers(&mut self, total: usize) {
        let mut remaining = total - DSS_MAX_LENGTH;
        let count = remaining.div_ceil(DSS_CONTINUATION_DATA_MAX);
        let mut shift = count * 2;
        let mut data_end = self.buf.len();
        self.buf.resize(data_end + shift, 0);

        let mut last_segment = true;
        while remaining > 0 {
            let mut chunk = remaining % DSS_CONTINUATION_DATA_MAX;
            if chunk == 0 {
                chunk = DSS_CONTINUATION_DATA_MAX;
            }
            let start = data_end - chunk;
            self.buf.copy_within(start..data_end, start + shift);

            let mut header = (chunk + 2) as u16;
            if !last_segment && usize::from(header) == DSS_MAX_LENGTH {
                header = 0xFFFF;
            }
            last_segment = false;
            self.buf[start + shift - 2..start + shift].copy_from_slice(&header.to_be_bytes());

            remaining -= chunk;
            shift -= 2;
            data_end = start;
        }
    }

    /// Complete the chain and return the encoded request.
    pub fn finish(mut self) -> Result<Bytes, ProtocolError> {
        self.complete_dss()?;
        Ok(self.buf.freeze())
    }

    /// Open a DDM object whose length is filled in later.
    pub fn mark_length_bytes(&mut self, code_point: u16) {
        self.marks.push(self.buf.len());
        self.buf.put_u16(0);
        self.buf.put_u16(code_point);
    }

    /// Close the most recently opened DDM object, switching to an extended
    /// length when the object exceeds 0x7FFF bytes.
    pub fn update_length_bytes(&mut self) -> Result<(), ProtocolError> {
        let location = self.marks.pop().ok_or_else(|| {
            ProtocolError::value_range("DDM", "no open DDM object to close")
        })?;
        let length = self.buf.len() - location;
        let ext_count = extended_length_byte_count(length as u64);

        let field = if ext_count == 0 {
            length as u16
        } else {
            let data_start = location + DDM_HEADER_SIZE;
            let data_end = self.buf.len();
            self.buf.resize(data_end + ext_count, 0);
            self.buf
                .copy_within(data_start..data_end, data_start + ext_count);

            let extended = ((length - DDM_HEADER_SIZE) as u64).to_be_bytes();
            self.buf[data_start..data_start + ext_count]
                .copy_from_slice(&extended[8 - ext_count..]);
            0x8000 | (ext_count + DDM_HEADER_SIZE) as u16
        };
        self.buf[location..location + 2].copy_from_slice(&field.to_be_bytes());
        Ok(())
    }

    /// Write a raw DDM header.
    pub fn write_length_code_point(&mut self, length: u16, code_point: u16) {
        self.buf.put_u16(length);
        self.buf.put_u16(code_point);
    }

    /// Write a 1-byte scalar.
    pub fn write_scalar_1_byte(&mut self, code_point: u16, value: u8) {
        self.write_length_code_point(5, code_point);
        self.buf.put_u8(value);
    }

    /// Write a 2-byte big-endian scalar.
    pub fn write_scalar_2_bytes(&mut self, code_point: u16, value: u16) {
        self.write_length_code_point(6, code_point);
        self.buf.put_u16(value);
    }

    /// Write a 4-byte big-endian scalar.
    pub fn write_scalar_4_bytes(&mut self, code_point: u16, value: u32) {
        self.write_length_code_point(8, code_point);
        self.buf.put_u32(value);
    }

    /// Write an 8-byte big-endian scalar.
    pub fn write_scalar_8_bytes(&mut self, code_point: u16, value: u64) {
        self.write_length_code_point(12, code_point);
        self.buf.put_u64(value);
    }

    /// Write a scalar whose content is `bytes`, using an extended length if
    /// needed.
    pub fn write_scalar_bytes(&mut self, code_point: u16, bytes: &[u8]) -> Result<(), ProtocolError> {
        if bytes.len() + DDM_HEADER_SIZE <= DDM_MAX_SHORT_LENGTH {
            self.write_length_code_point((bytes.len() + DDM_HEADER_SIZE) as u16, code_point);
            self.buf.put_slice(bytes);
            Ok(())
        } else {
            self.mark_length_bytes(code_point);
            self.buf.put_slice(bytes);
            self.update_length_bytes()
        }
    }

    /// Write `bytes` padded with `pad` up to `padded_length`.
    pub fn write_scalar_padded_bytes(&mut self, bytes: &[u8], padded_length: usize, pad: u8) {
        self.buf.put_slice(bytes);
        if padded_length > bytes.len() {
            self.buf.put_bytes(pad, padded_length - bytes.len());
        }
    }

    /// Write a string scalar in the connection CCSID.
    ///
    /// Content shorter than `min_length` bytes is padded with encoded
    /// spaces. Content longer than `max_length` bytes is rejected with an
    /// error naming `field`.
    pub fn write_scalar_string(
        &mut self,
        code_point: u16,
        value: &str,
        min_length: usize,
        max_length: usize,
        field: &'static str,
    ) -> Result<(), ProtocolError> {
        let encoded = self.ccsid.encode(value)?;
        if encoded.len() > max_length {
            return Err(ProtocolError::value_range(
                field,
                format!("{} bytes exceeds the limit of {max_length}", encoded.len()),
            ));
        }
        let content = encoded.len().max(min_length);
        if content + DDM_HEADER_SIZE > DDM_MAX_SHORT_LENGTH {
            self.mark_length_bytes(code_point);
            self.write_scalar_padded_bytes(&encoded, content, self.ccsid.space());
            return self.update_length_bytes();
        }
        self.write_length_code_point((content + DDM_HEADER_SIZE) as u16, code_point);
        self.write_scalar_padded_bytes(&encoded, content, self.ccsid.space());
        Ok(())
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Write a big-endian 2-byte value (DDM header fields and lengths).
    pub fn write_u16_be(&mut self, value: u16) {
        self.buf.put_u16(value);
    }

    /// Write a 2-byte integer in the negotiated byte order.
    pub fn write_short(&mut self, value: i16) {
        match self.byte_order {
            ByteOrder::BigEndian => self.buf.put_i16(value),
            ByteOrder::LittleEndian => self.buf.put_i16_le(value),
        }
    }

    /// Write a 4-byte integer in the negotiated byte order.
    pub fn write_int(&mut self, value: i32) {
        match self.byte_order {
            ByteOrder::BigEndian => self.buf.put_i32(value),
            ByteOrder::LittleEndian => self.buf.put_i32_le(value),
        }
    }

    /// Write an 8-byte integer in the negotiated byte order.
    pub fn write_long(&mut self, value: i64) {
        match self.byte_order {
            ByteOrder::BigEndian => self.buf.put_i64(value),
            ByteOrder::LittleEndian => self.buf.put_i64_le(value),
        }
    }

    /// Write the low 48 bits of `value`, big-endian.
    pub fn write_long_6_bytes(&mut self, value: u64) {
        self.buf.put_u16((value >> 32) as u16);
        self.buf.put_u32(value as u32);
    }

    /// Write an IEEE single in the negotiated byte order.
    pub fn write_float(&mut self, value: f32) {
        self.write_int(value.to_bits() as i32);
    }

    /// Write an IEEE double in the negotiated byte order.
    pub fn write_double(&mut self, value: f64) {
        self.write_long(value.to_bits() as i64);
    }

    /// Write a packed decimal of the declared precision and scale.
    pub fn write_decimal(
        &mut self,
        value: impl Into<PackedDecimal>,
        precision: u32,
        scale: u32,
    ) -> Result<(), ProtocolError> {
        let packed = decimal::encode_packed(value, precision, scale)?;
        self.buf.put_slice(&packed);
        Ok(())
    }

    /// Write a date as `YYYY-MM-DD`.
    pub fn write_date(&mut self, date: NaiveDate) {
        let text = format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day());
        self.buf.put_slice(text.as_bytes());
    }

    /// Write a time as `hh:mm:ss`.
    pub fn write_time(&mut self, time: NaiveTime) {
        let text = format!("{:02}:{:02}:{:02}", time.hour(), time.minute(), time.second());
        self.buf.put_slice(text.as_bytes());
    }

    /// Write bytes prefixed with a 2-byte big-endian length.
    pub fn write_ld_bytes(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        if bytes.len() > DDM_MAX_SHORT_LENGTH {
            return Err(ProtocolError::value_range(
                "LD",
                format!("{} bytes exceeds the limit of {DDM_MAX_SHORT_LENGTH}", bytes.len()),
            ));
        }
        self.buf.put_u16(bytes.len() as u16);
        self.buf.put_slice(bytes);
        Ok(())
    }

    /// Write a string prefixed with its 2-byte encoded length.
    pub fn write_ld_string(&mut self, value: &str) -> Result<(), ProtocolError> {
        let encoded = self.ccsid.encode(value)?;
        self.write_ld_bytes(&encoded)
    }

    /// Write an FD:OCA triplet header.
    pub fn write_triplet_header(&mut self, length: u8, triplet_type: u8, id: u8) {
        self.buf.put_u8(length);
        self.buf.put_u8(triplet_type);
        self.buf.put_u8(id);
    }

    /// Write `(lid, length)` pairs, replacing each lid found in `overrides`.
    pub fn write_lid_and_lengths(
        &mut self,
        entries: &[(u8, u16)],
        overrides: Option<&HashMap<u8, u8>>,
    ) {
        for &(lid, length) in entries {
            let lid = overrides
                .and_then(|map| map.get(&lid).copied())
                .unwrap_or(lid);
            self.buf.put_u8(lid);
            self.buf.put_u16(length);
        }
    }
}
