//! SQL communication area (SQLCA) decoding.
//!
//! A SQLCARD carries one FD:OCA SQLCAGRP:
//!
//! ```text
//! SQLCAGRP    := null | SQLCODE SQLSTATE SQLERRPROC SQLCAXGRP SQLDIAGGRP
//! SQLCAXGRP   := null | SQLERRD[6] SQLWARN[11] RDBNAME SQLERRMC
//! SQLDIAGGRP  := null | SQLDIAGSTT SQLDIAGCI SQLDIAGCN
//! ```
//!
//! Every group starts with a nullability byte; `0xFF` means the group is
//! absent.

use std::fmt;

use bytes::Bytes;

use crate::ccsid::Ccsid;
use crate::codepoint;
use crate::error::ProtocolError;
use crate::parser::{FdocaReader, ReplyParser};

/// Nullability indicator of an absent FD:OCA group.
const NULL_INDICATOR: u8 = 0xFF;

/// Separator between message tokens in SQLERRMC.
const TOKEN_DELIMITER: &str = "\u{14}\u{14}\u{14}";

const SQLSTATE_LEN: usize = 5;
const SQLERRPROC_LEN: usize = 8;
const SQLWARN_LEN: usize = 11;
const SQLERRD_LEN: usize = 6;

/// One row of the diagnostic condition group (SQLDCGRP).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlDiagnostic {
    /// SQLCODE of the condition.
    pub code: i32,
    /// SQLSTATE of the condition.
    pub state: String,
    /// Reason code.
    pub reason: i32,
    /// Line number in the statement.
    pub line: i32,
    /// Row number the condition applies to.
    pub row_number: i64,
    /// Database that raised the condition.
    pub rdb_name: String,
    /// Message text.
    pub message: Option<String>,
}

/// One message token of SQLERRMC with the SQLSTATE it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlMessage {
    /// SQLSTATE of this message.
    pub state: String,
    /// Message token text.
    pub text: String,
}

/// A decoded SQL communication area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetSqlca {
    code: i32,
    state: String,
    error_proc: String,
    contains_sqlcax: bool,
    errd: [i32; SQLERRD_LEN],
    warn: String,
    rdb_name: Option<String>,
    errmc: Option<String>,
    rowset_row_count: Option<i64>,
    diagnostics: Vec<SqlDiagnostic>,
}

impl NetSqlca {
    /// Create an SQLCA with only the code and state set.
    #[must_use]
    pub fn new(code: i32, state: impl Into<String>) -> Self {
        Self {
            code,
            state: state.into(),
            error_proc: String::new(),
            contains_sqlcax: false,
            errd: [0; SQLERRD_LEN],
            warn: " ".repeat(SQLWARN_LEN),
            rdb_name: None,
            errmc: None,
            rowset_row_count: None,
            diagnostics: Vec::new(),
        }
    }

    /// SQLCODE.
    #[must_use]
    pub fn code(&self) -> i32 {
        self.code
    }

    /// SQLSTATE.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Name of the server procedure that detected the condition.
    #[must_use]
    pub fn error_proc(&self) -> &str {
        &self.error_proc
    }

    /// Whether the SQLCAXGRP was present.
    #[must_use]
    pub fn contains_sqlcax(&self) -> bool {
        self.contains_sqlcax
    }

    /// The six SQLERRD diagnostic integers.
    #[must_use]
    pub fn errd(&self) -> &[i32; SQLERRD_LEN] {
        &self.errd
    }

    /// SQLWARN flags, one character per flag.
    #[must_use]
    pub fn warn(&self) -> &str {
        &self.warn
    }

    /// Database that produced the SQLCA.
    #[must_use]
    pub fn rdb_name(&self) -> Option<&str> {
        self.rdb_name.as_deref()
    }

    /// Raw SQLERRMC message tokens.
    #[must_use]
    pub fn errmc(&self) -> Option<&str> {
        self.errmc.as_deref()
    }

    /// Rows affected by an INSERT, UPDATE or DELETE.
    #[must_use]
    pub fn update_count(&self) -> i64 {
        (i64::from(self.errd[3]) << 32) | (i64::from(self.errd[2]) & 0xFFFF_FFFF)
    }

    /// Row count reported in SQLERRD(1) and SQLERRD(2).
    #[must_use]
    pub fn row_count(&self) -> i64 {
        (i64::from(self.errd[0]) << 32) + i64::from(self.errd[1])
    }

    /// Row count from the SQLDIAGSTT group of a rowset operation.
    #[must_use]
    pub fn rowset_row_count(&self) -> Option<i64> {
        self.rowset_row_count
    }

    /// Diagnostic conditions.
    #[must_use]
    pub fn diagnostics(&self) -> &[SqlDiagnostic] {
        &self.diagnostics
    }

    /// Whether the SQLCODE reports an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.code < 0
    }

    /// Whether the SQLCODE reports a warning.
    #[must_use]
    pub fn is_warning(&self) -> bool {
        self.code > 0
    }

    /// Split SQLERRMC into messages.
    ///
    /// The first token belongs to the main SQLSTATE; every later token is
    /// prefixed with its own `STATE:`.
    #[must_use]
    pub fn messages(&self) -> Vec<SqlMessage> {
        let Some(errmc) = self.errmc.as_deref() else {
            return Vec::new();
        };
        errmc
            .split(TOKEN_DELIMITER)
            .enumerate()
            .map(|(i, token)| {
                if i == 0 {
                    return SqlMessage {
                        state: self.state.clone(),
                        text: token.to_owned(),
                    };
                }
                match token.split_once(':') {
                    Some((state, text)) => SqlMessage {
                        state: state.to_owned(),
                        text: text.to_owned(),
                    },
                    None => SqlMessage {
                        state: self.state.clone(),
                        text: token.to_owned(),
                    },
                }
            })
            .collect()
    }

    /// Message tokens without their states.
    #[must_use]
    pub fn message_tokens(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.text).collect()
    }
}

impl fmt::Display for NetSqlca {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SQLCODE={}, SQLSTATE={}", self.code, self.state)?;
        if let Some(errmc) = &self.errmc {
            write!(f, ", SQLERRMC={}", errmc.replace(TOKEN_DELIMITER, ";"))?;
        }
        Ok(())
    }
}

/// Check the outcome of an SQLCA.
///
/// A negative SQLCODE becomes [`ProtocolError::Sql`]; a positive one is
/// logged as a warning. Returns the SQLCODE (0 without an SQLCA).
pub fn complete(sqlca: Option<&NetSqlca>) -> Result<i32, ProtocolError> {
    let Some(sqlca) = sqlca else {
        return Ok(0);
    };
    if sqlca.is_error() {
        return Err(ProtocolError::Sql(Box::new(sqlca.clone())));
    }
    if sqlca.is_warning() {
        tracing::warn!(
            sqlcode = sqlca.code,
            sqlstate = %sqlca.state,
            message = sqlca.errmc.as_deref().unwrap_or(""),
            "SQL warning"
        );
    }
    Ok(sqlca.code)
}

/// Parse a SQLCARD object. Returns `None` for a null SQLCA.
pub fn parse_sqlcard(parser: &mut ReplyParser) -> Result<Option<NetSqlca>, ProtocolError> {
    parser.parse_length_and_match_code_point(codepoint::SQLCARD)?;
    parser.read_fdoca(read_sqlca)
}

/// Decode an SQLCAGRP from raw FD:OCA data.
pub fn read_sqlca(reader: &mut FdocaReader) -> Result<Option<NetSqlca>, ProtocolError> {
    if reader.read_u8()? == NULL_INDICATOR {
        return Ok(None);
    }
    let ccsid = reader.ccsid();

    let code = reader.read_int()?;
    let state = reader.read_string(SQLSTATE_LEN, ccsid)?;
    let error_proc = reader.read_string(SQLERRPROC_LEN, ccsid)?;
    let mut sqlca = NetSqlca::new(code, state);
    sqlca.error_proc = error_proc;

    read_sqlcaxgrp(reader, &mut sqlca)?;
    read_sqldiaggrp(reader, &mut sqlca)?;

    tracing::trace!(sqlcode = sqlca.code, sqlstate = %sqlca.state, "decoded SQLCA");
    Ok(Some(sqlca))
}

fn read_sqlcaxgrp(reader: &mut FdocaReader, sqlca: &mut NetSqlca) -> Result<(), ProtocolError> {
    if reader.read_u8()? == NULL_INDICATOR {
        sqlca.contains_sqlcax = false;
        return Ok(());
    }
    let ccsid = reader.ccsid();
    sqlca.contains_sqlcax = true;
    reader.read_int_array(&mut sqlca.errd)?;
    sqlca.warn = reader.read_string(SQLWARN_LEN, ccsid)?;
    sqlca.rdb_name = Some(reader.read_vcs(ccsid)?);

    // SQLERRMC: mixed-byte form, then single-byte form; one of them is empty.
    let mixed = reader.read_ld_bytes()?;
    sqlca.errmc = match mixed {
        Some(bytes) => {
            reader.skip(2)?;
            Some(decode_utf8(&bytes))
        }
        None => reader.read_ld_bytes()?.map(|bytes| ccsid.decode(&bytes)),
    };
    Ok(())
}

fn read_sqldiaggrp(reader: &mut FdocaReader, sqlca: &mut NetSqlca) -> Result<(), ProtocolError> {
    if reader.remaining() == 0 || reader.read_u8()? == NULL_INDICATOR {
        return Ok(());
    }
    sqlca.rowset_row_count = read_sqldiagstt(reader)?;
    sqlca.diagnostics = read_sqldiagci(reader)?;
    read_sqldiagcn(reader)?;
    Ok(())
}

/// SQLDIAGSTT: statement-level diagnostics. Only the row count is kept.
fn read_sqldiagstt(reader: &mut FdocaReader) -> Result<Option<i64>, ProtocolError> {
    if reader.read_u8()? == NULL_INDICATOR {
        return Ok(None);
    }
    let _function_code = reader.read_int()?;
    let _cost_estimate = reader.read_int()?;
    let _last_row = reader.read_int()?;
    reader.skip(16)?;
    let row_count = reader.read_long()?;
    reader.skip(24)?;
    Ok(Some(row_count))
}

/// SQLDIAGCI: condition information, one SQLDCGRP per row.
fn read_sqldiagci(reader: &mut FdocaReader) -> Result<Vec<SqlDiagnostic>, ProtocolError> {
    if reader.read_u8()? == NULL_INDICATOR {
        return Ok(Vec::new());
    }
    let count = reader.read_unsigned_short()?;
    let mut rows = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        rows.push(read_sqldcgrp(reader)?);
    }
    Ok(rows)
}

fn read_sqldcgrp(reader: &mut FdocaReader) -> Result<SqlDiagnostic, ProtocolError> {
    let ccsid = reader.ccsid();
    let code = reader.read_int()?;
    let state = reader.read_string(SQLSTATE_LEN, Ccsid::Utf8)?;
    let reason = reader.read_int()?;
    let line = reader.read_int()?;
    let row_number = reader.read_long()?;
    reader.skip(47)?;
    let rdb_name = reader.read_vcs(ccsid)?;

    // SQLDCTOKS
    if reader.read_u8()? != NULL_INDICATOR {
        let tokens = reader.read_unsigned_short()?;
        for _ in 0..tokens {
            read_nvcm_nvcs(reader)?;
        }
    }

    let message = read_nvcm_nvcs(reader)?;
    for _ in 0..3 {
        read_nvcm_nvcs(reader)?;
    }
    read_sqldcxgrp(reader)?;

    Ok(SqlDiagnostic {
        code,
        state,
        reason,
        line,
        row_number,
        rdb_name,
        message,
    })
}

/// SQLDCXGRP: object names attached to a condition. Read and discarded.
fn read_sqldcxgrp(reader: &mut FdocaReader) -> Result<(), ProtocolError> {
    if reader.read_u8()? == NULL_INDICATOR {
        return Ok(());
    }
    let ccsid = reader.ccsid();
    for skip_count in [4, 2, 2] {
        for _ in 0..skip_count {
            read_nvcm_nvcs(reader)?;
        }
        reader.read_vcs(ccsid)?;
    }
    for _ in 0..2 {
        read_nvcm_nvcs(reader)?;
    }
    Ok(())
}

/// SQLDIAGCN: connection-level diagnostics. Read and discarded.
fn read_sqldiagcn(reader: &mut FdocaReader) -> Result<(), ProtocolError> {
    if reader.remaining() == 0 || reader.read_u8()? == NULL_INDICATOR {
        return Ok(());
    }
    let ccsid = reader.ccsid();
    let rows = reader.read_unsigned_short()?;
    for _ in 0..rows {
        reader.skip(18)?;
        for _ in 0..3 {
            reader.read_vcs(ccsid)?;
        }
    }
    Ok(())
}

/// Nullable mixed-byte string followed by a nullable single-byte string.
/// At most one of the pair may be present.
fn read_nvcm_nvcs(reader: &mut FdocaReader) -> Result<Option<String>, ProtocolError> {
    if reader.read_u8()? != NULL_INDICATOR {
        let length = usize::from(reader.read_unsigned_short()?);
        let value = decode_utf8(&reader.read_bytes(length)?);
        if reader.read_u8()? != NULL_INDICATOR {
            return Err(ProtocolError::value_range(
                "SQLCA",
                "NVCM and NVCS both non-null",
            ));
        }
        return Ok(Some(value));
    }
    if reader.read_u8()? != NULL_INDICATOR {
        let length = usize::from(reader.read_unsigned_short()?);
        let ccsid = reader.ccsid();
        return reader.read_string(length, ccsid).map(Some);
    }
    Ok(None)
}

fn decode_utf8(bytes: &Bytes) -> String {
    Ccsid::Utf8.decode(bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ccsid::{ByteOrder, Typdef};

    /// FD:OCA bytes of a little-endian UTF-8 SQLCA.
    struct SqlcaBytes(Vec<u8>);

    impl SqlcaBytes {
        fn new(code: i32, state: &str) -> Self {
            let mut out = vec![0x00];
            out.extend_from_slice(&code.to_le_bytes());
            out.extend_from_slice(state.as_bytes());
            out.extend_from_slice(b"SQLRI01F");
            Self(out)
        }

        fn with_sqlcax(mut self, errd: [i32; 6], errmc: &str) -> Self {
            self.0.push(0x00);
            for value in errd {
                self.0.extend_from_slice(&value.to_le_bytes());
            }
            self.0.push(b'W');
            self.0.extend_from_slice(&[b' '; 10]);
            self.0.extend_from_slice(&6u16.to_be_bytes());
            self.0.extend_from_slice(b"SAMPLE");
            // SQLERRMC mixed-byte, then its 2 byte empty single-byte length.
            self.0.extend_from_slice(&(errmc.len() as u16).to_be_bytes());
            self.0.extend_from_slice(errmc.as_bytes());
            self.0.extend_from_slice(&[0x00, 0x00]);
            self
        }

        fn without_sqlcax(mut self) -> Self {
            self.0.push(NULL_INDICATOR);
            self
        }

        fn null_diagnostics(mut self) -> Self {
            self.0.push(NULL_INDICATOR);
            self
        }

        fn reader(self) -> FdocaReader {
            FdocaReader::new(Bytes::from(self.0), Ccsid::Utf8, ByteOrder::LittleEndian)
        }
    }

    #[test]
    fn test_null_sqlca() {
        let mut reader = FdocaReader::new(
            Bytes::from_static(&[0xFF]),
            Ccsid::Utf8,
            ByteOrder::LittleEndian,
        );
        assert!(read_sqlca(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_sqlca_without_extension() {
        let mut reader = SqlcaBytes::new(100, "02000")
            .without_sqlcax()
            .null_diagnostics()
            .reader();
        let sqlca = read_sqlca(&mut reader).unwrap().unwrap();
        assert_eq!(sqlca.code(), 100);
        assert_eq!(sqlca.state(), "02000");
        assert_eq!(sqlca.error_proc(), "SQLRI01F");
        assert!(!sqlca.contains_sqlcax());
        assert_eq!(sqlca.warn(), "           ");
        assert!(sqlca.messages().is_empty());
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_sqlca_counts_and_messages() {
        let errmc = "TABLE1\u{14}\u{14}\u{14}01003:second token";
        let mut reader = SqlcaBytes::new(-204, "42704")
            .with_sqlcax([0, 7, 5, 1, 0, 0], errmc)
            .null_diagnostics()
            .reader();
        let sqlca = read_sqlca(&mut reader).unwrap().unwrap();

        assert!(sqlca.contains_sqlcax());
        assert_eq!(sqlca.rdb_name(), Some("SAMPLE"));
        assert_eq!(sqlca.update_count(), (1i64 << 32) | 5);
        assert_eq!(sqlca.row_count(), 7);
        assert!(sqlca.warn().starts_with('W'));

        let messages = sqlca.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].state, "42704");
        assert_eq!(messages[0].text, "TABLE1");
        assert_eq!(messages[1].state, "01003");
        assert_eq!(messages[1].text, "second token");
    }

    #[test]
    fn test_update_count_masks_low_word() {
        let mut sqlca = NetSqlca::new(0, "00000");
        sqlca.errd[2] = -1;
        assert_eq!(sqlca.update_count(), 0xFFFF_FFFF);
    }

    #[test]
    fn test_diagnostic_rows() {
        let mut bytes = SqlcaBytes::new(-911, "40001").without_sqlcax();
        let out = &mut bytes.0;
        out.push(0x00); // SQLDIAGGRP
        // SQLDIAGSTT
        out.push(0x00);
        out.extend_from_slice(&[0; 12]);
        out.extend_from_slice(&[0; 16]);
        out.extend_from_slice(&42i64.to_le_bytes());
        out.extend_from_slice(&[0; 24]);
        // SQLDIAGCI with one SQLDCGRP
        out.push(0x00);
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&(-911i32).to_le_bytes());
        out.extend_from_slice(b"40001");
        out.extend_from_slice(&2i32.to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&3i64.to_le_bytes());
        out.extend_from_slice(&[0; 47]);
        out.extend_from_slice(&6u16.to_be_bytes());
        out.extend_from_slice(b"SAMPLE");
        out.push(NULL_INDICATOR); // SQLDCTOKS
        out.extend_from_slice(&[0x00, 0x00, 0x08]);
        out.extend_from_slice(b"deadlock");
        out.push(NULL_INDICATOR);
        out.extend_from_slice(&[NULL_INDICATOR; 6]);
        out.push(NULL_INDICATOR); // SQLDCXGRP
        out.push(NULL_INDICATOR); // SQLDIAGCN

        let mut reader = bytes.reader();
        let sqlca = read_sqlca(&mut reader).unwrap().unwrap();
        assert_eq!(sqlca.rowset_row_count(), Some(42));
        let diagnostics = sqlca.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].reason, 2);
        assert_eq!(diagnostics[0].row_number, 3);
        assert_eq!(diagnostics[0].message.as_deref(), Some("deadlock"));
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_nvcm_and_nvcs_both_present() {
        let data = [0x00, 0x00, 0x01, b'a', 0x00, 0x00, 0x01, b'b'];
        let mut reader =
            FdocaReader::new(Bytes::copy_from_slice(&data), Ccsid::Utf8, ByteOrder::BigEndian);
        assert!(read_nvcm_nvcs(&mut reader).is_err());
    }

    #[test]
    fn test_complete() {
        assert_eq!(complete(None).unwrap(), 0);
        assert_eq!(complete(Some(&NetSqlca::new(100, "02000"))).unwrap(), 100);
        let err = complete(Some(&NetSqlca::new(-204, "42704"))).unwrap_err();
        assert_eq!(err.sqlca().unwrap().code(), -204);
    }

    #[test]
    fn test_display_joins_tokens() {
        let mut sqlca = NetSqlca::new(-204, "42704");
        sqlca.errmc = Some("A\u{14}\u{14}\u{14}01003:B".into());
        assert_eq!(sqlca.to_string(), "SQLCODE=-204, SQLSTATE=42704, SQLERRMC=A;01003:B");
    }

    #[test]
    fn test_parse_sqlcard_object() {
        let fdoca = SqlcaBytes::new(0, "00000").without_sqlcax().null_diagnostics().0;
        let mut payload = Vec::new();
        payload.extend_from_slice(&((fdoca.len() + 4) as u16).to_be_bytes());
        payload.extend_from_slice(&codepoint::SQLCARD.to_be_bytes());
        payload.extend_from_slice(&fdoca);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&((payload.len() + 6) as u16).to_be_bytes());
        bytes.extend_from_slice(&[0xD0, 0x03, 0x00, 0x01]);
        bytes.extend_from_slice(&payload);

        let mut parser = ReplyParser::new(Bytes::from(bytes), &Typdef::luw());
        parser.start_same_id_chain_parse().unwrap();
        let sqlca = parse_sqlcard(&mut parser).unwrap().unwrap();
        assert_eq!(sqlca.code(), 0);
        parser.end_of_same_id_chain_data().unwrap();
    }
}
