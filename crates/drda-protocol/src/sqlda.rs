//! SQL descriptor area (SQLDA) decoding.
//!
//! A SQLDARD describes the columns of a prepared query or the parameters of
//! a statement. Its FD:OCA layout at SQLAM 7 and above:
//!
//! ```text
//! SQLDARD     := SQLCAGRP SQLDHGRP SQLNUM SQLDAGRP[SQLNUM]
//! SQLDHGRP    := null | HOLD RETURN SCROLL SENSITIVE FCODE KEYTYPE RDBNAM SCHEMA
//! SQLDAGRP    := PRECISION SCALE LENGTH TYPE CCSID SQLDOPTGRP
//! SQLDOPTGRP  := null | UNNAMED NAME LABEL COMMENTS SQLUDTGRP SQLDXGRP
//! SQLDXGRP    := null | KEYMEM UPDATABLE GENERATED PARMMODE RDBNAM
//!                       CORNAME BASENAME SCHEMA NAME
//! ```
//!
//! Integers follow the negotiated byte order; SQLCCSID and string lengths are
//! always big-endian.

use std::fmt;

use bytes::Bytes;

use crate::ccsid::{Ccsid, ServerPlatform, Typdef};
use crate::codepoint;
use crate::error::ProtocolError;
use crate::parser::{FdocaReader, ReplyParser};
use crate::sqlca::{NetSqlca, read_sqlca};

/// Nullability indicator of an absent FD:OCA group.
const NULL_INDICATOR: u8 = 0xFF;

/// DB2 SQL type of a column, without its nullability bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SqlType {
    /// DATE
    Date,
    /// TIME
    Time,
    /// TIMESTAMP
    Timestamp,
    /// DATALINK
    Datalink,
    /// BLOB
    Blob,
    /// CLOB
    Clob,
    /// DBCLOB
    Dbclob,
    /// VARCHAR
    Varchar,
    /// CHAR
    Char,
    /// LONG VARCHAR
    LongVarchar,
    /// Null-terminated single-byte string.
    NulTerminated,
    /// VARGRAPHIC
    Vargraphic,
    /// GRAPHIC
    Graphic,
    /// LONG VARGRAPHIC
    LongVargraphic,
    /// Pascal string with a one byte length.
    LengthPrefixed,
    /// REAL or DOUBLE, told apart by the column length.
    Float,
    /// DECIMAL
    Decimal,
    /// Zoned decimal.
    Zoned,
    /// BIGINT
    Bigint,
    /// INTEGER
    Integer,
    /// SMALLINT
    Smallint,
    /// NUMERIC
    Numeric,
    /// ROWID
    Rowid,
    /// BLOB locator.
    BlobLocator,
    /// CLOB locator.
    ClobLocator,
    /// DBCLOB locator.
    DbclobLocator,
    /// BOOLEAN
    Boolean,
    /// User-defined type.
    UserDefined,
    /// A type code this crate does not name.
    Other(u16),
}

impl SqlType {
    /// Map a DB2 type code. The low bit (nullability) is ignored.
    #[must_use]
    pub fn from_code(code: u16) -> Self {
        match code & !1 {
            384 => Self::Date,
            388 => Self::Time,
            392 => Self::Timestamp,
            396 => Self::Datalink,
            404 => Self::Blob,
            408 => Self::Clob,
            412 => Self::Dbclob,
            448 => Self::Varchar,
            452 => Self::Char,
            456 => Self::LongVarchar,
            460 => Self::NulTerminated,
            464 => Self::Vargraphic,
            468 => Self::Graphic,
            472 => Self::LongVargraphic,
            476 => Self::LengthPrefixed,
            480 => Self::Float,
            484 => Self::Decimal,
            488 => Self::Zoned,
            492 => Self::Bigint,
            496 => Self::Integer,
            500 => Self::Smallint,
            504 => Self::Numeric,
            904 => Self::Rowid,
            960 => Self::BlobLocator,
            964 => Self::ClobLocator,
            968 => Self::DbclobLocator,
            2000 => Self::UserDefined,
            2436 => Self::Boolean,
            other => Self::Other(other),
        }
    }

    /// Whether values of this type are character data.
    #[must_use]
    pub fn is_character(self) -> bool {
        matches!(
            self,
            Self::Varchar
                | Self::Char
                | Self::LongVarchar
                | Self::NulTerminated
                | Self::Vargraphic
                | Self::Graphic
                | Self::LongVargraphic
                | Self::LengthPrefixed
                | Self::Clob
                | Self::Dbclob
        )
    }
}

/// Cursor attributes from SQLDHGRP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorHeader {
    /// 1 when the cursor is declared WITH HOLD.
    pub hold: i16,
    /// 1 for WITH RETURN CLIENT, 2 for WITH RETURN CALLER.
    pub with_return: i16,
    /// 1 when the cursor is scrollable.
    pub scroll: i16,
    /// 0 none, 1 sensitive dynamic, 2 sensitive static, 3 insensitive.
    pub sensitive: i16,
    /// Statement function code.
    pub function_code: i16,
    /// Whether the select list covers a primary key (1) or a unique key (2).
    pub key_type: i16,
    /// Database name.
    pub rdb_name: String,
    /// Default schema of the statement.
    pub schema: Option<String>,
}

/// Name of a user-defined type from SQLUDTGRP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserDefinedType {
    /// SQL type name.
    pub type_name: Option<String>,
    /// Client class name.
    pub class_name: Option<String>,
}

/// Origin of a column from SQLDXGRP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnOrigin {
    /// Position in the primary key, 0 when not a key member.
    pub key_member: i16,
    /// 1 when the column is updatable.
    pub updatable: i16,
    /// 1 for generated columns.
    pub generated: i16,
    /// Parameter mode for procedure parameters.
    pub parameter_mode: i16,
    /// Database name.
    pub rdb_name: String,
    /// Correlation name used in the query.
    pub correlation_name: Option<String>,
    /// Base table name.
    pub base_table: Option<String>,
    /// Schema of the base table.
    pub schema: Option<String>,
    /// Base column name.
    pub name: Option<String>,
}

/// Description of one column or parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMetaData {
    /// Raw DB2 type code; odd codes are nullable.
    pub type_code: u16,
    /// Precision for decimal types.
    pub precision: i16,
    /// Scale for decimal types.
    pub scale: i16,
    /// Maximum length in bytes.
    pub length: i64,
    /// CCSID of character data, 0 for other types.
    pub ccsid: u16,
    /// Whether the server generated the name.
    pub unnamed: bool,
    /// Column name as it appears in the select list.
    pub name: Option<String>,
    /// Column label.
    pub label: Option<String>,
    /// Column comment.
    pub comment: Option<String>,
    /// Type names of a user-defined type.
    pub user_defined: Option<UserDefinedType>,
    /// Base table and column, when the server describes them.
    pub origin: Option<ColumnOrigin>,
}

impl ColumnMetaData {
    /// SQL type of the column.
    #[must_use]
    pub fn sql_type(&self) -> SqlType {
        SqlType::from_code(self.type_code)
    }

    /// Whether the column accepts NULL.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.type_code & 1 == 1
    }

    /// Column name, preferring the base column name when the server sent one.
    #[must_use]
    pub fn column_name(&self) -> Option<&str> {
        self.origin
            .as_ref()
            .and_then(|origin| origin.name.as_deref())
            .or(self.name.as_deref())
    }
}

impl fmt::Display for ColumnMetaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?}({})",
            self.column_name().unwrap_or("?"),
            self.sql_type(),
            self.length
        )?;
        if self.is_nullable() {
            f.write_str(" NULL")?;
        }
        Ok(())
    }
}

/// A decoded SQLDARD.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlDescriptor {
    /// SQLCA of the describe, if not null.
    pub sqlca: Option<NetSqlca>,
    /// Cursor attributes, if not null.
    pub header: Option<DescriptorHeader>,
    /// One entry per column, in select-list order.
    pub columns: Vec<ColumnMetaData>,
}

impl SqlDescriptor {
    /// Names of all columns, `None` where the server sent none.
    #[must_use]
    pub fn column_names(&self) -> Vec<Option<&str>> {
        self.columns.iter().map(ColumnMetaData::column_name).collect()
    }
}

/// Parse a SQLDARD object.
pub fn parse_sqldard(
    parser: &mut ReplyParser,
    typdef: &Typdef,
) -> Result<SqlDescriptor, ProtocolError> {
    parser.parse_length_and_match_code_point(codepoint::SQLDARD)?;
    let platform = typdef.platform();
    parser.read_fdoca(|reader| read_sqldard(reader, platform))
}

/// Decode a SQLDARD from raw FD:OCA data.
///
/// DB2 for LUW closes every SQLDXGRP with an extra null indicator that DB2
/// for z/OS does not send.
pub fn read_sqldard(
    reader: &mut FdocaReader,
    platform: ServerPlatform,
) -> Result<SqlDescriptor, ProtocolError> {
    let sqlca = read_sqlca(reader)?;
    let header = read_sqldhgrp(reader)?;

    let count = reader.read_short()?;
    let count = usize::try_from(count).map_err(|_| {
        ProtocolError::value_range("SQLNUM", format!("negative column count {count}"))
    })?;
    let mut columns = Vec::with_capacity(count.min(reader.remaining()));
    for _ in 0..count {
        columns.push(read_sqldagrp(reader, platform)?);
    }

    tracing::trace!(columns = columns.len(), "decoded SQLDARD");
    Ok(SqlDescriptor {
        sqlca,
        header,
        columns,
    })
}

fn read_sqldhgrp(reader: &mut FdocaReader) -> Result<Option<DescriptorHeader>, ProtocolError> {
    if reader.read_u8()? == NULL_INDICATOR {
        return Ok(None);
    }
    let ccsid = reader.ccsid();
    Ok(Some(DescriptorHeader {
        hold: reader.read_short()?,
        with_return: reader.read_short()?,
        scroll: reader.read_short()?,
        sensitive: reader.read_short()?,
        function_code: reader.read_short()?,
        key_type: reader.read_short()?,
        rdb_name: reader.read_vcs(ccsid)?,
        schema: read_vcm_vcs(reader)?,
    }))
}

fn read_sqldagrp(
    reader: &mut FdocaReader,
    platform: ServerPlatform,
) -> Result<ColumnMetaData, ProtocolError> {
    let mut column = ColumnMetaData {
        precision: reader.read_short()?,
        scale: reader.read_short()?,
        length: reader.read_long()?,
        type_code: reader.read_short()? as u16,
        ccsid: reader.read_unsigned_short()?,
        ..ColumnMetaData::default()
    };
    read_sqldoptgrp(reader, &mut column, platform)?;
    Ok(column)
}

fn read_sqldoptgrp(
    reader: &mut FdocaReader,
    column: &mut ColumnMetaData,
    platform: ServerPlatform,
) -> Result<(), ProtocolError> {
    if reader.read_u8()? == NULL_INDICATOR {
        return Ok(());
    }
    column.unnamed = reader.read_short()? == 1;
    column.name = read_vcm_vcs(reader)?;
    column.label = read_vcm_vcs(reader)?;
    column.comment = read_vcm_vcs(reader)?;
    column.user_defined = read_sqludtgrp(reader)?;
    column.origin = read_sqldxgrp(reader, platform)?;
    Ok(())
}

fn read_sqludtgrp(reader: &mut FdocaReader) -> Result<Option<UserDefinedType>, ProtocolError> {
    if reader.read_u8()? == NULL_INDICATOR {
        return Ok(None);
    }
    Ok(Some(UserDefinedType {
        type_name: read_vcm_vcs(reader)?,
        class_name: read_vcm_vcs(reader)?,
    }))
}

fn read_sqldxgrp(
    reader: &mut FdocaReader,
    platform: ServerPlatform,
) -> Result<Option<ColumnOrigin>, ProtocolError> {
    if reader.read_u8()? == NULL_INDICATOR {
        return Ok(None);
    }
    let ccsid = reader.ccsid();
    let origin = ColumnOrigin {
        key_member: reader.read_short()?,
        updatable: reader.read_short()?,
        generated: reader.read_short()?,
        parameter_mode: reader.read_short()?,
        rdb_name: reader.read_vcs(ccsid)?,
        correlation_name: read_vcm_vcs(reader)?,
        base_table: read_vcm_vcs(reader)?,
        schema: read_vcm_vcs(reader)?,
        name: read_vcm_vcs(reader)?,
    };
    if platform != ServerPlatform::Zos {
        let trailer = reader.read_u8()?;
        if trailer != NULL_INDICATOR {
            return Err(ProtocolError::value_range(
                "SQLDXGRP",
                format!("expected null trailer, found {trailer:#04x}"),
            ));
        }
    }
    Ok(Some(origin))
}

/// Mixed-byte string followed by a single-byte string, both with a 2 byte
/// length. At most one of the pair may be non-empty.
fn read_vcm_vcs(reader: &mut FdocaReader) -> Result<Option<String>, ProtocolError> {
    let mixed = reader.read_ld_bytes()?;
    let single = reader.read_ld_bytes()?;
    match (mixed, single) {
        (Some(_), Some(_)) => Err(ProtocolError::value_range(
            "SQLDARD",
            "VCM and VCS lengths are mutually exclusive",
        )),
        (Some(bytes), None) => Ok(Some(decode_mixed(&bytes))),
        (None, Some(bytes)) => Ok(Some(reader.ccsid().decode(&bytes))),
        (None, None) => Ok(None),
    }
}

fn decode_mixed(bytes: &Bytes) -> String {
    Ccsid::Utf8.decode(bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ccsid::ByteOrder;

    /// SQLDARD of `SELECT ID, NAME, PRICE FROM DB2INST1.ITEMS` as DB2 11.5
    /// for LUW sends it: little-endian, UTF-8, null SQLCA.
    const LUW_ITEMS: &[u8] = &[
        0xFF, // SQLCAGRP
        // SQLDHGRP
        0x00, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0x00, 0x06, b'S', b'A', b'M', b'P', b'L', b'E', //
        0x00, 0x00, 0x00, 0x08, b'D', b'B', b'2', b'I', b'N', b'S', b'T', b'1', //
        // SQLNUM
        0x03, 0x00, //
        // ID INTEGER NOT NULL
        0x0A, 0x00, 0x00, 0x00, //
        0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0xF0, 0x01, //
        0x00, 0x00, //
        0x00, 0x00, 0x00, //
        0x00, 0x02, b'I', b'D', 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, //
        0xFF, // SQLUDTGRP
        0x00, // SQLDXGRP
        0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x05, b'I', b'T', b'E', b'M', b'S', //
        0x00, 0x00, 0x00, 0x08, b'D', b'B', b'2', b'I', b'N', b'S', b'T', b'1', //
        0x00, 0x00, 0x00, 0x02, b'I', b'D', //
        0xFF, //
        // NAME VARCHAR(40) nullable
        0x00, 0x00, 0x00, 0x00, //
        0x28, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0xC1, 0x01, //
        0x04, 0xB8, //
        0x00, 0x00, 0x00, //
        0x00, 0x04, b'N', b'A', b'M', b'E', 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, //
        0xFF, // SQLUDTGRP
        0xFF, // SQLDXGRP
        // PRICE DECIMAL(31,30) nullable, labelled
        0x1F, 0x00, 0x1E, 0x00, //
        0x1F, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
        0xE5, 0x01, //
        0x00, 0x00, //
        0x00, 0x00, 0x00, //
        0x00, 0x05, b'P', b'R', b'I', b'C', b'E', 0x00, 0x00, //
        0x00, 0x0A, b'U', b'n', b'i', b't', b' ', b'p', b'r', b'i', b'c', b'e', 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, //
        0xFF, // SQLUDTGRP
        0xFF, // SQLDXGRP
    ];

    fn luw_reader(bytes: &[u8]) -> FdocaReader {
        FdocaReader::new(
            Bytes::copy_from_slice(bytes),
            Ccsid::Utf8,
            ByteOrder::LittleEndian,
        )
    }

    #[test]
    fn test_luw_select_columns() {
        let mut reader = luw_reader(LUW_ITEMS);
        let descriptor = read_sqldard(&mut reader, ServerPlatform::Luw).unwrap();
        assert_eq!(reader.remaining(), 0);
        assert!(descriptor.sqlca.is_none());

        let header = descriptor.header.as_ref().unwrap();
        assert_eq!(header.rdb_name, "SAMPLE");
        assert_eq!(header.schema.as_deref(), Some("DB2INST1"));

        assert_eq!(
            descriptor.column_names(),
            [Some("ID"), Some("NAME"), Some("PRICE")]
        );

        let id = &descriptor.columns[0];
        assert_eq!(id.sql_type(), SqlType::Integer);
        assert!(!id.is_nullable());
        assert_eq!(id.precision, 10);
        assert_eq!(id.length, 4);
        let origin = id.origin.as_ref().unwrap();
        assert_eq!(origin.key_member, 1);
        assert_eq!(origin.base_table.as_deref(), Some("ITEMS"));
        assert_eq!(origin.schema.as_deref(), Some("DB2INST1"));

        let name = &descriptor.columns[1];
        assert_eq!(name.sql_type(), SqlType::Varchar);
        assert!(name.sql_type().is_character());
        assert!(name.is_nullable());
        assert_eq!(name.length, 40);
        assert_eq!(name.ccsid, 1208);
        assert!(name.origin.is_none());

        let price = &descriptor.columns[2];
        assert_eq!(price.sql_type(), SqlType::Decimal);
        assert_eq!((price.precision, price.scale), (31, 30));
        assert_eq!(price.label.as_deref(), Some("Unit price"));
        assert_eq!(price.to_string(), "PRICE Decimal(31) NULL");
    }

    #[test]
    fn test_zos_descriptor_without_trailer() {
        let mut bytes = vec![0xFF, 0xFF, 0x00, 0x01];
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        bytes.extend_from_slice(&2i64.to_be_bytes());
        bytes.extend_from_slice(&500u16.to_be_bytes());
        bytes.extend_from_slice(&[0x00, 0x00]);
        bytes.extend_from_slice(&[0x00, 0x00, 0x00]);
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x03, b'Q', b'T', b'Y']);
        bytes.extend_from_slice(&[0x00; 8]);
        bytes.push(0xFF); // SQLUDTGRP
        bytes.push(0x00); // SQLDXGRP
        bytes.extend_from_slice(&[0x00; 8]);
        bytes.extend_from_slice(&[0x00, 0x00]);
        bytes.extend_from_slice(&[0x00; 12]);
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x03, b'Q', b'T', b'Y']);

        let mut reader = FdocaReader::new(Bytes::from(bytes), Ccsid::Utf8, ByteOrder::BigEndian);
        let descriptor = read_sqldard(&mut reader, ServerPlatform::Zos).unwrap();
        assert_eq!(reader.remaining(), 0);
        assert!(descriptor.header.is_none());
        assert_eq!(descriptor.columns.len(), 1);
        assert_eq!(descriptor.columns[0].sql_type(), SqlType::Smallint);
        assert_eq!(descriptor.columns[0].column_name(), Some("QTY"));
    }

    #[test]
    fn test_no_columns() {
        let mut reader = luw_reader(&[0xFF, 0xFF, 0x00, 0x00]);
        let descriptor = read_sqldard(&mut reader, ServerPlatform::Luw).unwrap();
        assert!(descriptor.columns.is_empty());
    }

    #[test]
    fn test_negative_column_count() {
        let mut reader = luw_reader(&[0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(matches!(
            read_sqldard(&mut reader, ServerPlatform::Luw),
            Err(ProtocolError::ValueRange { field: "SQLNUM", .. })
        ));
    }

    #[test]
    fn test_truncated_column() {
        let mut reader = luw_reader(&LUW_ITEMS[..LUW_ITEMS.len() - 10]);
        assert!(read_sqldard(&mut reader, ServerPlatform::Luw).is_err());
    }

    #[test]
    fn test_vcm_and_vcs_both_present() {
        let data = [0x00, 0x01, b'a', 0x00, 0x01, b'b'];
        let mut reader = luw_reader(&data);
        assert!(read_vcm_vcs(&mut reader).is_err());
    }

    #[test]
    fn test_type_codes() {
        assert_eq!(SqlType::from_code(448), SqlType::Varchar);
        assert_eq!(SqlType::from_code(449), SqlType::Varchar);
        assert_eq!(SqlType::from_code(2437), SqlType::Boolean);
        assert_eq!(SqlType::from_code(996), SqlType::Other(996));
        assert!(!SqlType::Integer.is_character());
    }

    #[test]
    fn test_parse_sqldard_object() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&((LUW_ITEMS.len() + 4) as u16).to_be_bytes());
        payload.extend_from_slice(&codepoint::SQLDARD.to_be_bytes());
        payload.extend_from_slice(LUW_ITEMS);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&((payload.len() + 6) as u16).to_be_bytes());
        bytes.extend_from_slice(&[0xD0, 0x03, 0x00, 0x01]);
        bytes.extend_from_slice(&payload);

        let typdef = Typdef::luw();
        let mut parser = ReplyParser::new(Bytes::from(bytes), &typdef);
        parser.start_same_id_chain_parse().unwrap();
        let descriptor = parse_sqldard(&mut parser, &typdef).unwrap();
        assert_eq!(descriptor.columns.len(), 3);
        parser.end_of_same_id_chain_data().unwrap();
    }
}
