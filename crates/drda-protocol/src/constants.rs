//! Fixed protocol values: limits, manager levels, product identifiers,
//! security mechanisms and FDOCA type codes.

use std::fmt;

use crate::error::ProtocolError;

/// Product identifier sent in PRDID and SRVRLSLV.
pub const PRDID: &str = "JCC04250";

/// External name of this client, sent in EXTNAM.
pub const EXTNAM: &str = "db2jcc_application  JCC04250300";

/// Server class name sent in EXCSAT.
pub const SRVCLSNM: &str = "QDB2/JVM";

/// Type definition name for ASCII/little-endian data representation.
pub const TYPDEFNAM_QTDSQLASC: &str = "QTDSQLASC";

/// Type definition name for EBCDIC/big-endian (z/OS) data representation.
pub const TYPDEFNAM_QTDSQL370: &str = "QTDSQL370";

/// Maximum length of a single DSS segment, header included.
pub const DSS_MAX_LENGTH: usize = 32767;

/// Maximum number of data bytes that follow a continuation header.
pub const DSS_CONTINUATION_DATA_MAX: usize = 32765;

/// Size of a DSS header.
pub const DSS_HEADER_SIZE: usize = 6;

/// Size of a DDM length + code point header.
pub const DDM_HEADER_SIZE: usize = 4;

/// Largest DDM object length that fits the 2-byte length field.
pub const DDM_MAX_SHORT_LENGTH: usize = 0x7FFF;

/// Maximum security token size.
pub const SECTKN_MAX_SIZE: usize = 32763;

/// Maximum external name size.
pub const EXTNAM_MAX_SIZE: usize = 255;

/// Minimum external name size; shorter names are space padded.
pub const EXTNAM_MIN_SIZE: usize = 141;

/// Maximum server name size.
pub const SRVNAM_MAX_SIZE: usize = 255;

/// Maximum user ID size.
pub const USRID_MAX_SIZE: usize = 255;

/// Maximum password size.
pub const PASSWORD_MAX_SIZE: usize = 255;

/// Minimum RDBNAM length; shorter names are space padded.
pub const RDBNAM_MIN_LEN: usize = 18;

/// Maximum RDBNAM length.
pub const RDBNAM_MAX_LEN: usize = 1024;

/// Maximum PRDDTA size.
pub const PRDDTA_MAX_SIZE: usize = 255;

/// Offset of the PRDDTA length byte.
pub const PRDDTA_LEN_BYTE: usize = 0;

/// Offset of the PRDDTA accounting suffix length byte.
pub const PRDDTA_ACCT_SUFFIX_LEN_BYTE: usize = 55;

/// Fixed length of the application id inside PRDDTA.
pub const PRDDTA_APPL_ID_FIXED_LEN: usize = 20;

/// Fixed length of the user id inside PRDDTA.
pub const PRDDTA_USER_ID_FIXED_LEN: usize = 8;

/// Platform identifier inside PRDDTA.
pub const PRDDTA_PLATFORM_ID: &str = "JVM               ";

/// Length of the generated correlation token.
pub const CRRTKN_LEN: usize = 19;

/// SQLAM level the client targets.
pub const TARGET_SQLAM: u16 = 7;

/// Maximum precision of a packed decimal.
pub const MAX_DECIMAL_PRECISION: u32 = 31;

/// Manager levels requested in EXCSAT.
pub mod mgrlvl {
    /// AGENT level.
    pub const AGENT: u16 = 0x0A;
    /// SQLAM level.
    pub const SQLAM: u16 = super::TARGET_SQLAM;
    /// UNICODEMGR level: the CCSID of UTF-8.
    pub const UNICODEMGR: u16 = 1208;
    /// RDB level.
    pub const RDB: u16 = 0x0C;
    /// SECMGR level.
    pub const SECMGR: u16 = 0x0A;
    /// CMNTCPIP level.
    pub const CMNTCPIP: u16 = 0x08;
}

/// DDM security mechanisms (SECMEC values).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u16)]
pub enum SecurityMechanism {
    /// User ID and password.
    UserIdPassword = 0x03,
    /// User ID only.
    UserIdOnly = 0x04,
    /// User ID and encrypted password.
    UserEncryptedPassword = 0x07,
    /// Strong password substitute.
    StrongPasswordSubstitute = 0x08,
    /// Encrypted user ID and password.
    EncryptedUserIdPassword = 0x09,
    /// Encrypted user ID and security-sensitive data.
    EncryptedUserIdData = 0x0C,
    /// Encrypted user ID, password and security-sensitive data.
    EncryptedUserPasswordData = 0x0D,
}

impl SecurityMechanism {
    /// Decode a SECMEC value.
    pub fn from_u16(value: u16) -> Result<Self, ProtocolError> {
        Ok(match value {
            0x03 => Self::UserIdPassword,
            0x04 => Self::UserIdOnly,
            0x07 => Self::UserEncryptedPassword,
            0x08 => Self::StrongPasswordSubstitute,
            0x09 => Self::EncryptedUserIdPassword,
            0x0C => Self::EncryptedUserIdData,
            0x0D => Self::EncryptedUserPasswordData,
            other => {
                return Err(ProtocolError::value_range(
                    "SECMEC",
                    format!("unsupported security mechanism {other}"),
                ));
            }
        })
    }

    /// The raw SECMEC value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Whether ACCSECRD must carry a security token for this mechanism.
    #[must_use]
    pub const fn requires_token(self) -> bool {
        matches!(
            self,
            Self::UserEncryptedPassword
                | Self::StrongPasswordSubstitute
                | Self::EncryptedUserIdPassword
                | Self::EncryptedUserIdData
                | Self::EncryptedUserPasswordData
        )
    }

    /// Whether SECCHK must carry a password for this mechanism.
    #[must_use]
    pub const fn requires_password(self) -> bool {
        !matches!(self, Self::UserIdOnly)
    }
}

impl fmt::Display for SecurityMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UserIdPassword => "USRIDPWD",
            Self::UserIdOnly => "USRIDONL",
            Self::UserEncryptedPassword => "USRENCPWD",
            Self::StrongPasswordSubstitute => "USRSSBPWD",
            Self::EncryptedUserIdPassword => "EUSRIDPWD",
            Self::EncryptedUserIdData => "EUSRIDDTA",
            Self::EncryptedUserPasswordData => "EUSRPWDDTA",
        };
        write!(f, "{name} ({})", self.as_u16())
    }
}

/// FDOCA data type codes (DRDA_TYPE_*). Odd values are the nullable
/// variants of the preceding even value.
#[allow(missing_docs)]
pub mod drda_type {
    pub const INTEGER: u8 = 0x02;
    pub const NINTEGER: u8 = 0x03;
    pub const SMALL: u8 = 0x04;
    pub const NSMALL: u8 = 0x05;
    pub const ONE_BYTE_INT: u8 = 0x06;
    pub const NONE_BYTE_INT: u8 = 0x07;
    pub const FLOAT16: u8 = 0x08;
    pub const NFLOAT16: u8 = 0x09;
    pub const FLOAT8: u8 = 0x0A;
    pub const NFLOAT8: u8 = 0x0B;
    pub const FLOAT4: u8 = 0x0C;
    pub const NFLOAT4: u8 = 0x0D;
    pub const DECIMAL: u8 = 0x0E;
    pub const NDECIMAL: u8 = 0x0F;
    pub const ZDECIMAL: u8 = 0x10;
    pub const NZDECIMAL: u8 = 0x11;
    pub const NUMERIC_CHAR: u8 = 0x12;
    pub const NNUMERIC_CHAR: u8 = 0x13;
    pub const RSET_LOC: u8 = 0x14;
    pub const NRSET_LOC: u8 = 0x15;
    pub const INTEGER8: u8 = 0x16;
    pub const NINTEGER8: u8 = 0x17;
    pub const LOBLOC: u8 = 0x18;
    pub const NLOBLOC: u8 = 0x19;
    pub const CLOBLOC: u8 = 0x1A;
    pub const NCLOBLOC: u8 = 0x1B;
    pub const DBCSCLOBLOC: u8 = 0x1C;
    pub const NDBCSCLOBLOC: u8 = 0x1D;
    pub const ROWID: u8 = 0x1E;
    pub const NROWID: u8 = 0x1F;
    pub const DATE: u8 = 0x20;
    pub const NDATE: u8 = 0x21;
    pub const TIME: u8 = 0x22;
    pub const NTIME: u8 = 0x23;
    pub const TIMESTAMP: u8 = 0x24;
    pub const NTIMESTAMP: u8 = 0x25;
    pub const FIXBYTE: u8 = 0x26;
    pub const NFIXBYTE: u8 = 0x27;
    pub const VARBYTE: u8 = 0x28;
    pub const NVARBYTE: u8 = 0x29;
    pub const LONGVARBYTE: u8 = 0x2A;
    pub const NLONGVARBYTE: u8 = 0x2B;
    pub const NTERMBYTE: u8 = 0x2C;
    pub const NNTERMBYTE: u8 = 0x2D;
    pub const CSTR: u8 = 0x2E;
    pub const NCSTR: u8 = 0x2F;
    pub const CHAR: u8 = 0x30;
    pub const NCHAR: u8 = 0x31;
    pub const VARCHAR: u8 = 0x32;
    pub const NVARCHAR: u8 = 0x33;
    pub const LONG: u8 = 0x34;
    pub const NLONG: u8 = 0x35;
    pub const GRAPHIC: u8 = 0x36;
    pub const NGRAPHIC: u8 = 0x37;
    pub const VARGRAPH: u8 = 0x38;
    pub const NVARGRAPH: u8 = 0x39;
    pub const LONGRAPH: u8 = 0x3A;
    pub const NLONGRAPH: u8 = 0x3B;
    pub const MIX: u8 = 0x3C;
    pub const NMIX: u8 = 0x3D;
    pub const VARMIX: u8 = 0x3E;
    pub const NVARMIX: u8 = 0x3F;
    pub const LONGMIX: u8 = 0x40;
    pub const NLONGMIX: u8 = 0x41;
    pub const CSTRMIX: u8 = 0x42;
    pub const NCSTRMIX: u8 = 0x43;
    pub const PSCLBYTE: u8 = 0x44;
    pub const NPSCLBYTE: u8 = 0x45;
    pub const LSTR: u8 = 0x46;
    pub const NLSTR: u8 = 0x47;
    pub const LSTRMIX: u8 = 0x48;
    pub const NLSTRMIX: u8 = 0x49;
    pub const SDATALINK: u8 = 0x4C;
    pub const NSDATALINK: u8 = 0x4D;
    pub const MDATALINK: u8 = 0x4E;
    pub const NMDATALINK: u8 = 0x4F;
    pub const UDT: u8 = 0x50;
    pub const NUDT: u8 = 0x51;
    pub const BOOLEAN: u8 = 0xBE;
    pub const NBOOLEAN: u8 = 0xBF;
    pub const LOBBYTES: u8 = 0xC8;
    pub const NLOBBYTES: u8 = 0xC9;
    pub const LOBCSBCS: u8 = 0xCA;
    pub const NLOBCSBCS: u8 = 0xCB;
    pub const LOBCDBCS: u8 = 0xCC;
    pub const NLOBCDBCS: u8 = 0xCD;
    pub const LOBCMIXED: u8 = 0xCE;
    pub const NLOBCMIXED: u8 = 0xCF;

    /// Whether the type code is a nullable variant.
    #[must_use]
    pub const fn is_nullable(code: u8) -> bool {
        code & 0x01 == 0x01
    }
}

/// DB2 SQL type codes (SQLTYPE values in SQLDA). Odd values are nullable.
#[allow(missing_docs)]
pub mod sql_type {
    pub const DATE: u16 = 384;
    pub const TIME: u16 = 388;
    pub const TIMESTAMP: u16 = 392;
    pub const DATALINK: u16 = 396;
    pub const BLOB: u16 = 404;
    pub const CLOB: u16 = 408;
    pub const DBCLOB: u16 = 412;
    pub const VARCHAR: u16 = 448;
    pub const CHAR: u16 = 452;
    pub const LONG: u16 = 456;
    pub const CSTR: u16 = 460;
    pub const VARGRAPH: u16 = 464;
    pub const GRAPHIC: u16 = 468;
    pub const LONGRAPH: u16 = 472;
    pub const LSTR: u16 = 476;
    pub const FLOAT: u16 = 480;
    pub const DECIMAL: u16 = 484;
    pub const ZONED: u16 = 488;
    pub const BIGINT: u16 = 492;
    pub const INTEGER: u16 = 496;
    pub const SMALL: u16 = 500;
    pub const NUMERIC: u16 = 504;
    pub const ROWID: u16 = 904;
    pub const BLOB_LOCATOR: u16 = 960;
    pub const CLOB_LOCATOR: u16 = 964;
    pub const DBCLOB_LOCATOR: u16 = 968;
    pub const BOOLEAN: u16 = 2436;

    /// Strip the nullable bit from a SQL type.
    #[must_use]
    pub const fn base(code: u16) -> u16 {
        code & !0x01
    }
}
