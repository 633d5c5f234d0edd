//! Negotiated data representation: character encoding and byte order.
//!
//! DDM character parameters flow either in EBCDIC (CCSID 500) or in UTF-8
//! (CCSID 1208). Integers inside FDOCA data flow in the server's byte order:
//! big-endian for z/OS, little-endian for LUW servers. Both are decided once
//! per connection during the handshake and carried by [`Typdef`].

use std::fmt;

use bytes::BufMut;

use crate::error::ProtocolError;

/// CCSID of UTF-8.
pub const CCSID_UTF8: u16 = 1208;

/// CCSID of EBCDIC international (code page 500).
pub const CCSID_EBCDIC_500: u16 = 500;

/// Code page 500 to Latin-1 mapping. Every EBCDIC byte maps to a single
/// code point in U+0000..=U+00FF, so the table is a bijection.
#[rustfmt::skip]
const CP500_TO_LATIN1: [u8; 256] = [
    0x00, 0x01, 0x02, 0x03, 0x9C, 0x09, 0x86, 0x7F, 0x97, 0x8D, 0x8E, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
    0x10, 0x11, 0x12, 0x13, 0x9D, 0x85, 0x08, 0x87, 0x18, 0x19, 0x92, 0x8F, 0x1C, 0x1D, 0x1E, 0x1F,
    0x80, 0x81, 0x82, 0x83, 0x84, 0x0A, 0x17, 0x1B, 0x88, 0x89, 0x8A, 0x8B, 0x8C, 0x05, 0x06, 0x07,
    0x90, 0x91, 0x16, 0x93, 0x94, 0x95, 0x96, 0x04, 0x98, 0x99, 0x9A, 0x9B, 0x14, 0x15, 0x9E, 0x1A,
    0x20, 0xA0, 0xE2, 0xE4, 0xE0, 0xE1, 0xE3, 0xE5, 0xE7, 0xF1, 0x5B, 0x2E, 0x3C, 0x28, 0x2B, 0x21,
    0x26, 0xE9, 0xEA, 0xEB, 0xE8, 0xED, 0xEE, 0xEF, 0xEC, 0xDF, 0x5D, 0x24, 0x2A, 0x29, 0x3B, 0x5E,
    0x2D, 0x2F, 0xC2, 0xC4, 0xC0, 0xC1, 0xC3, 0xC5, 0xC7, 0xD1, 0xA6, 0x2C, 0x25, 0x5F, 0x3E, 0x3F,
    0xF8, 0xC9, 0xCA, 0xCB, 0xC8, 0xCD, 0xCE, 0xCF, 0xCC, 0x60, 0x3A, 0x23, 0x40, 0x27, 0x3D, 0x22,
    0xD8, 0x61, 0x62, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0xAB, 0xBB, 0xF0, 0xFD, 0xFE, 0xB1,
    0xB0, 0x6A, 0x6B, 0x6C, 0x6D, 0x6E, 0x6F, 0x70, 0x71, 0x72, 0xAA, 0xBA, 0xE6, 0xB8, 0xC6, 0xA4,
    0xB5, 0x7E, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7A, 0xA1, 0xBF, 0xD0, 0xDD, 0xDE, 0xAE,
    0xA2, 0xA3, 0xA5, 0xB7, 0xA9, 0xA7, 0xB6, 0xBC, 0xBD, 0xBE, 0xAC, 0x7C, 0xAF, 0xA8, 0xB4, 0xD7,
    0x7B, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0xAD, 0xF4, 0xF6, 0xF2, 0xF3, 0xF5,
    0x7D, 0x4A, 0x4B, 0x4C, 0x4D, 0x4E, 0x4F, 0x50, 0x51, 0x52, 0xB9, 0xFB, 0xFC, 0xF9, 0xFA, 0xFF,
    0x5C, 0xF7, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5A, 0xB2, 0xD4, 0xD6, 0xD2, 0xD3, 0xD5,
    0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0xB3, 0xDB, 0xDC, 0xD9, 0xDA, 0x9F,
];

const LATIN1_TO_CP500: [u8; 256] = invert(&CP500_TO_LATIN1);

const fn invert(table: &[u8; 256]) -> [u8; 256] {
    let mut out = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        out[table[i] as usize] = i as u8;
        i += 1;
    }
    out
}

/// Character encoding used for DDM character data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ccsid {
    /// EBCDIC code page 500.
    Ebcdic500,
    /// UTF-8.
    Utf8,
}

impl Ccsid {
    /// Numeric CCSID.
    #[must_use]
    pub const fn id(self) -> u16 {
        match self {
            Self::Ebcdic500 => CCSID_EBCDIC_500,
            Self::Utf8 => CCSID_UTF8,
        }
    }

    /// Encoded form of a single space, used for padding.
    #[must_use]
    pub const fn space(self) -> u8 {
        match self {
            Self::Ebcdic500 => 0x40,
            Self::Utf8 => 0x20,
        }
    }

    /// Encode a string, appending to `dst`. Returns the number of bytes
    /// written.
    pub fn encode_into(self, value: &str, dst: &mut impl BufMut) -> Result<usize, ProtocolError> {
        match self {
            Self::Utf8 => {
                dst.put_slice(value.as_bytes());
                Ok(value.len())
            }
            Self::Ebcdic500 => {
                let mut written = 0;
                for ch in value.chars() {
                    let code = u32::from(ch);
                    let latin1 = u8::try_from(code).map_err(|_| {
                        ProtocolError::value_range(
                            "EBCDIC",
                            format!("character {ch:?} has no code page 500 mapping"),
                        )
                    })?;
                    dst.put_u8(LATIN1_TO_CP500[latin1 as usize]);
                    written += 1;
                }
                Ok(written)
            }
        }
    }

    /// Encode a string into a new vector.
    pub fn encode(self, value: &str) -> Result<Vec<u8>, ProtocolError> {
        let mut out = Vec::with_capacity(value.len());
        self.encode_into(value, &mut out)?;
        Ok(out)
    }

    /// Decode bytes received from the server.
    #[must_use]
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => decode_utf8(bytes),
            Self::Ebcdic500 => bytes
                .iter()
                .map(|&b| char::from(CP500_TO_LATIN1[b as usize]))
                .collect(),
        }
    }
}

impl fmt::Display for Ccsid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CCSID {}", self.id())
    }
}

/// Decode UTF-8 server data, replacing malformed sequences.
#[cfg(feature = "encoding")]
#[must_use]
pub fn decode_utf8(bytes: &[u8]) -> String {
    let (text, _had_errors) = encoding_rs::UTF_8.decode_without_bom_handling(bytes);
    text.into_owned()
}

/// Decode UTF-8 server data, replacing malformed sequences.
#[cfg(not(feature = "encoding"))]
#[must_use]
pub fn decode_utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Byte order of integers inside FDOCA data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Most significant byte first (z/OS).
    BigEndian,
    /// Least significant byte first (LUW).
    LittleEndian,
}

/// Server platform, as identified from the EXCSATRD release level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ServerPlatform {
    /// Not yet known (before EXCSATRD).
    #[default]
    Unknown,
    /// DB2 for z/OS.
    Zos,
    /// DB2 for Linux, UNIX and Windows (and IBM i).
    Luw,
}

impl ServerPlatform {
    /// Identify the platform from a SRVRLSLV value such as `DSN12015` or
    /// `SQL11054`.
    #[must_use]
    pub fn from_release_level(level: &str) -> Self {
        if level.trim_start().starts_with("DSN") {
            Self::Zos
        } else {
            Self::Luw
        }
    }
}

/// Negotiated type definition of a connection.
///
/// Starts as EBCDIC and big-endian, the DDM defaults before any manager
/// levels are exchanged. [`Typdef::apply_platform`] picks the platform
/// representation after EXCSATRD; [`Typdef::switch_to_utf8`] is one-way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Typdef {
    ccsid: Ccsid,
    byte_order: ByteOrder,
    platform: ServerPlatform,
    utf8_locked: bool,
    overrides: CcsidOverrides,
    name: Option<String>,
}

/// CCSIDs declared by a TYPDEFOVR object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CcsidOverrides {
    /// Single-byte CCSID.
    pub sbc: Option<u16>,
    /// Double-byte CCSID.
    pub dbc: Option<u16>,
    /// Mixed-byte CCSID.
    pub mbc: Option<u16>,
    /// XML CCSID.
    pub xml: Option<u16>,
}

impl CcsidOverrides {
    /// Whether every declared character CCSID is UTF-8.
    #[must_use]
    pub fn is_unicode(&self) -> bool {
        [self.sbc, self.dbc, self.mbc]
            .into_iter()
            .flatten()
            .all(|ccsid| ccsid == CCSID_UTF8)
            && (self.sbc.is_some() || self.mbc.is_some())
    }
}

impl Default for Typdef {
    fn default() -> Self {
        Self {
            ccsid: Ccsid::Ebcdic500,
            byte_order: ByteOrder::BigEndian,
            platform: ServerPlatform::Unknown,
            utf8_locked: false,
            overrides: CcsidOverrides::default(),
            name: None,
        }
    }
}

impl Typdef {
    /// Representation for a LUW server: UTF-8, little-endian.
    #[must_use]
    pub fn luw() -> Self {
        let mut typdef = Self::default();
        typdef.apply_platform(ServerPlatform::Luw);
        typdef
    }

    /// Representation for a z/OS server: EBCDIC, big-endian.
    #[must_use]
    pub fn zos() -> Self {
        let mut typdef = Self::default();
        typdef.apply_platform(ServerPlatform::Zos);
        typdef
    }

    /// Current character encoding.
    #[must_use]
    pub fn ccsid(&self) -> Ccsid {
        self.ccsid
    }

    /// Current integer byte order.
    #[must_use]
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Identified server platform.
    #[must_use]
    pub fn platform(&self) -> ServerPlatform {
        self.platform
    }

    /// Whether the server is DB2 for z/OS.
    #[must_use]
    pub fn is_zos(&self) -> bool {
        self.platform == ServerPlatform::Zos
    }

    /// CCSID overrides most recently received from the server.
    #[must_use]
    pub fn overrides(&self) -> &CcsidOverrides {
        &self.overrides
    }

    /// Type definition name most recently received from the server.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Set the representation for the identified server platform.
    pub fn apply_platform(&mut self, platform: ServerPlatform) {
        self.platform = platform;
        match platform {
            ServerPlatform::Zos => {
                self.byte_order = ByteOrder::BigEndian;
                if !self.utf8_locked {
                    self.ccsid = Ccsid::Ebcdic500;
                }
            }
            ServerPlatform::Luw => {
                self.byte_order = ByteOrder::LittleEndian;
                self.ccsid = Ccsid::Utf8;
            }
            ServerPlatform::Unknown => {}
        }
    }

    /// Switch character data to UTF-8 for the rest of the connection.
    pub fn switch_to_utf8(&mut self) {
        if !self.utf8_locked {
            tracing::debug!(platform = ?self.platform, "switching DDM character data to UTF-8");
        }
        self.ccsid = Ccsid::Utf8;
        self.utf8_locked = true;
    }

    /// Record the TYPDEFNAM received from the server.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Merge CCSIDs received in a TYPDEFOVR object.
    pub fn apply_overrides(&mut self, overrides: CcsidOverrides) {
        let merged = CcsidOverrides {
            sbc: overrides.sbc.or(self.overrides.sbc),
            dbc: overrides.dbc.or(self.overrides.dbc),
            mbc: overrides.mbc.or(self.overrides.mbc),
            xml: overrides.xml.or(self.overrides.xml),
        };
        self.overrides = merged;
    }

    /// Encoding of FD:OCA character data sent by the server: UTF-8 once the
    /// server has declared CCSID 1208 through TYPDEFOVR, otherwise the DDM
    /// encoding.
    #[must_use]
    pub fn data_ccsid(&self) -> Ccsid {
        if self.overrides.is_unicode() {
            Ccsid::Utf8
        } else {
            self.ccsid
        }
    }

    /// Encode character data in the current CCSID.
    pub fn encode(&self, value: &str) -> Result<Vec<u8>, ProtocolError> {
        self.ccsid.encode(value)
    }

    /// Decode character data in the current CCSID.
    #[must_use]
    pub fn decode(&self, bytes: &[u8]) -> String {
        self.ccsid.decode(bytes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ebcdic_known_values() {
        let encoded = Ccsid::Ebcdic500.encode("DB2 abc 09").unwrap();
        assert_eq!(
            encoded,
            vec![0xC4, 0xC2, 0xF2, 0x40, 0x81, 0x82, 0x83, 0x40, 0xF0, 0xF9]
        );
    }

    #[test]
    fn test_ebcdic_code_page_500_specific_positions() {
        assert_eq!(Ccsid::Ebcdic500.decode(&[0x4A, 0x5A]), "[]");
        assert_eq!(Ccsid::Ebcdic500.decode(&[0x4F, 0xBB]), "!|");
    }

    #[test]
    fn test_ebcdic_table_is_bijective() {
        let all: Vec<u8> = (0..=255u8).collect();
        let text = Ccsid::Ebcdic500.decode(&all);
        let back = Ccsid::Ebcdic500.encode(&text).unwrap();
        assert_eq!(back, all);
    }

    #[test]
    fn test_ebcdic_rejects_non_latin1() {
        let err = Ccsid::Ebcdic500.encode("price €").unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_platform_detection() {
        assert_eq!(
            ServerPlatform::from_release_level("DSN12015"),
            ServerPlatform::Zos
        );
        assert_eq!(
            ServerPlatform::from_release_level("SQL11055"),
            ServerPlatform::Luw
        );
    }

    #[test]
    fn test_utf8_switch_is_never_reverted() {
        let mut typdef = Typdef::zos();
        assert_eq!(typdef.ccsid(), Ccsid::Ebcdic500);
        typdef.switch_to_utf8();
        typdef.apply_platform(ServerPlatform::Zos);
        assert_eq!(typdef.ccsid(), Ccsid::Utf8);
        assert_eq!(typdef.byte_order(), ByteOrder::BigEndian);
    }

    #[test]
    fn test_luw_representation() {
        let typdef = Typdef::luw();
        assert_eq!(typdef.ccsid(), Ccsid::Utf8);
        assert_eq!(typdef.byte_order(), ByteOrder::LittleEndian);
    }

    #[test]
    fn test_overrides_merge() {
        let mut typdef = Typdef::luw();
        typdef.apply_overrides(CcsidOverrides {
            sbc: Some(1208),
            ..CcsidOverrides::default()
        });
        typdef.apply_overrides(CcsidOverrides {
            mbc: Some(1208),
            ..CcsidOverrides::default()
        });
        assert_eq!(typdef.overrides().sbc, Some(1208));
        assert_eq!(typdef.overrides().mbc, Some(1208));
        assert!(typdef.overrides().is_unicode());
    }

    #[test]
    fn test_data_ccsid_follows_overrides() {
        let mut typdef = Typdef::zos();
        assert_eq!(typdef.data_ccsid(), Ccsid::Ebcdic500);
        typdef.apply_overrides(CcsidOverrides {
            sbc: Some(1208),
            dbc: Some(1200),
            mbc: Some(1208),
            xml: None,
        });
        assert_eq!(typdef.data_ccsid(), Ccsid::Ebcdic500);
        typdef.apply_overrides(CcsidOverrides {
            dbc: Some(1208),
            ..CcsidOverrides::default()
        });
        assert_eq!(typdef.data_ccsid(), Ccsid::Utf8);
    }
}
