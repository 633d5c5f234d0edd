//! Connect and unit-of-work commands.
//!
//! Each command is a plain value with builder-style setters and an
//! `encode` method that appends it to a [`RequestBuilder`]:
//!
//! ```text
//! EXCSAT  -> EXCSATRD   exchange server attributes
//! ACCSEC  -> ACCSECRD   pick a security mechanism
//! SECCHK  -> SECCHKRM   authenticate
//! ACCRDB  -> ACCRDBRM   open the database
//! RDBCMM / RDBRLLBCK -> ENDUOWRM
//! ```

use std::net::Ipv4Addr;

use crate::builder::RequestBuilder;
use crate::ccsid::{Ccsid, CcsidOverrides};
use crate::codepoint;
use crate::constants::{
    self, CRRTKN_LEN, EXTNAM_MAX_SIZE, EXTNAM_MIN_SIZE, PASSWORD_MAX_SIZE, PRDDTA_ACCT_SUFFIX_LEN_BYTE,
    PRDDTA_APPL_ID_FIXED_LEN, PRDDTA_LEN_BYTE, PRDDTA_MAX_SIZE, PRDDTA_PLATFORM_ID,
    PRDDTA_USER_ID_FIXED_LEN, RDBNAM_MAX_LEN, RDBNAM_MIN_LEN, SECTKN_MAX_SIZE, SRVNAM_MAX_SIZE,
    SecurityMechanism, USRID_MAX_SIZE, mgrlvl,
};
use crate::error::ProtocolError;

/// Manager levels the client requests.
pub const DEFAULT_MANAGER_LEVELS: [(u16, u16); 6] = [
    (codepoint::AGENT, mgrlvl::AGENT),
    (codepoint::SQLAM, mgrlvl::SQLAM),
    (codepoint::UNICODEMGR, mgrlvl::UNICODEMGR),
    (codepoint::RDB, mgrlvl::RDB),
    (codepoint::SECMGR, mgrlvl::SECMGR),
    (codepoint::CMNTCPIP, mgrlvl::CMNTCPIP),
];

/// Longest prefix of `value` that is at most `max` bytes.
fn truncate(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

fn write_rdbnam(builder: &mut RequestBuilder, rdb_name: &str) -> Result<(), ProtocolError> {
    builder.write_scalar_string(
        codepoint::RDBNAM,
        rdb_name,
        RDBNAM_MIN_LEN,
        RDBNAM_MAX_LEN,
        "RDBNAM",
    )
}

fn write_secmec(builder: &mut RequestBuilder, mechanism: SecurityMechanism) {
    builder.write_scalar_2_bytes(codepoint::SECMEC, mechanism.as_u16());
}

fn write_sectkn(builder: &mut RequestBuilder, token: &[u8]) -> Result<(), ProtocolError> {
    if token.len() > SECTKN_MAX_SIZE {
        return Err(ProtocolError::value_range(
            "SECTKN",
            format!("{} bytes exceeds the limit of {SECTKN_MAX_SIZE}", token.len()),
        ));
    }
    builder.write_scalar_bytes(codepoint::SECTKN, token)
}

// =============================================================================
// EXCSAT
// =============================================================================

/// Exchange Server Attributes command.
#[derive(Debug, Clone)]
pub struct ExchangeServerAttributes {
    /// External name of the client process.
    pub external_name: String,
    /// Client host name.
    pub server_name: String,
    /// Client product release level.
    pub release_level: String,
    /// Requested manager levels.
    pub manager_levels: Vec<(u16, u16)>,
    /// Client server class name.
    pub server_class: String,
}

impl Default for ExchangeServerAttributes {
    fn default() -> Self {
        Self {
            external_name: constants::EXTNAM.to_owned(),
            server_name: String::new(),
            release_level: constants::PRDID.to_owned(),
            manager_levels: DEFAULT_MANAGER_LEVELS.to_vec(),
            server_class: constants::SRVCLSNM.to_owned(),
        }
    }
}

impl ExchangeServerAttributes {
    /// Create the command with the default attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the external name.
    #[must_use]
    pub fn with_external_name(mut self, name: impl Into<String>) -> Self {
        self.external_name = name.into();
        self
    }

    /// Set the client host name.
    #[must_use]
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// Encode the command. Names longer than the DDM limits are truncated.
    pub fn encode(&self, builder: &mut RequestBuilder) -> Result<(), ProtocolError> {
        builder.create_command()?;
        builder.mark_length_bytes(codepoint::EXCSAT);

        builder.write_scalar_string(
            codepoint::EXTNAM,
            truncate(&self.external_name, EXTNAM_MAX_SIZE),
            EXTNAM_MIN_SIZE,
            EXTNAM_MAX_SIZE,
            "EXTNAM",
        )?;
        builder.write_scalar_string(
            codepoint::SRVNAM,
            truncate(&self.server_name, SRVNAM_MAX_SIZE),
            0,
            SRVNAM_MAX_SIZE,
            "SRVNAM",
        )?;
        builder.write_scalar_string(
            codepoint::SRVRLSLV,
            &self.release_level,
            0,
            u16::MAX as usize,
            "SRVRLSLV",
        )?;

        builder.mark_length_bytes(codepoint::MGRLVLLS);
        for &(manager, level) in &self.manager_levels {
            builder.write_u16_be(manager);
            builder.write_u16_be(level);
        }
        builder.update_length_bytes()?;

        builder.write_scalar_string(
            codepoint::SRVCLSNM,
            &self.server_class,
            0,
            u16::MAX as usize,
            "SRVCLSNM",
        )?;
        builder.update_length_bytes()
    }
}

// =============================================================================
// ACCSEC
// =============================================================================

/// Access Security command.
#[derive(Debug, Clone)]
pub struct AccessSecurity {
    /// Requested mechanism.
    pub mechanism: SecurityMechanism,
    /// Database name.
    pub rdb_name: String,
    /// Client security token.
    pub token: Option<Vec<u8>>,
}

impl AccessSecurity {
    /// Request `mechanism` for `rdb_name`.
    #[must_use]
    pub fn new(mechanism: SecurityMechanism, rdb_name: impl Into<String>) -> Self {
        Self {
            mechanism,
            rdb_name: rdb_name.into(),
            token: None,
        }
    }

    /// Attach a client security token.
    #[must_use]
    pub fn with_token(mut self, token: Vec<u8>) -> Self {
        self.token = Some(token);
        self
    }

    /// Encode the command.
    pub fn encode(&self, builder: &mut RequestBuilder) -> Result<(), ProtocolError> {
        builder.create_command()?;
        builder.mark_length_bytes(codepoint::ACCSEC);
        write_secmec(builder, self.mechanism);
        write_rdbnam(builder, &self.rdb_name)?;
        if let Some(token) = &self.token {
            write_sectkn(builder, token)?;
        }
        builder.update_length_bytes()
    }
}

// =============================================================================
// SECCHK
// =============================================================================

/// Security Check command.
///
/// The password is never printed by `Debug`.
#[derive(Clone)]
pub struct SecurityCheck {
    /// Mechanism accepted by ACCSEC.
    pub mechanism: SecurityMechanism,
    /// Database name.
    pub rdb_name: String,
    /// User ID.
    pub user: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Security tokens, sent in order.
    pub tokens: Vec<Vec<u8>>,
}

impl std::fmt::Debug for SecurityCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityCheck")
            .field("mechanism", &self.mechanism)
            .field("rdb_name", &self.rdb_name)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

impl SecurityCheck {
    /// Authenticate to `rdb_name` with `mechanism`.
    #[must_use]
    pub fn new(mechanism: SecurityMechanism, rdb_name: impl Into<String>) -> Self {
        Self {
            mechanism,
            rdb_name: rdb_name.into(),
            user: None,
            password: None,
            tokens: Vec::new(),
        }
    }

    /// Set the user ID and password.
    #[must_use]
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// Set the user ID only.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Add a security token.
    #[must_use]
    pub fn with_token(mut self, token: Vec<u8>) -> Self {
        self.tokens.push(token);
        self
    }

    /// Encode the command.
    pub fn encode(&self, builder: &mut RequestBuilder) -> Result<(), ProtocolError> {
        builder.create_command()?;
        builder.mark_length_bytes(codepoint::SECCHK);
        write_secmec(builder, self.mechanism);
        write_rdbnam(builder, &self.rdb_name)?;
        if let Some(user) = &self.user {
            builder.write_scalar_string(codepoint::USRID, user, 0, USRID_MAX_SIZE, "USRID")?;
        }
        if let Some(password) = &self.password {
            if password.is_empty() {
                return Err(ProtocolError::value_range("PASSWORD", "password must not be empty"));
            }
            builder.write_scalar_string(
                codepoint::PASSWORD,
                password,
                0,
                PASSWORD_MAX_SIZE,
                "PASSWORD",
            )?;
        }
        for token in &self.tokens {
            write_sectkn(builder, token)?;
        }
        builder.update_length_bytes()
    }
}

// =============================================================================
// ACCRDB
// =============================================================================

/// Access RDB command.
#[derive(Debug, Clone)]
pub struct AccessRdb {
    /// Database name.
    pub rdb_name: String,
    /// Open the database read-only.
    pub read_only: bool,
    /// ASCII correlation token from [`correlation_token`], converted to the
    /// connection CCSID when encoded.
    pub correlation_token: [u8; CRRTKN_LEN],
    /// Type definition the client sends data in.
    pub typdef_name: String,
    /// CCSIDs the client sends data in.
    pub overrides: CcsidOverrides,
    /// Application name placed in the product data.
    pub application_name: String,
}

impl AccessRdb {
    /// Open `rdb_name` with the default UTF-8 data representation.
    #[must_use]
    pub fn new(rdb_name: impl Into<String>, correlation_token: [u8; CRRTKN_LEN]) -> Self {
        Self {
            rdb_name: rdb_name.into(),
            read_only: false,
            correlation_token,
            typdef_name: constants::TYPDEFNAM_QTDSQLASC.to_owned(),
            overrides: CcsidOverrides {
                sbc: Some(mgrlvl::UNICODEMGR),
                dbc: Some(mgrlvl::UNICODEMGR),
                mbc: Some(mgrlvl::UNICODEMGR),
                xml: None,
            },
            application_name: constants::EXTNAM.to_owned(),
        }
    }

    /// Open the database read-only.
    #[must_use]
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Encode the command.
    pub fn encode(&self, builder: &mut RequestBuilder) -> Result<(), ProtocolError> {
        builder.create_command()?;
        builder.mark_length_bytes(codepoint::ACCRDB);

        write_rdbnam(builder, &self.rdb_name)?;
        builder.write_scalar_2_bytes(codepoint::RDBACCCL, codepoint::SQLAM);
        builder.write_scalar_string(codepoint::PRDID, constants::PRDID, 0, 8, "PRDID")?;

        let prddta = product_data(builder.ccsid(), &self.application_name)?;
        let length = usize::from(prddta[PRDDTA_LEN_BYTE]) + 1;
        builder.write_scalar_bytes(codepoint::PRDDTA, &prddta[..length])?;

        builder.write_scalar_string(
            codepoint::TYPDEFNAM,
            &self.typdef_name,
            0,
            u16::MAX as usize,
            "TYPDEFNAM",
        )?;
        let token = encode_correlation_token(builder.ccsid(), &self.correlation_token)?;
        builder.write_scalar_bytes(codepoint::CRRTKN, &token)?;

        builder.mark_length_bytes(codepoint::TYPDEFOVR);
        for (code_point, ccsid) in [
            (codepoint::CCSIDSBC, self.overrides.sbc),
            (codepoint::CCSIDDBC, self.overrides.dbc),
            (codepoint::CCSIDMBC, self.overrides.mbc),
            (codepoint::CCSIDXML, self.overrides.xml),
        ] {
            if let Some(ccsid) = ccsid {
                builder.write_scalar_2_bytes(code_point, ccsid);
            }
        }
        builder.update_length_bytes()?;

        if self.read_only {
            builder.write_scalar_1_byte(codepoint::RDBALWUPD, codepoint::FALSE);
        }
        builder.update_length_bytes()
    }
}

/// Build the PRDDTA product data block.
///
/// Byte 0 holds the length of the data that follows it. The block carries
/// the product ID, the platform ID, and the first 20 bytes of
/// `application_name`, followed by an 8 byte user ID area and a zero
/// accounting suffix length, all blank-padded in `ccsid`.
pub fn product_data(ccsid: Ccsid, application_name: &str) -> Result<[u8; PRDDTA_MAX_SIZE], ProtocolError> {
    let mut prddta = [0u8; PRDDTA_MAX_SIZE];
    prddta[..PRDDTA_ACCT_SUFFIX_LEN_BYTE].fill(ccsid.space());

    let mut position = PRDDTA_LEN_BYTE + 1;
    for part in [constants::PRDID, PRDDTA_PLATFORM_ID] {
        let encoded = ccsid.encode(part)?;
        prddta[position..position + encoded.len()].copy_from_slice(&encoded);
        position += encoded.len();
    }
    let mut length = position;

    let application = ccsid.encode(truncate(application_name, PRDDTA_APPL_ID_FIXED_LEN))?;
    prddta[position..position + application.len()].copy_from_slice(&application);
    length += PRDDTA_APPL_ID_FIXED_LEN + PRDDTA_USER_ID_FIXED_LEN;

    prddta[PRDDTA_ACCT_SUFFIX_LEN_BYTE] = 0;
    length += 1;
    prddta[PRDDTA_LEN_BYTE] = (length - 1) as u8;
    Ok(prddta)
}

/// Build a correlation token from the local address, the local port, and
/// the current time in milliseconds.
///
/// The address becomes eight hex-digit characters whose first character is
/// shifted into `G`..`V`, then `.`, four hex digits of the port, and the low
/// six bytes of the time.
#[must_use]
pub fn correlation_token(address: Ipv4Addr, port: u16, millis: u64) -> [u8; CRRTKN_LEN] {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let mut token = [0u8; CRRTKN_LEN];

    for (i, octet) in address.octets().into_iter().enumerate() {
        let high = usize::from(octet >> 4);
        token[i * 2] = if i == 0 {
            b'G' + high as u8
        } else {
            DIGITS[high]
        };
        token[i * 2 + 1] = DIGITS[usize::from(octet & 0x0F)];
    }
    token[8] = b'.';
    for i in 0..4 {
        token[9 + i] = DIGITS[usize::from((port >> (12 - i * 4)) & 0x0F)];
    }
    token[13..].copy_from_slice(&millis.to_be_bytes()[2..]);

    token
}

/// Convert an ASCII correlation token to the connection CCSID.
pub fn encode_correlation_token(
    ccsid: Ccsid,
    token: &[u8; CRRTKN_LEN],
) -> Result<[u8; CRRTKN_LEN], ProtocolError> {
    let mut out = *token;
    let text = std::str::from_utf8(&token[..13])
        .map_err(|_| ProtocolError::value_range("CRRTKN", "token prefix is not ASCII"))?;
    let encoded = ccsid.encode(text)?;
    out[..13].copy_from_slice(&encoded);
    Ok(out)
}

// =============================================================================
// RDBCMM / RDBRLLBCK
// =============================================================================

/// Encode RDB Commit Unit of Work. RDBNAM is omitted.
pub fn encode_commit(builder: &mut RequestBuilder) -> Result<(), ProtocolError> {
    builder.create_command()?;
    builder.write_length_code_point(4, codepoint::RDBCMM);
    Ok(())
}

/// Encode RDB Rollback Unit of Work. RDBNAM is omitted.
pub fn encode_rollback(builder: &mut RequestBuilder) -> Result<(), ProtocolError> {
    builder.create_command()?;
    builder.write_length_code_point(4, codepoint::RDBRLLBCK);
    Ok(())
}
