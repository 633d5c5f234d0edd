//! Replies to the connect and unit-of-work commands.
//!
//! Each `read_*` function consumes one complete same-ID reply chain: it
//! expects the normal reply first and falls back to the error replies the
//! command may draw.

use bytes::Bytes;

use crate::ccsid::{Ccsid, CcsidOverrides, ServerPlatform, Typdef};
use crate::codepoint;
use crate::constants::SecurityMechanism;
use crate::error::{ProtocolError, SecurityCheckCode, SecurityFailure, Severity, SyntaxErrorCode};
use crate::error_reply::parse_error_reply;
use crate::grammar::{
    Field, Grammar, invalid, read_mgrlvlls, read_rdbnam, read_srvdgn, read_string_scalar,
    read_svrcod, skip_member,
};
use crate::parser::{Peek, ReplyParser};
use crate::sqlca::{self, NetSqlca, parse_sqlcard};

/// Highest SECCHKCD value defined by DDM.
const SECCHKCD_MAX: u8 = 0x15;

// =============================================================================
// EXCSATRD
// =============================================================================

/// Server attributes returned by EXCSATRD.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerAttributes {
    /// External name of the server process.
    pub external_name: Option<String>,
    /// Manager code points and the levels the server granted.
    pub manager_levels: Vec<(u16, u16)>,
    /// Server class name, for example `QDB2/LINUXX8664`.
    pub server_class: Option<String>,
    /// Server name.
    pub server_name: Option<String>,
    /// Product release level, for example `SQL11058` or `DSN12015`.
    pub release_level: Option<String>,
}

impl ServerAttributes {
    /// Platform identified by the release level.
    #[must_use]
    pub fn platform(&self) -> ServerPlatform {
        self.release_level
            .as_deref()
            .map_or(ServerPlatform::Luw, ServerPlatform::from_release_level)
    }

    /// Level granted for a manager.
    #[must_use]
    pub fn manager_level(&self, manager: u16) -> Option<u16> {
        self.manager_levels
            .iter()
            .find(|(cp, _)| *cp == manager)
            .map(|&(_, level)| level)
    }
}

fn excsatrd_extnam(p: &mut ReplyParser, s: &mut ServerAttributes) -> Result<(), ProtocolError> {
    s.external_name = Some(read_string_scalar(p, codepoint::EXTNAM)?);
    Ok(())
}

fn excsatrd_mgrlvlls(p: &mut ReplyParser, s: &mut ServerAttributes) -> Result<(), ProtocolError> {
    let levels = read_mgrlvlls(p)?;
    for &(manager, level) in &levels {
        match manager {
            codepoint::AGENT
            | codepoint::SQLAM
            | codepoint::UNICODEMGR
            | codepoint::RDB
            | codepoint::SECMGR
            | codepoint::CMNTCPIP => {}
            other => tracing::warn!(manager = other, level, "unknown manager in MGRLVLLS"),
        }
    }
    s.manager_levels = levels;
    Ok(())
}

fn excsatrd_srvclsnm(p: &mut ReplyParser, s: &mut ServerAttributes) -> Result<(), ProtocolError> {
    s.server_class = Some(read_string_scalar(p, codepoint::SRVCLSNM)?);
    Ok(())
}

fn excsatrd_srvnam(p: &mut ReplyParser, s: &mut ServerAttributes) -> Result<(), ProtocolError> {
    s.server_name = Some(read_string_scalar(p, codepoint::SRVNAM)?);
    Ok(())
}

fn excsatrd_srvrlslv(p: &mut ReplyParser, s: &mut ServerAttributes) -> Result<(), ProtocolError> {
    s.release_level = Some(read_string_scalar(p, codepoint::SRVRLSLV)?);
    Ok(())
}

static EXCSATRD: Grammar<ServerAttributes> = Grammar {
    code_point: codepoint::EXCSATRD,
    fields: &[
        Field::optional(codepoint::EXTNAM, excsatrd_extnam),
        Field::optional(codepoint::MGRLVLLS, excsatrd_mgrlvlls),
        Field::optional(codepoint::SRVCLSNM, excsatrd_srvclsnm),
        Field::optional(codepoint::SRVNAM, excsatrd_srvnam),
        Field::optional(codepoint::SRVRLSLV, excsatrd_srvrlslv),
    ],
};

/// Read the reply to EXCSAT.
pub fn read_exchange_server_attributes(
    parser: &mut ReplyParser,
) -> Result<ServerAttributes, ProtocolError> {
    parser.start_same_id_chain_parse()?;
    if parser.peek_code_point()? != Peek::CodePoint(codepoint::EXCSATRD) {
        return Err(parse_error_reply(parser, "EXCSAT", &[codepoint::MGRLVLRM]));
    }
    let mut attributes = ServerAttributes::default();
    EXCSATRD.parse(parser, &mut attributes)?;
    parser.end_of_same_id_chain_data()?;

    tracing::debug!(
        release_level = attributes.release_level.as_deref().unwrap_or(""),
        server_class = attributes.server_class.as_deref().unwrap_or(""),
        "received server attributes"
    );
    Ok(attributes)
}

// =============================================================================
// ACCSECRD
// =============================================================================

/// Security negotiation result returned by ACCSECRD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessSecurityReply {
    /// Mechanisms the server accepts.
    pub mechanisms: Vec<u16>,
    /// Server security token.
    pub token: Option<Bytes>,
    /// Security check code.
    pub check_code: SecurityCheckCode,
}

impl Default for AccessSecurityReply {
    fn default() -> Self {
        Self {
            mechanisms: Vec::new(),
            token: None,
            check_code: SecurityCheckCode::Ok,
        }
    }
}

impl AccessSecurityReply {
    /// Check the reply accepts exactly the requested mechanism and carries
    /// everything that mechanism needs.
    ///
    /// Mechanisms that encrypt credentials with a key agreed from the server
    /// token return [`SecurityFailure::Unsupported`] once the token is present:
    /// the stack carries no Diffie-Hellman implementation to derive the key.
    pub fn validate(&self, requested: SecurityMechanism) -> Result<(), ProtocolError> {
        if self.check_code != SecurityCheckCode::Ok {
            return Err(SecurityFailure::CheckFailed(self.check_code).into());
        }
        if self.mechanisms.as_slice() != [requested.as_u16()] {
            return Err(SecurityFailure::MechanismNotAccepted {
                requested: requested.as_u16(),
                offered: self.mechanisms.clone(),
            }
            .into());
        }
        if requested.requires_token() {
            if self.token.is_none() {
                return Err(SecurityFailure::TokenRequired {
                    mechanism: requested.as_u16(),
                }
                .into());
            }
            return Err(SecurityFailure::Unsupported {
                mechanism: requested.as_u16(),
            }
            .into());
        }
        Ok(())
    }
}

fn read_secchkcd(p: &mut ReplyParser) -> Result<SecurityCheckCode, ProtocolError> {
    p.parse_length_and_match_code_point(codepoint::SECCHKCD)?;
    let code = p.read_unsigned_byte()?;
    if code > SECCHKCD_MAX {
        return Err(invalid(codepoint::SECCHKCD, code));
    }
    Ok(SecurityCheckCode::from_u8(code))
}

fn read_sectkn(p: &mut ReplyParser) -> Result<Bytes, ProtocolError> {
    p.parse_length_and_match_code_point(codepoint::SECTKN)?;
    p.read_scalar_bytes()
}

fn accsecrd_secmec(p: &mut ReplyParser, s: &mut AccessSecurityReply) -> Result<(), ProtocolError> {
    p.parse_length_and_match_code_point(codepoint::SECMEC)?;
    s.mechanisms = p.read_unsigned_short_list()?;
    Ok(())
}

fn accsecrd_sectkn(p: &mut ReplyParser, s: &mut AccessSecurityReply) -> Result<(), ProtocolError> {
    s.token = Some(read_sectkn(p)?);
    Ok(())
}

fn accsecrd_secchkcd(
    p: &mut ReplyParser,
    s: &mut AccessSecurityReply,
) -> Result<(), ProtocolError> {
    s.check_code = read_secchkcd(p)?;
    Ok(())
}

static ACCSECRD: Grammar<AccessSecurityReply> = Grammar {
    code_point: codepoint::ACCSECRD,
    fields: &[
        Field::required(codepoint::SECMEC, accsecrd_secmec),
        Field::optional(codepoint::SECTKN, accsecrd_sectkn),
        Field::optional(codepoint::SECCHKCD, accsecrd_secchkcd),
    ],
};

/// Read and validate the reply to ACCSEC.
pub fn read_access_security(
    parser: &mut ReplyParser,
    requested: SecurityMechanism,
) -> Result<AccessSecurityReply, ProtocolError> {
    parser.start_same_id_chain_parse()?;
    if parser.peek_code_point()? != Peek::CodePoint(codepoint::ACCSECRD) {
        return Err(parse_error_reply(
            parser,
            "ACCSEC",
            &[codepoint::CMDCHKRM, codepoint::RDBNFNRM, codepoint::RDBAFLRM],
        ));
    }
    let mut reply = AccessSecurityReply::default();
    ACCSECRD.parse(parser, &mut reply)?;
    parser.end_of_same_id_chain_data()?;
    reply.validate(requested)?;
    Ok(reply)
}

// =============================================================================
// SECCHKRM
// =============================================================================

/// Result of the security check returned by SECCHKRM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityCheckReply {
    /// Severity of the reply.
    pub severity: Severity,
    /// Security check code.
    pub check_code: SecurityCheckCode,
    /// Security token, inside the message or trailing it.
    pub token: Option<Bytes>,
}

impl Default for SecurityCheckReply {
    fn default() -> Self {
        Self {
            severity: Severity::Info,
            check_code: SecurityCheckCode::Ok,
            token: None,
        }
    }
}

fn secchkrm_svrcod(p: &mut ReplyParser, s: &mut SecurityCheckReply) -> Result<(), ProtocolError> {
    s.severity = read_svrcod(p, Severity::Info, Severity::Severe)?;
    Ok(())
}

fn secchkrm_secchkcd(p: &mut ReplyParser, s: &mut SecurityCheckReply) -> Result<(), ProtocolError> {
    s.check_code = read_secchkcd(p)?;
    Ok(())
}

fn secchkrm_sectkn(p: &mut ReplyParser, s: &mut SecurityCheckReply) -> Result<(), ProtocolError> {
    s.token = Some(read_sectkn(p)?);
    Ok(())
}

static SECCHKRM: Grammar<SecurityCheckReply> = Grammar {
    code_point: codepoint::SECCHKRM,
    fields: &[
        Field::required(codepoint::SVRCOD, secchkrm_svrcod),
        Field::required(codepoint::SECCHKCD, secchkrm_secchkcd),
        Field::optional(codepoint::SECTKN, secchkrm_sectkn),
    ],
};

/// Read the reply to SECCHK. A non-zero SECCHKCD is an error.
pub fn read_security_check(parser: &mut ReplyParser) -> Result<SecurityCheckReply, ProtocolError> {
    parser.start_same_id_chain_parse()?;
    if parser.peek_code_point()? != Peek::CodePoint(codepoint::SECCHKRM) {
        return Err(parse_error_reply(parser, "SECCHK", &[codepoint::CMDCHKRM]));
    }
    let mut reply = SecurityCheckReply::default();
    SECCHKRM.parse(parser, &mut reply)?;
    if parser.peek_code_point()? == Peek::CodePoint(codepoint::SECTKN) {
        reply.token = Some(read_sectkn(parser)?);
    }
    parser.end_of_same_id_chain_data()?;

    if reply.check_code != SecurityCheckCode::Ok {
        return Err(SecurityFailure::CheckFailed(reply.check_code).into());
    }
    Ok(reply)
}

// =============================================================================
// ACCRDBRM
// =============================================================================

/// Address of an alternate server in SRVLST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAddress {
    /// Host name and TCP port.
    Host {
        /// TCP port.
        port: u16,
        /// Host name.
        host: String,
    },
    /// Raw IP address.
    Ip(Bytes),
}

/// One entry of the server list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerListEntry {
    /// Relative weight of the server.
    pub priority: u16,
    /// Where the server listens.
    pub address: ServerAddress,
}

/// Database access result returned by ACCRDBRM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdbAccessData {
    /// Severity of the reply: INFO or WARNING.
    pub svrcod: Severity,
    /// Product identifier of the database server.
    pub prdid: String,
    /// Correlation token assigned by the server, replacing the client's.
    pub correlation_token: Option<Bytes>,
    /// Type definition the server uses for reply data.
    pub typdef_name: String,
    /// CCSIDs the server uses for reply data.
    pub overrides: CcsidOverrides,
    /// Interrupt token.
    pub interrupt_token: Option<Bytes>,
    /// Target-defined user ID.
    pub user_id: Option<String>,
    /// Alternate servers.
    pub server_list: Vec<ServerListEntry>,
    /// Server diagnostic text.
    pub diagnostic: Option<String>,
}

impl Default for RdbAccessData {
    fn default() -> Self {
        Self {
            svrcod: Severity::Info,
            prdid: String::new(),
            correlation_token: None,
            typdef_name: String::new(),
            overrides: CcsidOverrides::default(),
            interrupt_token: None,
            user_id: None,
            server_list: Vec::new(),
            diagnostic: None,
        }
    }
}

fn accrdbrm_svrcod(p: &mut ReplyParser, s: &mut RdbAccessData) -> Result<(), ProtocolError> {
    s.svrcod = read_svrcod(p, Severity::Info, Severity::Warning)?;
    Ok(())
}

fn accrdbrm_prdid(p: &mut ReplyParser, s: &mut RdbAccessData) -> Result<(), ProtocolError> {
    s.prdid = read_string_scalar(p, codepoint::PRDID)?;
    Ok(())
}

fn accrdbrm_typdefnam(p: &mut ReplyParser, s: &mut RdbAccessData) -> Result<(), ProtocolError> {
    s.typdef_name = read_string_scalar(p, codepoint::TYPDEFNAM)?;
    Ok(())
}

fn accrdbrm_typdefovr(p: &mut ReplyParser, s: &mut RdbAccessData) -> Result<(), ProtocolError> {
    TYPDEFOVR.parse(p, &mut s.overrides)
}

fn accrdbrm_rdbinttkn(p: &mut ReplyParser, s: &mut RdbAccessData) -> Result<(), ProtocolError> {
    p.parse_length_and_match_code_point(codepoint::RDBINTTKN)?;
    s.interrupt_token = Some(p.read_scalar_bytes()?);
    Ok(())
}

fn accrdbrm_usrid(p: &mut ReplyParser, s: &mut RdbAccessData) -> Result<(), ProtocolError> {
    s.user_id = Some(read_string_scalar(p, codepoint::USRID)?);
    Ok(())
}

fn accrdbrm_crrtkn(p: &mut ReplyParser, s: &mut RdbAccessData) -> Result<(), ProtocolError> {
    p.parse_length_and_match_code_point(codepoint::CRRTKN)?;
    s.correlation_token = Some(p.read_scalar_bytes()?);
    Ok(())
}

fn accrdbrm_srvlst(p: &mut ReplyParser, s: &mut RdbAccessData) -> Result<(), ProtocolError> {
    s.server_list = read_srvlst(p)?;
    Ok(())
}

fn accrdbrm_ipaddr(p: &mut ReplyParser, _: &mut RdbAccessData) -> Result<(), ProtocolError> {
    skip_member(p, codepoint::IPADDR)
}

fn accrdbrm_pkgdftcst(p: &mut ReplyParser, _: &mut RdbAccessData) -> Result<(), ProtocolError> {
    skip_member(p, codepoint::PKGDFTCST)
}

fn accrdbrm_srvdgn(p: &mut ReplyParser, s: &mut RdbAccessData) -> Result<(), ProtocolError> {
    s.diagnostic = Some(read_srvdgn(p)?);
    Ok(())
}

static ACCRDBRM: Grammar<RdbAccessData> = Grammar {
    code_point: codepoint::ACCRDBRM,
    fields: &[
        Field::required(codepoint::SVRCOD, accrdbrm_svrcod),
        Field::required(codepoint::PRDID, accrdbrm_prdid),
        Field::required(codepoint::TYPDEFNAM, accrdbrm_typdefnam),
        Field::required(codepoint::TYPDEFOVR, accrdbrm_typdefovr),
        Field::optional(codepoint::RDBINTTKN, accrdbrm_rdbinttkn),
        Field::optional(codepoint::USRID, accrdbrm_usrid),
        Field::optional(codepoint::CRRTKN, accrdbrm_crrtkn),
        Field::optional(codepoint::SRVLST, accrdbrm_srvlst),
        Field::optional(codepoint::IPADDR, accrdbrm_ipaddr),
        Field::optional(codepoint::PKGDFTCST, accrdbrm_pkgdftcst),
        Field::optional(codepoint::SRVDGN, accrdbrm_srvdgn),
    ],
};

// TYPDEFOVR

fn read_ccsid(p: &mut ReplyParser, code_point: u16) -> Result<Option<u16>, ProtocolError> {
    p.parse_length_and_match_code_point(code_point)?;
    Ok(Some(p.read_unsigned_short()?))
}

fn typdefovr_sbc(p: &mut ReplyParser, s: &mut CcsidOverrides) -> Result<(), ProtocolError> {
    s.sbc = read_ccsid(p, codepoint::CCSIDSBC)?;
    Ok(())
}

fn typdefovr_dbc(p: &mut ReplyParser, s: &mut CcsidOverrides) -> Result<(), ProtocolError> {
    s.dbc = read_ccsid(p, codepoint::CCSIDDBC)?;
    Ok(())
}

fn typdefovr_mbc(p: &mut ReplyParser, s: &mut CcsidOverrides) -> Result<(), ProtocolError> {
    s.mbc = read_ccsid(p, codepoint::CCSIDMBC)?;
    Ok(())
}

fn typdefovr_xml(p: &mut ReplyParser, s: &mut CcsidOverrides) -> Result<(), ProtocolError> {
    s.xml = read_ccsid(p, codepoint::CCSIDXML)?;
    Ok(())
}

static TYPDEFOVR: Grammar<CcsidOverrides> = Grammar {
    code_point: codepoint::TYPDEFOVR,
    fields: &[
        Field::optional(codepoint::CCSIDSBC, typdefovr_sbc),
        Field::optional(codepoint::CCSIDDBC, typdefovr_dbc),
        Field::optional(codepoint::CCSIDMBC, typdefovr_mbc),
        Field::optional(codepoint::CCSIDXML, typdefovr_xml),
    ],
};

/// Consume TYPDEFNAM and TYPDEFOVR reply data into `typdef`, returning the
/// first object that is neither.
pub fn parse_typdefs(parser: &mut ReplyParser, typdef: &mut Typdef) -> Result<Peek, ProtocolError> {
    loop {
        match parser.peek_code_point()? {
            Peek::CodePoint(codepoint::TYPDEFNAM) => {
                typdef.set_name(read_string_scalar(parser, codepoint::TYPDEFNAM)?);
            }
            Peek::CodePoint(codepoint::TYPDEFOVR) => {
                let mut overrides = CcsidOverrides::default();
                TYPDEFOVR.parse(parser, &mut overrides)?;
                typdef.apply_overrides(overrides);
                parser.set_typdef(typdef);
            }
            other => return Ok(other),
        }
    }
}

// SRVLST

fn read_srvlst(p: &mut ReplyParser) -> Result<Vec<ServerListEntry>, ProtocolError> {
    struct ServerList {
        count: u16,
        entries: Vec<ServerListEntry>,
    }

    fn srvlstcnt(p: &mut ReplyParser, s: &mut ServerList) -> Result<(), ProtocolError> {
        p.parse_length_and_match_code_point(codepoint::SRVLSTCNT)?;
        s.count = p.read_unsigned_short()?;
        Ok(())
    }

    fn srvlsrv(p: &mut ReplyParser, s: &mut ServerList) -> Result<(), ProtocolError> {
        p.parse_length_and_match_code_point(codepoint::SRVLSRV)?;
        p.push_length_on_collection_stack();
        while let Peek::CodePoint(cp) = p.peek_code_point()? {
            if cp != codepoint::SRVPRTY {
                return Err(ProtocolError::UnexpectedCodePoint {
                    context: "SRVLSRV",
                    code_point: cp,
                });
            }
            p.parse_length_and_match_code_point(codepoint::SRVPRTY)?;
            let priority = p.read_unsigned_short()?;
            let address = match p.peek_code_point()? {
                Peek::CodePoint(codepoint::TCPPORTHOST) => {
                    p.parse_length_and_match_code_point(codepoint::TCPPORTHOST)?;
                    let port = p.read_unsigned_short()?;
                    let host = p.read_string()?;
                    ServerAddress::Host { port, host }
                }
                Peek::CodePoint(codepoint::IPADDR) => {
                    p.parse_length_and_match_code_point(codepoint::IPADDR)?;
                    ServerAddress::Ip(p.read_scalar_bytes()?)
                }
                Peek::CodePoint(other) => {
                    return Err(ProtocolError::UnexpectedCodePoint {
                        context: "SRVLSRV",
                        code_point: other,
                    });
                }
                end => {
                    return Err(ProtocolError::framing(
                        SyntaxErrorCode::ReqObjNotFound,
                        format!("server address missing from SRVLSRV at {end:?}"),
                    ));
                }
            };
            s.entries.push(ServerListEntry { priority, address });
        }
        p.pop_collection_stack()
    }

    static SRVLST: Grammar<ServerList> = Grammar {
        code_point: codepoint::SRVLST,
        fields: &[
            Field::required(codepoint::SRVLSTCNT, srvlstcnt),
            Field::required(codepoint::SRVLSRV, srvlsrv),
        ],
    };

    let mut list = ServerList {
        count: 0,
        entries: Vec::new(),
    };
    SRVLST.parse(p, &mut list)?;
    if usize::from(list.count) != list.entries.len() {
        tracing::debug!(
            declared = list.count,
            received = list.entries.len(),
            "server list count mismatch"
        );
    }
    Ok(list.entries)
}

// PBSD

/// Session data piggy-backed on a reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PbsdData {
    /// Isolation level now in effect.
    pub isolation: Option<u8>,
    /// Current schema.
    pub schema: Option<String>,
}

fn pbsd_iso(p: &mut ReplyParser, s: &mut PbsdData) -> Result<(), ProtocolError> {
    p.parse_length_and_match_code_point(codepoint::PBSD_ISO)?;
    s.isolation = Some(p.read_unsigned_byte()?);
    Ok(())
}

fn pbsd_schema(p: &mut ReplyParser, s: &mut PbsdData) -> Result<(), ProtocolError> {
    p.parse_length_and_match_code_point(codepoint::PBSD_SCHEMA)?;
    let length = p.scalar_length();
    s.schema = Some(p.read_string_with(length, Ccsid::Utf8)?);
    Ok(())
}

static PBSD: Grammar<PbsdData> = Grammar {
    code_point: codepoint::PBSD,
    fields: &[
        Field::optional(codepoint::PBSD_ISO, pbsd_iso),
        Field::optional(codepoint::PBSD_SCHEMA, pbsd_schema),
    ],
};

/// Parse a PBSD object when it is next.
pub fn parse_pbsd(parser: &mut ReplyParser) -> Result<Option<PbsdData>, ProtocolError> {
    if parser.peek_code_point()? != Peek::CodePoint(codepoint::PBSD) {
        return Ok(None);
    }
    let mut data = PbsdData::default();
    PBSD.parse(parser, &mut data)?;
    Ok(Some(data))
}

/// Everything returned for ACCRDB.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessRdbReply {
    /// The ACCRDBRM content.
    pub access: RdbAccessData,
    /// Initial session data.
    pub session: Option<PbsdData>,
    /// SQLCA following the reply message.
    pub sqlca: Option<NetSqlca>,
}

/// Read the reply to ACCRDB.
///
/// The server's TYPDEFNAM and TYPDEFOVR are applied to `typdef` and to the
/// parser for the rest of the reply. A negative SQLCODE in a trailing
/// SQLCARD fails the access even when ACCRDBRM reported success.
pub fn read_access_database(
    parser: &mut ReplyParser,
    typdef: &mut Typdef,
) -> Result<AccessRdbReply, ProtocolError> {
    parser.start_same_id_chain_parse()?;
    if parser.peek_code_point()? != Peek::CodePoint(codepoint::ACCRDBRM) {
        return Err(parse_error_reply(
            parser,
            "ACCRDB",
            &[
                codepoint::RDBNACRM,
                codepoint::RDBNFNRM,
                codepoint::RDBAFLRM,
                codepoint::CMDCHKRM,
                codepoint::MGRLVLRM,
            ],
        ));
    }

    let mut access = RdbAccessData::default();
    ACCRDBRM.parse(parser, &mut access)?;
    typdef.set_name(access.typdef_name.clone());
    typdef.apply_overrides(access.overrides);
    parser.set_typdef(typdef);

    let session = parse_pbsd(parser)?;
    let sqlca = match parse_typdefs(parser, typdef)? {
        Peek::CodePoint(codepoint::SQLCARD) => parse_sqlcard(parser)?,
        _ => None,
    };
    parser.end_of_same_id_chain_data()?;

    sqlca::complete(sqlca.as_ref())?;
    tracing::debug!(
        svrcod = %access.svrcod,
        prdid = %access.prdid,
        typdef = %access.typdef_name,
        "database accessed"
    );
    Ok(AccessRdbReply {
        access,
        session,
        sqlca,
    })
}

// =============================================================================
// ENDUOWRM
// =============================================================================

/// How a unit of work ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UowDisposition {
    /// Committed.
    Committed,
    /// Rolled back.
    RolledBack,
}

/// Result of RDBCMM or RDBRLLBCK.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitResult {
    /// How the unit of work ended.
    pub disposition: UowDisposition,
    /// Database named in the reply.
    pub rdb_name: Option<String>,
    /// Release conversation indicator.
    pub release_conversation: Option<u8>,
    /// SQLCA following the reply message.
    pub sqlca: Option<NetSqlca>,
}

#[derive(Default)]
struct EndUow {
    disposition: Option<UowDisposition>,
    rdb_name: Option<String>,
    release_conversation: Option<u8>,
}

fn enduowrm_svrcod(p: &mut ReplyParser, _: &mut EndUow) -> Result<(), ProtocolError> {
    read_svrcod(p, Severity::Warning, Severity::Warning).map(|_| ())
}

fn enduowrm_uowdsp(p: &mut ReplyParser, s: &mut EndUow) -> Result<(), ProtocolError> {
    p.parse_length_and_match_code_point(codepoint::UOWDSP)?;
    s.disposition = Some(match p.read_unsigned_byte()? {
        codepoint::UOWDSP_COMMIT => UowDisposition::Committed,
        codepoint::UOWDSP_ROLLBACK => UowDisposition::RolledBack,
        other => return Err(invalid(codepoint::UOWDSP, other)),
    });
    Ok(())
}

fn enduowrm_rdbnam(p: &mut ReplyParser, s: &mut EndUow) -> Result<(), ProtocolError> {
    s.rdb_name = Some(read_rdbnam(p)?);
    Ok(())
}

fn enduowrm_rlsconv(p: &mut ReplyParser, s: &mut EndUow) -> Result<(), ProtocolError> {
    p.parse_length_and_match_code_point(codepoint::RLSCONV)?;
    s.release_conversation = Some(p.read_unsigned_byte()?);
    Ok(())
}

static ENDUOWRM: Grammar<EndUow> = Grammar {
    code_point: codepoint::ENDUOWRM,
    fields: &[
        Field::required(codepoint::SVRCOD, enduowrm_svrcod),
        Field::required(codepoint::UOWDSP, enduowrm_uowdsp),
        Field::optional(codepoint::RDBNAM, enduowrm_rdbnam),
        Field::optional(codepoint::RLSCONV, enduowrm_rlsconv),
    ],
};

/// Replies a commit or rollback may be answered with instead of, or after,
/// ENDUOWRM.
fn commit_error(parser: &mut ReplyParser) -> ProtocolError {
    parse_error_reply(
        parser,
        "RDBCMM",
        &[codepoint::ABNUOWRM, codepoint::CMDCHKRM, codepoint::RDBNACRM],
    )
}

/// Read the reply to RDBCMM or RDBRLLBCK.
pub fn read_end_unit_of_work(
    parser: &mut ReplyParser,
    typdef: &mut Typdef,
) -> Result<CommitResult, ProtocolError> {
    parser.start_same_id_chain_parse()?;
    if parse_typdefs(parser, typdef)? != Peek::CodePoint(codepoint::ENDUOWRM) {
        return Err(commit_error(parser));
    }
    let mut end = EndUow::default();
    ENDUOWRM.parse(parser, &mut end)?;

    let sqlca = match parse_typdefs(parser, typdef)? {
        Peek::CodePoint(codepoint::SQLCARD) => parse_sqlcard(parser)?,
        Peek::CodePoint(_) => return Err(commit_error(parser)),
        _ => None,
    };
    parser.end_of_same_id_chain_data()?;
    sqlca::complete(sqlca.as_ref())?;

    let disposition = end.disposition.ok_or_else(|| {
        ProtocolError::framing(
            SyntaxErrorCode::ReqObjNotFound,
            "UOWDSP missing from ENDUOWRM",
        )
    })?;
    Ok(CommitResult {
        disposition,
        rdb_name: end.rdb_name,
        release_conversation: end.release_conversation,
        sqlca,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn object(code_point: u16, content: &[u8]) -> Vec<u8> {
        let mut out = ((content.len() + 4) as u16).to_be_bytes().to_vec();
        out.extend_from_slice(&code_point.to_be_bytes());
        out.extend_from_slice(content);
        out
    }

    fn reply(objects: &[Vec<u8>], typdef: &Typdef) -> ReplyParser {
        let payload = objects.concat();
        let mut out = ((payload.len() + 6) as u16).to_be_bytes().to_vec();
        out.extend_from_slice(&[0xD0, 0x02, 0x00, 0x01]);
        out.extend_from_slice(&payload);
        ReplyParser::new(Bytes::from(out), typdef)
    }

    fn excsatrd(release: &str) -> Vec<u8> {
        let mut levels = Vec::new();
        for (cp, level) in [(codepoint::AGENT, 10u16), (codepoint::SQLAM, 7)] {
            levels.extend_from_slice(&cp.to_be_bytes());
            levels.extend_from_slice(&level.to_be_bytes());
        }
        let members = [
            object(codepoint::SRVRLSLV, release.as_bytes()),
            object(codepoint::MGRLVLLS, &levels),
            object(codepoint::SRVCLSNM, b"QDB2/LINUXX8664"),
        ]
        .concat();
        object(codepoint::EXCSATRD, &members)
    }

    #[test]
    fn test_server_attributes() {
        let typdef = Typdef::luw();
        let mut parser = reply(&[excsatrd("SQL11058")], &typdef);
        let attributes = read_exchange_server_attributes(&mut parser).unwrap();
        assert_eq!(attributes.release_level.as_deref(), Some("SQL11058"));
        assert_eq!(attributes.platform(), ServerPlatform::Luw);
        assert_eq!(attributes.manager_level(codepoint::SQLAM), Some(7));
        assert_eq!(attributes.manager_level(codepoint::RDB), None);
    }

    #[test]
    fn test_zos_release_level() {
        let attributes = ServerAttributes {
            release_level: Some("DSN12015".into()),
            ..ServerAttributes::default()
        };
        assert_eq!(attributes.platform(), ServerPlatform::Zos);
    }

    #[test]
    fn test_mgrlvlls_length_must_be_multiple_of_four() {
        let members = object(codepoint::MGRLVLLS, &[0x14, 0x03, 0x00]);
        let typdef = Typdef::luw();
        let mut parser = reply(&[object(codepoint::EXCSATRD, &members)], &typdef);
        let err = read_exchange_server_attributes(&mut parser).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Framing {
                code: SyntaxErrorCode::ObjLenNotAllowed,
                ..
            }
        ));
    }

    fn accsecrd(mechanisms: &[u16], token: Option<&[u8]>) -> Vec<u8> {
        let list: Vec<u8> = mechanisms.iter().flat_map(|m| m.to_be_bytes()).collect();
        let mut members = object(codepoint::SECMEC, &list);
        if let Some(token) = token {
            members.extend(object(codepoint::SECTKN, token));
        }
        object(codepoint::ACCSECRD, &members)
    }

    #[test]
    fn test_access_security_accepted() {
        let typdef = Typdef::luw();
        let mut parser = reply(&[accsecrd(&[3], None)], &typdef);
        let reply = read_access_security(&mut parser, SecurityMechanism::UserIdPassword).unwrap();
        assert_eq!(reply.mechanisms, vec![3]);
    }

    #[test]
    fn test_access_security_mechanism_mismatch() {
        let typdef = Typdef::luw();
        let mut parser = reply(&[accsecrd(&[9, 3], None)], &typdef);
        let err = read_access_security(&mut parser, SecurityMechanism::UserIdPassword).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Security(SecurityFailure::MechanismNotAccepted { requested: 3, .. })
        ));
    }

    #[test]
    fn test_access_security_token_required() {
        let reply = AccessSecurityReply {
            mechanisms: vec![9],
            ..AccessSecurityReply::default()
        };
        let err = reply
            .validate(SecurityMechanism::EncryptedUserIdPassword)
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Security(SecurityFailure::TokenRequired { mechanism: 9 })
        ));
    }

    #[test]
    fn test_access_security_check_code() {
        let reply = AccessSecurityReply {
            mechanisms: vec![3],
            check_code: SecurityCheckCode::MechanismNotSupported,
            ..AccessSecurityReply::default()
        };
        assert!(reply.validate(SecurityMechanism::UserIdPassword).is_err());
    }

    fn secchkrm(secchkcd: u8) -> Vec<u8> {
        let members = [
            object(codepoint::SECCHKCD, &[secchkcd]),
            object(codepoint::SVRCOD, &[0x00, if secchkcd == 0 { 0 } else { 8 }]),
        ]
        .concat();
        object(codepoint::SECCHKRM, &members)
    }

    #[test]
    fn test_security_check() {
        let typdef = Typdef::luw();
        let mut parser = reply(&[secchkrm(0)], &typdef);
        assert_eq!(
            read_security_check(&mut parser).unwrap().check_code,
            SecurityCheckCode::Ok
        );

        let mut parser = reply(&[secchkrm(0x0F)], &typdef);
        let err = read_security_check(&mut parser).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Security(SecurityFailure::CheckFailed(
                SecurityCheckCode::PasswordInvalid
            ))
        ));
    }

    #[test]
    fn test_security_check_code_out_of_range() {
        let typdef = Typdef::luw();
        let mut parser = reply(&[secchkrm(0x16)], &typdef);
        assert!(matches!(
            read_security_check(&mut parser).unwrap_err(),
            ProtocolError::InvalidValue {
                code_point: codepoint::SECCHKCD,
                value: 0x16,
            }
        ));
    }

    fn typdefovr(ccsid: u16) -> Vec<u8> {
        let members = [
            object(codepoint::CCSIDSBC, &ccsid.to_be_bytes()),
            object(codepoint::CCSIDDBC, &1200u16.to_be_bytes()),
            object(codepoint::CCSIDMBC, &ccsid.to_be_bytes()),
        ]
        .concat();
        object(codepoint::TYPDEFOVR, &members)
    }

    fn accrdbrm(svrcod: u16, crrtkn: Option<&[u8]>) -> Vec<u8> {
        let mut members = [
            object(codepoint::SVRCOD, &svrcod.to_be_bytes()),
            object(codepoint::PRDID, b"SQL11058"),
            object(codepoint::TYPDEFNAM, b"QTDSQLX86"),
            typdefovr(1208),
        ]
        .concat();
        if let Some(token) = crrtkn {
            members.extend(object(codepoint::CRRTKN, token));
        }
        object(codepoint::ACCRDBRM, &members)
    }

    fn sqlcard(code: i32, state: &str) -> Vec<u8> {
        let mut content = vec![0x00];
        content.extend_from_slice(&code.to_le_bytes());
        content.extend_from_slice(state.as_bytes());
        content.extend_from_slice(b"SQLRI01F");
        content.extend_from_slice(&[0xFF, 0xFF]);
        object(codepoint::SQLCARD, &content)
    }

    #[test]
    fn test_access_database() {
        let mut typdef = Typdef::luw();
        let mut parser = reply(&[accrdbrm(0, Some(b"NEWTOKEN"))], &typdef);
        let reply = read_access_database(&mut parser, &mut typdef).unwrap();
        assert_eq!(reply.access.svrcod, Severity::Info);
        assert_eq!(reply.access.prdid, "SQL11058");
        assert_eq!(
            reply.access.correlation_token.as_deref(),
            Some(&b"NEWTOKEN"[..])
        );
        assert_eq!(typdef.name(), Some("QTDSQLX86"));
        assert_eq!(typdef.overrides().sbc, Some(1208));
    }

    #[test]
    fn test_access_database_with_pbsd_and_sqlcard() {
        let pbsd = object(
            codepoint::PBSD,
            &[
                object(codepoint::PBSD_ISO, &[0x02]),
                object(codepoint::PBSD_SCHEMA, b"DB2INST1"),
            ]
            .concat(),
        );
        let mut typdef = Typdef::luw();
        let mut parser = reply(&[accrdbrm(4, None), pbsd, sqlcard(0, "00000")], &typdef);
        let reply = read_access_database(&mut parser, &mut typdef).unwrap();
        assert_eq!(reply.access.svrcod, Severity::Warning);
        let session = reply.session.unwrap();
        assert_eq!(session.isolation, Some(2));
        assert_eq!(session.schema.as_deref(), Some("DB2INST1"));
        assert_eq!(reply.sqlca.unwrap().code(), 0);
    }

    #[test]
    fn test_access_database_negative_sqlcode() {
        let mut typdef = Typdef::luw();
        let mut parser = reply(&[accrdbrm(4, None), sqlcard(-30082, "08001")], &typdef);
        let err = read_access_database(&mut parser, &mut typdef).unwrap_err();
        let sqlca = err.sqlca().unwrap();
        assert_eq!(sqlca.code(), -30082);
        assert_eq!(sqlca.state(), "08001");
    }

    #[test]
    fn test_access_database_rejects_error_svrcod() {
        let mut typdef = Typdef::luw();
        let mut parser = reply(&[accrdbrm(8, None)], &typdef);
        assert!(matches!(
            read_access_database(&mut parser, &mut typdef).unwrap_err(),
            ProtocolError::InvalidValue {
                code_point: codepoint::SVRCOD,
                ..
            }
        ));
    }

    #[test]
    fn test_access_database_missing_typdefovr() {
        let members = [
            object(codepoint::SVRCOD, &[0, 0]),
            object(codepoint::PRDID, b"SQL11058"),
            object(codepoint::TYPDEFNAM, b"QTDSQLX86"),
        ]
        .concat();
        let mut typdef = Typdef::luw();
        let mut parser = reply(&[object(codepoint::ACCRDBRM, &members)], &typdef);
        assert!(matches!(
            read_access_database(&mut parser, &mut typdef).unwrap_err(),
            ProtocolError::Framing {
                code: SyntaxErrorCode::ReqObjNotFound,
                ..
            }
        ));
    }

    #[test]
    fn test_server_list() {
        let mut tcp = 50001u16.to_be_bytes().to_vec();
        tcp.extend_from_slice(b"db2b.example.com");
        let srvlsrv = [
            object(codepoint::SRVPRTY, &[0x00, 0x40]),
            object(codepoint::TCPPORTHOST, &tcp),
            object(codepoint::SRVPRTY, &[0x00, 0x20]),
            object(codepoint::IPADDR, &[10, 0, 0, 7]),
        ]
        .concat();
        let srvlst = object(
            codepoint::SRVLST,
            &[
                object(codepoint::SRVLSTCNT, &[0x00, 0x02]),
                object(codepoint::SRVLSRV, &srvlsrv),
            ]
            .concat(),
        );
        let members = [
            object(codepoint::SVRCOD, &[0, 0]),
            object(codepoint::PRDID, b"SQL11058"),
            object(codepoint::TYPDEFNAM, b"QTDSQLX86"),
            typdefovr(1208),
            srvlst,
        ]
        .concat();
        let mut typdef = Typdef::luw();
        let mut parser = reply(&[object(codepoint::ACCRDBRM, &members)], &typdef);
        let reply = read_access_database(&mut parser, &mut typdef).unwrap();
        let list = reply.access.server_list;
        assert_eq!(list.len(), 2);
        assert_eq!(
            list[0].address,
            ServerAddress::Host {
                port: 50001,
                host: "db2b.example.com".into()
            }
        );
        assert_eq!(list[1].priority, 0x20);
    }

    fn enduowrm(uowdsp: u8) -> Vec<u8> {
        let members = [
            object(codepoint::SVRCOD, &[0x00, 0x04]),
            object(codepoint::UOWDSP, &[uowdsp]),
        ]
        .concat();
        object(codepoint::ENDUOWRM, &members)
    }

    #[test]
    fn test_commit_reply() {
        let mut typdef = Typdef::luw();
        let mut parser = reply(&[enduowrm(1), sqlcard(0, "00000")], &typdef);
        let result = read_end_unit_of_work(&mut parser, &mut typdef).unwrap();
        assert_eq!(result.disposition, UowDisposition::Committed);

        let mut parser = reply(&[enduowrm(2), sqlcard(0, "00000")], &typdef);
        let result = read_end_unit_of_work(&mut parser, &mut typdef).unwrap();
        assert_eq!(result.disposition, UowDisposition::RolledBack);
    }

    #[test]
    fn test_commit_invalid_disposition() {
        let mut typdef = Typdef::luw();
        let mut parser = reply(&[enduowrm(3)], &typdef);
        assert!(read_end_unit_of_work(&mut parser, &mut typdef).is_err());
    }

    #[test]
    fn test_commit_abnormal_end() {
        let members = object(codepoint::SVRCOD, &[0x00, 0x08]);
        let mut typdef = Typdef::luw();
        let mut parser = reply(
            &[object(codepoint::ABNUOWRM, &members), sqlcard(-911, "40001")],
            &typdef,
        );
        let err = read_end_unit_of_work(&mut parser, &mut typdef).unwrap_err();
        match err {
            ProtocolError::Server(server) => {
                assert_eq!(server.code_point, codepoint::ABNUOWRM);
                assert_eq!(server.sqlca.unwrap().code(), -911);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_commit_answered_by_rdbnacrm() {
        let members = [
            object(codepoint::SVRCOD, &[0x00, 0x08]),
            object(codepoint::RDBNAM, b"SAMPLE            "),
        ]
        .concat();
        let mut typdef = Typdef::luw();
        let mut parser = reply(&[object(codepoint::RDBNACRM, &members)], &typdef);
        match read_end_unit_of_work(&mut parser, &mut typdef).unwrap_err() {
            ProtocolError::Server(server) => {
                assert_eq!(server.code_point, codepoint::RDBNACRM);
                assert_eq!(server.severity, Severity::Error);
                assert_eq!(server.rdb_name.as_deref(), Some("SAMPLE"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_commit_error_after_enduowrm() {
        let members = object(codepoint::SVRCOD, &[0x00, 0x08]);
        let mut typdef = Typdef::luw();
        let mut parser = reply(
            &[enduowrm(1), object(codepoint::CMDCHKRM, &members)],
            &typdef,
        );
        match read_end_unit_of_work(&mut parser, &mut typdef).unwrap_err() {
            ProtocolError::Server(server) => {
                assert_eq!(server.code_point, codepoint::CMDCHKRM);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_commit_reply_without_uowdsp() {
        let members = object(codepoint::SVRCOD, &[0x00, 0x04]);
        let mut typdef = Typdef::luw();
        let mut parser = reply(&[object(codepoint::ENDUOWRM, &members)], &typdef);
        assert!(matches!(
            read_end_unit_of_work(&mut parser, &mut typdef),
            Err(ProtocolError::Framing {
                code: SyntaxErrorCode::ReqObjNotFound,
                ..
            })
        ));
    }

    #[test]
    fn test_commit_unexpected_reply() {
        let members = object(codepoint::SVRCOD, &[0x00, 0x04]);
        let mut typdef = Typdef::luw();
        let mut parser = reply(&[object(codepoint::ACCRDBRM, &members)], &typdef);
        assert!(matches!(
            read_end_unit_of_work(&mut parser, &mut typdef),
            Err(ProtocolError::UnexpectedCodePoint {
                context: "RDBCMM",
                code_point: codepoint::ACCRDBRM,
            })
        ));
    }
}
