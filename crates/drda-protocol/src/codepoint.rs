//! DDM code points.
//!
//! Every DDM object on the wire is tagged with a 16-bit code point. Commands,
//! reply messages, reply data objects and their parameters all share one
//! namespace.

// Commands
/// Exchange server attributes.
pub const EXCSAT: u16 = 0x1041;
/// Sync point control request.
pub const SYNCCTL: u16 = 0x1055;
/// Resynchronization request.
pub const SYNCRSY: u16 = 0x1069;
/// Access security.
pub const ACCSEC: u16 = 0x106D;
/// Security check.
pub const SECCHK: u16 = 0x106E;
/// Access relational database.
pub const ACCRDB: u16 = 0x2001;
/// Close query.
pub const CLSQRY: u16 = 0x2005;
/// Continue query.
pub const CNTQRY: u16 = 0x2006;
/// Describe SQL statement.
pub const DSCSQLSTT: u16 = 0x2008;
/// Execute immediate SQL statement.
pub const EXCSQLIMM: u16 = 0x200A;
/// Execute SQL statement.
pub const EXCSQLSTT: u16 = 0x200B;
/// Open query.
pub const OPNQRY: u16 = 0x200C;
/// Prepare SQL statement.
pub const PRPSQLSTT: u16 = 0x200D;
/// Commit unit of work.
pub const RDBCMM: u16 = 0x200E;
/// Roll back unit of work.
pub const RDBRLLBCK: u16 = 0x200F;
/// Set SQL environment.
pub const EXCSQLSET: u16 = 0x2014;

// Reply data objects
/// Server attributes reply data.
pub const EXCSATRD: u16 = 0x1443;
/// Access security reply data.
pub const ACCSECRD: u16 = 0x14AC;
/// SQL communications area reply data.
pub const SQLCARD: u16 = 0x2408;
/// SQL descriptor area reply data.
pub const SQLDARD: u16 = 0x2411;
/// SQL program variable data.
pub const SQLDTA: u16 = 0x2412;
/// SQL data reply data.
pub const SQLDTARD: u16 = 0x2413;
/// SQL statement.
pub const SQLSTT: u16 = 0x2414;
/// Query answer set description.
pub const QRYDSC: u16 = 0x241A;
/// Query answer set data.
pub const QRYDTA: u16 = 0x241B;
/// Externalized data.
pub const EXTDTA: u16 = 0x146C;

// Reply messages
/// Command check.
pub const CMDCHKRM: u16 = 0x1254;
/// Command not supported.
pub const CMDNSPRM: u16 = 0x1250;
/// Object not supported.
pub const OBJNSPRM: u16 = 0x1253;
/// Manager level conflict.
pub const MGRLVLRM: u16 = 0x1210;
/// Conversational protocol error.
pub const PRCCNVRM: u16 = 0x1245;
/// Security check reply.
pub const SECCHKRM: u16 = 0x1219;
/// Data stream syntax error.
pub const SYNTAXRM: u16 = 0x124C;
/// Parameter value not supported.
pub const VALNSPRM: u16 = 0x1252;
/// Access to RDB completed.
pub const ACCRDBRM: u16 = 0x2201;
/// Query not open.
pub const QRYNOPRM: u16 = 0x2202;
/// RDB not accessed.
pub const RDBNACRM: u16 = 0x2204;
/// Open query complete.
pub const OPNQRYRM: u16 = 0x2205;
/// RDB currently accessed.
pub const RDBACCRM: u16 = 0x2207;
/// End of query.
pub const ENDQRYRM: u16 = 0x220B;
/// End unit of work condition.
pub const ENDUOWRM: u16 = 0x220C;
/// Abnormal end unit of work condition.
pub const ABNUOWRM: u16 = 0x220D;
/// Data descriptor mismatch.
pub const DTAMCHRM: u16 = 0x220E;
/// Query previously opened.
pub const QRYPOPRM: u16 = 0x220F;
/// RDB not found.
pub const RDBNFNRM: u16 = 0x2211;
/// Open query failure.
pub const OPNQFLRM: u16 = 0x2212;
/// SQL error condition.
pub const SQLERRRM: u16 = 0x2213;
/// RDB update reply message.
pub const RDBUPDRM: u16 = 0x2218;
/// Result set reply message.
pub const RSLSETRM: u16 = 0x2219;
/// RDB access failed.
pub const RDBAFLRM: u16 = 0x221A;
/// Not authorized to RDB.
pub const RDBATHRM: u16 = 0x22CB;

// Parameters
/// Code point (used by error replies to name the offending object).
pub const CODPNT: u16 = 0x000C;
/// Data type definition name.
pub const TYPDEFNAM: u16 = 0x002F;
/// Data type definition override.
pub const TYPDEFOVR: u16 = 0x0035;
/// Product-specific identifier.
pub const PRDID: u16 = 0x112E;
/// Conversational protocol error code.
pub const PRCCNVCD: u16 = 0x113F;
/// Server class name.
pub const SRVCLSNM: u16 = 0x1147;
/// Severity code.
pub const SVRCOD: u16 = 0x1149;
/// Syntax error code.
pub const SYNERRCD: u16 = 0x114A;
/// Server diagnostic information.
pub const SRVDGN: u16 = 0x1153;
/// Server product release level.
pub const SRVRLSLV: u16 = 0x115A;
/// External name.
pub const EXTNAM: u16 = 0x115E;
/// Server name.
pub const SRVNAM: u16 = 0x116D;
/// CCSID for single-byte characters.
pub const CCSIDSBC: u16 = 0x119C;
/// CCSID for double-byte characters.
pub const CCSIDDBC: u16 = 0x119D;
/// CCSID for mixed-byte characters.
pub const CCSIDMBC: u16 = 0x119E;
/// Release conversation.
pub const RLSCONV: u16 = 0x119F;
/// User ID.
pub const USRID: u16 = 0x11A0;
/// Password.
pub const PASSWORD: u16 = 0x11A1;
/// Security mechanism.
pub const SECMEC: u16 = 0x11A2;
/// Security check code.
pub const SECCHKCD: u16 = 0x11A4;
/// Security token.
pub const SECTKN: u16 = 0x11DC;
/// IP address.
pub const IPADDR: u16 = 0x11E8;
/// TCP/IP port and host name.
pub const TCPPORTHOST: u16 = 0x11E9;
/// CCSID for XML data.
pub const CCSIDXML: u16 = 0x1913;
/// Manager-level list.
pub const MGRLVLLS: u16 = 0x1404;
/// RDB interrupt token.
pub const RDBINTTKN: u16 = 0x2103;
/// Product-specific data.
pub const PRDDTA: u16 = 0x2104;
/// RDB commit allowed.
pub const RDBCMTOK: u16 = 0x2105;
/// Package section number.
pub const PKGSN: u16 = 0x210C;
/// RDB access manager class.
pub const RDBACCCL: u16 = 0x210F;
/// Relational database name.
pub const RDBNAM: u16 = 0x2110;
/// Package name, consistency token and section number.
pub const PKGNAMCSN: u16 = 0x2113;
/// Query block size.
pub const QRYBLKSZ: u16 = 0x2114;
/// Unit of work disposition.
pub const UOWDSP: u16 = 0x2115;
/// RDB allow updates.
pub const RDBALWUPD: u16 = 0x211A;
/// Correlation token.
pub const CRRTKN: u16 = 0x2135;
/// Package default character subtype.
pub const PKGDFTCST: u16 = 0x2125;
/// Server priority.
pub const SRVPRTY: u16 = 0x243E;
/// Server list count.
pub const SRVLSTCNT: u16 = 0x244C;
/// Server list entry.
pub const SRVLSRV: u16 = 0x244D;
/// Server list.
pub const SRVLST: u16 = 0x244E;

// Managers
/// Agent.
pub const AGENT: u16 = 0x1403;
/// Security manager.
pub const SECMGR: u16 = 0x1440;
/// LU 6.2 conversational communications manager.
pub const CMNAPPC: u16 = 0x1444;
/// TCP/IP communications manager.
pub const CMNTCPIP: u16 = 0x1474;
/// Sync point manager.
pub const SYNCPTMGR: u16 = 0x14C0;
/// Resynchronization manager.
pub const RSYNCMGR: u16 = 0x14C1;
/// XA manager.
pub const XAMGR: u16 = 0x1C01;
/// Unicode manager.
pub const UNICODEMGR: u16 = 0x1C08;
/// SQL application manager.
pub const SQLAM: u16 = 0x2407;
/// Relational database.
pub const RDB: u16 = 0x240F;

// Piggy-backed session data
/// Piggy-backed session data block.
pub const PBSD: u16 = 0xC000;
/// Piggy-backed isolation level.
pub const PBSD_ISO: u16 = 0xC001;
/// Piggy-backed current schema.
pub const PBSD_SCHEMA: u16 = 0xC002;

// Enumerated values
/// DDM boolean true.
pub const TRUE: u8 = 0xF1;
/// DDM boolean false.
pub const FALSE: u8 = 0xF0;
/// UOWDSP: unit of work committed.
pub const UOWDSP_COMMIT: u8 = 0x01;
/// UOWDSP: unit of work rolled back.
pub const UOWDSP_ROLLBACK: u8 = 0x02;
/// FDOCA null indicator.
pub const NULLDATA: u8 = 0xFF;

/// Human-readable name of a code point, for logs and error messages.
#[must_use]
pub fn name(code_point: u16) -> &'static str {
    match code_point {
        EXCSAT => "EXCSAT",
        ACCSEC => "ACCSEC",
        SECCHK => "SECCHK",
        ACCRDB => "ACCRDB",
        RDBCMM => "RDBCMM",
        RDBRLLBCK => "RDBRLLBCK",
        EXCSATRD => "EXCSATRD",
        ACCSECRD => "ACCSECRD",
        SQLCARD => "SQLCARD",
        SQLDARD => "SQLDARD",
        CMDCHKRM => "CMDCHKRM",
        CMDNSPRM => "CMDNSPRM",
        OBJNSPRM => "OBJNSPRM",
        MGRLVLRM => "MGRLVLRM",
        PRCCNVRM => "PRCCNVRM",
        SECCHKRM => "SECCHKRM",
        SYNTAXRM => "SYNTAXRM",
        VALNSPRM => "VALNSPRM",
        ACCRDBRM => "ACCRDBRM",
        RDBNACRM => "RDBNACRM",
        RDBACCRM => "RDBACCRM",
        ENDUOWRM => "ENDUOWRM",
        ABNUOWRM => "ABNUOWRM",
        RDBNFNRM => "RDBNFNRM",
        SQLERRRM => "SQLERRRM",
        RDBUPDRM => "RDBUPDRM",
        RDBAFLRM => "RDBAFLRM",
        RDBATHRM => "RDBATHRM",
        CODPNT => "CODPNT",
        TYPDEFNAM => "TYPDEFNAM",
        TYPDEFOVR => "TYPDEFOVR",
        PRDID => "PRDID",
        PRCCNVCD => "PRCCNVCD",
        SRVCLSNM => "SRVCLSNM",
        SVRCOD => "SVRCOD",
        SYNERRCD => "SYNERRCD",
        SRVDGN => "SRVDGN",
        SRVRLSLV => "SRVRLSLV",
        EXTNAM => "EXTNAM",
        SRVNAM => "SRVNAM",
        CCSIDSBC => "CCSIDSBC",
        CCSIDDBC => "CCSIDDBC",
        CCSIDMBC => "CCSIDMBC",
        CCSIDXML => "CCSIDXML",
        RLSCONV => "RLSCONV",
        USRID => "USRID",
        PASSWORD => "PASSWORD",
        SECMEC => "SECMEC",
        SECCHKCD => "SECCHKCD",
        SECTKN => "SECTKN",
        IPADDR => "IPADDR",
        TCPPORTHOST => "TCPPORTHOST",
        MGRLVLLS => "MGRLVLLS",
        RDBINTTKN => "RDBINTTKN",
        PRDDTA => "PRDDTA",
        RDBACCCL => "RDBACCCL",
        RDBNAM => "RDBNAM",
        UOWDSP => "UOWDSP",
        RDBALWUPD => "RDBALWUPD",
        CRRTKN => "CRRTKN",
        PKGDFTCST => "PKGDFTCST",
        SRVPRTY => "SRVPRTY",
        SRVLSTCNT => "SRVLSTCNT",
        SRVLSRV => "SRVLSRV",
        SRVLST => "SRVLST",
        AGENT => "AGENT",
        SECMGR => "SECMGR",
        CMNAPPC => "CMNAPPC",
        CMNTCPIP => "CMNTCPIP",
        SYNCPTMGR => "SYNCPTMGR",
        RSYNCMGR => "RSYNCMGR",
        XAMGR => "XAMGR",
        UNICODEMGR => "UNICODEMGR",
        SQLAM => "SQLAM",
        RDB => "RDB",
        PBSD => "PBSD",
        PBSD_ISO => "PBSD_ISO",
        PBSD_SCHEMA => "PBSD_SCHEMA",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(name(EXCSATRD), "EXCSATRD");
        assert_eq!(name(ACCRDBRM), "ACCRDBRM");
        assert_eq!(name(0x0001), "UNKNOWN");
    }
}
