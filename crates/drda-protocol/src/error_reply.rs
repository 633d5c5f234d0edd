//! Error reply messages.
//!
//! When a command fails the server answers with a reply message in place of
//! the expected reply data, optionally followed by a SQLCARD. Every such
//! message terminates the connection; it is decoded into a
//! [`ServerError`] and returned as [`ProtocolError::Server`].

use crate::codepoint;
use crate::error::{ProtocolError, Severity, ServerError, SyntaxErrorCode};
use crate::grammar::{
    Field, Grammar, read_codpnt, read_mgrlvlls, read_rdbnam, read_srvdgn, read_svrcod, skip_member,
};
use crate::parser::{Peek, ReplyParser};
use crate::sqlca::parse_sqlcard;

/// Error replies any command may receive.
pub const COMMON_ERRORS: &[u16] = &[
    codepoint::CMDNSPRM,
    codepoint::PRCCNVRM,
    codepoint::SYNTAXRM,
    codepoint::VALNSPRM,
];

fn svrcod_any(p: &mut ReplyParser, e: &mut ServerError) -> Result<(), ProtocolError> {
    e.severity = read_svrcod(p, Severity::Info, Severity::SessionDamage)?;
    Ok(())
}

fn svrcod_error(p: &mut ReplyParser, e: &mut ServerError) -> Result<(), ProtocolError> {
    e.severity = read_svrcod(p, Severity::Error, Severity::Error)?;
    Ok(())
}

fn svrcod_error_or_worse(p: &mut ReplyParser, e: &mut ServerError) -> Result<(), ProtocolError> {
    e.severity = read_svrcod(p, Severity::Error, Severity::SessionDamage)?;
    Ok(())
}

fn svrcod_warning_or_error(p: &mut ReplyParser, e: &mut ServerError) -> Result<(), ProtocolError> {
    e.severity = read_svrcod(p, Severity::Warning, Severity::Error)?;
    Ok(())
}

fn rdbnam(p: &mut ReplyParser, e: &mut ServerError) -> Result<(), ProtocolError> {
    e.rdb_name = Some(read_rdbnam(p)?);
    Ok(())
}

fn srvdgn(p: &mut ReplyParser, e: &mut ServerError) -> Result<(), ProtocolError> {
    e.diagnostic = Some(read_srvdgn(p)?);
    Ok(())
}

fn codpnt(p: &mut ReplyParser, e: &mut ServerError) -> Result<(), ProtocolError> {
    e.reason = Some(read_codpnt(p)?);
    Ok(())
}

fn synerrcd(p: &mut ReplyParser, e: &mut ServerError) -> Result<(), ProtocolError> {
    p.parse_length_and_match_code_point(codepoint::SYNERRCD)?;
    let code = p.read_unsigned_byte()?;
    if let Some(known) = SyntaxErrorCode::from_u8(code) {
        tracing::debug!(synerrcd = %known, "server reported a syntax error");
    }
    // CODPNT, when present, names the offending object and wins.
    e.reason.get_or_insert(u16::from(code));
    Ok(())
}

fn syntax_codpnt(p: &mut ReplyParser, e: &mut ServerError) -> Result<(), ProtocolError> {
    e.reason = Some(read_codpnt(p)?);
    Ok(())
}

fn prccnvcd(p: &mut ReplyParser, e: &mut ServerError) -> Result<(), ProtocolError> {
    p.parse_length_and_match_code_point(codepoint::PRCCNVCD)?;
    e.reason = Some(u16::from(p.read_unsigned_byte()?));
    Ok(())
}

fn mgrlvlls(p: &mut ReplyParser, e: &mut ServerError) -> Result<(), ProtocolError> {
    let levels = read_mgrlvlls(p)?;
    e.reason = levels.first().map(|&(manager, _)| manager);
    if e.diagnostic.is_none() {
        let listed: Vec<String> = levels
            .iter()
            .map(|(manager, level)| format!("{}={level}", codepoint::name(*manager)))
            .collect();
        e.diagnostic = Some(format!("unsupported manager levels: {}", listed.join(", ")));
    }
    Ok(())
}

static CMDCHKRM: Grammar<ServerError> = Grammar {
    code_point: codepoint::CMDCHKRM,
    fields: &[
        Field::required(codepoint::SVRCOD, svrcod_any),
        Field::optional(codepoint::RDBNAM, rdbnam),
        Field::optional(codepoint::SRVDGN, srvdgn),
    ],
};

/// RDBNACRM, RDBNFNRM and RDBAFLRM share one layout.
const RDB_FAILURE_FIELDS: &[Field<ServerError>] = &[
    Field::required(codepoint::SVRCOD, svrcod_error),
    Field::required(codepoint::RDBNAM, rdbnam),
    Field::optional(codepoint::SRVDGN, srvdgn),
];

static RDBNACRM: Grammar<ServerError> = Grammar {
    code_point: codepoint::RDBNACRM,
    fields: RDB_FAILURE_FIELDS,
};

static RDBNFNRM: Grammar<ServerError> = Grammar {
    code_point: codepoint::RDBNFNRM,
    fields: RDB_FAILURE_FIELDS,
};

static RDBAFLRM: Grammar<ServerError> = Grammar {
    code_point: codepoint::RDBAFLRM,
    fields: RDB_FAILURE_FIELDS,
};

const NOT_SUPPORTED_FIELDS: &[Field<ServerError>] = &[
    Field::required(codepoint::SVRCOD, svrcod_warning_or_error),
    Field::required(codepoint::CODPNT, codpnt),
    Field::optional(codepoint::RDBNAM, rdbnam),
    Field::optional(codepoint::SRVDGN, srvdgn),
];

static CMDNSPRM: Grammar<ServerError> = Grammar {
    code_point: codepoint::CMDNSPRM,
    fields: NOT_SUPPORTED_FIELDS,
};

static VALNSPRM: Grammar<ServerError> = Grammar {
    code_point: codepoint::VALNSPRM,
    fields: NOT_SUPPORTED_FIELDS,
};

static PRCCNVRM: Grammar<ServerError> = Grammar {
    code_point: codepoint::PRCCNVRM,
    fields: &[
        Field::required(codepoint::SVRCOD, svrcod_error_or_worse),
        Field::required(codepoint::PRCCNVCD, prccnvcd),
        Field::optional(codepoint::RDBNAM, rdbnam),
        Field::optional(codepoint::SRVDGN, srvdgn),
    ],
};

static SYNTAXRM: Grammar<ServerError> = Grammar {
    code_point: codepoint::SYNTAXRM,
    fields: &[
        Field::required(codepoint::SVRCOD, svrcod_error),
        Field::required(codepoint::SYNERRCD, synerrcd),
        Field::optional(codepoint::RDBNAM, rdbnam),
        Field::optional(codepoint::CODPNT, syntax_codpnt),
        Field::optional(codepoint::SRVDGN, srvdgn),
    ],
};

static MGRLVLRM: Grammar<ServerError> = Grammar {
    code_point: codepoint::MGRLVLRM,
    fields: &[
        Field::required(codepoint::SVRCOD, svrcod_error),
        Field::required(codepoint::MGRLVLLS, mgrlvlls),
        Field::optional(codepoint::RDBNAM, rdbnam),
        Field::optional(codepoint::SRVDGN, srvdgn),
    ],
};

static ABNUOWRM: Grammar<ServerError> = Grammar {
    code_point: codepoint::ABNUOWRM,
    fields: &[
        Field::required(codepoint::SVRCOD, svrcod_error),
        Field::optional(codepoint::RDBNAM, rdbnam),
        Field::optional(codepoint::SRVDGN, srvdgn),
    ],
};

fn grammar_for(code_point: u16) -> Option<&'static Grammar<ServerError>> {
    Some(match code_point {
        codepoint::CMDCHKRM => &CMDCHKRM,
        codepoint::RDBNACRM => &RDBNACRM,
        codepoint::RDBNFNRM => &RDBNFNRM,
        codepoint::RDBAFLRM => &RDBAFLRM,
        codepoint::CMDNSPRM => &CMDNSPRM,
        codepoint::VALNSPRM => &VALNSPRM,
        codepoint::PRCCNVRM => &PRCCNVRM,
        codepoint::SYNTAXRM => &SYNTAXRM,
        codepoint::MGRLVLRM => &MGRLVLRM,
        codepoint::ABNUOWRM => &ABNUOWRM,
        _ => return None,
    })
}

/// Decode the error reply found where the reply to `context` was expected.
///
/// `accepted` lists the error messages valid for the command in addition to
/// [`COMMON_ERRORS`]. The result is the error to report: the decoded
/// [`ProtocolError::Server`], or the failure met while decoding it.
pub fn parse_error_reply(
    parser: &mut ReplyParser,
    context: &'static str,
    accepted: &[u16],
) -> ProtocolError {
    match read_error_reply(parser, context, accepted) {
        Ok(err) | Err(err) => err,
    }
}

fn read_error_reply(
    parser: &mut ReplyParser,
    context: &'static str,
    accepted: &[u16],
) -> Result<ProtocolError, ProtocolError> {
    let code_point = match parser.peek_code_point()? {
        Peek::CodePoint(cp) => cp,
        other => {
            return Err(ProtocolError::framing(
                SyntaxErrorCode::ReqObjNotFound,
                format!("reply to {context} ended at {other:?}"),
            ));
        }
    };
    let grammar = grammar_for(code_point)
        .filter(|_| accepted.contains(&code_point) || COMMON_ERRORS.contains(&code_point))
        .ok_or(ProtocolError::UnexpectedCodePoint {
            context,
            code_point,
        })?;

    let mut error = ServerError::new(code_point, Severity::Error);
    grammar.parse(parser, &mut error)?;

    // Reply data that may trail the message.
    loop {
        match parser.peek_code_point()? {
            Peek::CodePoint(cp @ (codepoint::TYPDEFNAM | codepoint::TYPDEFOVR)) => {
                skip_member(parser, cp)?;
            }
            Peek::CodePoint(codepoint::SQLCARD) => {
                error.sqlca = parse_sqlcard(parser)?.map(Box::new);
                break;
            }
            _ => break,
        }
    }

    tracing::debug!(
        message = error.message_name(),
        severity = %error.severity,
        context,
        "server returned an error reply"
    );
    Ok(ProtocolError::Server(Box::new(error)))
}
