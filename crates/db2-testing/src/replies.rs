//! Encoders for the server side of the connect sequence.
//!
//! Replies are built as plain DDM objects and wrapped in a single reply DSS
//! with correlation ID 1, which is what the client expects for every
//! command it sends.

use bytes::Bytes;
use drda_protocol::{ByteOrder, CcsidOverrides, Typdef, codepoint};

/// Build a DDM object: 2 byte length, code point, content.
#[must_use]
pub fn object(code_point: u16, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 4);
    out.extend_from_slice(&((content.len() + 4) as u16).to_be_bytes());
    out.extend_from_slice(&code_point.to_be_bytes());
    out.extend_from_slice(content);
    out
}

/// Wrap objects in one reply DSS with correlation ID 1.
#[must_use]
pub fn reply_chain(objects: &[Vec<u8>]) -> Bytes {
    let payload = objects.concat();
    let mut out = Vec::with_capacity(payload.len() + 6);
    out.extend_from_slice(&((payload.len() + 6) as u16).to_be_bytes());
    out.extend_from_slice(&[0xD0, 0x02, 0x00, 0x01]);
    out.extend_from_slice(&payload);
    Bytes::from(out)
}

/// Code point of the first command in a request chain.
#[must_use]
pub fn command_code_point(request: &[u8]) -> Option<u16> {
    request.get(8..10).map(|b| u16::from_be_bytes([b[0], b[1]]))
}

/// Content of a parameter of the first command in a request chain.
#[must_use]
pub fn command_parameter(request: &[u8], code_point: u16) -> Option<&[u8]> {
    let header = request.get(0..2)?;
    let dss_end = usize::from(u16::from_be_bytes([header[0], header[1]]) & 0x7FFF).min(request.len());
    let mut pos = 10;
    while pos + 4 <= dss_end {
        let length = usize::from(u16::from_be_bytes([request[pos], request[pos + 1]]));
        let found = u16::from_be_bytes([request[pos + 2], request[pos + 3]]);
        if length < 4 || pos + length > dss_end {
            return None;
        }
        if found == code_point {
            return request.get(pos + 4..pos + length);
        }
        pos += length;
    }
    None
}

/// Encodes reply objects in the server's current data representation.
#[derive(Debug, Clone)]
pub struct ReplyEncoder {
    typdef: Typdef,
}

impl ReplyEncoder {
    /// Encode with `typdef`.
    #[must_use]
    pub fn new(typdef: Typdef) -> Self {
        Self { typdef }
    }

    /// The representation in use.
    #[must_use]
    pub fn typdef(&self) -> &Typdef {
        &self.typdef
    }

    /// Mutable access to the representation in use.
    pub fn typdef_mut(&mut self) -> &mut Typdef {
        &mut self.typdef
    }

    fn text(&self, value: &str) -> Vec<u8> {
        self.typdef
            .encode(value)
            .unwrap_or_else(|_| value.as_bytes().to_vec())
    }

    fn data_text(&self, value: &str) -> Vec<u8> {
        self.typdef
            .data_ccsid()
            .encode(value)
            .unwrap_or_else(|_| value.as_bytes().to_vec())
    }

    /// Decode character data sent by the client.
    #[must_use]
    pub fn decode(&self, bytes: &[u8]) -> String {
        self.typdef.decode(bytes)
    }

    /// EXCSATRD granting the usual manager levels.
    #[must_use]
    pub fn excsatrd(&self, release_level: &str, server_class: &str, server_name: &str) -> Vec<u8> {
        let mut levels = Vec::new();
        for (manager, level) in [
            (codepoint::AGENT, 10u16),
            (codepoint::SQLAM, 11),
            (codepoint::RDB, 7),
            (codepoint::SECMGR, 9),
            (codepoint::CMNTCPIP, 8),
        ] {
            levels.extend_from_slice(&manager.to_be_bytes());
            levels.extend_from_slice(&level.to_be_bytes());
        }
        let members = [
            object(codepoint::EXTNAM, &self.text("db2sysc")),
            object(codepoint::MGRLVLLS, &levels),
            object(codepoint::SRVCLSNM, &self.text(server_class)),
            object(codepoint::SRVNAM, &self.text(server_name)),
            object(codepoint::SRVRLSLV, &self.text(release_level)),
        ]
        .concat();
        object(codepoint::EXCSATRD, &members)
    }

    /// ACCSECRD listing the mechanisms the server offers.
    #[must_use]
    pub fn accsecrd(&self, mechanisms: &[u16]) -> Vec<u8> {
        let list: Vec<u8> = mechanisms.iter().flat_map(|m| m.to_be_bytes()).collect();
        object(codepoint::ACCSECRD, &object(codepoint::SECMEC, &list))
    }

    /// SECCHKRM with the given check code.
    #[must_use]
    pub fn secchkrm(&self, check_code: u8) -> Vec<u8> {
        let svrcod: u16 = if check_code == 0 { 0 } else { 8 };
        let members = [
            object(codepoint::SVRCOD, &svrcod.to_be_bytes()),
            object(codepoint::SECCHKCD, &[check_code]),
        ]
        .concat();
        object(codepoint::SECCHKRM, &members)
    }

    /// ACCRDBRM. The server's TYPDEFNAM and TYPDEFOVR are also applied to
    /// this encoder so a following SQLCARD uses them.
    pub fn accrdbrm(
        &mut self,
        svrcod: u16,
        prdid: &str,
        typdef_name: &str,
        sbc_ccsid: u16,
        correlation_token: Option<&[u8]>,
    ) -> Vec<u8> {
        let typdefovr = [
            object(codepoint::CCSIDSBC, &sbc_ccsid.to_be_bytes()),
            object(codepoint::CCSIDDBC, &1200u16.to_be_bytes()),
            object(codepoint::CCSIDMBC, &sbc_ccsid.to_be_bytes()),
        ]
        .concat();
        let mut members = [
            object(codepoint::SVRCOD, &svrcod.to_be_bytes()),
            object(codepoint::PRDID, &self.text(prdid)),
            object(codepoint::TYPDEFNAM, &self.text(typdef_name)),
            object(codepoint::TYPDEFOVR, &typdefovr),
        ]
        .concat();
        if let Some(token) = correlation_token {
            members.extend(object(codepoint::CRRTKN, token));
        }

        self.typdef.set_name(typdef_name);
        self.typdef.apply_overrides(CcsidOverrides {
            sbc: Some(sbc_ccsid),
            dbc: Some(1200),
            mbc: Some(sbc_ccsid),
            xml: None,
        });
        object(codepoint::ACCRDBRM, &members)
    }

    /// RDBNFNRM for an unknown database.
    #[must_use]
    pub fn rdbnfnrm(&self, rdb_name: &str) -> Vec<u8> {
        let members = [
            object(codepoint::SVRCOD, &8u16.to_be_bytes()),
            object(codepoint::RDBNAM, &self.text(rdb_name)),
        ]
        .concat();
        object(codepoint::RDBNFNRM, &members)
    }

    /// PBSD carrying the current schema.
    #[must_use]
    pub fn pbsd_schema(&self, schema: &str) -> Vec<u8> {
        object(
            codepoint::PBSD,
            &object(codepoint::PBSD_SCHEMA, schema.as_bytes()),
        )
    }

    /// SQLCARD with an SQLCODE and SQLSTATE, without the extension and
    /// diagnostic groups.
    #[must_use]
    pub fn sqlcard(&self, code: i32, state: &str) -> Vec<u8> {
        let mut content = vec![0x00];
        match self.typdef.byte_order() {
            ByteOrder::LittleEndian => content.extend_from_slice(&code.to_le_bytes()),
            ByteOrder::BigEndian => content.extend_from_slice(&code.to_be_bytes()),
        }
        content.extend(self.data_text(&format!("{state:<5.5}")));
        content.extend(self.data_text("SQLRI01F"));
        content.extend_from_slice(&[0xFF, 0xFF]);
        object(codepoint::SQLCARD, &content)
    }

    /// ENDUOWRM with the given UOWDSP.
    #[must_use]
    pub fn enduowrm(&self, disposition: u8) -> Vec<u8> {
        let members = [
            object(codepoint::SVRCOD, &4u16.to_be_bytes()),
            object(codepoint::UOWDSP, &[disposition]),
        ]
        .concat();
        object(codepoint::ENDUOWRM, &members)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use drda_protocol::ReplyParser;
    use drda_protocol::reply::{read_end_unit_of_work, read_exchange_server_attributes};
    use drda_protocol::{ServerPlatform, UowDisposition};

    #[test]
    fn test_excsatrd_in_ebcdic_is_readable() {
        let encoder = ReplyEncoder::new(Typdef::default());
        let chain = reply_chain(&[encoder.excsatrd("DSN12015", "QDB2", "DB2Z")]);
        let mut parser = ReplyParser::new(chain, &Typdef::default());
        let attributes = read_exchange_server_attributes(&mut parser).unwrap();
        assert_eq!(attributes.release_level.as_deref(), Some("DSN12015"));
        assert_eq!(attributes.platform(), ServerPlatform::Zos);
    }

    #[test]
    fn test_enduowrm_with_sqlcard() {
        let encoder = ReplyEncoder::new(Typdef::luw());
        let chain = reply_chain(&[encoder.enduowrm(2), encoder.sqlcard(0, "00000")]);
        let mut typdef = Typdef::luw();
        let mut parser = ReplyParser::new(chain, &typdef);
        let result = read_end_unit_of_work(&mut parser, &mut typdef).unwrap();
        assert_eq!(result.disposition, UowDisposition::RolledBack);
    }

    #[test]
    fn test_command_parameter() {
        let mut request = vec![0, 0, 0xD0, 0x01, 0x00, 0x01];
        let params = [
            object(codepoint::SECMEC, &[0x00, 0x03]),
            object(codepoint::RDBNAM, b"SAMPLE"),
        ]
        .concat();
        request.extend(object(codepoint::ACCSEC, &params));
        let length = request.len() as u16;
        request[0..2].copy_from_slice(&length.to_be_bytes());

        assert_eq!(command_code_point(&request), Some(codepoint::ACCSEC));
        assert_eq!(
            command_parameter(&request, codepoint::RDBNAM),
            Some(&b"SAMPLE"[..])
        );
        assert_eq!(command_parameter(&request, codepoint::SECTKN), None);
    }
}
