//! The DRDA connect sequence.
//!
//! ```text
//! EXCSAT  -> EXCSATRD   platform known, typdef chosen
//! ACCSEC  -> ACCSECRD   security mechanism agreed
//! SECCHK  -> SECCHKRM   only when credentials are configured
//! ACCRDB  -> ACCRDBRM   database open, server typdef applied
//! ```
//!
//! Every command is its own exchange with a fresh request builder, so
//! correlation IDs restart at 1 for each one.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use db2_codec::Connection;
use drda_protocol::connect::{
    AccessRdb, AccessSecurity, ExchangeServerAttributes, SecurityCheck, correlation_token,
};
use drda_protocol::constants::CRRTKN_LEN;
use drda_protocol::reply::{
    read_access_database, read_access_security, read_exchange_server_attributes,
    read_security_check,
};
use drda_protocol::{
    PbsdData, ProtocolError, RdbAccessData, ReplyParser, RequestBuilder, ServerAttributes, Typdef,
};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::Config;
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::section::SectionManager;
use crate::state::HandshakeState;

/// What the server told the client while connecting.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Attributes from EXCSATRD.
    pub server_attributes: ServerAttributes,
    /// Database access data from ACCRDBRM.
    pub access: RdbAccessData,
    /// Session data piggy-backed on ACCRDBRM.
    pub session: Option<PbsdData>,
    /// Correlation token in effect: the server's if it sent one, otherwise
    /// the client's.
    pub correlation_token: Bytes,
    /// Type definition negotiated for the connection.
    pub typdef: Typdef,
}

/// IPv4 address used in the correlation token.
///
/// IPv4-mapped IPv6 addresses are unwrapped; other IPv6 addresses use the
/// loopback address.
pub(crate) fn token_address(local: SocketAddr) -> Ipv4Addr {
    match local.ip() {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(v6) => v6.to_ipv4_mapped().unwrap_or(Ipv4Addr::LOCALHOST),
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Drives the connect sequence over one connection.
pub(crate) struct Handshake<'a, T>
where
    T: AsyncRead + AsyncWrite,
{
    connection: &'a mut Connection<T>,
    config: &'a Config,
    sections: &'a SectionManager,
    state: HandshakeState,
    typdef: Typdef,
}

impl<'a, T> Handshake<'a, T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(
        connection: &'a mut Connection<T>,
        config: &'a Config,
        sections: &'a SectionManager,
    ) -> Self {
        Self {
            connection,
            config,
            sections,
            state: HandshakeState::Disconnected,
            typdef: Typdef::default(),
        }
    }

    /// Current step of the sequence.
    pub(crate) fn state(&self) -> HandshakeState {
        self.state
    }

    /// Run the whole sequence. On error the state is left at
    /// [`HandshakeState::Failed`].
    pub(crate) async fn run(&mut self, local: SocketAddr) -> Result<SessionInfo> {
        match self.run_steps(local).await {
            Ok(info) => Ok(info),
            Err(e) => {
                tracing::warn!(state = %self.state, error = %e, "handshake failed");
                self.state.fail();
                Err(e)
            }
        }
    }

    async fn run_steps(&mut self, local: SocketAddr) -> Result<SessionInfo> {
        let server_attributes = self.exchange_server_attributes().await?;
        self.access_security().await?;
        let config = self.config;
        if let Some(credentials) = &config.credentials {
            self.security_check(credentials).await?;
        }

        let token = correlation_token(token_address(local), local.port(), now_millis());
        let (access, session) = self.access_database(token).await?;

        let correlation_token = access
            .correlation_token
            .clone()
            .unwrap_or_else(|| Bytes::copy_from_slice(&token));
        Ok(SessionInfo {
            server_attributes,
            access,
            session,
            correlation_token,
            typdef: self.typdef.clone(),
        })
    }

    async fn round_trip(
        &mut self,
        encode: impl FnOnce(&mut RequestBuilder) -> std::result::Result<(), ProtocolError>,
    ) -> Result<ReplyParser> {
        let mut builder = RequestBuilder::with_capacity(&self.typdef, self.config.packet_capacity);
        encode(&mut builder)?;
        let request = builder.finish()?;
        let reply = self.connection.exchange(request).await?;
        Ok(ReplyParser::new(reply.bytes, &self.typdef))
    }

    async fn exchange_server_attributes(&mut self) -> Result<ServerAttributes> {
        let command = ExchangeServerAttributes::new()
            .with_external_name(self.config.external_name.clone())
            .with_server_name(self.config.client_host_name.clone());
        self.state.advance(HandshakeState::ExcsatSent)?;
        let mut parser = self.round_trip(|b| command.encode(b)).await?;
        let attributes = read_exchange_server_attributes(&mut parser)?;

        let platform = attributes.platform();
        self.typdef.apply_platform(platform);
        if self.typdef.is_zos() {
            self.sections.configure_for_zos();
        }
        tracing::debug!(
            platform = ?platform,
            ccsid = self.typdef.ccsid().id(),
            "server platform identified"
        );
        Ok(attributes)
    }

    async fn access_security(&mut self) -> Result<()> {
        let mechanism = self.config.security_mechanism;
        let command = AccessSecurity::new(mechanism, self.config.database.clone());
        self.state.advance(HandshakeState::AccsecSent)?;
        let mut parser = self.round_trip(|b| command.encode(b)).await?;
        read_access_security(&mut parser, mechanism)?;
        tracing::debug!(mechanism = %mechanism, "security mechanism accepted");
        Ok(())
    }

    async fn security_check(&mut self, credentials: &Credentials) -> Result<()> {
        let mechanism = self.config.security_mechanism;
        let command = SecurityCheck::new(mechanism, self.config.database.clone());
        let command = match credentials.password() {
            Some(password) => command.with_credentials(credentials.user(), password),
            None if mechanism.requires_password() => {
                return Err(Error::Authentication(format!(
                    "{mechanism} requires a password but only a user ID is configured"
                )));
            }
            None => command.with_user(credentials.user()),
        };

        self.state.advance(HandshakeState::SecchkSent)?;
        let mut parser = self.round_trip(|b| command.encode(b)).await?;
        read_security_check(&mut parser)?;
        tracing::debug!(method = credentials.method_name(), "security check passed");
        Ok(())
    }

    async fn access_database(
        &mut self,
        token: [u8; CRRTKN_LEN],
    ) -> Result<(RdbAccessData, Option<PbsdData>)> {
        let mut command = AccessRdb::new(self.config.database.clone(), token)
            .with_read_only(self.config.read_only);
        command.application_name = self.config.application_name.clone();

        self.state.advance(HandshakeState::AccrdbSent)?;
        let mut parser = self.round_trip(|b| command.encode(b)).await?;
        let reply = read_access_database(&mut parser, &mut self.typdef)?;

        if self.typdef.is_zos() {
            self.typdef.switch_to_utf8();
        }
        self.state.advance(HandshakeState::Ready)?;
        Ok((reply.access, reply.session))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_token_address_v4() {
        let local: SocketAddr = "10.1.2.3:40000".parse().unwrap();
        assert_eq!(token_address(local), Ipv4Addr::new(10, 1, 2, 3));
    }

    #[test]
    fn test_token_address_mapped_v6() {
        let local: SocketAddr = "[::ffff:192.168.0.7]:40000".parse().unwrap();
        assert_eq!(token_address(local), Ipv4Addr::new(192, 168, 0, 7));
    }

    #[test]
    fn test_token_address_plain_v6_uses_loopback() {
        let local: SocketAddr = "[2001:db8::1]:40000".parse().unwrap();
        assert_eq!(token_address(local), Ipv4Addr::LOCALHOST);
    }
}
