//! DB2 client implementation.

use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use db2_codec::{Connection, DssCodec};
use drda_protocol::connect::{encode_commit, encode_rollback};
use drda_protocol::reply::read_end_unit_of_work;
use drda_protocol::{
    CommitResult, PbsdData, RdbAccessData, ReplyParser, RequestBuilder, ServerAttributes, Typdef,
};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::handshake::{Handshake, SessionInfo};
use crate::section::{Section, SectionManager};
use crate::state::{ConnectionState, Disconnected, HandshakeState, Ready};

/// DB2 client with type-state connection management.
///
/// The generic parameter `S` represents the current connection state,
/// ensuring at compile time that database operations are only available
/// once the handshake has completed.
pub struct Client<S: ConnectionState> {
    config: Config,
    _state: PhantomData<S>,
    /// The underlying connection (present only when connected)
    connection: Option<Connection<TcpStream>>,
    handshake: HandshakeState,
    session: Option<SessionInfo>,
    sections: Arc<SectionManager>,
}

impl Client<Disconnected> {
    /// Connect to DB2.
    ///
    /// This opens the TCP connection and runs EXCSAT, ACCSEC, SECCHK (when
    /// credentials are configured) and ACCRDB.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = Config::from_connection_string(
    ///     "Server=localhost:50000;Database=SAMPLE;UID=db2inst1;PWD=secret",
    /// )?;
    /// let client = Client::connect(config).await?;
    /// ```
    pub async fn connect(config: Config) -> Result<Client<Ready>> {
        config.validate()?;
        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "connecting to DB2"
        );

        let addr = format!("{}:{}", config.host, config.port);
        tracing::debug!("establishing TCP connection to {}", addr);
        let tcp_stream = timeout(config.timeouts.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)?
            .map_err(|e| Error::Connection(format!("{addr}: {e}")))?;
        tcp_stream.set_nodelay(true)?;
        let local = tcp_stream.local_addr()?;

        let codec = DssCodec::new().with_max_reply_size(config.max_reply_size);
        let mut connection = Connection::with_codec(tcp_stream, codec);
        let sections = config
            .section_manager
            .clone()
            .unwrap_or_else(|| Arc::new(SectionManager::with_layout(config.sections)));

        let mut handshake = Handshake::new(&mut connection, &config, &sections);
        let session = timeout(config.timeouts.login_timeout, handshake.run(local))
            .await
            .map_err(|_| Error::LoginTimeout)??;
        let state = handshake.state();

        tracing::info!(
            prdid = %session.access.prdid,
            release_level = session.server_attributes.release_level.as_deref().unwrap_or(""),
            "connected to DB2"
        );

        Ok(Client {
            config,
            _state: PhantomData,
            connection: Some(connection),
            handshake: state,
            session: Some(session),
            sections,
        })
    }
}

impl Client<Ready> {
    fn session(&self) -> Result<&SessionInfo> {
        self.session.as_ref().ok_or(Error::ConnectionClosed)
    }

    /// Server attributes from EXCSATRD.
    #[must_use]
    pub fn server_attributes(&self) -> Option<&ServerAttributes> {
        self.session.as_ref().map(|s| &s.server_attributes)
    }

    /// Database access data from ACCRDBRM.
    #[must_use]
    pub fn access_data(&self) -> Option<&RdbAccessData> {
        self.session.as_ref().map(|s| &s.access)
    }

    /// Session data the server sent with ACCRDBRM.
    #[must_use]
    pub fn session_data(&self) -> Option<&PbsdData> {
        self.session.as_ref().and_then(|s| s.session.as_ref())
    }

    /// Negotiated type definition.
    #[must_use]
    pub fn typdef(&self) -> Option<&Typdef> {
        self.session.as_ref().map(|s| &s.typdef)
    }

    /// Correlation token identifying this connection to the server.
    #[must_use]
    pub fn correlation_token(&self) -> Option<&Bytes> {
        self.session.as_ref().map(|s| &s.correlation_token)
    }

    /// Step the handshake reached.
    #[must_use]
    pub fn handshake_state(&self) -> HandshakeState {
        self.handshake
    }

    /// Section manager of this connection.
    #[must_use]
    pub fn sections(&self) -> &Arc<SectionManager> {
        &self.sections
    }

    /// Get a section for a dynamic statement.
    pub fn get_dynamic_section(&self) -> Result<Section> {
        Ok(self.sections.get_dynamic_section()?)
    }

    /// Commit the current unit of work.
    pub async fn commit(&mut self) -> Result<CommitResult> {
        tracing::debug!("committing unit of work");
        self.end_unit_of_work(encode_commit).await
    }

    /// Roll back the current unit of work.
    pub async fn rollback(&mut self) -> Result<CommitResult> {
        tracing::debug!("rolling back unit of work");
        self.end_unit_of_work(encode_rollback).await
    }

    async fn end_unit_of_work(
        &mut self,
        encode: impl FnOnce(&mut RequestBuilder) -> std::result::Result<(), drda_protocol::ProtocolError>,
    ) -> Result<CommitResult> {
        let mut typdef = self.session()?.typdef.clone();
        let mut builder = RequestBuilder::with_capacity(&typdef, self.config.packet_capacity);
        encode(&mut builder)?;
        let request = builder.finish()?;

        let connection = self.connection.as_mut().ok_or(Error::ConnectionClosed)?;
        let reply = timeout(self.config.timeouts.command_timeout, connection.exchange(request))
            .await
            .map_err(|_| Error::CommandTimeout)??;

        let mut parser = ReplyParser::new(reply.bytes, &typdef);
        let result = read_end_unit_of_work(&mut parser, &mut typdef);
        if let Some(session) = self.session.as_mut() {
            session.typdef = typdef;
        }
        let result = result?;
        tracing::debug!(disposition = ?result.disposition, "unit of work ended");
        Ok(result)
    }

    /// Close the connection gracefully.
    pub async fn close(mut self) -> Result<()> {
        tracing::debug!("closing connection");
        if let Some(mut connection) = self.connection.take() {
            connection.close().await?;
        }
        Ok(())
    }
}

impl<S: ConnectionState> Client<S> {
    /// Get the database name.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.config.database
    }

    /// Get the server host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Get the server port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.config.port
    }
}

impl<S: ConnectionState> std::fmt::Debug for Client<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("database", &self.config.database)
            .field("handshake", &self.handshake)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::TimeoutConfig;

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let err = Client::connect(Config::new().host("localhost")).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = Config::new()
            .host("127.0.0.1")
            .port(port)
            .database("SAMPLE")
            .timeouts(TimeoutConfig::new().connect_timeout(Duration::from_secs(5)));
        let err = Client::connect(config).await.unwrap_err();
        assert!(matches!(err, Error::Connection(_) | Error::ConnectionTimeout));
    }

    #[tokio::test]
    async fn test_login_timeout_when_server_is_silent() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let config = Config::new()
            .host("127.0.0.1")
            .port(port)
            .database("SAMPLE")
            .timeouts(TimeoutConfig::new().login_timeout(Duration::from_millis(100)));
        let err = Client::connect(config).await.unwrap_err();
        assert!(matches!(err, Error::LoginTimeout));
        assert!(err.is_transient());
        server.abort();
    }

    #[tokio::test]
    async fn test_server_closing_mid_handshake() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let config = Config::new().host("127.0.0.1").port(port).database("SAMPLE");
        let err = Client::connect(config).await.unwrap_err();
        assert!(err.is_terminal() || err.is_transient());
    }
}
