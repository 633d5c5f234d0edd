//! Mock DRDA server for unit testing.
//!
//! This module provides a mock DB2 server that answers the connect
//! sequence and unit-of-work commands, so the client can be tested
//! without a real database instance.
//!
//! ## Features
//!
//! - EXCSAT, ACCSEC, SECCHK and ACCRDB replies for LUW or z/OS
//! - Credential checking with SECCHKCD failures
//! - ACCRDBRM severity, SQLCARD and correlation token overrides
//! - RDBCMM / RDBRLLBCK replies
//! - Recording of the commands each connection sent
//!
//! ## Example
//!
//! ```rust,ignore
//! use db2_testing::MockDrdaServer;
//!
//! #[tokio::test]
//! async fn test_connect() {
//!     let server = MockDrdaServer::builder()
//!         .with_database("SAMPLE")
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let config = Config::new()
//!         .host(server.host())
//!         .port(server.port())
//!         .database("SAMPLE");
//!     let client = Client::connect(config).await.unwrap();
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use db2_codec::{CodecError, Connection};
use drda_protocol::{ServerPlatform, Severity, Typdef, codepoint};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast};

use crate::replies::{ReplyEncoder, command_code_point, command_parameter, reply_chain};

/// Error type for mock server operations.
#[derive(Debug, Error)]
pub enum MockServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing error on the client connection.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The client sent something the mock does not understand.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server already stopped.
    #[error("server already stopped")]
    Stopped,
}

/// Result type for mock server operations.
pub type Result<T> = std::result::Result<T, MockServerError>;

/// Mock server configuration.
#[derive(Debug, Clone)]
pub struct MockServerConfig {
    /// Platform the server reports through its release level.
    pub platform: ServerPlatform,
    /// SRVRLSLV value.
    pub release_level: String,
    /// SRVCLSNM value.
    pub server_class: String,
    /// SRVNAM value.
    pub server_name: String,
    /// Database the server accepts. Empty accepts any name.
    pub database: String,
    /// Security mechanisms offered in ACCSECRD.
    pub security_mechanisms: Vec<u16>,
    /// Expected user and password. `None` accepts anything.
    pub credentials: Option<(String, String)>,
    /// SVRCOD of ACCRDBRM.
    pub accrdb_severity: Severity,
    /// SQLCARD following ACCRDBRM.
    pub accrdb_sqlcard: Option<(i32, String)>,
    /// Correlation token returned in ACCRDBRM.
    pub correlation_token: Option<Vec<u8>>,
    /// Current schema returned in PBSD.
    pub schema: Option<String>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            platform: ServerPlatform::Luw,
            release_level: "SQL11058".to_string(),
            server_class: "QDB2/LINUXX8664".to_string(),
            server_name: "MOCKDB2".to_string(),
            database: String::new(),
            security_mechanisms: vec![0x03, 0x04],
            credentials: None,
            accrdb_severity: Severity::Info,
            accrdb_sqlcard: None,
            correlation_token: None,
            schema: None,
        }
    }
}

/// Builder for [`MockDrdaServer`].
#[derive(Debug, Default)]
pub struct MockServerBuilder {
    config: MockServerConfig,
}

impl MockServerBuilder {
    /// Create a new builder with an LUW server.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report DB2 for z/OS.
    #[must_use]
    pub fn zos(mut self) -> Self {
        self.config.platform = ServerPlatform::Zos;
        self.config.release_level = "DSN12015".to_string();
        self.config.server_class = "QDB2".to_string();
        self
    }

    /// Set the release level.
    #[must_use]
    pub fn with_release_level(mut self, level: impl Into<String>) -> Self {
        self.config.release_level = level.into();
        self
    }

    /// Only accept this database name.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.config.database = database.into();
        self
    }

    /// Require these credentials in SECCHK.
    #[must_use]
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Some((user.into(), password.into()));
        self
    }

    /// Offer these security mechanisms.
    #[must_use]
    pub fn with_security_mechanisms(mut self, mechanisms: &[u16]) -> Self {
        self.config.security_mechanisms = mechanisms.to_vec();
        self
    }

    /// Send ACCRDBRM with this severity.
    #[must_use]
    pub fn with_accrdb_severity(mut self, severity: Severity) -> Self {
        self.config.accrdb_severity = severity;
        self
    }

    /// Follow ACCRDBRM with an SQLCARD.
    #[must_use]
    pub fn with_accrdb_sqlcard(mut self, code: i32, state: impl Into<String>) -> Self {
        self.config.accrdb_sqlcard = Some((code, state.into()));
        self
    }

    /// Return this correlation token in ACCRDBRM.
    #[must_use]
    pub fn with_correlation_token(mut self, token: &[u8]) -> Self {
        self.config.correlation_token = Some(token.to_vec());
        self
    }

    /// Return this schema in PBSD.
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.config.schema = Some(schema.into());
        self
    }

    /// Build and start the server.
    pub async fn build(self) -> Result<MockDrdaServer> {
        MockDrdaServer::start(self.config).await
    }
}

/// Mock DB2 server.
pub struct MockDrdaServer {
    /// Server address.
    addr: SocketAddr,
    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,
    /// Connection count.
    connection_count: Arc<Mutex<usize>>,
    /// Command code points received, in order, across connections.
    received: Arc<Mutex<Vec<u16>>>,
}

impl MockDrdaServer {
    /// Create a new builder for the mock server.
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    /// Start the mock server on an available port.
    pub async fn start(config: MockServerConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let config = Arc::new(config);
        let connection_count = Arc::new(Mutex::new(0usize));
        let received = Arc::new(Mutex::new(Vec::new()));

        let server = Self {
            addr,
            shutdown_tx: shutdown_tx.clone(),
            connection_count: connection_count.clone(),
            received: received.clone(),
        };

        // Spawn the accept loop
        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _peer_addr)) => {
                                let config = config.clone();
                                let count = connection_count.clone();
                                let received = received.clone();
                                tokio::spawn(async move {
                                    {
                                        let mut c = count.lock().await;
                                        *c += 1;
                                    }
                                    if let Err(e) = handle_connection(stream, config, received).await {
                                        tracing::debug!("connection error: {}", e);
                                    }
                                    {
                                        let mut c = count.lock().await;
                                        *c = c.saturating_sub(1);
                                    }
                                });
                            }
                            Err(e) => {
                                tracing::error!("accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Ok(server)
    }

    /// Get the server's listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the host string for connection configuration.
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Get the port number.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Get the current connection count.
    pub async fn connection_count(&self) -> usize {
        *self.connection_count.lock().await
    }

    /// Command code points received so far.
    pub async fn received_commands(&self) -> Vec<u16> {
        self.received.lock().await.clone()
    }

    /// Stop the server.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for MockDrdaServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Per-connection server state.
struct Session {
    config: Arc<MockServerConfig>,
    encoder: ReplyEncoder,
}

impl Session {
    fn new(config: Arc<MockServerConfig>) -> Self {
        Self {
            config,
            encoder: ReplyEncoder::new(Typdef::default()),
        }
    }

    fn string_parameter(&self, request: &[u8], code_point: u16) -> Option<String> {
        command_parameter(request, code_point).map(|b| self.encoder.decode(b).trim_end().to_string())
    }

    fn excsat(&mut self) -> Vec<Vec<u8>> {
        let reply = self.encoder.excsatrd(
            &self.config.release_level,
            &self.config.server_class,
            &self.config.server_name,
        );
        self.encoder.typdef_mut().apply_platform(self.config.platform);
        vec![reply]
    }

    /// Echo the requested mechanism when offered, otherwise list the offered
    /// ones.
    fn accsec(&self, request: &[u8]) -> Vec<Vec<u8>> {
        let requested = command_parameter(request, codepoint::SECMEC)
            .and_then(|b| b.get(0..2))
            .map(|b| u16::from_be_bytes([b[0], b[1]]));
        let reply = match requested {
            Some(mechanism) if self.config.security_mechanisms.contains(&mechanism) => {
                self.encoder.accsecrd(&[mechanism])
            }
            _ => self.encoder.accsecrd(&self.config.security_mechanisms),
        };
        vec![reply]
    }

    fn secchk(&self, request: &[u8]) -> Vec<Vec<u8>> {
        let code = match &self.config.credentials {
            None => 0x00,
            Some((user, password)) => {
                let sent_user = self.string_parameter(request, codepoint::USRID);
                let sent_password = self.string_parameter(request, codepoint::PASSWORD);
                match (sent_user, sent_password) {
                    (None, _) => 0x12,
                    (Some(u), _) if &u != user => 0x13,
                    (Some(_), None) => 0x10,
                    (Some(_), Some(p)) if &p != password => 0x0F,
                    _ => 0x00,
                }
            }
        };
        vec![self.encoder.secchkrm(code)]
    }

    fn accrdb(&mut self, request: &[u8]) -> Vec<Vec<u8>> {
        let rdb_name = self.string_parameter(request, codepoint::RDBNAM).unwrap_or_default();
        if !self.config.database.is_empty() && !rdb_name.eq_ignore_ascii_case(&self.config.database)
        {
            return vec![self.encoder.rdbnfnrm(&rdb_name)];
        }

        let (typdef_name, sbc_ccsid) = match self.config.platform {
            ServerPlatform::Zos => ("QTDSQL370", 500),
            _ => ("QTDSQLX86", 1208),
        };
        let config = self.config.clone();
        let mut objects = vec![self.encoder.accrdbrm(
            config.accrdb_severity as u16,
            &config.release_level,
            typdef_name,
            sbc_ccsid,
            config.correlation_token.as_deref(),
        )];
        if let Some(schema) = &config.schema {
            objects.push(self.encoder.pbsd_schema(schema));
        }
        if let Some((code, state)) = &config.accrdb_sqlcard {
            objects.push(self.encoder.sqlcard(*code, state));
        }
        if self.encoder.typdef().is_zos() {
            self.encoder.typdef_mut().switch_to_utf8();
        }
        objects
    }

    fn end_unit_of_work(&self, disposition: u8) -> Vec<Vec<u8>> {
        vec![
            self.encoder.enduowrm(disposition),
            self.encoder.sqlcard(0, "00000"),
        ]
    }
}

/// Handle a single client connection.
async fn handle_connection(
    stream: TcpStream,
    config: Arc<MockServerConfig>,
    received: Arc<Mutex<Vec<u16>>>,
) -> Result<()> {
    let mut connection = Connection::new(stream);
    let mut session = Session::new(config);

    loop {
        // Requests are framed exactly like replies.
        let request = match connection.read_reply().await {
            Ok(request) => request,
            Err(CodecError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let bytes = request.bytes;
        let command = command_code_point(&bytes)
            .ok_or_else(|| MockServerError::Protocol("request shorter than a command".into()))?;
        received.lock().await.push(command);
        tracing::debug!(command = codepoint::name(command), "mock server received command");

        let objects = match command {
            codepoint::EXCSAT => session.excsat(),
            codepoint::ACCSEC => session.accsec(&bytes),
            codepoint::SECCHK => session.secchk(&bytes),
            codepoint::ACCRDB => session.accrdb(&bytes),
            codepoint::RDBCMM => session.end_unit_of_work(codepoint::UOWDSP_COMMIT),
            codepoint::RDBRLLBCK => session.end_unit_of_work(codepoint::UOWDSP_ROLLBACK),
            other => {
                return Err(MockServerError::Protocol(format!(
                    "unsupported command {other:#06X}"
                )));
            }
        };
        connection.send_request(reply_chain(&objects)).await?;
    }
}
