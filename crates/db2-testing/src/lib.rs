//! # db2-testing
//!
//! Test infrastructure for DB2 client development.
//!
//! This crate provides utilities for integration testing against DB2
//! instances, including testcontainers support and a mock DRDA server.
//!
//! ## Features
//!
//! - DB2 container management via testcontainers
//! - Mock DRDA server for unit tests (no Docker required)
//! - Reply encoders for hand-built server replies
//!
//! ## Mock Server Example
//!
//! ```rust,ignore
//! use db2_client::{Client, Config, Credentials};
//! use db2_testing::MockDrdaServer;
//!
//! #[tokio::test]
//! async fn test_with_mock_server() {
//!     let server = MockDrdaServer::builder()
//!         .with_database("SAMPLE")
//!         .with_credentials("db2inst1", "secret")
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let config = Config::new()
//!         .host(server.host())
//!         .port(server.port())
//!         .database("SAMPLE")
//!         .credentials(Credentials::user_password("db2inst1", "secret"));
//!     let client = Client::connect(config).await.unwrap();
//! }
//! ```
//!
//! ## Container Example
//!
//! ```rust,ignore
//! use db2_testing::Db2Container;
//! use testcontainers::runners::AsyncRunner;
//!
//! #[tokio::test]
//! async fn test_with_real_server() {
//!     let image = Db2Container::default();
//!     let container = image.clone().start().await.unwrap();
//!     let port = container.get_host_port_ipv4(50000).await.unwrap();
//!     let config = Config::from_connection_string(&image.connection_string("127.0.0.1", port));
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod container;
pub mod mock_server;
pub mod replies;

pub use container::Db2Container;
pub use mock_server::{MockDrdaServer, MockServerBuilder, MockServerConfig, MockServerError};
pub use replies::ReplyEncoder;
