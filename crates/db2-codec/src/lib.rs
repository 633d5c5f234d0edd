//! # db2-codec
//!
//! Async framing layer for DRDA reply chains.
//!
//! This crate turns a raw byte stream into complete DRDA reply chains,
//! buffering across TCP segment boundaries and DSS continuation headers until
//! the last DSS of a chain has arrived.
//!
//! ## Features
//!
//! - Reply chain reassembly, continuations included
//! - Configurable limit on buffered reply size
//! - Split read/write halves over any tokio transport
//! - Integration with tokio-util's codec framework
//!
//! ## Architecture
//!
//! ```text
//! TCP Stream → DssCodec (chain framing) → Connection → Client
//! ```
//!
//! Request chains are produced fully framed by
//! [`drda_protocol::RequestBuilder`]; the codec writes them unchanged.
//!
//! ```rust,ignore
//! use db2_codec::Connection;
//!
//! let mut conn = Connection::new(tcp_stream);
//! let reply = conn.exchange(request).await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod dss_codec;
pub mod error;
pub mod framed;

pub use connection::Connection;
pub use dss_codec::{DEFAULT_MAX_REPLY_SIZE, DssCodec, Reply};
pub use error::CodecError;
pub use framed::{DssReader, DssWriter};
