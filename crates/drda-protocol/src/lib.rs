//! # drda-protocol
//!
//! Pure implementation of the client side of DRDA, the Distributed
//! Relational Database Architecture spoken by DB2 for LUW and DB2 for z/OS.
//!
//! The crate covers three layers:
//!
//! - **DSS**: the 6 byte data stream structure headers that frame requests
//!   and replies, including chaining and continuation of large objects.
//! - **DDM**: length-prefixed, code-point-tagged objects. Requests are
//!   serialized by [`RequestBuilder`]; replies are read by [`ReplyParser`]
//!   and decoded by declarative [`grammar::Grammar`] tables.
//! - **FD:OCA**: the row-level data representation, including packed
//!   decimals, IEEE and IBM hexadecimal floating point, the SQLCA, and
//!   the column descriptions of a SQLDARD.
//!
//! ## Features
//!
//! - `encoding` (default): lossy decoding of malformed UTF-8 from the server
//!   through `encoding_rs`
//!
//! ## Design Philosophy
//!
//! This crate is IO-agnostic. It contains no networking logic and makes no
//! assumptions about the async runtime. `db2-codec` and `db2-client` build
//! the transport and the connection on top of it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use drda_protocol::{RequestBuilder, Typdef};
//! use drda_protocol::connect::ExchangeServerAttributes;
//!
//! let typdef = Typdef::default();
//! let mut builder = RequestBuilder::new(&typdef);
//! ExchangeServerAttributes::new()
//!     .with_server_name("app01")
//!     .encode(&mut builder)?;
//! let request = builder.finish()?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod builder;
pub mod ccsid;
pub mod codepoint;
pub mod connect;
pub mod constants;
pub mod decimal;
pub mod dss;
pub mod error;
pub mod error_reply;
pub mod floating_point;
pub mod grammar;
pub mod parser;
pub mod reply;
pub mod sqlca;
pub mod sqlda;

pub use builder::RequestBuilder;
pub use ccsid::{ByteOrder, Ccsid, CcsidOverrides, ServerPlatform, Typdef};
pub use constants::SecurityMechanism;
pub use decimal::PackedDecimal;
pub use dss::{DssFlags, DssHeader, DssType, scan_chain};
pub use error::{
    ProtocolError, SecurityCheckCode, SecurityFailure, ServerError, Severity, SyntaxErrorCode,
};
pub use parser::{FdocaReader, Peek, ReplyParser};
pub use reply::{
    AccessRdbReply, AccessSecurityReply, CommitResult, PbsdData, RdbAccessData, SecurityCheckReply,
    ServerAddress, ServerAttributes, ServerListEntry, UowDisposition,
};
pub use sqlca::{NetSqlca, SqlDiagnostic, SqlMessage};
pub use sqlda::{ColumnMetaData, ColumnOrigin, DescriptorHeader, SqlDescriptor, SqlType};
