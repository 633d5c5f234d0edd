//! Split I/O connection carrying DRDA request and reply chains.
//!
//! Every DRDA command is one exchange: the client writes a request chain and
//! the server answers with exactly one reply chain. Interrupting a running
//! statement happens on a separate connection, so the halves never need to be
//! shared across tasks.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};

use crate::dss_codec::{DssCodec, Reply};
use crate::error::CodecError;
use crate::framed::{DssReader, DssWriter};

/// A DRDA connection with split read and write halves.
///
/// # Example
///
/// ```rust,ignore
/// use db2_codec::Connection;
/// use tokio::net::TcpStream;
///
/// let stream = TcpStream::connect("localhost:50000").await?;
/// let mut conn = Connection::new(stream);
///
/// let reply = conn.exchange(excsat_request).await?;
/// ```
pub struct Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    reader: DssReader<ReadHalf<T>>,
    writer: DssWriter<WriteHalf<T>>,
    exchanges: u64,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Create a new connection from a transport.
    ///
    /// The transport is immediately split into read and write halves.
    pub fn new(transport: T) -> Self {
        Self::with_codec(transport, DssCodec::new())
    }

    /// Create a new connection with a custom read codec.
    pub fn with_codec(transport: T, codec: DssCodec) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);

        Self {
            reader: DssReader::with_codec(read_half, codec),
            writer: DssWriter::new(write_half),
            exchanges: 0,
        }
    }

    /// Number of completed request/reply exchanges.
    #[must_use]
    pub fn exchanges(&self) -> u64 {
        self.exchanges
    }

    /// Get a reference to the read codec.
    pub fn read_codec(&self) -> &DssCodec {
        self.reader.codec()
    }
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Queue a request chain and flush it to the transport.
    pub async fn send_request(&mut self, request: Bytes) -> Result<(), CodecError> {
        tracing::debug!(length = request.len(), "sending request chain");
        self.writer.send(request).await
    }

    /// Read the next complete reply chain.
    ///
    /// End of stream is an error here: a reply is always owed once a request
    /// has been sent.
    pub async fn read_reply(&mut self) -> Result<Reply, CodecError> {
        match self.reader.next().await {
            Some(Ok(reply)) => {
                tracing::debug!(length = reply.len(), "received reply chain");
                Ok(reply)
            }
            Some(Err(e)) => Err(e),
            None => {
                if self.reader.read_buffer().is_empty() {
                    tracing::debug!("server closed the connection");
                } else {
                    tracing::warn!(
                        buffered = self.reader.read_buffer().len(),
                        "server closed the connection mid-reply"
                    );
                }
                Err(CodecError::ConnectionClosed)
            }
        }
    }

    /// Send a request chain and wait for its reply.
    pub async fn exchange(&mut self, request: Bytes) -> Result<Reply, CodecError> {
        self.send_request(request).await?;
        let reply = self.read_reply().await?;
        self.exchanges += 1;
        Ok(reply)
    }

    /// Flush the write buffer.
    pub async fn flush(&mut self) -> Result<(), CodecError> {
        self.writer.flush().await
    }

    /// Flush and shut down the write half.
    pub async fn close(&mut self) -> Result<(), CodecError> {
        self.writer.close().await
    }
}

impl<T> std::fmt::Debug for Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("exchanges", &self.exchanges)
            .field("buffered", &self.reader.read_buffer().len())
            .finish_non_exhaustive()
    }
}
