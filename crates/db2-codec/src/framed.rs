//! Framed DSS streams for async I/O.
//!
//! - `DssReader<T>`: read-only stream of reply chains
//! - `DssWriter<T>`: write-only sink of request chains
//!
//! Both back [`crate::Connection`].

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::Sink;
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::dss_codec::{DssCodec, Reply};
use crate::error::CodecError;

pin_project! {
    /// A read-only stream of reply chains.
    pub struct DssReader<T> {
        #[pin]
        inner: FramedRead<T, DssCodec>,
    }
}

impl<T> DssReader<T>
where
    T: AsyncRead,
{
    /// Create a reader over the given transport.
    pub fn new(transport: T) -> Self {
        Self::with_codec(transport, DssCodec::new())
    }

    /// Create a reader with a custom codec.
    pub fn with_codec(transport: T, codec: DssCodec) -> Self {
        Self {
            inner: FramedRead::new(transport, codec),
        }
    }

    /// Get a reference to the codec.
    pub fn codec(&self) -> &DssCodec {
        self.inner.decoder()
    }

    /// Bytes received but not yet framed.
    pub fn read_buffer(&self) -> &BytesMut {
        self.inner.read_buffer()
    }
}

impl<T> Stream for DssReader<T>
where
    T: AsyncRead + Unpin,
{
    type Item = Result<Reply, CodecError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

impl<T> std::fmt::Debug for DssReader<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DssReader")
            .field("transport", self.inner.get_ref())
            .finish()
    }
}

pin_project! {
    /// A write-only sink of request chains.
    pub struct DssWriter<T> {
        #[pin]
        inner: FramedWrite<T, DssCodec>,
    }
}

impl<T> DssWriter<T>
where
    T: AsyncWrite,
{
    /// Create a writer over the given transport.
    pub fn new(transport: T) -> Self {
        Self {
            inner: FramedWrite::new(transport, DssCodec::new()),
        }
    }
}

impl<T> Sink<Bytes> for DssWriter<T>
where
    T: AsyncWrite + Unpin,
{
    type Error = CodecError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Bytes) -> Result<(), Self::Error> {
        self.project().inner.start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_close(cx)
    }
}

impl<T> std::fmt::Debug for DssWriter<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DssWriter")
            .field("transport", self.inner.get_ref())
            .finish()
    }
}
