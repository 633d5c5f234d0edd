//! DSS chain codec implementation.
//!
//! Requests leave [`drda_protocol::RequestBuilder`] fully framed, so encoding
//! only copies bytes. Decoding waits until a whole reply chain is buffered:
//! every DSS through the first one without the chaining bit, continuation
//! headers included.

use bytes::{BufMut, Bytes, BytesMut};
use drda_protocol::{DssHeader, scan_chain};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;

/// Default limit on the size of one reply chain.
pub const DEFAULT_MAX_REPLY_SIZE: usize = 64 * 1024 * 1024;

/// A complete reply chain as received from the server.
#[derive(Debug, Clone)]
pub struct Reply {
    /// Raw chain bytes, DSS headers included.
    pub bytes: Bytes,
}

impl Reply {
    /// Header of the first DSS in the chain.
    pub fn first_header(&self) -> Result<DssHeader, CodecError> {
        let mut cursor = self.bytes.as_ref();
        Ok(DssHeader::decode(&mut cursor)?)
    }

    /// Chain length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// DSS codec for tokio-util framing.
#[derive(Debug)]
pub struct DssCodec {
    max_reply_size: usize,
}

impl DssCodec {
    /// Create a codec with the default reply size limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_reply_size: DEFAULT_MAX_REPLY_SIZE,
        }
    }

    /// Set the largest reply chain the codec will buffer.
    #[must_use]
    pub fn with_max_reply_size(mut self, size: usize) -> Self {
        self.max_reply_size = size;
        self
    }

    /// The configured reply size limit.
    #[must_use]
    pub fn max_reply_size(&self) -> usize {
        self.max_reply_size
    }
}

impl Default for DssCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for DssCodec {
    type Item = Reply;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(length) = scan_chain(src)? else {
            if src.len() > self.max_reply_size {
                return Err(CodecError::ReplyTooLarge {
                    size: src.len(),
                    max: self.max_reply_size,
                });
            }
            return Ok(None);
        };

        let bytes = src.split_to(length).freeze();
        tracing::trace!(length, "decoded DSS reply chain");
        Ok(Some(Reply { bytes }))
    }
}

impl Encoder<Bytes> for DssCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        dst.put_slice(&item);
        tracing::trace!(length = item.len(), "encoded DSS request chain");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use drda_protocol::DssType;

    fn dss(format: u8, correlation_id: u16, payload: &[u8]) -> Vec<u8> {
        let mut out = ((payload.len() + 6) as u16).to_be_bytes().to_vec();
        out.push(0xD0);
        out.push(format);
        out.extend_from_slice(&correlation_id.to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_decode_single_dss() {
        let mut codec = DssCodec::new();
        let mut data = BytesMut::from(&dss(0x02, 1, &[0x00, 0x04, 0x14, 0x43])[..]);

        let reply = codec.decode(&mut data).unwrap().unwrap();
        assert_eq!(reply.len(), 10);
        assert_eq!(reply.first_header().unwrap().dss_type, DssType::Reply);
        assert!(data.is_empty());
    }

    #[test]
    fn test_decode_waits_for_chain_end() {
        let mut codec = DssCodec::new();
        // Chained with the same correlator, then the chain end.
        let first = dss(0x52, 1, &[0x00, 0x04, 0x14, 0x43]);
        let second = dss(0x03, 1, &[0x00, 0x04, 0x24, 0x08]);

        let mut data = BytesMut::from(&first[..]);
        assert!(codec.decode(&mut data).unwrap().is_none());

        data.extend_from_slice(&second[..4]);
        assert!(codec.decode(&mut data).unwrap().is_none());

        data.extend_from_slice(&second[4..]);
        let reply = codec.decode(&mut data).unwrap().unwrap();
        assert_eq!(reply.len(), first.len() + second.len());
    }

    #[test]
    fn test_decode_leaves_next_chain_buffered() {
        let mut codec = DssCodec::new();
        let mut data = BytesMut::new();
        data.extend_from_slice(&dss(0x02, 1, &[0x00, 0x04, 0x14, 0x43]));
        data.extend_from_slice(&dss(0x02, 1, &[0x00, 0x04, 0x14, 0x44]));

        assert!(codec.decode(&mut data).unwrap().is_some());
        assert_eq!(data.len(), 10);
        assert!(codec.decode(&mut data).unwrap().is_some());
        assert!(data.is_empty());
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut codec = DssCodec::new();
        let mut bytes = dss(0x02, 1, &[]);
        bytes[2] = 0xD1;
        let mut data = BytesMut::from(&bytes[..]);
        assert!(matches!(
            codec.decode(&mut data).unwrap_err(),
            CodecError::Protocol(_)
        ));
    }

    #[test]
    fn test_reply_size_limit() {
        let mut codec = DssCodec::new().with_max_reply_size(16);
        let mut data = BytesMut::from(&[0x7F, 0xFF, 0xD0, 0x02, 0x00, 0x01][..]);
        data.extend_from_slice(&[0u8; 20]);
        assert!(matches!(
            codec.decode(&mut data).unwrap_err(),
            CodecError::ReplyTooLarge { max: 16, .. }
        ));
    }

    #[test]
    fn test_encode_copies_request() {
        let mut codec = DssCodec::new();
        let request = Bytes::from(dss(0x01, 1, &[0x00, 0x04, 0x20, 0x0E]));
        let mut dst = BytesMut::new();
        codec.encode(request.clone(), &mut dst).unwrap();
        assert_eq!(dst.as_ref(), request.as_ref());
    }
}
