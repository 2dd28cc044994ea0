use crate::protocol::{PayloadItem, PayloadSize, SendError};
use bytes::{Buf, BufMut, BytesMut};

use tokio_util::codec::Encoder;
use tracing::{trace, warn};

/// Writes response payload items according to the payload size decided for the response head.
///
/// Response payloads are never chunked here: a response that needs chunked framing has
/// already been framed by the chunking gate, and its bytes pass through as `Streamed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEncoder {
    kind: Kind,
    eof: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// bytes still allowed before the declared content-length is reached
    Length(u64),

    /// bytes are written as they come
    Streamed,

    NoBody,
}

impl PayloadEncoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody, eof: false }
    }

    pub fn streamed() -> Self {
        Self { kind: Kind::Streamed, eof: false }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(size), eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl From<PayloadSize> for PayloadEncoder {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(size) => PayloadEncoder::fix_length(size),
            PayloadSize::Chunked | PayloadSize::Streamed => PayloadEncoder::streamed(),
            PayloadSize::Empty => PayloadEncoder::empty(),
        }
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for PayloadEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut bytes = match item {
            PayloadItem::Chunk(bytes) => bytes,
            PayloadItem::Trailers(_) | PayloadItem::Eof => {
                self.eof = true;
                return Ok(());
            }
        };

        match &mut self.kind {
            Kind::Length(remaining) => {
                let size = bytes.remaining() as u64;
                if size > *remaining {
                    warn!(size, remaining = *remaining, "payload exceeds content-length, truncating");
                }
                let write_size = size.min(*remaining);
                dst.put((&mut bytes).take(usize::try_from(write_size).unwrap_or(usize::MAX)));
                *remaining -= write_size;
            }
            Kind::Streamed => dst.put(bytes),
            Kind::NoBody => trace!(size = bytes.remaining(), "drop payload for bodiless response"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_length_truncates() {
        let mut encoder = PayloadEncoder::fix_length(4);
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"abc")), &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"def")), &mut dst).unwrap();
        assert!(!encoder.is_finish());
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();

        assert_eq!(&dst[..], b"abcd");
        assert!(encoder.is_finish());
    }

    #[test]
    fn test_streamed_passes_bytes_through() {
        let mut encoder = PayloadEncoder::from(PayloadSize::Streamed);
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"5\r\nHello\r\n")), &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"0\r\n\r\n")), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();

        assert_eq!(&dst[..], b"5\r\nHello\r\n0\r\n\r\n");
    }

    #[test]
    fn test_no_body_drops_data() {
        let mut encoder = PayloadEncoder::empty();
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"ignored")), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();

        assert!(dst.is_empty());
        assert!(encoder.is_finish());
    }
}
