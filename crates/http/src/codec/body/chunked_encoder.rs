//! Encoder for HTTP chunked transfer coding.
//!
//! Implements the framing of [RFC 7230 Section 4.1](https://tools.ietf.org/html/rfc7230#section-4.1):
//! every non-empty chunk is written as its byte length in lowercase hex, CRLF, the raw
//! bytes and CRLF. The terminal item writes the zero-size chunk, the trailer fields (if
//! any) and the final CRLF.

use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BufMut, BytesMut};
use std::io::Write;

use tokio_util::codec::Encoder;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkedEncoder {
    eof: bool,
    send_size: usize,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self { eof: false, send_size: 0 }
    }

    /// Returns true once the terminal chunk has been written.
    pub fn is_finish(&self) -> bool {
        self.eof
    }

    /// Number of payload bytes framed so far, excluding framing overhead.
    pub fn send_size(&self) -> usize {
        self.send_size
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for ChunkedEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            trace!("chunked payload already terminated, ignore payload item");
            return Ok(());
        }

        match item {
            PayloadItem::Chunk(bytes) => {
                let size = bytes.remaining();
                // a zero-size chunk would terminate the payload early
                if size == 0 {
                    return Ok(());
                }

                write!(helper::Writer(dst), "{size:x}\r\n")?;
                dst.reserve(size + 2);
                dst.put(bytes);
                dst.extend_from_slice(b"\r\n");
                self.send_size += size;
                Ok(())
            }
            PayloadItem::Trailers(trailers) => {
                self.eof = true;
                dst.extend_from_slice(b"0\r\n");
                for (name, value) in &trailers {
                    dst.extend_from_slice(name.as_ref());
                    dst.extend_from_slice(b": ");
                    dst.extend_from_slice(value.as_bytes());
                    dst.extend_from_slice(b"\r\n");
                }
                dst.extend_from_slice(b"\r\n");
                Ok(())
            }
            PayloadItem::Eof => {
                self.eof = true;
                dst.extend_from_slice(b"0\r\n\r\n");
                Ok(())
            }
        }
    }
}

mod helper {
    use bytes::{BufMut, BytesMut};
    use std::io;

    pub struct Writer<'a>(pub &'a mut BytesMut);

    impl io::Write for Writer<'_> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.put_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
