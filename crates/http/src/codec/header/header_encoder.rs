//! HTTP response head encoder.
//!
//! Serializes the status line and header fields. The only field it manages itself is
//! `content-length` for responses of known size; `transfer-encoding` is left exactly as
//! the application (or the chunking gate) set it.

use crate::protocol::{PayloadSize, ResponseHead, SendError};

use bytes::{BufMut, BytesMut};

use http::{HeaderValue, Version, header};
use std::io;
use std::io::{ErrorKind, Write};
use tokio_util::codec::Encoder;
use tracing::error;

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    /// Encodes the response head into the provided bytes buffer.
    ///
    /// # Errors
    ///
    /// Returns error if the response version is neither HTTP/1.0 nor HTTP/1.1.
    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut header, payload_size) = item;

        let version = match header.version() {
            Version::HTTP_11 => "HTTP/1.1",
            Version::HTTP_10 => "HTTP/1.0",
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(io::Error::from(ErrorKind::Unsupported).into());
            }
        };

        dst.reserve(INIT_HEADER_SIZE);
        let status = header.status();
        write!(FastWrite(dst), "{version} {} {}\r\n", status.as_str(), status.canonical_reason().unwrap_or(""))?;

        if let PayloadSize::Length(n) = payload_size {
            header.headers_mut().insert(header::CONTENT_LENGTH, HeaderValue::from(n));
        }

        for (header_name, header_value) in header.headers() {
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Writer over `BytesMut`, used for the formatted status line.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Response, StatusCode};

    fn encode(head: ResponseHead, payload_size: PayloadSize) -> String {
        let mut dst = BytesMut::new();
        HeaderEncoder.encode((head, payload_size), &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn length_sets_content_length() {
        let head = Response::builder().status(StatusCode::OK).header("content-type", "text/plain").body(()).unwrap();
        assert_eq!(encode(head, PayloadSize::Length(12)), "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 12\r\n\r\n");
    }

    #[test]
    fn transfer_encoding_is_left_alone() {
        let head = Response::builder().status(StatusCode::OK).header("transfer-encoding", "chunked").body(()).unwrap();
        assert_eq!(encode(head, PayloadSize::Streamed), "HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n");
    }

    #[test]
    fn bodiless_status_has_no_length() {
        let head = Response::builder().status(StatusCode::NOT_MODIFIED).body(()).unwrap();
        assert_eq!(encode(head, PayloadSize::Empty), "HTTP/1.1 304 Not Modified\r\n\r\n");
    }

    #[test]
    fn http10_status_line() {
        let head = Response::builder().version(Version::HTTP_10).status(StatusCode::NOT_FOUND).body(()).unwrap();
        assert_eq!(encode(head, PayloadSize::Length(0)), "HTTP/1.0 404 Not Found\r\ncontent-length: 0\r\n\r\n");
    }

    #[test]
    fn http2_is_unsupported() {
        let head = Response::builder().version(Version::HTTP_2).body(()).unwrap();
        let mut dst = BytesMut::new();
        assert!(HeaderEncoder.encode((head, PayloadSize::Empty), &mut dst).is_err());
    }
}
