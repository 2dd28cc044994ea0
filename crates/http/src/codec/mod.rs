//! Wire codecs for HTTP/1.x messages.
//!
//! Request side:
//!   - [`RequestDecoder`] parses a request head with [`HeaderDecoder`], then its payload
//!     with a [`PayloadDecoder`] (content-length or chunked)
//!
//! Response side:
//!   - [`ResponseEncoder`] writes the head with [`HeaderEncoder`], then the payload with a
//!     [`PayloadEncoder`]
//!
//! Chunk framing lives in [`ChunkedEncoder`] and [`ChunkedDecoder`]. The encoder is what
//! [`crate::chunked::ChunkedBody`] drives to frame streamed responses; the decoder reads
//! the same framing back, trailer fields included.
//!
//! ```
//! use bytes::{Bytes, BytesMut};
//! use spindle_http::codec::ChunkedEncoder;
//! use spindle_http::protocol::PayloadItem;
//! use tokio_util::codec::Encoder;
//!
//! let mut encoder = ChunkedEncoder::new();
//! let mut dst = BytesMut::new();
//! encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"hello")), &mut dst).unwrap();
//! encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();
//! assert_eq!(&dst[..], b"5\r\nhello\r\n0\r\n\r\n");
//! ```

mod body;
mod header;
mod request_decoder;
mod response_encoder;

pub use body::{ChunkedDecoder, ChunkedEncoder, PayloadDecoder, PayloadEncoder};
pub use header::{HeaderDecoder, HeaderEncoder};
pub(crate) use header::is_chunked;
pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
