//! Parses the chunked transfer coding of [RFC 7230 §4.1](https://tools.ietf.org/html/rfc7230#section-4.1).
//!
//! Size lines are handed to [`httparse::parse_chunk_size`], which also skips chunk
//! extensions. Chunk data is emitted as soon as any of it is buffered, so a large
//! chunk never has to arrive in one read. The trailer section is collected until its
//! blank line and then parsed as one block of header fields.

use crate::ensure;
use crate::protocol::{ParseError, PayloadItem};
use bytes::{Buf, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue};
use httparse::Status;
use tokio_util::codec::Decoder;
use tracing::trace;

const CRLF: &[u8] = b"\r\n";
const END_OF_TRAILERS: &[u8] = b"\r\n\r\n";

/// Maximum number of trailer fields accepted after the last chunk
const MAX_TRAILER_NUM: usize = 32;

/// Maximum size in bytes of the trailer section
const MAX_TRAILER_BYTES: usize = 8 * 1024;

/// Longest size line accepted, extensions included
const MAX_SIZE_LINE_BYTES: usize = 4 * 1024;

/// Decodes a chunked payload into [`PayloadItem::Chunk`]s followed by one terminal item:
/// [`PayloadItem::Trailers`] when the last chunk carries trailer fields, otherwise
/// [`PayloadItem::Eof`]. Once finished, the decoder keeps answering `Eof`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkedDecoder {
    state: State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Size,
    /// bytes of the current chunk not read yet
    Data(u64),
    /// CRLF closing a chunk's data
    DataEnd,
    Trailers,
    Done,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.state == State::Done
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                State::Size => {
                    let Some((consumed, size)) = read_size_line(src)? else {
                        return Ok(None);
                    };
                    src.advance(consumed);
                    trace!(size, "read chunk size");
                    self.state = if size == 0 { State::Trailers } else { State::Data(size) };
                }

                State::Data(remaining) => {
                    if src.is_empty() {
                        return Ok(None);
                    }

                    let len = usize::try_from(remaining).map_or(src.len(), |remaining| remaining.min(src.len()));
                    let left = remaining - len as u64;
                    self.state = if left == 0 { State::DataEnd } else { State::Data(left) };

                    trace!(len, left, "read chunked bytes");
                    return Ok(Some(PayloadItem::Chunk(src.split_to(len).freeze())));
                }

                State::DataEnd => {
                    if src.len() < CRLF.len() {
                        return Ok(None);
                    }
                    ensure!(src.starts_with(CRLF), ParseError::invalid_body("chunk data must end with CRLF"));
                    src.advance(CRLF.len());
                    self.state = State::Size;
                }

                State::Trailers => {
                    if src.len() < CRLF.len() {
                        return Ok(None);
                    }

                    if src.starts_with(CRLF) {
                        src.advance(CRLF.len());
                        self.state = State::Done;
                        trace!("finished reading chunked data");
                        return Ok(Some(PayloadItem::Eof));
                    }

                    let Some(end) = find(src, END_OF_TRAILERS) else {
                        ensure!(src.len() <= MAX_TRAILER_BYTES, ParseError::too_large_header(src.len(), MAX_TRAILER_BYTES));
                        return Ok(None);
                    };

                    let section = src.split_to(end + END_OF_TRAILERS.len());
                    let trailers = parse_trailers(&section)?;
                    self.state = State::Done;
                    trace!(count = trailers.len(), "finished reading chunked data with trailers");
                    return Ok(Some(PayloadItem::Trailers(trailers)));
                }

                State::Done => return Ok(Some(PayloadItem::Eof)),
            }
        }
    }
}

/// Returns the length of the size line and the chunk size, or `None` until the whole
/// line is buffered.
fn read_size_line(src: &[u8]) -> Result<Option<(usize, u64)>, ParseError> {
    match httparse::parse_chunk_size(src) {
        Ok(Status::Complete(parsed)) => Ok(Some(parsed)),
        Ok(Status::Partial) => {
            ensure!(src.len() <= MAX_SIZE_LINE_BYTES, ParseError::invalid_body("chunk size line too long"));
            Ok(None)
        }
        Err(httparse::InvalidChunkSize) => Err(ParseError::invalid_body("invalid chunk size line")),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Parses a trailer section, every field line plus the closing blank line, into a map.
fn parse_trailers(section: &[u8]) -> Result<HeaderMap, ParseError> {
    let mut fields = [httparse::EMPTY_HEADER; MAX_TRAILER_NUM];
    let parsed = match httparse::parse_headers(section, &mut fields) {
        Ok(Status::Complete((_, parsed))) => parsed,
        Ok(Status::Partial) => return Err(ParseError::invalid_header("incomplete trailer section")),
        Err(httparse::Error::TooManyHeaders) => return Err(ParseError::too_many_headers(MAX_TRAILER_NUM)),
        Err(e) => return Err(ParseError::invalid_header(e)),
    };

    let mut trailers = HeaderMap::with_capacity(parsed.len());
    for field in parsed {
        let name = HeaderName::from_bytes(field.name.as_bytes()).map_err(ParseError::invalid_header)?;
        let value = HeaderValue::from_bytes(field.value).map_err(ParseError::invalid_header)?;
        trailers.append(name, value);
    }
    Ok(trailers)
}
