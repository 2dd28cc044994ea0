//! HTTP request head decoder.
//!
//! Parses the request line and header fields with `httparse`, then decides how the
//! request payload is delimited.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum header size: 8KB
//! - Only HTTP/1.0 and HTTP/1.1 request lines are accepted

use bytes::BytesMut;
use http::{HeaderName, HeaderValue, Request};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;

use crate::protocol::{ParseError, PayloadSize, RequestHeader};

/// Maximum number of headers allowed in a request
const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire header section
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Decoder for HTTP request heads implementing the [`Decoder`] trait.
///
/// Yields the parsed [`RequestHeader`] together with the [`PayloadSize`] announced by
/// its `content-length` / `transfer-encoding` fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderDecoder;

impl Decoder for HeaderDecoder {
    type Item = (RequestHeader, PayloadSize);
    type Error = ParseError;

    /// Attempts to decode a request head from the provided bytes buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((header, payload_size)))` if a complete head was parsed; the head bytes
    ///   are removed from `src`
    /// - `Ok(None)` if more data is needed
    /// - `Err(ParseError)` if parsing failed or a limit was exceeded
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut fields = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
        let mut req = httparse::Request::new(&mut fields);

        let parsed_result = req.parse(src).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
            e => ParseError::invalid_header(e.to_string()),
        });

        let body_offset = match parsed_result? {
            Status::Complete(body_offset) => body_offset,
            Status::Partial => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                return Ok(None);
            }
        };

        trace!(head_size = body_offset, "parsed request head");
        ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

        let version = match req.version {
            Some(0) => http::Version::HTTP_10,
            Some(1) => http::Version::HTTP_11,
            v => return Err(ParseError::InvalidVersion(v)),
        };

        let mut header_builder = Request::builder()
            .method(req.method.ok_or(ParseError::InvalidMethod)?)
            .uri(req.path.ok_or(ParseError::InvalidUri)?)
            .version(version);

        if let Some(headers) = header_builder.headers_mut() {
            headers.reserve(req.headers.len());
            for field in req.headers.iter() {
                let name = HeaderName::from_bytes(field.name.as_bytes()).map_err(ParseError::invalid_header)?;
                let value = HeaderValue::from_bytes(field.value).map_err(ParseError::invalid_header)?;
                headers.append(name, value);
            }
        }

        let header = RequestHeader::from(header_builder.body(()).map_err(|e| match e {
            e if e.is::<http::uri::InvalidUri>() => ParseError::InvalidUri,
            e if e.is::<http::method::InvalidMethod>() => ParseError::InvalidMethod,
            e => ParseError::invalid_header(e),
        })?);
        let payload_size = parse_payload(&header)?;

        let _ = src.split_to(body_offset);
        Ok(Some((header, payload_size)))
    }
}

/// Determines how the request payload is delimited, following RFC 9112 section 6.
///
/// # Errors
///
/// Returns `ParseError` if:
/// - Both Content-Length and Transfer-Encoding headers are present
/// - Content-Length value is invalid
/// - Transfer-Encoding is present but chunked is not the final coding
fn parse_payload(header: &RequestHeader) -> Result<PayloadSize, ParseError> {
    // refer: https://www.rfc-editor.org/rfc/rfc9112.html#name-transfer-encoding
    let te_header = header.headers().get(http::header::TRANSFER_ENCODING);
    let cl_header = header.headers().get(http::header::CONTENT_LENGTH);

    match (te_header, cl_header) {
        (None, None) => Ok(PayloadSize::Empty),

        (te_value @ Some(_), None) => {
            if is_chunked(te_value) {
                Ok(PayloadSize::Chunked)
            } else {
                Err(ParseError::invalid_body("transfer-encoding without final chunked coding"))
            }
        }

        (None, Some(cl_value)) => {
            let cl_str = cl_value.to_str().map_err(|_e| ParseError::invalid_content_length("value can't to_str"))?;

            let length =
                cl_str.trim().parse::<u64>().map_err(|_e| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;

            if length == 0 && !header.need_body() { Ok(PayloadSize::Empty) } else { Ok(PayloadSize::Length(length)) }
        }

        (Some(_), Some(_)) => Err(ParseError::invalid_content_length("transfer_encoding and content_length both present in headers")),
    }
}

/// Checks if the Transfer-Encoding header indicates chunked encoding.
///
/// According to RFC 7230, chunked must be the last encoding if present.
pub(crate) fn is_chunked(header_value: Option<&HeaderValue>) -> bool {
    const CHUNKED: &[u8] = b"chunked";
    header_value
        .and_then(|value| value.as_bytes().rsplit(|b| *b == b',').next())
        .is_some_and(|last| last.trim_ascii().eq_ignore_ascii_case(CHUNKED))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, Version};
    use indoc::indoc;

    #[test]
    fn chunked_request_body() {
        let str = indoc! {r##"
        POST /upload HTTP/1.1
        Host: 127.0.0.1:8080
        Transfer-Encoding: chunked

        "##};

        let (header, payload_size) = HeaderDecoder.decode(&mut BytesMut::from(str)).unwrap().unwrap();
        assert_eq!(header.method(), &Method::POST);
        assert!(payload_size.is_chunked());
    }

    #[test]
    fn content_length_request_body() {
        let str = indoc! {r##"
        POST /upload HTTP/1.0
        Content-Length: 12

        "##};

        let (header, payload_size) = HeaderDecoder.decode(&mut BytesMut::from(str)).unwrap().unwrap();
        assert_eq!(header.version(), Version::HTTP_10);
        assert_eq!(payload_size, PayloadSize::Length(12));
    }

    #[test]
    fn both_length_and_chunked_is_rejected() {
        let str = indoc! {r##"
        POST /upload HTTP/1.1
        Content-Length: 12
        Transfer-Encoding: chunked

        "##};

        assert!(HeaderDecoder.decode(&mut BytesMut::from(str)).is_err());
    }

    #[test]
    fn partial_head_needs_more_data() {
        let mut buf = BytesMut::from("GET / HTTP/1.1\r\nHost: loc");
        assert!(HeaderDecoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 25);
    }

    #[test]
    fn chunked_must_be_the_final_coding() {
        let chunked = |value: &'static str| is_chunked(Some(&HeaderValue::from_static(value)));

        assert!(!is_chunked(None));
        assert!(chunked("chunked"));
        assert!(chunked("gzip, Chunked "));
        assert!(!chunked("chunked, gzip"));
        assert!(!chunked("gzip"));
    }

    #[test]
    fn leaves_the_body_in_the_buffer() {
        let mut buf = BytesMut::from("POST /echo HTTP/1.1\r\nContent-Length: 3\r\n\r\n123");

        let (_, payload_size) = HeaderDecoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(payload_size, PayloadSize::Length(3));
        assert_eq!(&buf[..], b"123");
    }

    #[test]
    fn from_curl() {
        let str = indoc! {r##"
        GET /index.html HTTP/1.1
        Host: 127.0.0.1:8080
        User-Agent: curl/7.79.1
        Accept: */*

        "##};

        let mut buf = BytesMut::from(str);

        let (header, payload_decoder) = HeaderDecoder.decode(&mut buf).unwrap().unwrap();

        assert!(payload_decoder.is_empty());

        assert_eq!(header.method(), &Method::GET);
        assert_eq!(header.version(), Version::HTTP_11);
        assert_eq!(header.uri().host(), None);
        assert_eq!(header.uri().path(), "/index.html");
        assert_eq!(header.uri().scheme(), None);
        assert_eq!(header.uri().query(), None);

        assert_eq!(header.headers().len(), 3);

        assert_eq!(header.headers().get(http::header::ACCEPT), Some(&HeaderValue::from_str("*/*").unwrap()));

        assert_eq!(header.headers().get(http::header::HOST), Some(&HeaderValue::from_str("127.0.0.1:8080").unwrap()));

        assert_eq!(header.headers().get(http::header::USER_AGENT), Some(&HeaderValue::from_str("curl/7.79.1").unwrap()));
    }
}
