//! HTTP request decoder.
//!
//! The decoder works in two phases: the head is parsed by [`HeaderDecoder`], then the
//! payload (if any) by a [`PayloadDecoder`] chosen from the head. The connection driver
//! sees a `Message::Header` followed by `Message::Payload` items up to and including a
//! terminal item.

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::protocol::{Message, ParseError, PayloadSize, RequestHeader};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// A decoder for HTTP requests that handles both headers and payload.
///
/// - `payload_decoder == None`: parsing the next request head
/// - `payload_decoder == Some(_)`: parsing the current request's payload
#[derive(Debug, Default)]
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHeader, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode(src)? {
                Some(item) => {
                    if item.is_eof() {
                        self.payload_decoder.take();
                    }
                    Some(Message::Payload(item))
                }
                None => None,
            };

            return Ok(message);
        }

        let message = self.header_decoder.decode(src)?.map(|(header, payload_size)| {
            self.payload_decoder = Some(payload_size.into());
            Message::Header((header, payload_size))
        });

        Ok(message)
    }
}
