//! Decoder for request payloads.
//!
//! A request body is delimited either by `content-length` or by the chunked transfer
//! coding; bodiless requests decode straight to EOF.

use std::cmp;

use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::protocol::{ParseError, PayloadItem, PayloadSize};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDecoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// bytes still expected before the content-length is reached
    Length(u64),

    /// transfer-encoding chunked payload
    Chunked(ChunkedDecoder),

    NoBody,
}

impl PayloadDecoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new()) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(size) }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, Kind::NoBody)
    }
}

impl From<PayloadSize> for PayloadDecoder {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(size) => PayloadDecoder::fix_length(size),
            PayloadSize::Chunked => PayloadDecoder::chunked(),
            // requests are never delimited by closing the connection
            PayloadSize::Streamed | PayloadSize::Empty => PayloadDecoder::empty(),
        }
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(0) | Kind::NoBody => Ok(Some(PayloadItem::Eof)),
            Kind::Length(remaining) => {
                if src.is_empty() {
                    return Ok(None);
                }

                let len = cmp::min(*remaining, src.len() as u64);
                // len <= src.len(), so it fits in usize
                let bytes = src.split_to(usize::try_from(len).unwrap_or(src.len())).freeze();
                *remaining -= bytes.len() as u64;
                Ok(Some(PayloadItem::Chunk(bytes)))
            }
            Kind::Chunked(chunked_decoder) => chunked_decoder.decode(src),
        }
    }
}
