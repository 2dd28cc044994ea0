use bytes::{Buf, Bytes};
use http::HeaderMap;

/// Represents a HTTP message that can either be a header or payload.
///
/// The generic parameter `T` is the head type (request head plus its payload size,
/// or response head plus its payload size), while `Data` is the payload buffer type.
pub enum Message<T, Data: Buf = Bytes> {
    /// Contains the header information of type `T`
    Header(T),
    /// Contains a chunk of payload data, the trailer fields or the EOF marker
    Payload(PayloadItem<Data>),
}

/// Represents an item in the HTTP message payload stream.
///
/// A payload is a run of `Chunk`s closed by exactly one terminal item: either
/// `Trailers` (the payload ended and carried trailer fields) or `Eof`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    /// A chunk of payload data
    Chunk(Data),
    /// Marks the end of the payload stream, carrying trailer fields
    Trailers(HeaderMap),
    /// Marks the end of the payload stream
    Eof,
}

/// Describes how the payload of a message is delimited on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload with known length in bytes
    Length(u64),
    /// Payload using chunked transfer encoding, request side only
    Chunked,
    /// Payload bytes are written as they come: either already framed by a transfer
    /// coding the application applied, or delimited by closing the connection
    Streamed,
    /// Empty payload (no body)
    Empty,
}

impl PayloadSize {
    /// Returns true if the payload uses chunked transfer encoding
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    /// Returns true if the payload is written without any framing of our own
    #[inline]
    pub fn is_streamed(&self) -> bool {
        matches!(self, PayloadSize::Streamed)
    }

    /// Returns true if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }
}

impl<T> Message<T> {
    /// Returns true if this message contains payload data
    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }

    /// Returns true if this message contains header information
    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }

    /// Converts the message into a PayloadItem if it contains payload data
    pub fn into_payload_item(self) -> Option<PayloadItem> {
        match self {
            Message::Header(_) => None,
            Message::Payload(payload_item) => Some(payload_item),
        }
    }
}

impl<T> From<Bytes> for Message<T> {
    fn from(bytes: Bytes) -> Self {
        Self::Payload(PayloadItem::Chunk(bytes))
    }
}

impl<D: Buf> PayloadItem<D> {
    /// Returns true if this item ends the payload stream, with or without trailers
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof | PayloadItem::Trailers(_))
    }

    /// Returns true if this item contains chunk data
    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }

    /// Returns the trailer fields if this is a `Trailers` item
    pub fn trailers(&self) -> Option<&HeaderMap> {
        match self {
            PayloadItem::Trailers(trailers) => Some(trailers),
            _ => None,
        }
    }
}

impl PayloadItem {
    /// Returns a reference to the contained bytes if this is a Chunk
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Consumes the PayloadItem and returns the contained bytes if this is a Chunk
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            _ => None,
        }
    }
}
