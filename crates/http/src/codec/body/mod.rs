//! HTTP body codecs.
//!
//! # Components
//!
//! ## Decoders
//! - [`ChunkedDecoder`]: parses chunked transfer coding, including trailer fields
//! - [`PayloadDecoder`]: request payloads delimited by content-length or chunked coding
//!
//! ## Encoders
//! - [`ChunkedEncoder`]: frames payload items as chunked transfer coding
//! - [`PayloadEncoder`]: writes response payloads by declared length or as-is

mod chunked_decoder;
mod chunked_encoder;
mod payload_decoder;
mod payload_encoder;

pub use chunked_decoder::ChunkedDecoder;
pub use chunked_encoder::ChunkedEncoder;
pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
