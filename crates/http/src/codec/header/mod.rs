//! HTTP head codecs.
//!
//! - [`HeaderDecoder`]: parses request heads and decides how the request payload is delimited
//! - [`HeaderEncoder`]: writes response heads

mod header_decoder;
mod header_encoder;

pub use header_decoder::HeaderDecoder;
pub(crate) use header_decoder::is_chunked;
pub use header_encoder::HeaderEncoder;
