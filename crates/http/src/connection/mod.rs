//! Serving HTTP/1.x over a byte stream.
//!
//! [`HttpConnection`] decodes requests, calls the application and writes responses,
//! keeping the connection open between requests when both sides allow it.

mod http_connection;

pub use http_connection::{HttpConnection, MAX_BODY_SIZE};
