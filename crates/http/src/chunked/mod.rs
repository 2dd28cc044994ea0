//! Chunked transfer coding for streamed responses.
//!
//! [`chunk_response`] decides whether a response gets chunked and, if so, rewraps its
//! body in a [`ChunkedBody`], which frames fragments lazily as the connection pulls them.
//! [`Chunked`] applies the decision to every response of an [`Application`](crate::handler::Application).

mod body;
mod gate;

pub use body::ChunkedBody;
pub use gate::{Chunked, chunk_response};
