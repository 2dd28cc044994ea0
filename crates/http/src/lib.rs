//! Chunked transfer coding for streamed HTTP responses, plus a small HTTP/1.x
//! connection driver to serve them.
//!
//! A response whose size is not known up front can still be sent over a persistent
//! connection when its body is framed with chunked transfer coding. This crate does
//! that framing lazily: the body is wrapped, and each fragment is framed only when the
//! connection pulls it.
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use http::{Request, Response};
//! use spindle_http::chunked::Chunked;
//! use spindle_http::connection::HttpConnection;
//! use spindle_http::handler::make_application;
//! use spindle_http::protocol::ResponseBody;
//! use std::convert::Infallible;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn hello(_req: Request<Bytes>) -> Result<Response<ResponseBody>, Infallible> {
//!     Ok(Response::new(ResponseBody::from("Hello World!\r\n")))
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     let app = Arc::new(Chunked::new(make_application(hello)));
//!     let shutdown = CancellationToken::new();
//!
//!     loop {
//!         let (stream, _) = listener.accept().await?;
//!         let (app, shutdown) = (app.clone(), shutdown.clone());
//!         tokio::spawn(async move {
//!             let (reader, writer) = stream.into_split();
//!             let _ = HttpConnection::new(reader, writer).process(app, shutdown).await;
//!         });
//!     }
//! }
//! ```
//!
//! # Modules
//!
//! - [`chunked`]: the chunking gate and the lazily framing body
//! - [`codec`]: wire encoders and decoders
//! - [`connection`]: the HTTP/1.x connection driver
//! - [`handler`]: the application trait
//! - [`protocol`]: message types, response bodies and errors
//!
//! # Limits
//!
//! - Maximum header size: 8KB
//! - Maximum number of headers: 64
//! - Maximum request body: 8MiB

pub mod chunked;
pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
