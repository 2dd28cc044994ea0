//! Runs one spindle server per process.
//!
//! [`Supervisor`] takes a [`ServerConfig`] and an
//! [`Application`](spindle_http::handler::Application) and owns everything around
//! serving it: the pidfile, daemonizing, the shutdown signal and optional profiling.
//! Every response goes through the chunking gate of [`spindle_http::chunked`] before a
//! handler writes it.
//!
//! ```no_run
//! use bytes::Bytes;
//! use http::{Request, Response};
//! use spindle_http::handler::make_application;
//! use spindle_http::protocol::ResponseBody;
//! use spindle_server::{ServerConfig, Supervisor};
//! use std::convert::Infallible;
//!
//! async fn hello(_req: Request<Bytes>) -> Result<Response<ResponseBody>, Infallible> {
//!     Ok(Response::new(ResponseBody::from("hello")))
//! }
//!
//! let config = ServerConfig::builder().host("127.0.0.1").port(9292).pid("/tmp/spindle.pid").build()?;
//! Supervisor::new(config).start(make_application(hello), |listening| println!("listening: {listening}"))?;
//! # Ok::<(), spindle_server::ServerError>(())
//! ```

pub mod config;
pub mod error;
pub mod handler;
pub mod profile;
pub mod supervisor;

pub use config::ServerConfig;
pub use error::ServerError;
pub use supervisor::{Supervisor, SupervisorState};
