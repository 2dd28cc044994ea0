//! Network handlers: the servers a supervisor can run.
//!
//! A [`ListenHandler`] binds, reports readiness through a callback, serves until asked
//! to stop and then returns. Handlers that can be stopped from outside hand out a
//! [`Shutdown`] capability. The set of handlers is closed: [`HandlerKind`] names them
//! and [`HandlerKind::lookup`] resolves configuration names through a fixed table.

mod tcp;
mod unix;

pub use tcp::TcpHandler;
pub use unix::UnixHandler;

use crate::config::ServerConfig;
use crate::error::ServerError;
use async_trait::async_trait;
use spindle_http::connection::HttpConnection;
use spindle_http::handler::Application;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Called once the handler is listening.
pub type ReadyCallback = Box<dyn FnOnce(Listening) + Send>;

#[async_trait]
pub trait ListenHandler: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Serves `app` until the handler is shut down.
    ///
    /// `ready` is called once, after the listener is bound and before the first
    /// connection is accepted.
    async fn run(&self, app: Arc<dyn Application>, config: &ServerConfig, ready: ReadyCallback) -> Result<(), ServerError>;

    /// The capability to stop a running handler, if it has one.
    fn shutdown(&self) -> Option<Arc<dyn Shutdown>>;
}

/// Asks a running handler to stop.
///
/// The handler stops accepting connections, lets in-flight requests finish, and then
/// returns from [`ListenHandler::run`]. Safe to call from any thread, any number of times.
pub trait Shutdown: Send + Sync + fmt::Debug {
    fn shutdown(&self) -> Result<(), ServerError>;
}

#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Shutdown for ShutdownHandle {
    fn shutdown(&self) -> Result<(), ServerError> {
        if !self.token.is_cancelled() {
            info!("shutdown requested, stop accepting connections");
            self.token.cancel();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "{addr}"),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// What a handler reports once it is listening.
#[derive(Debug, Clone)]
pub struct Listening {
    name: &'static str,
    addr: ListenAddr,
    shutdown: Option<Arc<dyn Shutdown>>,
}

impl Listening {
    pub fn new(name: &'static str, addr: ListenAddr, shutdown: Option<Arc<dyn Shutdown>>) -> Self {
        Self { name, addr, shutdown }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn addr(&self) -> &ListenAddr {
        &self.addr
    }

    pub fn shutdown(&self) -> Option<Arc<dyn Shutdown>> {
        self.shutdown.clone()
    }
}

impl fmt::Display for Listening {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.name, self.addr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Tcp,
    Unix,
}

const REGISTRY: &[(&str, HandlerKind)] = &[("tcp", HandlerKind::Tcp), ("micro", HandlerKind::Tcp), ("unix", HandlerKind::Unix)];

impl HandlerKind {
    /// Resolves a configured handler name, ignoring ASCII case.
    pub fn lookup(name: &str) -> Option<Self> {
        REGISTRY.iter().find(|(registered, _)| registered.eq_ignore_ascii_case(name)).map(|(_, kind)| *kind)
    }

    pub fn create(self) -> Arc<dyn ListenHandler> {
        match self {
            Self::Tcp => Arc::new(TcpHandler::new()),
            Self::Unix => Arc::new(UnixHandler::new()),
        }
    }
}

fn spawn_connection<R, W>(tracker: &TaskTracker, app: Arc<dyn Application>, shutdown: CancellationToken, reader: R, writer: W)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tracker.spawn(async move {
        match HttpConnection::new(reader, writer).process(app, shutdown).await {
            Ok(()) => debug!("finished process, connection shutdown"),
            Err(e) => warn!(cause = %e, "service has error, connection shutdown"),
        }
    });
}

async fn drain(tracker: TaskTracker) {
    tracker.close();
    info!(connections = tracker.len(), "stopped accepting, wait for in-flight connections");
    tracker.wait().await;
}
