use super::{ListenAddr, ListenHandler, Listening, ReadyCallback, Shutdown, ShutdownHandle, drain, spawn_connection};
use crate::config::ServerConfig;
use crate::error::ServerError;
use async_trait::async_trait;
use spindle_http::handler::Application;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::select;
use tokio_util::task::TaskTracker;
use tracing::{info, trace, warn};

/// Serves HTTP/1.x over TCP on the configured host and port.
#[derive(Debug, Default)]
pub struct TcpHandler {
    shutdown: ShutdownHandle,
}

impl TcpHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ListenHandler for TcpHandler {
    fn name(&self) -> &'static str {
        "tcp"
    }

    async fn run(&self, app: Arc<dyn Application>, config: &ServerConfig, ready: ReadyCallback) -> Result<(), ServerError> {
        let (host, port) = (config.host(), config.port());
        let tcp_listener = TcpListener::bind((host, port)).await.map_err(|e| ServerError::bind(format!("{host}:{port}"), e))?;
        let local_addr = tcp_listener.local_addr()?;
        info!(%local_addr, "start listening");

        ready(Listening::new(self.name(), ListenAddr::Tcp(local_addr), self.shutdown()));

        let token = self.shutdown.token();
        let tracker = TaskTracker::new();
        loop {
            let (tcp_stream, remote_addr) = select! {
                () = token.cancelled() => break,
                accepted = tcp_listener.accept() => match accepted {
                    Ok(stream_and_addr) => stream_and_addr,
                    Err(e) => {
                        warn!(cause = %e, "failed to accept");
                        continue;
                    }
                },
            };

            trace!(%remote_addr, "accept connection");
            let (reader, writer) = tcp_stream.into_split();
            spawn_connection(&tracker, Arc::clone(&app), token.clone(), reader, writer);
        }

        drop(tcp_listener);
        drain(tracker).await;
        info!(%local_addr, "server stopped");
        Ok(())
    }

    fn shutdown(&self) -> Option<Arc<dyn Shutdown>> {
        Some(Arc::new(self.shutdown.clone()))
    }
}
