use super::{ListenAddr, ListenHandler, Listening, ReadyCallback, Shutdown, ShutdownHandle, drain, spawn_connection};
use crate::config::ServerConfig;
use crate::error::ServerError;
use async_trait::async_trait;
use spindle_http::handler::Application;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::select;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

/// Serves HTTP/1.x over a Unix domain socket at the configured `socket` path.
#[derive(Debug, Default)]
pub struct UnixHandler {
    shutdown: ShutdownHandle,
}

impl UnixHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ListenHandler for UnixHandler {
    fn name(&self) -> &'static str {
        "unix"
    }

    async fn run(&self, app: Arc<dyn Application>, config: &ServerConfig, ready: ReadyCallback) -> Result<(), ServerError> {
        let path = config.socket().ok_or_else(|| ServerError::invalid_configuration("the unix handler needs a `socket` path"))?;
        remove_stale_socket(path)?;

        let unix_listener = UnixListener::bind(path).map_err(|e| ServerError::bind(path.display(), e))?;
        info!(path = %path.display(), "start listening");

        ready(Listening::new(self.name(), ListenAddr::Unix(path.to_path_buf()), self.shutdown()));

        let token = self.shutdown.token();
        let tracker = TaskTracker::new();
        loop {
            let unix_stream = select! {
                () = token.cancelled() => break,
                accepted = unix_listener.accept() => match accepted {
                    Ok((unix_stream, _)) => unix_stream,
                    Err(e) => {
                        warn!(cause = %e, "failed to accept");
                        continue;
                    }
                },
            };

            trace!("accept connection");
            let (reader, writer) = unix_stream.into_split();
            spawn_connection(&tracker, Arc::clone(&app), token.clone(), reader, writer);
        }

        drop(unix_listener);
        drain(tracker).await;
        if let Err(e) = fs::remove_file(path) {
            debug!(cause = %e, path = %path.display(), "can't remove socket file");
        }
        info!(path = %path.display(), "server stopped");
        Ok(())
    }

    fn shutdown(&self) -> Option<Arc<dyn Shutdown>> {
        Some(Arc::new(self.shutdown.clone()))
    }
}

/// Removes a socket file left behind by a previous run. Anything else at `path` is kept,
/// so binding fails instead of deleting it.
fn remove_stale_socket(path: &Path) -> Result<(), ServerError> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_socket() => {
            debug!(path = %path.display(), "remove stale socket file");
            fs::remove_file(path).map_err(|e| ServerError::bind(path.display(), e))
        }
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ServerError::bind(path.display(), e)),
    }
}
