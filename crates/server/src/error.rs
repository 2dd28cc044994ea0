use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration {} not found", .path.display())]
    Configuration { path: PathBuf },

    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("already running (pid: {pid}, file: {})", .file.display())]
    AlreadyRunning { pid: i32, file: PathBuf },

    #[error("pidfile {} error: {source}", .file.display())]
    Pidfile { file: PathBuf, source: io::Error },

    #[error("daemonize failed: {source}")]
    Daemonize { source: io::Error },

    #[error("can't listen for SIG{signal}: {source}")]
    Signal { signal: &'static str, source: io::Error },

    #[error("can't bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("shutdown failed: {reason}")]
    Shutdown { reason: String },
}

impl ServerError {
    pub fn configuration<P: Into<PathBuf>>(path: P) -> Self {
        Self::Configuration { path: path.into() }
    }

    pub fn invalid_configuration<S: ToString>(str: S) -> Self {
        Self::InvalidConfiguration { reason: str.to_string() }
    }

    pub fn already_running(pid: i32, file: &Path) -> Self {
        Self::AlreadyRunning { pid, file: file.to_path_buf() }
    }

    pub fn pidfile(file: &Path, source: io::Error) -> Self {
        Self::Pidfile { file: file.to_path_buf(), source }
    }

    pub fn daemonize(source: io::Error) -> Self {
        Self::Daemonize { source }
    }

    pub fn signal(signal: &'static str, source: io::Error) -> Self {
        Self::Signal { signal, source }
    }

    pub fn bind<S: ToString>(addr: S, source: io::Error) -> Self {
        Self::Bind { addr: addr.to_string(), source }
    }

    pub fn shutdown<S: ToString>(str: S) -> Self {
        Self::Shutdown { reason: str.to_string() }
    }

    /// Returns true for errors that stop the process before it starts serving.
    pub fn is_startup_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::InvalidConfiguration { .. }
                | Self::AlreadyRunning { .. }
                | Self::Pidfile { .. }
                | Self::Daemonize { .. }
                | Self::Signal { .. }
                | Self::Bind { .. }
        )
    }
}
