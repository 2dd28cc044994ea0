//! Server configuration.
//!
//! A [`ServerConfig`] is read once, from a JSON file or through
//! [`ServerConfig::builder`], and never changes afterwards. Every field has a default,
//! so a configuration file only names what it overrides:
//!
//! ```json
//! {
//!   "host": "0.0.0.0",
//!   "port": 8080,
//!   "pid": "/var/run/spindle.pid",
//!   "daemonize": "on"
//! }
//! ```

use crate::error::ServerError;
use crate::handler::HandlerKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::signal::unix::SignalKind;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 9292;
pub const DEFAULT_HANDLER: &str = "tcp";
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Whether and how the process detaches from its terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Daemonize {
    #[default]
    Off,
    /// detach and redirect stdin, stdout and stderr to `/dev/null`
    On,
    /// detach but keep the standard streams
    NoClose,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileMode {
    #[default]
    None,
    Cpu,
    Wall,
    Object,
    Heap,
}

impl ProfileMode {
    /// File extension of the profile written for this mode.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Cpu => Some("cpu.svg"),
            Self::Wall => Some("wall.svg"),
            Self::Object => Some("objects.json"),
            Self::Heap => Some("heap.json"),
        }
    }
}

/// The signal that asks the server to shut down gracefully.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ShutdownSignal {
    #[default]
    #[serde(alias = "SIGINT")]
    Int,
    #[serde(alias = "SIGTERM")]
    Term,
    #[serde(alias = "SIGHUP")]
    Hup,
    #[serde(alias = "SIGQUIT")]
    Quit,
    #[serde(alias = "SIGUSR1")]
    Usr1,
    #[serde(alias = "SIGUSR2")]
    Usr2,
}

impl ShutdownSignal {
    pub fn name(self) -> &'static str {
        match self {
            Self::Int => "INT",
            Self::Term => "TERM",
            Self::Hup => "HUP",
            Self::Quit => "QUIT",
            Self::Usr1 => "USR1",
            Self::Usr2 => "USR2",
        }
    }

    pub fn kind(self) -> SignalKind {
        match self {
            Self::Int => SignalKind::interrupt(),
            Self::Term => SignalKind::terminate(),
            Self::Hup => SignalKind::hangup(),
            Self::Quit => SignalKind::quit(),
            Self::Usr1 => SignalKind::user_defined1(),
            Self::Usr2 => SignalKind::user_defined2(),
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIG{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    host: String,
    port: u16,
    handler: String,
    socket: Option<PathBuf>,
    environment: String,
    daemonize: Daemonize,
    pid: Option<PathBuf>,
    profile: ProfileMode,
    profile_file: Option<PathBuf>,
    signal: ShutdownSignal,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            handler: DEFAULT_HANDLER.to_owned(),
            socket: None,
            environment: DEFAULT_ENVIRONMENT.to_owned(),
            daemonize: Daemonize::Off,
            pid: None,
            profile: ProfileMode::None,
            profile_file: None,
            signal: ShutdownSignal::Int,
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Reads a configuration file.
    ///
    /// # Errors
    ///
    /// [`ServerError::Configuration`] if the file doesn't exist, and
    /// [`ServerError::InvalidConfiguration`] if it can't be read or parsed, or names a
    /// handler that doesn't exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ServerError::configuration(path),
            _ => ServerError::invalid_configuration(format!("can't read {}: {e}", path.display())),
        })?;

        let config: ServerConfig = serde_json::from_str(&content)
            .map_err(|e| ServerError::invalid_configuration(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ServerError> {
        match HandlerKind::lookup(&self.handler) {
            None => Err(ServerError::invalid_configuration(format!("unknown handler `{}`", self.handler))),
            Some(HandlerKind::Unix) if self.socket.is_none() => {
                Err(ServerError::invalid_configuration("the unix handler needs a `socket` path"))
            }
            Some(_) => Ok(()),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn handler(&self) -> &str {
        &self.handler
    }

    pub fn handler_kind(&self) -> Option<HandlerKind> {
        HandlerKind::lookup(&self.handler)
    }

    pub fn socket(&self) -> Option<&Path> {
        self.socket.as_deref()
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn is_development(&self) -> bool {
        self.environment == DEFAULT_ENVIRONMENT
    }

    pub fn daemonize(&self) -> Daemonize {
        self.daemonize
    }

    pub fn pid(&self) -> Option<&Path> {
        self.pid.as_deref()
    }

    pub fn profile(&self) -> ProfileMode {
        self.profile
    }

    pub fn profile_file(&self) -> Option<&Path> {
        self.profile_file.as_deref()
    }

    pub fn signal(&self) -> ShutdownSignal {
        self.signal
    }
}

#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn handler(mut self, handler: impl Into<String>) -> Self {
        self.config.handler = handler.into();
        self
    }

    pub fn socket(mut self, socket: impl Into<PathBuf>) -> Self {
        self.config.socket = Some(socket.into());
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.config.environment = environment.into();
        self
    }

    pub fn daemonize(mut self, daemonize: Daemonize) -> Self {
        self.config.daemonize = daemonize;
        self
    }

    pub fn pid(mut self, pid: impl Into<PathBuf>) -> Self {
        self.config.pid = Some(pid.into());
        self
    }

    pub fn profile(mut self, profile: ProfileMode) -> Self {
        self.config.profile = profile;
        self
    }

    pub fn profile_file(mut self, profile_file: impl Into<PathBuf>) -> Self {
        self.config.profile_file = Some(profile_file.into());
        self
    }

    pub fn signal(mut self, signal: ShutdownSignal) -> Self {
        self.config.signal = signal;
        self
    }

    pub fn build(self) -> Result<ServerConfig, ServerError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host(), "localhost");
        assert_eq!(config.port(), 9292);
        assert_eq!(config.handler_kind(), Some(HandlerKind::Tcp));
        assert!(config.is_development());
        assert_eq!(config.daemonize(), Daemonize::Off);
        assert_eq!(config.profile(), ProfileMode::None);
        assert_eq!(config.signal(), ShutdownSignal::Int);
        assert!(config.pid().is_none());
    }

    #[test]
    fn load_full_file() {
        let file = write_config(
            r#"{
                "host": "0.0.0.0",
                "port": 8080,
                "handler": "unix",
                "socket": "/tmp/spindle.sock",
                "environment": "production",
                "daemonize": "noclose",
                "pid": "/tmp/spindle.pid",
                "profile": "heap",
                "profile_file": "/tmp/spindle.heap.json",
                "signal": "SIGTERM"
            }"#,
        );

        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(config.host(), "0.0.0.0");
        assert_eq!(config.port(), 8080);
        assert_eq!(config.handler_kind(), Some(HandlerKind::Unix));
        assert_eq!(config.socket(), Some(Path::new("/tmp/spindle.sock")));
        assert!(!config.is_development());
        assert_eq!(config.daemonize(), Daemonize::NoClose);
        assert_eq!(config.pid(), Some(Path::new("/tmp/spindle.pid")));
        assert_eq!(config.profile(), ProfileMode::Heap);
        assert_eq!(config.profile_file(), Some(Path::new("/tmp/spindle.heap.json")));
        assert_eq!(config.signal(), ShutdownSignal::Term);
    }

    #[test]
    fn load_partial_file() {
        let file = write_config(r#"{"port": 3000, "signal": "USR2"}"#);
        let config = ServerConfig::load(file.path()).unwrap();
        assert_eq!(config.port(), 3000);
        assert_eq!(config.signal(), ShutdownSignal::Usr2);
        assert_eq!(config.host(), DEFAULT_HOST);
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");

        let err = ServerConfig::load(&path).unwrap_err();
        assert!(matches!(err, ServerError::Configuration { .. }));
        assert_eq!(err.to_string(), format!("configuration {} not found", path.display()));
    }

    #[test]
    fn invalid_files() {
        for content in [r#"{"port": "eighty"}"#, r#"{"daemonize": "sometimes"}"#, r#"{"listen": 1}"#, r#"{"handler": "webrick"}"#, "not json"] {
            let file = write_config(content);
            let err = ServerConfig::load(file.path()).unwrap_err();
            assert!(matches!(err, ServerError::InvalidConfiguration { .. }), "{content}: {err}");
        }
    }

    #[test]
    fn builder_validates() {
        let config = ServerConfig::builder().host("127.0.0.1").port(0).handler("micro").build().unwrap();
        assert_eq!(config.handler_kind(), Some(HandlerKind::Tcp));

        let err = ServerConfig::builder().handler("unix").build().unwrap_err();
        assert!(matches!(err, ServerError::InvalidConfiguration { .. }));

        let config = ServerConfig::builder().handler("unix").socket("/tmp/s.sock").build().unwrap();
        assert_eq!(config.handler_kind(), Some(HandlerKind::Unix));
    }

    #[test]
    fn profile_extensions() {
        assert_eq!(ProfileMode::None.extension(), None);
        assert_eq!(ProfileMode::Cpu.extension(), Some("cpu.svg"));
        assert_eq!(ProfileMode::Wall.extension(), Some("wall.svg"));
        assert_eq!(ProfileMode::Object.extension(), Some("objects.json"));
        assert_eq!(ProfileMode::Heap.extension(), Some("heap.json"));
    }

    #[test]
    fn signal_names() {
        assert_eq!(ShutdownSignal::Int.to_string(), "SIGINT");
        assert_eq!(ShutdownSignal::Usr1.name(), "USR1");
    }
}
