//! The process supervisor.
//!
//! A [`Supervisor`] owns one server for the lifetime of the process. [`Supervisor::start`]
//! runs these steps in order:
//!
//! 1. check the pidfile: a live process recorded in it aborts startup
//! 2. daemonize, if configured (before any thread exists)
//! 3. write the pidfile
//! 4. build the tokio runtime and listen for the shutdown signal
//! 5. run the handler with the chunking gate in front of the application, inside the
//!    profiler if one is configured
//!
//! The shutdown signal asks the handler to stop; `start` returns once the handler has
//! drained its connections.

mod daemon;
mod pidfile;
mod signal;
mod state;

pub use pidfile::{PidFile, PidGuard, PidStatus};
pub use state::SupervisorState;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::handler::{HandlerKind, ListenHandler, Listening, ReadyCallback};
use crate::profile;
use spindle_http::chunked::Chunked;
use spindle_http::handler::Application;
use state::Lifecycle;
use std::sync::Arc;
use tokio::select;
use tokio::sync::oneshot;
use tracing::{error, info};

#[derive(Debug)]
pub struct Supervisor {
    config: ServerConfig,
    lifecycle: Lifecycle,
}

impl Supervisor {
    pub fn new(config: ServerConfig) -> Self {
        Self { config, lifecycle: Lifecycle::default() }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> SupervisorState {
        self.lifecycle.state()
    }

    /// Returns true once the shutdown signal has been received.
    pub fn shutdown_requested(&self) -> bool {
        self.lifecycle.shutdown_requested()
    }

    /// Runs `app` until the server is shut down.
    ///
    /// `on_ready` is called once the handler is listening. A supervisor starts only once.
    ///
    /// # Errors
    ///
    /// Startup failures (unknown handler, pidfile owned by a live process, daemonize or
    /// bind failures) leave the supervisor [`Aborted`](SupervisorState::Aborted). A
    /// failing shutdown is returned as is.
    pub fn start<A, F>(&self, app: A, on_ready: F) -> Result<(), ServerError>
    where
        A: Application + 'static,
        F: FnOnce(Listening) + Send + 'static,
    {
        let Some(kind) = self.config.handler_kind() else {
            self.lifecycle.transition(SupervisorState::Aborted);
            return Err(ServerError::invalid_configuration(format!("unknown handler `{}`", self.config.handler())));
        };

        if !self.lifecycle.advance(SupervisorState::Created, SupervisorState::Starting) {
            return Err(ServerError::invalid_configuration("a supervisor can only be started once"));
        }

        let result = self.run(kind, app, on_ready);

        let end = if self.state() == SupervisorState::Starting { SupervisorState::Aborted } else { SupervisorState::Stopped };
        self.lifecycle.transition(end);
        match &result {
            Ok(()) => info!("supervisor stopped"),
            Err(e) => error!(cause = %e, state = ?end, "supervisor finished with error"),
        }
        result
    }

    fn run<A, F>(&self, kind: HandlerKind, app: A, on_ready: F) -> Result<(), ServerError>
    where
        A: Application + 'static,
        F: FnOnce(Listening) + Send + 'static,
    {
        let pidfile = self.config.pid().map(PidFile::new);
        if let Some(pidfile) = &pidfile {
            pidfile.check()?;
        }

        daemon::daemonize(self.config.daemonize())?;

        let _pid_guard = pidfile.as_ref().map(PidFile::write).transpose()?;

        let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;

        let lifecycle = self.lifecycle.clone();
        let ready: ReadyCallback = Box::new(move |listening| {
            if lifecycle.advance(SupervisorState::Starting, SupervisorState::Running) {
                info!(%listening, "server ready");
            } else {
                info!(%listening, state = ?lifecycle.state(), "server ready while shutting down");
            }
            on_ready(listening);
        });

        runtime.block_on(self.serve(kind.create(), Arc::new(Chunked::new(app)), pidfile, ready))
    }

    async fn serve(
        &self,
        handler: Arc<dyn ListenHandler>,
        app: Arc<dyn Application>,
        pidfile: Option<PidFile>,
        ready: ReadyCallback,
    ) -> Result<(), ServerError> {
        let (failure_sender, mut failure_receiver) = oneshot::channel();
        let signal_listener =
            signal::listen(self.config.signal(), handler.shutdown(), self.lifecycle.clone(), pidfile, failure_sender)?;

        info!(handler = handler.name(), signal = %self.config.signal(), environment = self.config.environment(), "starting server");
        let run = profile::with_profiling(self.config.profile(), self.config.profile_file(), handler.run(app, &self.config, ready));

        let result = select! {
            result = run => result,
            Ok(e) = &mut failure_receiver => Err(e),
        };

        signal_listener.abort();
        result
    }
}
