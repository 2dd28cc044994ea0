use super::pidfile::PidFile;
use super::state::{Lifecycle, SupervisorState};
use crate::config::ShutdownSignal;
use crate::error::ServerError;
use crate::handler::Shutdown;
use std::sync::Arc;
use tokio::signal::unix::signal;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Listens for `shutdown_signal` and stops the server when it arrives.
///
/// With a shutdown capability, the handler is asked to stop and the listener keeps
/// running; later signals are only logged. A failing shutdown is reported once through
/// `failures`. Without the capability the process exits right away, after releasing
/// the pidfile.
pub(crate) fn listen(
    shutdown_signal: ShutdownSignal,
    target: Option<Arc<dyn Shutdown>>,
    lifecycle: Lifecycle,
    pidfile: Option<PidFile>,
    failures: oneshot::Sender<ServerError>,
) -> Result<JoinHandle<()>, ServerError> {
    let mut signals = signal(shutdown_signal.kind()).map_err(|e| ServerError::signal(shutdown_signal.name(), e))?;

    Ok(tokio::spawn(async move {
        let mut failures = Some(failures);

        while signals.recv().await.is_some() {
            info!(signal = %shutdown_signal, "receive signal");
            match on_signal(target.as_deref(), &lifecycle, pidfile.as_ref()) {
                Outcome::Repeated => warn!(signal = %shutdown_signal, "shutdown already in progress"),
                Outcome::Stopping(Ok(())) => {}
                Outcome::Stopping(Err(e)) => {
                    if let Some(failures) = failures.take() {
                        let _ = failures.send(e);
                    }
                }
                Outcome::Exit => std::process::exit(0),
            }
        }
    }))
}

#[derive(Debug)]
enum Outcome {
    /// shutdown was already requested by an earlier signal
    Repeated,
    /// the handler was asked to stop
    Stopping(Result<(), ServerError>),
    /// no way to stop the handler: the pidfile is released and the process must exit
    Exit,
}

/// Reacts to one delivery of the shutdown signal.
fn on_signal(target: Option<&dyn Shutdown>, lifecycle: &Lifecycle, pidfile: Option<&PidFile>) -> Outcome {
    if !lifecycle.request_shutdown() {
        return Outcome::Repeated;
    }

    let Some(target) = target else {
        info!("handler can't shut down gracefully, exit");
        if let Some(pidfile) = pidfile {
            pidfile.release();
        }
        return Outcome::Exit;
    };

    if !lifecycle.advance(SupervisorState::Running, SupervisorState::ShuttingDown) {
        // the signal may arrive before the handler reported ready
        lifecycle.advance(SupervisorState::Starting, SupervisorState::ShuttingDown);
    }
    info!(state = ?lifecycle.state(), "shutting down");

    let result = target.shutdown();
    if let Err(e) = &result {
        error!(cause = %e, "shutdown failed");
    }
    Outcome::Stopping(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::ShutdownHandle;
    use std::fs;

    #[derive(Debug)]
    struct Refusing;

    impl Shutdown for Refusing {
        fn shutdown(&self) -> Result<(), ServerError> {
            Err(ServerError::shutdown("listener refused to stop"))
        }
    }

    fn running() -> Lifecycle {
        let lifecycle = Lifecycle::default();
        lifecycle.transition(SupervisorState::Running);
        lifecycle
    }

    #[test]
    fn first_signal_stops_the_handler() {
        let lifecycle = running();
        let handle = ShutdownHandle::new();

        assert!(matches!(on_signal(Some(&handle), &lifecycle, None), Outcome::Stopping(Ok(()))));
        assert!(handle.is_shutdown());
        assert!(lifecycle.shutdown_requested());
        assert_eq!(lifecycle.state(), SupervisorState::ShuttingDown);

        assert!(matches!(on_signal(Some(&handle), &lifecycle, None), Outcome::Repeated));
    }

    #[test]
    fn failing_shutdown_is_reported() {
        let lifecycle = running();

        let Outcome::Stopping(Err(e)) = on_signal(Some(&Refusing), &lifecycle, None) else {
            panic!("expect the shutdown failure");
        };
        assert_eq!(e.to_string(), "shutdown failed: listener refused to stop");
    }

    #[test]
    fn signal_during_startup_is_recorded() {
        let lifecycle = Lifecycle::default();
        lifecycle.transition(SupervisorState::Starting);

        assert!(matches!(on_signal(Some(&ShutdownHandle::new()), &lifecycle, None), Outcome::Stopping(Ok(()))));
        assert_eq!(lifecycle.state(), SupervisorState::ShuttingDown);
        // a late ready callback can't move it back to running
        assert!(!lifecycle.advance(SupervisorState::Starting, SupervisorState::Running));
    }

    #[test]
    fn no_capability_releases_pidfile_and_exits() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = PidFile::new(dir.path().join("spindle.pid"));
        let guard = pidfile.write().unwrap();
        let lifecycle = running();

        assert!(matches!(on_signal(None, &lifecycle, Some(&pidfile)), Outcome::Exit));
        assert!(fs::metadata(pidfile.path()).is_err());
        drop(guard);
    }
}
