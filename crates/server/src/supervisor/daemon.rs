use crate::config::Daemonize;
use crate::error::ServerError;
use std::io;
use tracing::info;

/// Detaches the process from its terminal.
///
/// Must run before the async runtime exists: only the calling thread survives the fork.
/// The working directory is kept, so relative paths in the configuration stay valid.
pub(crate) fn daemonize(mode: Daemonize) -> Result<(), ServerError> {
    let noclose = match mode {
        Daemonize::Off => return Ok(()),
        Daemonize::On => 0,
        Daemonize::NoClose => 1,
    };

    info!(?mode, "daemonize");
    // SAFETY: no other thread exists yet, so the forked child can't inherit a lock held
    // by a thread that is gone.
    let result = unsafe { libc::daemon(1, noclose) };
    if result != 0 {
        return Err(ServerError::daemonize(io::Error::last_os_error()));
    }

    info!(pid = std::process::id(), "running in background");
    Ok(())
}
