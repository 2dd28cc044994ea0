use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Lifecycle of a supervised server.
///
/// `Created → Starting → Running → ShuttingDown → Stopped`, or `Aborted` when startup
/// fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SupervisorState {
    Created = 0,
    Starting = 1,
    Running = 2,
    ShuttingDown = 3,
    Stopped = 4,
    Aborted = 5,
}

impl SupervisorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::ShuttingDown,
            4 => Self::Stopped,
            _ => Self::Aborted,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Aborted)
    }
}

/// State shared between the supervisor and its signal listener. Lock free: the state is
/// an atomic cell and shutdown is a one-way flag.
#[derive(Debug, Clone)]
pub(crate) struct Lifecycle {
    state: Arc<AtomicU8>,
    shutdown_requested: Arc<AtomicBool>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(SupervisorState::Created as u8)),
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Lifecycle {
    pub(crate) fn state(&self) -> SupervisorState {
        SupervisorState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn transition(&self, to: SupervisorState) {
        self.state.store(to as u8, Ordering::Release);
    }

    /// Moves `from` to `to`, unless another transition happened first.
    pub(crate) fn advance(&self, from: SupervisorState, to: SupervisorState) -> bool {
        self.state.compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    /// Raises the shutdown flag. Returns false if it was already raised.
    pub(crate) fn request_shutdown(&self) -> bool {
        !self.shutdown_requested.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }
}
