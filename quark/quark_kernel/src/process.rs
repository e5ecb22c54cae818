//! Process objects and their lifecycle.
//!
//! A process is a named execution of a program image. Its status moves
//! through a monotone state machine: `Created` until started, `Running`
//! while its body executes on a dedicated task, then exactly one of the
//! terminal states. Terminal states are absorbing; there is no restart.
//!
//! Cancellation is advisory. The process owns a [`CancelSource`]; the
//! kernel hands the matching token to the process body through its
//! execution context and never aborts the body itself.

use parking_lot::Mutex;

use quark_core::{CancelReason, Koid, ProcessError, ProcessStatus};

use crate::context::{CancelSource, CancelToken};
use crate::program::ProgramImage;

/// A process.
pub struct Process {
    koid: Koid,
    name: String,
    program: ProgramImage,
    status: Mutex<ProcessStatus>,
    cancel: CancelSource,
}

impl Process {
    pub(crate) fn new(koid: Koid, name: String, program: ProgramImage) -> Self {
        Self {
            koid,
            name,
            program,
            status: Mutex::new(ProcessStatus::Created),
            cancel: CancelSource::new(),
        }
    }

    /// The process's koid.
    pub fn koid(&self) -> Koid {
        self.koid
    }

    /// The process name, already truncated to the configured cap.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name of the program this process runs.
    pub fn program_name(&self) -> &str {
        self.program.name()
    }

    /// Current lifecycle status.
    pub fn status(&self) -> ProcessStatus {
        *self.status.lock()
    }

    /// Ask the process to stop. Advisory; the body observes it through its
    /// execution context. The first reason wins.
    pub fn cancel(&self, reason: CancelReason) {
        self.cancel.cancel(reason);
    }

    pub(crate) fn cancel_token(&self) -> CancelToken {
        self.cancel.token()
    }

    pub(crate) fn program(&self) -> &ProgramImage {
        &self.program
    }

    /// Claim the one `Created` to `Running` transition.
    pub(crate) fn set_running(&self) -> Result<(), ProcessError> {
        let mut status = self.status.lock();
        match *status {
            ProcessStatus::Created => {
                *status = ProcessStatus::Running;
                Ok(())
            }
            other => Err(ProcessError::InvalidState(other)),
        }
    }

    /// Record the terminal status. Called exactly once, when the body
    /// returns.
    pub(crate) fn finish(&self, terminal: ProcessStatus) {
        debug_assert!(terminal.is_terminal());
        let mut status = self.status.lock();
        if !status.is_terminal() {
            *status = terminal;
        }
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("koid", &self.koid)
            .field("name", &self.name)
            .field("program", &self.program.name())
            .field("status", &self.status())
            .finish()
    }
}
