//! Execution contexts and cooperative cancellation.
//!
//! Every started process receives an [`ExecContext`]: its identity, its
//! kernel, a cancellation token, and an optional deadline. The context is
//! how process bodies issue syscalls (the kernel attributes each call to the
//! context's process) and how they observe cancellation. Nothing here stops
//! a process; a body that never checks its context simply runs until it
//! returns on its own, and `Kernel::wait` waits for it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use quark_core::{
    CancelReason, Error, Handle, Koid, Message, ProcessError, ProcessStatus, ReadLimits, Result,
};

use crate::kernel::Kernel;

/// The cancelling half of a cancellation pair.
pub struct CancelSource {
    tx: watch::Sender<Option<CancelReason>>,
}

impl CancelSource {
    /// Create a source with no cancellation recorded.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Record a cancellation and wake every waiting token. The first reason
    /// wins; later calls are no-ops.
    pub fn cancel(&self, reason: CancelReason) {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }

    /// A token observing this source.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

/// The observing half of a cancellation pair.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<Option<CancelReason>>,
}

impl CancelToken {
    /// The recorded cancellation reason, if any.
    pub fn reason(&self) -> Option<CancelReason> {
        *self.rx.borrow()
    }

    /// Check whether a cancellation has been recorded.
    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Suspend until a cancellation is recorded.
    pub async fn cancelled(&self) -> CancelReason {
        let mut rx = self.rx.clone();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            if rx.changed().await.is_err() {
                // Source dropped without cancelling; nothing will ever fire.
                std::future::pending::<()>().await;
            }
        }
    }
}

/// A process's execution context.
///
/// Carries the kernel reference, the process identity used to attribute
/// syscalls, the cancellation token, and the optional execution deadline.
#[derive(Clone)]
pub struct ExecContext {
    kernel: Arc<Kernel>,
    process: Koid,
    token: CancelToken,
    deadline: Option<Instant>,
}

impl ExecContext {
    pub(crate) fn new(
        kernel: Arc<Kernel>,
        process: Koid,
        token: CancelToken,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            kernel,
            process,
            token,
            deadline,
        }
    }

    /// The kernel this context belongs to.
    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// The koid of the process this context executes.
    pub fn process_koid(&self) -> Koid {
        self.process
    }

    /// The execution deadline, if one was configured.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time remaining until the deadline, if one was configured.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    fn deadline_elapsed(&self) -> bool {
        matches!(self.deadline, Some(deadline) if Instant::now() >= deadline)
    }

    /// Check whether this context has been cancelled or its deadline has
    /// elapsed.
    pub fn is_cancelled(&self) -> bool {
        self.check().is_err()
    }

    /// `Ok` while the process should keep running, otherwise the error
    /// describing why it should stop. Composes with `?` in process bodies.
    pub fn check(&self) -> std::result::Result<(), ProcessError> {
        if let Some(reason) = self.token.reason() {
            return Err(match reason {
                CancelReason::DeadlineElapsed => ProcessError::DeadlineExceeded,
                _ => ProcessError::Cancelled,
            });
        }
        if self.deadline_elapsed() {
            return Err(ProcessError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Suspend until this context is cancelled or its deadline elapses.
    pub async fn cancelled(&self) -> ProcessError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                reason = self.token.cancelled() => match reason {
                    CancelReason::DeadlineElapsed => ProcessError::DeadlineExceeded,
                    _ => ProcessError::Cancelled,
                },
                _ = tokio::time::sleep_until(deadline) => ProcessError::DeadlineExceeded,
            },
            None => match self.token.cancelled().await {
                CancelReason::DeadlineElapsed => ProcessError::DeadlineExceeded,
                _ => ProcessError::Cancelled,
            },
        }
    }

    // Syscall surface, attributed to this context's process.

    /// Create a channel; both endpoint handles land in this process's table.
    pub fn channel_create(&self) -> Result<(Handle, Handle)> {
        self.kernel.channel_create(self.process)
    }

    /// Write a message, transferring the listed handles to the channel.
    pub fn channel_write(
        &self,
        channel: Handle,
        bytes: Vec<u8>,
        handles: Vec<Handle>,
    ) -> Result<()> {
        self.kernel.channel_write(self.process, channel, bytes, handles)
    }

    /// Read a message, blocking until one arrives, the channel dies, or this
    /// context is cancelled.
    pub async fn channel_read(&self, channel: Handle, limits: ReadLimits) -> Result<Message> {
        tokio::select! {
            result = self.kernel.channel_read(self.process, channel, limits) => result,
            stop = self.cancelled() => Err(Error::Process(stop)),
        }
    }

    /// Read a message without blocking.
    pub fn channel_try_read(&self, channel: Handle, limits: ReadLimits) -> Result<Message> {
        self.kernel.channel_try_read(self.process, channel, limits)
    }

    /// Resolve a program name to a program handle.
    pub fn program_lookup(&self, name: &str) -> Result<Handle> {
        self.kernel.program_lookup(self.process, name)
    }

    /// Create a process from a program handle.
    pub fn process_create(&self, name: &str, program: Handle) -> Result<Handle> {
        self.kernel.process_create(self.process, name, program)
    }

    /// Start a process, transferring the bootstrap handle to it.
    pub fn process_start(&self, process: Handle, bootstrap: Handle) -> Result<()> {
        self.kernel.process_start(self.process, process, bootstrap)
    }

    /// Current status of a process.
    pub fn process_status(&self, process: Handle) -> Result<ProcessStatus> {
        self.kernel.process_status(self.process, process)
    }

    /// Close a handle. Idempotent; never fails.
    pub fn handle_close(&self, handle: Handle) {
        self.kernel.handle_close(self.process, handle)
    }

    /// Duplicate a handle, where the object type permits it.
    pub fn handle_duplicate(&self, handle: Handle) -> Result<Handle> {
        self.kernel.handle_duplicate(self.process, handle)
    }

    /// The koid of the object a handle refers to.
    pub fn object_koid(&self, handle: Handle) -> Result<Koid> {
        self.kernel.object_koid(self.process, handle)
    }

    /// The koid of the object's counterpart: the peer endpoint for
    /// channels, invalid for everything else.
    pub fn related_koid(&self, handle: Handle) -> Result<Koid> {
        self.kernel.related_koid(self.process, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cancel_token_observes_source() {
        let source = CancelSource::new();
        let token = source.token();
        assert!(!token.is_cancelled());

        source.cancel(CancelReason::Requested);
        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some(CancelReason::Requested));
    }

    #[test]
    fn test_first_reason_wins() {
        let source = CancelSource::new();
        source.cancel(CancelReason::Shutdown);
        source.cancel(CancelReason::Requested);
        assert_eq!(source.token().reason(), Some(CancelReason::Shutdown));
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let source = CancelSource::new();
        let token = source.token();

        let waiter = tokio::spawn(async move { token.cancelled().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        source.cancel(CancelReason::Requested);

        assert_eq!(waiter.await.unwrap(), CancelReason::Requested);
    }

    #[tokio::test]
    async fn test_token_cancelled_before_wait() {
        let source = CancelSource::new();
        source.cancel(CancelReason::Shutdown);
        // Resolves immediately when the cancellation predates the wait
        assert_eq!(source.token().cancelled().await, CancelReason::Shutdown);
    }
}
