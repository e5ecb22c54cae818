//! Shared data types for the kernel.
//!
//! This module defines the classifications and value types that cross the
//! syscall boundary: object types, process lifecycle states, cancellation
//! reasons, channel messages, and read limits.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::handle::Handle;

/// Default cap on a single channel message payload, in bytes.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 65536;

/// Default cap on the number of handles a single message may carry.
pub const DEFAULT_MAX_MESSAGE_HANDLES: usize = 64;

/// Default cap on object names, in bytes. Longer names are truncated.
pub const DEFAULT_MAX_NAME_LEN: usize = 32;

/// The kind of object a handle refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectType {
    /// One endpoint of a bidirectional message channel.
    Channel,

    /// A process.
    Process,

    /// A runnable program image.
    Program,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel => write!(f, "channel"),
            Self::Process => write!(f, "process"),
            Self::Program => write!(f, "program"),
        }
    }
}

/// Process state in the lifecycle.
///
/// Transitions are monotone: `Created` moves to `Running` exactly once, and
/// `Running` moves to exactly one of the three terminal states. Terminal
/// states are absorbing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessStatus {
    /// Process exists but has not been started.
    Created,

    /// Process body is executing on its own task.
    Running,

    /// Process body returned successfully.
    Completed,

    /// Process body returned an error or panicked.
    Failed,

    /// Process was cancelled, or its deadline elapsed, before the body
    /// returned.
    Cancelled,
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Running => write!(f, "Running"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl ProcessStatus {
    /// Check if this state is terminal.
    ///
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Why a process was asked to stop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    /// The host asked this process to stop.
    Requested,

    /// The kernel is shutting down.
    Shutdown,

    /// The process's execution deadline elapsed.
    DeadlineElapsed,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "requested"),
            Self::Shutdown => write!(f, "shutdown"),
            Self::DeadlineElapsed => write!(f, "deadline elapsed"),
        }
    }
}

/// A message read from a channel endpoint.
///
/// `handles` are fresh entries in the reader's handle table, minted for the
/// objects the sender transferred; they appear in the order the sender
/// listed them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Payload bytes.
    pub bytes: Vec<u8>,

    /// Handles transferred with the payload.
    pub handles: Vec<Handle>,
}

impl Message {
    /// Create a message with a payload and no handles.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            handles: Vec::new(),
        }
    }
}

/// Caller-side limits for a channel read.
///
/// A queued message larger than the limits fails the read with
/// `ChannelError::BufferTooSmall` and stays queued, unless `may_discard` is
/// set, in which case the message is dequeued and dropped (its carried
/// objects are closed) and the error is still returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadLimits {
    /// Largest payload the caller is prepared to accept.
    pub max_bytes: usize,

    /// Most handles the caller is prepared to accept.
    pub max_handles: usize,

    /// Whether an over-limit message should be dropped instead of left
    /// queued.
    pub may_discard: bool,
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self {
            max_bytes: usize::MAX,
            max_handles: usize::MAX,
            may_discard: false,
        }
    }
}

impl ReadLimits {
    /// Limits that accept any message the channel admitted.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Limits bounded to the given payload and handle counts.
    pub fn bounded(max_bytes: usize, max_handles: usize) -> Self {
        Self {
            max_bytes,
            max_handles,
            may_discard: false,
        }
    }

    /// The same limits, with over-limit messages dropped instead of left
    /// queued.
    pub fn discarding(mut self) -> Self {
        self.may_discard = true;
        self
    }
}
