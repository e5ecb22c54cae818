//! Error types for the Quark kernel.
//!
//! This module defines the error hierarchy used throughout the system. The
//! errors are organized by subsystem, with each subsystem having its own
//! error type, and the root type `Error` wrapping any of them for uniform
//! handling at the syscall boundary.
//!
//! Every kernel operation reports failure to the issuing caller; no
//! capability error is fatal to the kernel or to other processes.

use thiserror::Error;

use crate::handle::Handle;
use crate::types::{ObjectType, ProcessStatus};

/// Root error type for the Quark kernel.
#[derive(Debug, Error)]
pub enum Error {
    /// Handle table errors
    #[error("Handle error: {0}")]
    Handle(#[from] HandleError),

    /// Channel errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Process lifecycle errors
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// Boot and program resolution errors
    #[error("Boot error: {0}")]
    Boot(#[from] BootError),
}

/// Errors related to handle table operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandleError {
    /// Handle does not resolve: unknown, stale, or not owned by the caller
    #[error("invalid handle: {0}")]
    Invalid(Handle),

    /// Handle resolves to an object of the wrong type
    #[error("wrong object type: expected {expected}, got {actual}")]
    WrongType {
        /// The type the operation requires
        expected: ObjectType,

        /// The type the handle actually refers to
        actual: ObjectType,
    },

    /// Object type does not support duplication
    #[error("{0} handles cannot be duplicated")]
    NotDuplicable(ObjectType),
}

/// Errors related to channel operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// The endpoint being operated on has been closed
    #[error("channel endpoint closed")]
    Closed,

    /// The peer endpoint has been closed
    #[error("peer endpoint closed")]
    PeerClosed,

    /// Payload exceeds the channel's maximum message size
    #[error("payload of {size} bytes exceeds maximum of {max}")]
    PayloadTooLarge {
        /// Size of the rejected payload
        size: usize,

        /// Configured maximum
        max: usize,
    },

    /// Message carries more handles than the channel allows
    #[error("message carries {count} handles, maximum is {max}")]
    TooManyHandles {
        /// Number of handles in the rejected message
        count: usize,

        /// Configured maximum
        max: usize,
    },

    /// The queued message does not fit the caller's read limits
    #[error("queued message needs {needed_bytes} bytes and {needed_handles} handle slots")]
    BufferTooSmall {
        /// Payload size of the queued message
        needed_bytes: usize,

        /// Handle count of the queued message
        needed_handles: usize,
    },

    /// No message is queued and the caller asked not to block
    #[error("no message available")]
    WouldBlock,
}

/// Errors related to process lifecycle operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProcessError {
    /// Process is in the wrong state for the requested operation
    #[error("process is in invalid state: {0}")]
    InvalidState(ProcessStatus),

    /// Process execution was cancelled
    #[error("process execution cancelled")]
    Cancelled,

    /// Process execution deadline elapsed
    #[error("process deadline exceeded")]
    DeadlineExceeded,
}

/// Errors related to boot and program resolution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BootError {
    /// No program is registered under the given name
    #[error("program not found: {0}")]
    ProgramNotFound(String),

    /// The registry has no entry for the init program
    #[error("registry has no init program: {0}")]
    MissingInit(String),

    /// A program is already registered under the given name
    #[error("program already registered: {0}")]
    AlreadyRegistered(String),
}

/// Result type used throughout the Quark kernel.
pub type Result<T> = std::result::Result<T, Error>;
