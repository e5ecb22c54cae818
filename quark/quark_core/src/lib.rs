//! # Quark Core
//!
//! `quark_core` provides the shared vocabulary for the Quark capability
//! kernel: handle values, kernel object ids, object and process
//! classifications, message types, and the error hierarchy used throughout
//! the system.
//!
//! ## Core Principles
//!
//! The Quark kernel simulates a capability-secured operating system inside a
//! single host process. The types in this crate encode its three load-bearing
//! rules:
//!
//! 1. **Single ownership**: every kernel object is named by exactly one live
//!    handle-table entry. There is no handle aliasing; authority over an
//!    object is held by exactly one process at a time.
//!
//! 2. **Transfer, not copy**: sending a handle over a channel atomically
//!    removes it from the sender's table and later mints a fresh entry in the
//!    receiver's table for the same underlying object. Object identity is
//!    tracked by koid, handle identity by (slot, generation) pairs.
//!
//! 3. **Errors are values**: every kernel operation reports failure to the
//!    issuing caller through the [`Error`] hierarchy. No capability error is
//!    fatal to the kernel or to other processes.
//!
//! ## Crate Structure
//!
//! - **error**: the subsystem error enums and the root [`Error`] type
//! - **handle**: packed (index, generation) handle values
//! - **id**: kernel object ids (koids)
//! - **types**: object/process classifications, messages, read limits

pub mod error;
pub mod handle;
pub mod id;
pub mod types;

// Re-export key types for convenience
pub use error::{BootError, ChannelError, Error, HandleError, ProcessError, Result};
pub use handle::Handle;
pub use id::Koid;
pub use types::{CancelReason, Message, ObjectType, ProcessStatus, ReadLimits};
pub use types::{DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_MAX_MESSAGE_HANDLES, DEFAULT_MAX_NAME_LEN};
