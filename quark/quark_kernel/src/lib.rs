//! # Quark Kernel
//!
//! The kernel proper: kernel objects, the owner-checked handle table, and
//! the syscall surface processes run against.
//!
//! A [`Kernel`] is an explicit instance. Booting one takes a
//! [`KernelConfig`] and a [`ProgramLoader`]; programs are in-process
//! [`NativeProgram`] implementations executed as tokio tasks. Everything a
//! process can do goes through its [`ExecContext`], which attributes each
//! syscall to the owning process and carries its cancellation token.
//!
//! ## Object model
//!
//! Three object types live behind handles: channels (paired message
//! endpoints), processes, and program images. Handles are single-owner.
//! The only way a handle crosses a process boundary is inside a channel
//! message, and the transfer is atomic: the sender's handle dies in the
//! same critical section that removes it, and the receiver is minted a
//! fresh one on read.

pub mod channel;
pub mod config;
pub mod context;
pub mod kernel;
pub mod object;
pub mod process;
pub mod program;
pub mod table;
pub mod trace;

pub use channel::Endpoint;
pub use config::{ConfigError, KernelConfig};
pub use context::{CancelSource, CancelToken, ExecContext};
pub use kernel::Kernel;
pub use object::KernelObject;
pub use process::Process;
pub use program::{NativeProgram, ProgramImage, ProgramLoader};
pub use table::HandleTable;
pub use trace::{RecordingSink, SyscallOp, SyscallRecord, SyscallSink, TracingSink};
