//! The kernel.
//!
//! One `Kernel` value owns a handle table, a process registry, and the
//! outstanding-process counter behind `wait`. There is no global instance:
//! kernels are explicit `Arc<Kernel>` values, independent kernels can
//! coexist in one host, and every piece of state is reachable from the
//! instance that owns it.
//!
//! Each syscall emits one trace record before it takes effect, then runs
//! synchronously on the calling task. The two exceptions that suspend are
//! the blocking form of `channel_read` and `wait`.
//!
//! Lock discipline: the handle table lock and endpoint inbox locks are
//! never held at the same time, and no lock is held across an await point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use quark_core::{
    CancelReason, ChannelError, Handle, HandleError, Koid, Message, ObjectType, ProcessStatus,
    ReadLimits, Result,
};

use crate::channel::{Endpoint, MessagePacket, RecvError};
use crate::config::KernelConfig;
use crate::context::{CancelSource, ExecContext};
use crate::object::KernelObject;
use crate::process::Process;
use crate::program::{ProgramImage, ProgramLoader};
use crate::table::HandleTable;
use crate::trace::{SyscallOp, SyscallRecord, SyscallSink, TracingSink};

/// The kernel instance.
pub struct Kernel {
    config: KernelConfig,
    table: HandleTable,
    processes: Mutex<HashMap<Koid, Arc<Process>>>,
    next_koid: AtomicU64,
    outstanding: watch::Sender<usize>,
    loader: Arc<dyn ProgramLoader>,
    sink: Arc<dyn SyscallSink>,
    host: Koid,
    host_cancel: CancelSource,
}

impl Kernel {
    /// Boot a kernel with the default trace sink.
    pub fn boot(config: KernelConfig, loader: Arc<dyn ProgramLoader>) -> Arc<Self> {
        Self::boot_with_sink(config, loader, Arc::new(TracingSink))
    }

    /// Boot a kernel with a custom trace sink.
    pub fn boot_with_sink(
        config: KernelConfig,
        loader: Arc<dyn ProgramLoader>,
        sink: Arc<dyn SyscallSink>,
    ) -> Arc<Self> {
        let next_koid = AtomicU64::new(1);
        let host = Koid::from_raw(next_koid.fetch_add(1, Ordering::Relaxed));
        let (outstanding, _) = watch::channel(0usize);

        info!("kernel booted (host koid {})", host);

        Arc::new(Self {
            config,
            table: HandleTable::new(),
            processes: Mutex::new(HashMap::new()),
            next_koid,
            outstanding,
            loader,
            sink,
            host,
            host_cancel: CancelSource::new(),
        })
    }

    /// The kernel's configuration.
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// The koid syscalls issued by the host are attributed to.
    pub fn host_koid(&self) -> Koid {
        self.host
    }

    /// An execution context carrying the host identity, for issuing
    /// syscalls from outside any process.
    pub fn host_context(self: &Arc<Self>) -> ExecContext {
        ExecContext::new(self.clone(), self.host, self.host_cancel.token(), None)
    }

    /// Number of started processes that have not yet reached a terminal
    /// state.
    pub fn outstanding_processes(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Number of live handle table entries, across all owners.
    pub fn live_handles(&self) -> usize {
        self.table.len()
    }

    fn allocate_koid(&self) -> Koid {
        Koid::from_raw(self.next_koid.fetch_add(1, Ordering::Relaxed))
    }

    fn trace(&self, op: SyscallOp, caller: Koid, handles: &[Handle]) {
        self.sink.record(&SyscallRecord {
            op,
            caller,
            handles: handles.to_vec(),
        });
    }

    fn endpoint(&self, caller: Koid, handle: Handle) -> Result<Arc<Endpoint>> {
        match self.table.get(caller, handle)? {
            KernelObject::Channel(endpoint) => Ok(endpoint),
            other => Err(HandleError::WrongType {
                expected: ObjectType::Channel,
                actual: other.object_type(),
            }
            .into()),
        }
    }

    fn process_object(&self, caller: Koid, handle: Handle) -> Result<Arc<Process>> {
        match self.table.get(caller, handle)? {
            KernelObject::Process(process) => Ok(process),
            other => Err(HandleError::WrongType {
                expected: ObjectType::Process,
                actual: other.object_type(),
            }
            .into()),
        }
    }

    /// Create a channel. Both endpoint handles are owned by `caller`.
    pub fn channel_create(&self, caller: Koid) -> Result<(Handle, Handle)> {
        self.trace(SyscallOp::ChannelCreate, caller, &[]);

        let (a, b) = Endpoint::create_pair(self.allocate_koid(), self.allocate_koid());
        let first = self.table.alloc(caller, KernelObject::Channel(a));
        let second = self.table.alloc(caller, KernelObject::Channel(b));

        debug!("channel created for {}: {} / {}", caller, first, second);
        Ok((first, second))
    }

    /// Write a message to `channel`, transferring the listed handles.
    ///
    /// The transferred handles are removed from the caller's table in one
    /// critical section before the message is enqueued; after a successful
    /// write none of them resolves for the caller anymore. A write that
    /// fails validation removes nothing. A write that finds the peer closed
    /// has already performed the removal, so the transferred objects are
    /// closed with it.
    pub fn channel_write(
        &self,
        caller: Koid,
        channel: Handle,
        bytes: Vec<u8>,
        handles: Vec<Handle>,
    ) -> Result<()> {
        let mut traced = Vec::with_capacity(handles.len() + 1);
        traced.push(channel);
        traced.extend_from_slice(&handles);
        self.trace(SyscallOp::ChannelWrite, caller, &traced);

        let endpoint = self.endpoint(caller, channel)?;

        if bytes.len() > self.config.max_message_bytes {
            return Err(ChannelError::PayloadTooLarge {
                size: bytes.len(),
                max: self.config.max_message_bytes,
            }
            .into());
        }
        if handles.len() > self.config.max_message_handles {
            return Err(ChannelError::TooManyHandles {
                count: handles.len(),
                max: self.config.max_message_handles,
            }
            .into());
        }
        // A channel handle cannot ride its own channel
        if handles.contains(&channel) {
            return Err(HandleError::Invalid(channel).into());
        }

        let objects = self.table.remove_many(caller, &handles)?;
        match endpoint.send(MessagePacket { bytes, objects }) {
            Ok(()) => Ok(()),
            Err(packet) => {
                for object in packet.objects {
                    object.close();
                }
                warn!("write by {} to {}: peer closed", caller, channel);
                Err(ChannelError::PeerClosed.into())
            }
        }
    }

    /// Read a message from `channel`, suspending until one arrives or the
    /// channel dies.
    pub async fn channel_read(
        &self,
        caller: Koid,
        channel: Handle,
        limits: ReadLimits,
    ) -> Result<Message> {
        self.trace(SyscallOp::ChannelRead, caller, &[channel]);

        let endpoint = self.endpoint(caller, channel)?;
        match endpoint.recv(&limits).await {
            Ok(packet) => Ok(self.deliver(caller, packet)),
            Err(failure) => Err(self.recv_failure(failure)),
        }
    }

    /// Read a message from `channel` without suspending.
    pub fn channel_try_read(
        &self,
        caller: Koid,
        channel: Handle,
        limits: ReadLimits,
    ) -> Result<Message> {
        self.trace(SyscallOp::ChannelRead, caller, &[channel]);

        let endpoint = self.endpoint(caller, channel)?;
        match endpoint.try_recv(&limits) {
            Ok(packet) => Ok(self.deliver(caller, packet)),
            Err(failure) => Err(self.recv_failure(failure)),
        }
    }

    /// Mint fresh handles for the objects a packet carries. Transfer, not
    /// alias: the receiver gets new handle values naming the same objects.
    fn deliver(&self, caller: Koid, packet: MessagePacket) -> Message {
        let handles = self.table.transfer_in(caller, packet.objects);
        Message {
            bytes: packet.bytes,
            handles,
        }
    }

    fn recv_failure(&self, failure: RecvError) -> quark_core::Error {
        match failure {
            RecvError::Empty => ChannelError::WouldBlock.into(),
            RecvError::Closed => ChannelError::Closed.into(),
            RecvError::PeerClosed => ChannelError::PeerClosed.into(),
            RecvError::TooBig {
                needed_bytes,
                needed_handles,
                discarded,
            } => {
                if let Some(packet) = discarded {
                    for object in packet.objects {
                        object.close();
                    }
                }
                ChannelError::BufferTooSmall {
                    needed_bytes,
                    needed_handles,
                }
                .into()
            }
        }
    }

    /// Resolve a program name through the loader and mint a program handle.
    pub fn program_lookup(&self, caller: Koid, name: &str) -> Result<Handle> {
        self.trace(SyscallOp::ProgramLookup, caller, &[]);

        let entry = self.loader.resolve(name)?;
        let image = ProgramImage::new(self.allocate_koid(), name.to_string(), entry);
        debug!("program '{}' resolved for {} (koid {})", name, caller, image.koid());
        Ok(self.table.alloc(caller, KernelObject::Program(image)))
    }

    /// Create a process from a program handle. The program handle is not
    /// consumed; one image can back any number of processes.
    pub fn process_create(&self, caller: Koid, name: &str, program: Handle) -> Result<Handle> {
        self.trace(SyscallOp::ProcessCreate, caller, &[program]);

        let image = match self.table.get(caller, program)? {
            KernelObject::Program(image) => image,
            other => {
                return Err(HandleError::WrongType {
                    expected: ObjectType::Program,
                    actual: other.object_type(),
                }
                .into())
            }
        };

        let koid = self.allocate_koid();
        let name = truncate_name(name, self.config.max_name_len);
        let process = Arc::new(Process::new(koid, name, image));
        self.processes.lock().insert(koid, process.clone());

        debug!("process {} '{}' created by {}", koid, process.name(), caller);
        Ok(self.table.alloc(caller, KernelObject::Process(process)))
    }

    /// Start a process, handing it `bootstrap` as its sole initial
    /// capability.
    ///
    /// The bootstrap handle is consumed once it validates: re-homed to the
    /// new process on success, closed if the process cannot start. Starting
    /// a process twice fails with `InvalidState`.
    pub fn process_start(
        self: &Arc<Self>,
        caller: Koid,
        process: Handle,
        bootstrap: Handle,
    ) -> Result<()> {
        self.trace(SyscallOp::ProcessStart, caller, &[process, bootstrap]);

        let proc = self.process_object(caller, process)?;
        let object = self.table.remove(caller, bootstrap)?;

        if let Err(failure) = proc.set_running() {
            object.close();
            return Err(failure.into());
        }

        let child_bootstrap = self.table.alloc(proc.koid(), object);
        self.outstanding.send_modify(|count| *count += 1);
        self.spawn(proc, child_bootstrap);
        Ok(())
    }

    fn spawn(self: &Arc<Self>, process: Arc<Process>, bootstrap: Handle) {
        let deadline = self
            .config
            .process_deadline_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        let ctx = ExecContext::new(
            self.clone(),
            process.koid(),
            process.cancel_token(),
            deadline,
        );
        let watchdog = ctx.clone();
        let entry = process.program().entry();
        let kernel = self.clone();

        info!(
            "process {} '{}' started (program '{}')",
            process.koid(),
            process.name(),
            process.program_name()
        );

        let body = tokio::spawn(async move {
            let result = entry.start(ctx, bootstrap).await;
            // Cancellation state is sampled at the moment the body returns
            let stopped = watchdog.is_cancelled();
            (result, stopped)
        });

        tokio::spawn(async move {
            let status = match body.await {
                Ok((_, true)) => ProcessStatus::Cancelled,
                Ok((Ok(()), false)) => ProcessStatus::Completed,
                Ok((Err(failure), false)) => {
                    warn!("process {} returned error: {:#}", process.koid(), failure);
                    ProcessStatus::Failed
                }
                Err(join_failure) => {
                    error!("process {} body panicked: {}", process.koid(), join_failure);
                    ProcessStatus::Failed
                }
            };

            process.finish(status);
            info!("process {} exited: {}", process.koid(), status);
            kernel.outstanding.send_modify(|count| *count -= 1);
        });
    }

    /// Current status of a process.
    pub fn process_status(&self, caller: Koid, process: Handle) -> Result<ProcessStatus> {
        self.trace(SyscallOp::ProcessStatus, caller, &[process]);
        Ok(self.process_object(caller, process)?.status())
    }

    /// Close a handle. Idempotent: closing an unknown, stale, or already
    /// closed handle is a no-op. Never fails.
    pub fn handle_close(&self, caller: Koid, handle: Handle) {
        self.trace(SyscallOp::HandleClose, caller, &[handle]);

        if let Ok(object) = self.table.remove(caller, handle) {
            object.close();
            debug!("handle {} closed by {}", handle, caller);
        }
    }

    /// Duplicate a handle. Program images duplicate into a fresh object
    /// sharing the entry point; channels and processes refuse, since a
    /// second handle would break single ownership.
    pub fn handle_duplicate(&self, caller: Koid, handle: Handle) -> Result<Handle> {
        self.trace(SyscallOp::HandleDuplicate, caller, &[handle]);

        match self.table.get(caller, handle)? {
            KernelObject::Program(image) => {
                let copy = image.duplicate(self.allocate_koid());
                Ok(self.table.alloc(caller, KernelObject::Program(copy)))
            }
            other => Err(HandleError::NotDuplicable(other.object_type()).into()),
        }
    }

    /// The koid of the object `handle` refers to.
    pub fn object_koid(&self, caller: Koid, handle: Handle) -> Result<Koid> {
        self.trace(SyscallOp::ObjectInfo, caller, &[handle]);
        Ok(self.table.get(caller, handle)?.koid())
    }

    /// The koid of the object's counterpart: the peer endpoint for
    /// channels, [`Koid::INVALID`] for everything else.
    pub fn related_koid(&self, caller: Koid, handle: Handle) -> Result<Koid> {
        self.trace(SyscallOp::ObjectInfo, caller, &[handle]);
        match self.table.get(caller, handle)? {
            KernelObject::Channel(endpoint) => Ok(endpoint.peer_koid()),
            _ => Ok(Koid::INVALID),
        }
    }

    /// Suspend until every started process has reached a terminal state.
    ///
    /// Returns immediately when nothing is outstanding. Processes started
    /// after this resolves need a fresh call.
    pub async fn wait(&self) {
        let mut outstanding = self.outstanding.subscribe();
        // The sender lives as long as the kernel, so this cannot fail here
        let _ = outstanding.wait_for(|count| *count == 0).await;
    }

    /// Advisory cancellation of every known process. Bodies observe it
    /// through their contexts; nothing is aborted.
    pub fn cancel_all(&self, reason: CancelReason) {
        let processes = self.processes.lock();
        info!("cancelling {} processes ({})", processes.len(), reason);
        for process in processes.values() {
            process.cancel(reason);
        }
    }
}

/// Cut a name down to `max_len` bytes on a character boundary.
fn truncate_name(name: &str, max_len: usize) -> String {
    if name.len() <= max_len {
        return name.to_string();
    }
    let mut end = max_len;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_name() {
        assert_eq!(truncate_name("init", 32), "init");
        assert_eq!(truncate_name("0123456789", 4), "0123");
        assert_eq!(truncate_name("", 32), "");
    }

    #[test]
    fn test_truncate_name_respects_char_boundary() {
        // Multibyte character straddling the cut point is dropped whole
        let name = "ab\u{00e9}cd";
        assert_eq!(truncate_name(name, 3), "ab");
        assert_eq!(truncate_name(name, 4), "ab\u{00e9}");
    }
}
