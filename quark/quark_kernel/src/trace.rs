//! Syscall tracing.
//!
//! The kernel emits one structured record per syscall, before the syscall
//! takes effect, to a write-only [`SyscallSink`]. The default sink forwards
//! to `tracing`; harnesses can install [`RecordingSink`] to assert on the
//! stream. The sink sees every operation with its caller and handle
//! arguments, which makes it the natural interception point for a future
//! policy layer.

use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use quark_core::{Handle, Koid};

/// A syscall name, as recorded in the trace stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SyscallOp {
    ChannelCreate,
    ChannelWrite,
    ChannelRead,
    ProcessCreate,
    ProcessStart,
    ProgramLookup,
    HandleClose,
    HandleDuplicate,
    ProcessStatus,
    ObjectInfo,
}

impl fmt::Display for SyscallOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One traced syscall: the operation, the caller it is attributed to, and
/// the handle arguments as the caller passed them.
#[derive(Clone, Debug)]
pub struct SyscallRecord {
    pub op: SyscallOp,
    pub caller: Koid,
    pub handles: Vec<Handle>,
}

/// A write-only receiver for syscall records.
pub trait SyscallSink: Send + Sync {
    fn record(&self, record: &SyscallRecord);
}

/// Default sink: one `tracing` event per syscall.
pub struct TracingSink;

impl SyscallSink for TracingSink {
    fn record(&self, record: &SyscallRecord) {
        debug!(
            target: "quark::syscall",
            op = %record.op,
            caller = %record.caller,
            handles = ?record.handles,
            "syscall"
        );
    }
}

/// Sink that keeps every record, for tests and harnesses.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<SyscallRecord>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records so far, in emission order.
    pub fn records(&self) -> Vec<SyscallRecord> {
        self.records.lock().clone()
    }

    /// Number of records whose operation is `op`.
    pub fn count(&self, op: SyscallOp) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|record| record.op == op)
            .count()
    }
}

impl SyscallSink for RecordingSink {
    fn record(&self, record: &SyscallRecord) {
        self.records.lock().push(record.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_display() {
        assert_eq!(SyscallOp::ChannelWrite.to_string(), "ChannelWrite");
        assert_eq!(SyscallOp::HandleClose.to_string(), "HandleClose");
    }

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.record(&SyscallRecord {
            op: SyscallOp::ChannelCreate,
            caller: Koid::from_raw(1),
            handles: vec![],
        });
        sink.record(&SyscallRecord {
            op: SyscallOp::ChannelWrite,
            caller: Koid::from_raw(1),
            handles: vec![Handle::from_parts(0, 1)],
        });

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].op, SyscallOp::ChannelCreate);
        assert_eq!(records[1].op, SyscallOp::ChannelWrite);
        assert_eq!(sink.count(SyscallOp::ChannelWrite), 1);
    }
}
