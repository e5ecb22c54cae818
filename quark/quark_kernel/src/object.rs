//! Kernel objects.
//!
//! Everything a handle can refer to: channel endpoints, processes, and
//! program images. The variants carry shared references; the handle table
//! entry is what makes an object reachable from a given process, and single
//! ownership means there is at most one such entry per object.

use std::sync::Arc;

use quark_core::{Koid, ObjectType};

use crate::channel::Endpoint;
use crate::process::Process;
use crate::program::ProgramImage;

/// A kernel object, as stored in the handle table and carried by messages.
#[derive(Clone)]
pub enum KernelObject {
    /// One endpoint of a channel.
    Channel(Arc<Endpoint>),

    /// A process.
    Process(Arc<Process>),

    /// A runnable program image.
    Program(ProgramImage),
}

impl KernelObject {
    /// The classification of this object.
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Channel(_) => ObjectType::Channel,
            Self::Process(_) => ObjectType::Process,
            Self::Program(_) => ObjectType::Program,
        }
    }

    /// The object's koid.
    pub fn koid(&self) -> Koid {
        match self {
            Self::Channel(endpoint) => endpoint.koid(),
            Self::Process(process) => process.koid(),
            Self::Program(image) => image.koid(),
        }
    }

    /// Type-specific teardown when the last handle to this object goes away.
    ///
    /// Closing an endpoint drains its inbox and recursively closes every
    /// object carried by the undelivered packets, so no capability survives
    /// unreachable. Closing a process or program handle drops the reference;
    /// a running process is not affected by losing its handle.
    pub(crate) fn close(&self) {
        if let Self::Channel(endpoint) = self {
            for packet in endpoint.close() {
                for object in packet.objects {
                    object.close();
                }
            }
        }
    }
}

impl std::fmt::Debug for KernelObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.object_type(), self.koid())
    }
}
