//! Program entry points and the loader seam.
//!
//! A program is the runnable half of a process: an entry point the kernel
//! invokes on a fresh task when the process starts. Programs reach the
//! kernel through [`ProgramLoader`], a name-resolution seam implemented by
//! the host's registry; the kernel never sees how programs are stored or
//! built, so a loader backed by real images can replace the in-memory
//! registry without touching kernel internals.

use std::sync::Arc;

use async_trait::async_trait;

use quark_core::{BootError, Handle, Koid};

use crate::context::ExecContext;

/// The entry-point contract for native programs.
///
/// The kernel calls `start` on a dedicated task when a process is started.
/// `bootstrap` is the process's sole initial capability, already owned by
/// the new process. The returned result becomes the process's terminal
/// status: `Ok` completes it, `Err` fails it, unless the context was
/// cancelled first.
#[async_trait]
pub trait NativeProgram: Send + Sync {
    /// Run the program body.
    async fn start(&self, ctx: ExecContext, bootstrap: Handle) -> anyhow::Result<()>;
}

/// Resolves program names to entry points.
///
/// Implemented by the host registry; installed into the kernel at boot.
pub trait ProgramLoader: Send + Sync {
    /// Resolve `name` to a program entry point.
    fn resolve(&self, name: &str) -> Result<Arc<dyn NativeProgram>, BootError>;
}

/// A resolved program image held by the handle table.
#[derive(Clone)]
pub struct ProgramImage {
    koid: Koid,
    name: String,
    entry: Arc<dyn NativeProgram>,
}

impl ProgramImage {
    pub(crate) fn new(koid: Koid, name: String, entry: Arc<dyn NativeProgram>) -> Self {
        Self { koid, name, entry }
    }

    /// A fresh image sharing this image's entry point.
    pub(crate) fn duplicate(&self, koid: Koid) -> Self {
        Self {
            koid,
            name: self.name.clone(),
            entry: self.entry.clone(),
        }
    }

    /// The image's koid.
    pub fn koid(&self) -> Koid {
        self.koid
    }

    /// The name the image was resolved under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn entry(&self) -> Arc<dyn NativeProgram> {
        self.entry.clone()
    }
}

impl std::fmt::Debug for ProgramImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramImage")
            .field("koid", &self.koid)
            .field("name", &self.name)
            .finish()
    }
}
