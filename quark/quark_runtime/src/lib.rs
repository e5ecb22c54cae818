//! # Quark Runtime
//!
//! Host-facing layer over the Quark kernel: the native program registry,
//! runtime configuration, and boot / root-process / wait / shutdown
//! orchestration.
//!
//! A host registers its programs in a [`ProgramRegistry`], boots a
//! [`Runtime`] around it, and seeds the system with [`Runtime::root_process`].
//! The root process receives one endpoint of a fresh channel as its
//! bootstrap capability; the host keeps the other end and the process
//! handle, and every further capability in the system flows from there.

pub mod config;
pub mod registry;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use quark_core::{BootError, CancelReason, Error, Handle};
use quark_kernel::Kernel;

pub use config::RuntimeConfig;
pub use registry::ProgramRegistry;

/// Handles the host keeps after seeding the root process.
#[derive(Debug, Clone, Copy)]
pub struct RootHandles {
    /// The root process handle.
    pub process: Handle,

    /// The host's end of the root bootstrap channel.
    pub channel: Handle,
}

/// Runtime facade that owns the kernel and the program registry.
pub struct Runtime {
    config: RuntimeConfig,
    kernel: Arc<Kernel>,
    registry: Arc<ProgramRegistry>,
}

impl Runtime {
    /// Boot a runtime: validate the configuration and bring up a kernel
    /// resolving program names through `registry`.
    pub fn boot(config: RuntimeConfig, registry: Arc<ProgramRegistry>) -> Result<Self> {
        info!("Initializing Quark runtime");

        config
            .validate()
            .context("invalid runtime configuration")?;

        let kernel = Kernel::boot(config.kernel.clone(), registry.clone());

        Ok(Self {
            config,
            kernel,
            registry,
        })
    }

    /// The kernel instance.
    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// The program registry. Programs may still be registered after boot,
    /// as long as it happens before a process looks them up.
    pub fn registry(&self) -> &Arc<ProgramRegistry> {
        &self.registry
    }

    /// The runtime configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The configured shutdown grace period.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.config.shutdown_timeout_secs)
    }

    /// Seed the system: create a channel pair, create a process from the
    /// configured init program, and start it with one endpoint as its
    /// bootstrap capability.
    ///
    /// A missing init program is the only fatal condition: the call fails
    /// with `BootError::MissingInit` and nothing starts.
    pub fn root_process(&self) -> Result<RootHandles> {
        let host = self.kernel.host_koid();
        let init = self.config.init_program.as_str();

        let program = match self.kernel.program_lookup(host, init) {
            Ok(program) => program,
            Err(Error::Boot(BootError::ProgramNotFound(_))) => {
                return Err(BootError::MissingInit(init.to_string()).into());
            }
            Err(other) => return Err(other.into()),
        };

        let process = self.kernel.process_create(host, init, program)?;
        let (mine, theirs) = self.kernel.channel_create(host)?;
        self.kernel.process_start(host, process, theirs)?;

        // The image handle has served its purpose
        self.kernel.handle_close(host, program);

        info!("root process started from program '{}'", init);
        Ok(RootHandles {
            process,
            channel: mine,
        })
    }

    /// Suspend until every started process has reached a terminal state.
    pub async fn wait(&self) {
        self.kernel.wait().await;
    }

    /// Two-phase shutdown: signal cancellation to every process, then wait
    /// up to `grace` for quiescence.
    ///
    /// Elapsing the grace period is an error reporting how many processes
    /// are still outstanding. Cancellation is advisory, so a non-cooperating
    /// process body is exactly what this timeout surfaces.
    pub async fn shutdown(&self, grace: Duration) -> Result<()> {
        info!("Shutting down Quark runtime");
        self.kernel.cancel_all(CancelReason::Shutdown);

        match tokio::time::timeout(grace, self.kernel.wait()).await {
            Ok(()) => {
                info!("Shutdown complete");
                Ok(())
            }
            Err(_) => {
                let outstanding = self.kernel.outstanding_processes();
                warn!(
                    "Shutdown timed out after {:?}; {} processes still outstanding",
                    grace, outstanding
                );
                Err(anyhow::anyhow!(
                    "shutdown timed out with {} processes still running",
                    outstanding
                ))
            }
        }
    }
}
