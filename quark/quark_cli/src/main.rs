//! Quark command line interface.
//!
//! Boots a kernel and runs a small process tree over channels: an init
//! process spawns worker processes, hands each one its own data endpoint
//! through a transferred handle, and pings every worker before reporting
//! back to the host.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{ensure, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use quark_core::ReadLimits;
use quark_runtime::{ProgramRegistry, Runtime, RuntimeConfig};

/// Quark Command Line Interface
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot a kernel and run the worker demo
    Run {
        /// Path to a JSON runtime configuration file
        #[clap(long)]
        config: Option<PathBuf>,

        /// Number of worker processes to spawn
        #[clap(long, default_value_t = 4)]
        workers: u32,

        /// Per-process execution deadline in milliseconds
        #[clap(long)]
        deadline_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Collector configured from RUST_LOG, defaulting to info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            workers,
            deadline_ms,
        } => run(config.as_deref(), workers, deadline_ms).await,
    }
}

async fn run(config_path: Option<&Path>, workers: u32, deadline_ms: Option<u64>) -> Result<()> {
    let mut config = RuntimeConfig::load(config_path).await?;
    if let Some(deadline) = deadline_ms {
        config.kernel.process_deadline_ms = Some(deadline);
    }

    let registry = Arc::new(ProgramRegistry::new());
    register_demo_programs(&registry, workers)?;

    let runtime = Runtime::boot(config, registry)?;
    let root = runtime.root_process()?;

    let kernel = runtime.kernel();
    let host = kernel.host_koid();

    let report = kernel
        .channel_read(host, root.channel, ReadLimits::default())
        .await?;
    println!("{}", String::from_utf8_lossy(&report.bytes));

    runtime.wait().await;
    info!(
        "quiescent: {} processes outstanding, {} handles live",
        kernel.outstanding_processes(),
        kernel.live_handles()
    );

    Ok(())
}

/// Register the demo's init and worker programs.
///
/// Each worker is started with a control endpoint as its bootstrap; init
/// then transfers the worker's data endpoint to it inside a control
/// message, and the ping round trip runs over the data channel.
fn register_demo_programs(registry: &ProgramRegistry, workers: u32) -> Result<()> {
    registry.register_fn("worker", |ctx, bootstrap| async move {
        let setup = ctx.channel_read(bootstrap, ReadLimits::default()).await?;
        let data = *setup
            .handles
            .first()
            .ok_or_else(|| anyhow::anyhow!("setup message carried no endpoint"))?;

        let ping = ctx.channel_read(data, ReadLimits::default()).await?;
        ctx.channel_write(data, ping.bytes, Vec::new())?;
        Ok(())
    })?;

    registry.register_fn("init", move |ctx, bootstrap| async move {
        let image = ctx.program_lookup("worker")?;

        for index in 0..workers {
            let process = ctx.process_create(&format!("worker-{}", index), image)?;
            let (control, control_child) = ctx.channel_create()?;
            ctx.process_start(process, control_child)?;
            ctx.handle_close(process);

            let (data, data_child) = ctx.channel_create()?;
            ctx.channel_write(control, Vec::new(), vec![data_child])?;

            let payload = format!("ping {}", index).into_bytes();
            ctx.channel_write(data, payload.clone(), Vec::new())?;
            let reply = ctx.channel_read(data, ReadLimits::default()).await?;
            ensure!(
                reply.bytes == payload,
                "worker {} echoed a different payload",
                index
            );

            ctx.handle_close(control);
            ctx.handle_close(data);
        }
        ctx.handle_close(image);

        let report = format!("{} workers echoed", workers);
        ctx.channel_write(bootstrap, report.into_bytes(), Vec::new())?;
        Ok(())
    })?;

    Ok(())
}
