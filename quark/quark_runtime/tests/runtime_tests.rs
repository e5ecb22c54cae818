//! Integration tests for the runtime facade.
//!
//! These tests boot full runtimes with closure-backed programs: root
//! process seeding, echo traffic over the bootstrap channel, missing-init
//! handling, and two-phase shutdown.

use std::sync::Arc;
use std::time::Duration;

use quark_core::{BootError, ProcessStatus, ReadLimits};
use quark_runtime::{ProgramRegistry, Runtime, RuntimeConfig};

fn echo_registry() -> Arc<ProgramRegistry> {
    let registry = Arc::new(ProgramRegistry::new());
    registry
        .register_fn("init", |ctx, bootstrap| async move {
            loop {
                let message = ctx.channel_read(bootstrap, ReadLimits::default()).await?;
                if message.bytes == b"quit" {
                    return Ok(());
                }
                ctx.channel_write(bootstrap, message.bytes, Vec::new())?;
            }
        })
        .unwrap();
    registry
}

#[tokio::test]
async fn test_boot_and_root_echo() {
    let runtime = Runtime::boot(RuntimeConfig::default(), echo_registry()).unwrap();
    let root = runtime.root_process().unwrap();

    let kernel = runtime.kernel();
    let host = kernel.host_koid();

    kernel
        .channel_write(host, root.channel, b"ping".to_vec(), Vec::new())
        .unwrap();
    let reply = kernel
        .channel_read(host, root.channel, ReadLimits::default())
        .await
        .unwrap();
    assert_eq!(reply.bytes, b"ping");

    kernel
        .channel_write(host, root.channel, b"quit".to_vec(), Vec::new())
        .unwrap();
    runtime.wait().await;

    assert_eq!(
        kernel.process_status(host, root.process).unwrap(),
        ProcessStatus::Completed
    );
}

#[tokio::test]
async fn test_missing_init_program() {
    let runtime = Runtime::boot(RuntimeConfig::default(), Arc::new(ProgramRegistry::new()))
        .unwrap();

    let failure = runtime.root_process().unwrap_err();
    match failure.downcast_ref::<BootError>() {
        Some(BootError::MissingInit(name)) => assert_eq!(name, "init"),
        other => panic!("expected MissingInit, got {:?}", other),
    }

    // Nothing was started
    assert_eq!(runtime.kernel().outstanding_processes(), 0);
}

#[tokio::test]
async fn test_configured_init_name() {
    let registry = Arc::new(ProgramRegistry::new());
    registry
        .register_fn("supervisor", |_ctx, _bootstrap| async { Ok(()) })
        .unwrap();

    let config = RuntimeConfig {
        init_program: "supervisor".to_string(),
        ..RuntimeConfig::default()
    };
    let runtime = Runtime::boot(config, registry).unwrap();

    runtime.root_process().unwrap();
    runtime.wait().await;
}

#[tokio::test]
async fn test_invalid_config_is_rejected_at_boot() {
    let config = RuntimeConfig {
        shutdown_timeout_secs: 0,
        ..RuntimeConfig::default()
    };
    assert!(Runtime::boot(config, Arc::new(ProgramRegistry::new())).is_err());
}

#[tokio::test]
async fn test_shutdown_cancels_cooperative_processes() {
    let registry = Arc::new(ProgramRegistry::new());
    registry
        .register_fn("init", |ctx, _bootstrap| async move {
            let _ = ctx.cancelled().await;
            Ok(())
        })
        .unwrap();

    let runtime = Runtime::boot(RuntimeConfig::default(), registry).unwrap();
    let root = runtime.root_process().unwrap();

    runtime.shutdown(Duration::from_secs(5)).await.unwrap();

    let kernel = runtime.kernel();
    assert_eq!(
        kernel
            .process_status(kernel.host_koid(), root.process)
            .unwrap(),
        ProcessStatus::Cancelled
    );
}

#[tokio::test]
async fn test_shutdown_reports_stragglers() {
    let registry = Arc::new(ProgramRegistry::new());
    registry
        .register_fn("init", |_ctx, _bootstrap| async {
            // Ignores cancellation entirely
            std::future::pending::<()>().await;
            Ok(())
        })
        .unwrap();

    let runtime = Runtime::boot(RuntimeConfig::default(), registry).unwrap();
    runtime.root_process().unwrap();

    let failure = runtime
        .shutdown(Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(failure.to_string().contains("1 processes still running"));
}

#[tokio::test]
async fn test_registration_after_boot_is_visible() {
    let registry = Arc::new(ProgramRegistry::new());
    let runtime = Runtime::boot(RuntimeConfig::default(), registry.clone()).unwrap();

    // init only appears after boot, but before the lookup
    registry
        .register_fn("init", |_ctx, _bootstrap| async { Ok(()) })
        .unwrap();

    runtime.root_process().unwrap();
    runtime.wait().await;
}
