//! Native program registry.
//!
//! Maps program names to [`NativeProgram`] entry points. The registry is
//! the in-process stand-in for a program loader: it implements
//! [`ProgramLoader`], so the kernel resolves names through it without
//! knowing how programs are stored.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::info;

use quark_core::{BootError, Handle};
use quark_kernel::{ExecContext, NativeProgram, ProgramLoader};

/// Adapter turning an async closure into a [`NativeProgram`].
struct ProgramFn<F> {
    body: F,
}

#[async_trait]
impl<F, Fut> NativeProgram for ProgramFn<F>
where
    F: Fn(ExecContext, Handle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn start(&self, ctx: ExecContext, bootstrap: Handle) -> anyhow::Result<()> {
        (self.body)(ctx, bootstrap).await
    }
}

/// The program registry maps names to entry points.
pub struct ProgramRegistry {
    programs: RwLock<HashMap<String, Arc<dyn NativeProgram>>>,
}

impl ProgramRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            programs: RwLock::new(HashMap::new()),
        }
    }

    /// Register a program under `name`.
    ///
    /// Names are unique; registering a taken name fails with
    /// `AlreadyRegistered` and leaves the existing entry in place.
    pub fn register(
        &self,
        name: &str,
        program: Arc<dyn NativeProgram>,
    ) -> Result<(), BootError> {
        let mut programs = self.programs.write();
        if programs.contains_key(name) {
            return Err(BootError::AlreadyRegistered(name.to_string()));
        }
        programs.insert(name.to_string(), program);

        info!("Registered program: {}", name);
        Ok(())
    }

    /// Register an async closure as a program body.
    pub fn register_fn<F, Fut>(&self, name: &str, body: F) -> Result<(), BootError>
    where
        F: Fn(ExecContext, Handle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(name, Arc::new(ProgramFn { body }))
    }

    /// Check whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.programs.read().contains_key(name)
    }

    /// The registered program names, in no particular order.
    pub fn names(&self) -> Vec<String> {
        self.programs.read().keys().cloned().collect()
    }

    /// Number of registered programs.
    pub fn len(&self) -> usize {
        self.programs.read().len()
    }

    /// Check whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.programs.read().is_empty()
    }
}

impl Default for ProgramRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramLoader for ProgramRegistry {
    fn resolve(&self, name: &str) -> Result<Arc<dyn NativeProgram>, BootError> {
        self.programs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| BootError::ProgramNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nop(registry: &ProgramRegistry, name: &str) -> Result<(), BootError> {
        registry.register_fn(name, |_ctx, _bootstrap| async { Ok(()) })
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = ProgramRegistry::new();
        assert!(registry.is_empty());

        nop(&registry, "init").unwrap();
        assert!(registry.contains("init"));
        assert_eq!(registry.len(), 1);
        assert!(registry.resolve("init").is_ok());
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let registry = ProgramRegistry::new();
        nop(&registry, "init").unwrap();

        let result = nop(&registry, "init");
        assert!(matches!(
            result,
            Err(BootError::AlreadyRegistered(name)) if name == "init"
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_name_fails_resolution() {
        let registry = ProgramRegistry::new();
        let result = registry.resolve("ghost");
        assert!(matches!(
            result,
            Err(BootError::ProgramNotFound(name)) if name == "ghost"
        ));
    }

    #[test]
    fn test_names_lists_every_program() {
        let registry = ProgramRegistry::new();
        nop(&registry, "init").unwrap();
        nop(&registry, "worker").unwrap();

        let mut names = registry.names();
        names.sort();
        assert_eq!(names, vec!["init".to_string(), "worker".to_string()]);
    }
}
