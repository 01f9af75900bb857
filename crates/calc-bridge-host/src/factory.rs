//! Booting the Wasmtime runtime.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use wasmtime::Linker;

use calc_bridge_common::{BridgeError, EngineConfig, ExecutionConfig};
use calc_bridge_core::{EmbeddedRuntime, PackageSource, RuntimeFactory, WasmEngine, WasmRuntime};

use crate::linker::register_all;

/// Create a [`WasmRuntime`] with every host function registered.
///
/// # Errors
///
/// Returns an error if the engine, linker, or store cannot be set up.
pub fn create_runtime(
    engine_config: &EngineConfig,
    exec_config: &ExecutionConfig,
    packages: Arc<dyn PackageSource>,
) -> Result<WasmRuntime, BridgeError> {
    let engine = WasmEngine::new(engine_config)?;

    let mut linker = Linker::new(engine.inner());
    register_all(&mut linker)?;

    WasmRuntime::new(engine, linker, packages, exec_config.clone())
}

/// Boots a [`WasmRuntime`] on demand.
pub struct WasmRuntimeFactory {
    engine_config: EngineConfig,
    exec_config: ExecutionConfig,
    packages: Arc<dyn PackageSource>,
}

impl WasmRuntimeFactory {
    /// Create a factory that serves packages from `packages`.
    pub fn new(
        engine_config: EngineConfig,
        exec_config: ExecutionConfig,
        packages: Arc<dyn PackageSource>,
    ) -> Self {
        Self {
            engine_config,
            exec_config,
            packages,
        }
    }
}

#[async_trait]
impl RuntimeFactory for WasmRuntimeFactory {
    async fn boot(&self) -> Result<Arc<dyn EmbeddedRuntime>, BridgeError> {
        let runtime = create_runtime(
            &self.engine_config,
            &self.exec_config,
            Arc::clone(&self.packages),
        )?;

        info!(
            fuel_metering = self.engine_config.fuel_metering,
            max_fuel = self.exec_config.max_fuel,
            "Wasmtime runtime created"
        );

        Ok(Arc::new(runtime))
    }
}

impl std::fmt::Debug for WasmRuntimeFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmRuntimeFactory")
            .field("engine_config", &self.engine_config)
            .field("exec_config", &self.exec_config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StaticPackageSource;
    use calc_bridge_core::ModuleSource;

    #[tokio::test]
    async fn test_boot_links_host_functions() {
        let factory = WasmRuntimeFactory::new(
            EngineConfig::default(),
            ExecutionConfig::default(),
            Arc::new(StaticPackageSource::new()),
        );

        let runtime = factory.boot().await.unwrap();
        let source = ModuleSource::Wat(
            r#"(module (import "env" "log" (func (param i32 i32 i32))) (memory (export "memory") 1))"#
                .into(),
        );

        runtime.execute_module("logger", &source).await.unwrap();
    }
}
