//! Wasmtime engine configuration and creation.
//!
//! The [`WasmEngine`] is the compilation half of the embedded runtime. It is:
//! - Thread-safe and shared by the runtime and the registry verifier
//! - Set up for async execution so long calls never block the host's executor
//! - Optionally fuel-metered to bound runaway callees

use std::sync::Arc;

use tracing::info;
use wasmtime::{Config, Engine, OptLevel};

use calc_bridge_common::{BridgeError, EngineConfig};

/// Thread-safe WebAssembly engine wrapper.
///
/// # Example
///
/// ```ignore
/// use calc_bridge_common::EngineConfig;
/// use calc_bridge_core::WasmEngine;
///
/// let engine = WasmEngine::new(&EngineConfig::default())?;
/// ```
#[derive(Clone)]
pub struct WasmEngine {
    engine: Arc<Engine>,
    config: EngineConfig,
}

impl WasmEngine {
    /// Create a new WebAssembly engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the Wasmtime configuration is rejected.
    pub fn new(config: &EngineConfig) -> Result<Self, BridgeError> {
        let mut wasmtime_config = Config::new();
        wasmtime_config
            .async_support(true)
            .consume_fuel(config.fuel_metering)
            .cranelift_opt_level(opt_level(config));

        let engine = Engine::new(&wasmtime_config)
            .map_err(|e| BridgeError::runtime_boot(format!("engine rejected configuration: {e}")))?;

        info!(
            fuel_metering = config.fuel_metering,
            optimize = config.optimize,
            "Wasmtime engine initialized"
        );

        Ok(Self {
            engine: Arc::new(engine),
            config: config.clone(),
        })
    }

    /// Get a reference to the inner Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.engine
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Check if fuel metering is enabled.
    pub fn is_fuel_metered(&self) -> bool {
        self.config.fuel_metering
    }
}

fn opt_level(config: &EngineConfig) -> OptLevel {
    if config.optimize {
        OptLevel::Speed
    } else {
        OptLevel::None
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine")
            .field("fuel_metering", &self.config.fuel_metering)
            .field("optimize", &self.config.optimize)
            .finish_non_exhaustive()
    }
}
