//! Configuration structures for calc-bridge.
//!
//! This module defines configuration options for the bridge components:
//! - [`BridgeConfig`]: Top-level configuration containing all settings
//! - [`EngineConfig`]: Wasmtime engine settings
//! - [`LoaderConfig`]: Package loader retry policy
//! - [`ExecutionConfig`]: Per-call execution limits

use serde::{Deserialize, Serialize};

use crate::BridgeError;

/// Top-level bridge configuration.
///
/// Usually read from the `[bridge]` table of a [`ConfigFile`](crate::ConfigFile).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// Wasmtime engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Package loader configuration.
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Per-call execution configuration.
    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl BridgeConfig {
    /// Check the configuration for values the bridge cannot run with.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.loader.max_retries == 0 {
            return Err(BridgeError::invalid_config(
                "loader.max_retries must be at least 1",
            ));
        }

        if self.engine.fuel_metering && self.execution.max_fuel == 0 {
            return Err(BridgeError::invalid_config(
                "execution.max_fuel must be positive when fuel metering is enabled",
            ));
        }

        Ok(())
    }
}

/// Wasmtime engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Enable fuel metering.
    ///
    /// When enabled, every call is given `execution.max_fuel` units of fuel and
    /// a callee that runs out fails with an execution-limit error.
    #[serde(default = "defaults::fuel_metering")]
    pub fuel_metering: bool,

    /// Compile with Cranelift's speed optimizations.
    #[serde(default = "defaults::optimize")]
    pub optimize: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fuel_metering: defaults::fuel_metering(),
            optimize: defaults::optimize(),
        }
    }
}

/// Package loader configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoaderConfig {
    /// Attempts per package before the load is abandoned.
    ///
    /// Attempts run back to back; there is no backoff.
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::max_retries(),
        }
    }
}

/// Per-call execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Fuel granted to each call when fuel metering is enabled.
    ///
    /// Numerical routines are long-running, so the default is generous.
    #[serde(default = "defaults::max_fuel")]
    pub max_fuel: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_fuel: defaults::max_fuel(),
        }
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn fuel_metering() -> bool {
        true
    }

    pub const fn optimize() -> bool {
        true
    }

    pub const fn max_retries() -> u32 {
        3
    }

    pub const fn max_fuel() -> u64 {
        1_000_000_000
    }
}
