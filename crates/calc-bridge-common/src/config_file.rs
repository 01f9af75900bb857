//! Configuration file structures for calc-bridge.
//!
//! This module defines structures for TOML configuration files:
//! - [`ConfigFile`]: Top-level configuration file structure
//! - [`PackageEntry`]: A package fetched from disk
//! - [`ModuleEntry`]: A module declared in addition to the bundled ones
//! - [`ContractEntry`]: A call contract for a declared module

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::BridgeConfig;

/// Top-level configuration file structure.
///
/// # Example
///
/// ```toml
/// [bridge.loader]
/// max_retries = 3
///
/// [bridge.execution]
/// max_fuel = 1_000_000_000
///
/// [[packages]]
/// name = "linalg-lib"
/// path = "./packages/linalg-lib.wat"
///
/// [[modules]]
/// id = "regression"
/// path = "./modules/regression.wat"
/// packages = ["linalg-lib"]
/// weight = "heavy"
///
/// [[contracts]]
/// exposed_name = "linear_fit"
/// module = "regression"
/// function = "linear_fit"
/// abi = "vector"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Bridge configuration (engine, loader, execution).
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Packages fetched from disk.
    #[serde(default)]
    pub packages: Vec<PackageEntry>,

    /// Modules declared in addition to the bundled table.
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,

    /// Call contracts for the declared modules.
    #[serde(default)]
    pub contracts: Vec<ContractEntry>,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigFileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// A package whose source is read from disk.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PackageEntry {
    /// Package name, as imported by module source.
    pub name: String,

    /// Path to a `.wat` or `.wasm` file, relative to the config file.
    pub path: String,
}

/// A module declaration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModuleEntry {
    /// Unique identifier for the module.
    pub id: String,

    /// Path to a `.wat` or `.wasm` file, relative to the config file.
    pub path: String,

    /// Packages that must be loaded before the module source runs, in load order.
    #[serde(default)]
    pub packages: Vec<String>,

    /// Weight class, `"light"` or `"heavy"`.
    #[serde(default)]
    pub weight: Option<String>,
}

/// A call contract pairing an exposed name with a module function.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContractEntry {
    /// Name host code uses to invoke the operation.
    pub exposed_name: String,

    /// Target module id.
    pub module: String,

    /// Exported function inside the module.
    pub function: String,

    /// Argument convention, `"scalar"` (default) or `"vector"`.
    #[serde(default)]
    pub abi: Option<String>,
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}
