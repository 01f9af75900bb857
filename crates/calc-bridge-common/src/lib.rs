//! Common types, errors, and configuration for calc-bridge.
//!
//! This crate provides shared functionality used across the calc-bridge workspace:
//! - [`BridgeError`]: the failure taxonomy surfaced by every bridge operation
//! - Configuration structures for the engine, package loader, and execution limits
//! - The TOML configuration file format

pub mod config;
pub mod config_file;
pub mod error;

pub use config::{BridgeConfig, EngineConfig, ExecutionConfig, LoaderConfig};
pub use config_file::{ConfigFile, ConfigFileError, ContractEntry, ModuleEntry, PackageEntry};
pub use error::{BridgeError, ErrorKind};
