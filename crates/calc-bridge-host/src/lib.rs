//! Host side of calc-bridge.
//!
//! This crate provides what the core needs from the host environment:
//!
//! - [`linker`]: host functions guests may import (`env::log`)
//! - [`logging`]: guest log capture and re-emission through `tracing`
//! - [`source`]: package sources (bundled, on disk, layered)
//! - [`declarations`]: module declarations read from configuration
//! - [`factory`]: the [`RuntimeFactory`](calc_bridge_core::RuntimeFactory) that boots Wasmtime

pub mod declarations;
pub mod factory;
pub mod linker;
pub mod logging;
pub mod source;

pub use declarations::module_declarations;
pub use factory::{WasmRuntimeFactory, create_runtime};
pub use logging::LoggingHost;
pub use source::{FilePackageSource, LayeredPackageSource, StaticPackageSource};
