//! Runtime bridge core for calc-bridge.
//!
//! This crate lets host code call functions that live inside an embedded
//! WebAssembly runtime:
//! - [`RuntimeManager`]: boots the single runtime instance, at most once
//! - [`PackageLoader`]: loads the packages a module depends on, with bounded retry
//! - [`ModuleLoader`]: executes module source once its packages are in place
//! - [`MethodRegistry`]: the exhaustive list of callable operations
//! - [`CallDispatcher`]: routes a call through all of the above
//! - [`RuntimeBridge`]: the facade host code holds on to
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    RuntimeBridge                        │
//! │  call("heavy-stats", "zscores", &values)                │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                   CallDispatcher                        │
//! │  - MethodRegistry lookup (unregistered names stop here) │
//! │  - RuntimeManager::initialize                           │
//! │  - ModuleLoader::require_ready                          │
//! │  - marshal, invoke, unmarshal                           │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │      ModuleLoader ──► PackageLoader (retry per package) │
//! │  packages are always installed before module source     │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │          dyn EmbeddedRuntime (WasmRuntime)              │
//! │  - one Store<BridgeContext> + Linker                    │
//! │  - packages registered as linker instances              │
//! │  - fuel metering per call                               │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod bridge;
pub mod declaration;
pub mod dispatcher;
pub mod engine;
pub mod manager;
pub mod marshal;
pub mod module;
pub mod modules;
pub mod packages;
pub mod registry;
pub mod retry;
pub mod runtime;
pub mod store;
pub mod wasm;

pub use bridge::{RuntimeBridge, global, install_global};
pub use declaration::{ModuleDeclaration, ModuleSource, Weight};
pub use dispatcher::CallDispatcher;
pub use engine::WasmEngine;
pub use manager::RuntimeManager;
pub use module::CompiledModule;
pub use modules::{ModuleLoader, ModuleState};
pub use packages::{PackageLoader, PackageState};
pub use registry::{CallAbi, CallContract, MethodRegistry, RegistryViolation};
pub use runtime::{EmbeddedRuntime, PackageSource, RuntimeFactory};
pub use store::{BridgeContext, ExecutionMetrics, LogEntry, LogLevel};
pub use wasm::WasmRuntime;
