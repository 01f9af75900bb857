//! Seams between the bridge and the embedded runtime.
//!
//! The loaders and the dispatcher only ever talk to the runtime through
//! [`EmbeddedRuntime`]. [`WasmRuntime`](crate::WasmRuntime) is the production
//! implementation; tests substitute scripted ones to observe ordering and
//! call counts.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::{CallAbi, ModuleSource};
use calc_bridge_common::BridgeError;

/// One embedded runtime instance.
///
/// Implementations execute one operation at a time; callers may issue
/// operations concurrently and they are serialized inside.
#[async_trait]
pub trait EmbeddedRuntime: Send + Sync {
    /// Make one attempt to load a package into the runtime.
    ///
    /// Retrying is the caller's job.
    async fn install_package(&self, name: &str) -> Result<(), BridgeError>;

    /// Execute a module's source so its exports become callable.
    async fn execute_module(&self, module_id: &str, source: &ModuleSource)
    -> Result<(), BridgeError>;

    /// Whether an executed module exports `function`.
    async fn has_function(&self, module_id: &str, function: &str) -> bool;

    /// Call `function` in an executed module with already-serialized arguments.
    async fn invoke(
        &self,
        module_id: &str,
        function: &str,
        abi: CallAbi,
        args: Value,
    ) -> Result<Value, BridgeError>;
}

/// Creates the embedded runtime. Called at most once per successful boot.
#[async_trait]
pub trait RuntimeFactory: Send + Sync {
    /// Boot a new runtime instance.
    async fn boot(&self) -> Result<Arc<dyn EmbeddedRuntime>, BridgeError>;
}

/// Where package source comes from.
#[async_trait]
pub trait PackageSource: Send + Sync {
    /// Whether this source knows the package at all.
    fn provides(&self, name: &str) -> bool;

    /// Fetch the package source. Failures are reported per attempt.
    async fn fetch(&self, name: &str) -> Result<ModuleSource, BridgeError>;
}
