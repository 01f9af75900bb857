//! Call dispatch.
//!
//! [`CallDispatcher`] is the single path from host code into module functions.
//! A call goes through these steps, and stops at the first failure:
//!
//! 1. resolve the exposed name in the [`MethodRegistry`]
//! 2. boot the runtime if needed
//! 3. make sure the owning module is `Ready`
//! 4. check the module exports the function
//! 5. marshal arguments, invoke, unmarshal the result
//!
//! Names that are not registered never reach the runtime.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::{CallContract, MethodRegistry, ModuleLoader, RuntimeManager};
use calc_bridge_common::BridgeError;

/// Routes exposed operations to module functions.
#[derive(Debug)]
pub struct CallDispatcher {
    manager: Arc<RuntimeManager>,
    modules: Arc<ModuleLoader>,
    registry: Arc<MethodRegistry>,
}

impl CallDispatcher {
    /// Create a dispatcher over the given components.
    pub fn new(
        manager: Arc<RuntimeManager>,
        modules: Arc<ModuleLoader>,
        registry: Arc<MethodRegistry>,
    ) -> Self {
        Self {
            manager,
            modules,
            registry,
        }
    }

    /// The registry calls are resolved against.
    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Call `function` in `module_id` with typed arguments.
    ///
    /// The pair must be registered; there is no way to reach an unregistered
    /// export.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::FunctionNotFound`] if the pair is not registered or the
    ///   module does not export it
    /// - boot, package and module errors from bringing the module up
    /// - [`BridgeError::Marshal`], [`BridgeError::Domain`] or
    ///   [`BridgeError::ExecutionLimit`] from the call itself
    pub async fn call<A, T>(&self, module_id: &str, function: &str, args: &A) -> Result<T, BridgeError>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let contract = self
            .registry
            .resolve(module_id, function)
            .ok_or_else(|| BridgeError::function_not_found(module_id, function))?;

        self.dispatch(contract, args).await
    }

    /// Call the operation registered under `exposed_name`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UnknownOperation`] if the name is not registered,
    /// otherwise the same errors as [`call`](Self::call).
    pub async fn invoke<A, T>(&self, exposed_name: &str, args: &A) -> Result<T, BridgeError>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let contract = self
            .registry
            .get(exposed_name)
            .ok_or_else(|| BridgeError::unknown_operation(exposed_name))?;

        self.dispatch(contract, args).await
    }

    #[instrument(
        skip(self, contract, args),
        fields(module = %contract.module_id, function = %contract.function_name)
    )]
    async fn dispatch<A, T>(&self, contract: &CallContract, args: &A) -> Result<T, BridgeError>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let target = contract.target();
        let module_id = contract.module_id.as_ref();
        let function = contract.function_name.as_ref();

        let runtime = self.manager.initialize().await?;
        self.modules.require_ready(runtime.as_ref(), module_id).await?;

        if !runtime.has_function(module_id, function).await {
            warn!("Registered function is not exported by its module");
            return Err(BridgeError::function_not_found(module_id, function));
        }

        let args = serde_json::to_value(args)
            .map_err(|e| BridgeError::marshal(&target, format!("arguments: {e}")))?;

        let start = Instant::now();
        let result = runtime
            .invoke(module_id, function, contract.abi, args)
            .await?;
        debug!(duration_ms = start.elapsed().as_millis(), "Dispatched");

        decode(&target, result)
    }
}

fn decode<T: DeserializeOwned>(target: &str, value: Value) -> Result<T, BridgeError> {
    serde_json::from_value(value).map_err(|e| BridgeError::marshal(target, format!("result: {e}")))
}
