//! The Wasmtime-backed embedded runtime.
//!
//! [`WasmRuntime`] keeps one [`Store`] and one [`Linker`] for the lifetime of
//! the process:
//!
//! 1. Installing a package instantiates it and registers its exports in the
//!    linker under the package name.
//! 2. Executing a module instantiates it against the linker, which resolves
//!    its package imports and runs its start function.
//! 3. Invoking a function calls an export of an executed module instance.
//!
//! All three go through one async mutex, so the runtime executes one operation
//! at a time no matter how many callers are waiting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use wasmtime::{Instance, Linker, Store, Trap, Val, ValType};

use crate::marshal;
use crate::store::{
    BridgeContext, ExecutionMetrics, calculate_fuel_consumed, create_store, get_remaining_fuel,
    refuel,
};
use crate::{CallAbi, CompiledModule, EmbeddedRuntime, ModuleSource, PackageSource, WasmEngine};
use calc_bridge_common::{BridgeError, ExecutionConfig};

/// Guest export that allocates `bytes` of linear memory and returns the offset.
pub const ALLOC_EXPORT: &str = "alloc";

/// Optional guest export that releases everything `alloc` handed out.
pub const RESET_EXPORT: &str = "reset";

/// Guest memory export used by the vector convention.
pub const MEMORY_EXPORT: &str = "memory";

struct RuntimeInner {
    store: Store<BridgeContext>,
    linker: Linker<BridgeContext>,
    instances: HashMap<String, Instance>,
}

/// Embedded WebAssembly runtime.
pub struct WasmRuntime {
    engine: WasmEngine,
    packages: Arc<dyn PackageSource>,
    exec_config: ExecutionConfig,
    inner: Mutex<RuntimeInner>,
}

impl WasmRuntime {
    /// Create the runtime around a linker with host functions already registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be created.
    pub fn new(
        engine: WasmEngine,
        linker: Linker<BridgeContext>,
        packages: Arc<dyn PackageSource>,
        exec_config: ExecutionConfig,
    ) -> Result<Self, BridgeError> {
        let store = create_store(&engine, &exec_config)?;

        Ok(Self {
            engine,
            packages,
            exec_config,
            inner: Mutex::new(RuntimeInner {
                store,
                linker,
                instances: HashMap::new(),
            }),
        })
    }

    /// Get the engine.
    pub fn engine(&self) -> &WasmEngine {
        &self.engine
    }

    /// Ids of executed modules, sorted.
    pub async fn executed_modules(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        let mut ids: Vec<String> = inner.instances.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot of the runtime's execution counters.
    pub async fn metrics(&self) -> ExecutionMetrics {
        self.inner.lock().await.store.data().metrics.clone()
    }

    fn refuel(&self, store: &mut Store<BridgeContext>) -> Result<u64, BridgeError> {
        if self.engine.is_fuel_metered() {
            refuel(store, self.exec_config.max_fuel)?;
            Ok(self.exec_config.max_fuel)
        } else {
            Ok(0)
        }
    }
}

#[async_trait]
impl EmbeddedRuntime for WasmRuntime {
    #[instrument(skip(self))]
    async fn install_package(&self, name: &str) -> Result<(), BridgeError> {
        let source = self.packages.fetch(name).await?;
        let compiled = CompiledModule::from_source(self.engine.inner(), &source)
            .map_err(|e| BridgeError::package_unavailable(name, e.to_string()))?;

        let mut guard = self.inner.lock().await;
        let RuntimeInner { store, linker, .. } = &mut *guard;

        self.refuel(store)?;
        store.data_mut().begin(name);

        let instance = linker
            .instantiate_async(&mut *store, compiled.module())
            .await
            .map_err(|e| BridgeError::package_unavailable(name, format!("instantiation failed: {e}")));
        store.data_mut().end();
        let instance = instance?;

        linker
            .instance(&mut *store, name, instance)
            .map_err(|e| BridgeError::package_unavailable(name, format!("registration failed: {e}")))?;

        debug!(package = %name, content_hash = %compiled.content_hash(), "Package registered in linker");
        Ok(())
    }

    #[instrument(skip(self, source), fields(source_len = source.len()))]
    async fn execute_module(
        &self,
        module_id: &str,
        source: &ModuleSource,
    ) -> Result<(), BridgeError> {
        let compiled = CompiledModule::from_source(self.engine.inner(), source)
            .map_err(|e| BridgeError::module_execution(module_id, e.to_string(), Vec::new()))?;

        let mut guard = self.inner.lock().await;
        let RuntimeInner {
            store,
            linker,
            instances,
        } = &mut *guard;

        self.refuel(store)?;
        store.data_mut().take_logs();
        store.data_mut().begin(module_id);

        let result = linker
            .instantiate_async(&mut *store, compiled.module())
            .await;

        store.data_mut().end();
        let diagnostics = store.data_mut().take_logs();

        let instance = result.map_err(|e| {
            warn!(module = %module_id, error = %e, "Module source failed");
            BridgeError::module_execution(module_id, format!("{e:#}"), diagnostics)
        })?;

        instances.insert(module_id.to_string(), instance);
        info!(module = %module_id, content_hash = %compiled.content_hash(), "Module source executed");
        Ok(())
    }

    async fn has_function(&self, module_id: &str, function: &str) -> bool {
        let mut guard = self.inner.lock().await;
        let RuntimeInner {
            store, instances, ..
        } = &mut *guard;

        instances
            .get(module_id)
            .is_some_and(|instance| instance.get_func(&mut *store, function).is_some())
    }

    #[instrument(skip(self, args), fields(abi = %abi))]
    async fn invoke(
        &self,
        module_id: &str,
        function: &str,
        abi: CallAbi,
        args: Value,
    ) -> Result<Value, BridgeError> {
        let target = format!("{module_id}::{function}");
        let mut guard = self.inner.lock().await;
        let RuntimeInner {
            store, instances, ..
        } = &mut *guard;

        let instance = *instances
            .get(module_id)
            .ok_or_else(|| BridgeError::function_not_found(module_id, function))?;

        let start = Instant::now();
        let initial_fuel = self.refuel(store)?;
        store.data_mut().take_logs();
        store.data_mut().begin(target.clone());

        let result = match abi {
            CallAbi::Scalar => call_scalar(store, instance, module_id, function, &args).await,
            CallAbi::Vector => call_vector(store, instance, module_id, function, &args).await,
        };

        let fuel_consumed = if self.engine.is_fuel_metered() {
            calculate_fuel_consumed(initial_fuel, store)
        } else {
            0
        };
        let elapsed = start.elapsed();
        let ctx = store.data_mut();
        ctx.end();
        ctx.record_call(fuel_consumed, elapsed);

        debug!(
            target = %target,
            duration_ms = elapsed.as_millis(),
            fuel_consumed,
            remaining_fuel = get_remaining_fuel(store),
            ok = result.is_ok(),
            "Call finished"
        );

        result
    }
}

async fn call_scalar(
    store: &mut Store<BridgeContext>,
    instance: Instance,
    module_id: &str,
    function: &str,
    args: &Value,
) -> Result<Value, BridgeError> {
    let target = format!("{module_id}::{function}");
    let func = instance
        .get_func(&mut *store, function)
        .ok_or_else(|| BridgeError::function_not_found(module_id, function))?;

    let ty = func.ty(&*store);
    let param_types: Vec<ValType> = ty.params().collect();
    let params = marshal::scalar_params(&target, &param_types, args)?;
    let mut results = vec![Val::I32(0); ty.results().len()];

    func.call_async(&mut *store, &params, &mut results)
        .await
        .map_err(|e| classify_trap(module_id, function, &e))?;

    marshal::scalar_results(&target, &results)
}

async fn call_vector(
    store: &mut Store<BridgeContext>,
    instance: Instance,
    module_id: &str,
    function: &str,
    args: &Value,
) -> Result<Value, BridgeError> {
    let target = format!("{module_id}::{function}");
    let values = marshal::f64_vector(&target, args)?;

    let func = instance
        .get_func(&mut *store, function)
        .ok_or_else(|| BridgeError::function_not_found(module_id, function))?;
    let memory = instance
        .get_memory(&mut *store, MEMORY_EXPORT)
        .ok_or_else(|| BridgeError::marshal(&target, "module does not export memory"))?;
    let alloc = instance
        .get_typed_func::<i32, i32>(&mut *store, ALLOC_EXPORT)
        .map_err(|e| BridgeError::marshal(&target, format!("module has no usable alloc: {e}")))?;

    let ty = func.ty(&*store);
    let params: Vec<ValType> = ty.params().collect();
    if !matches!(params.as_slice(), [ValType::I32, ValType::I32]) {
        return Err(BridgeError::marshal(
            &target,
            "vector functions must take (ptr: i32, len: i32)",
        ));
    }
    let returns_vector = match ty.results().collect::<Vec<_>>().as_slice() {
        [ValType::F64] => false,
        [ValType::I64] => true,
        _ => {
            return Err(BridgeError::marshal(
                &target,
                "vector functions must return f64 or a packed i64 vector",
            ));
        }
    };

    if let Ok(reset) = instance.get_typed_func::<(), ()>(&mut *store, RESET_EXPORT) {
        reset
            .call_async(&mut *store, ())
            .await
            .map_err(|e| classify_trap(module_id, function, &e))?;
    }

    let bytes = marshal::encode_f64s(&values);
    let byte_len = i32::try_from(bytes.len())
        .map_err(|_| BridgeError::marshal(&target, "argument vector too large"))?;
    let len = i32::try_from(values.len())
        .map_err(|_| BridgeError::marshal(&target, "argument vector too large"))?;

    let ptr = alloc
        .call_async(&mut *store, byte_len)
        .await
        .map_err(|e| classify_trap(module_id, function, &e))?;
    let offset = usize::try_from(ptr)
        .map_err(|_| BridgeError::marshal(&target, format!("alloc returned invalid offset {ptr}")))?;
    memory
        .write(&mut *store, offset, &bytes)
        .map_err(|e| BridgeError::marshal(&target, format!("writing arguments failed: {e}")))?;

    let mut results = [Val::I32(0)];
    func.call_async(&mut *store, &[Val::I32(ptr), Val::I32(len)], &mut results)
        .await
        .map_err(|e| classify_trap(module_id, function, &e))?;

    if !returns_vector {
        return marshal::scalar_results(&target, &results);
    }

    let packed = results[0]
        .i64()
        .ok_or_else(|| BridgeError::marshal(&target, "expected packed i64 result"))?;
    let (out_ptr, out_len) = marshal::unpack(packed);
    let bytes = marshal::output_range(out_ptr, out_len, memory.data_size(&*store))
        .and_then(|range| memory.data(&*store).get(range))
        .ok_or_else(|| {
            BridgeError::marshal(
                &target,
                format!("result vector out of bounds: {out_len} values at offset {out_ptr}"),
            )
        })?;

    marshal::vector_result(&target, &marshal::decode_f64s(bytes))
}

/// Map a failed guest call to the bridge taxonomy.
fn classify_trap(module_id: &str, function: &str, error: &wasmtime::Error) -> BridgeError {
    match error.downcast_ref::<Trap>() {
        Some(Trap::OutOfFuel) => BridgeError::execution_limit(module_id, function),
        Some(trap) => BridgeError::domain(module_id, function, format!("{trap}: {error}")),
        None => BridgeError::domain(module_id, function, error.to_string()),
    }
}

impl std::fmt::Debug for WasmRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmRuntime")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
