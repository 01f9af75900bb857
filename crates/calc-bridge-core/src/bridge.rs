//! The runtime bridge facade.
//!
//! [`RuntimeBridge`] wires the runtime manager, both loaders, the registry and
//! the dispatcher into one value that host code holds on to. It is cheap to
//! clone; clones share every component.
//!
//! Most processes want exactly one bridge. [`install_global`] and [`global`]
//! hold it; tests build their own isolated bridges with [`RuntimeBridge::new`].

use std::sync::{Arc, OnceLock};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::{
    CallDispatcher, MethodRegistry, ModuleDeclaration, ModuleLoader, ModuleState, PackageLoader,
    PackageState, RuntimeFactory, RuntimeManager,
};
use calc_bridge_common::{BridgeConfig, BridgeError};

static GLOBAL: OnceLock<RuntimeBridge> = OnceLock::new();

/// Host-side entry point to the embedded runtime.
#[derive(Clone, Debug)]
pub struct RuntimeBridge {
    manager: Arc<RuntimeManager>,
    packages: Arc<PackageLoader>,
    modules: Arc<ModuleLoader>,
    registry: Arc<MethodRegistry>,
    dispatcher: Arc<CallDispatcher>,
}

impl RuntimeBridge {
    /// Assemble a bridge. Nothing is booted or loaded until first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or two modules share
    /// an id.
    pub fn new(
        config: &BridgeConfig,
        factory: Arc<dyn RuntimeFactory>,
        declarations: impl IntoIterator<Item = ModuleDeclaration>,
        registry: MethodRegistry,
    ) -> Result<Self, BridgeError> {
        config.validate()?;

        let manager = Arc::new(RuntimeManager::new(factory));
        let packages = Arc::new(PackageLoader::new(config.loader.max_retries));
        let modules = Arc::new(ModuleLoader::new(declarations, Arc::clone(&packages))?);
        let registry = Arc::new(registry);
        let dispatcher = Arc::new(CallDispatcher::new(
            Arc::clone(&manager),
            Arc::clone(&modules),
            Arc::clone(&registry),
        ));

        info!(
            modules = modules.module_ids().len(),
            contracts = registry.len(),
            max_retries = packages.max_retries(),
            "Runtime bridge assembled"
        );

        Ok(Self {
            manager,
            packages,
            modules,
            registry,
            dispatcher,
        })
    }

    /// Boot the embedded runtime if it is not running yet.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::RuntimeBoot`] if booting fails.
    pub async fn initialize_runtime(&self) -> Result<(), BridgeError> {
        self.manager.initialize().await.map(|_| ())
    }

    /// Whether the runtime is running. Never blocks.
    pub fn is_initialized(&self) -> bool {
        self.manager.is_initialized()
    }

    /// Call a registered module function.
    ///
    /// # Errors
    ///
    /// See [`CallDispatcher::call`].
    pub async fn call<A, T>(&self, module_id: &str, function: &str, args: &A) -> Result<T, BridgeError>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.dispatcher.call(module_id, function, args).await
    }

    /// Call an operation by its exposed name.
    ///
    /// # Errors
    ///
    /// See [`CallDispatcher::invoke`].
    pub async fn invoke<A, T>(&self, exposed_name: &str, args: &A) -> Result<T, BridgeError>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.dispatcher.invoke(exposed_name, args).await
    }

    /// Bring a module to `Ready`, booting the runtime first if needed.
    ///
    /// A module left `Failed` by an earlier attempt is loaded again.
    ///
    /// # Errors
    ///
    /// Returns the boot, package or execution failure.
    pub async fn ensure_ready(&self, module_id: &str) -> Result<(), BridgeError> {
        let runtime = self.manager.initialize().await?;
        self.modules.ensure_ready(runtime.as_ref(), module_id).await
    }

    /// Snapshot of a module's state.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ModuleNotFound`] for undeclared modules.
    pub fn module_state(&self, module_id: &str) -> Result<ModuleState, BridgeError> {
        self.modules.state(module_id)
    }

    /// Snapshot of a package's state.
    pub fn package_state(&self, name: &str) -> PackageState {
        self.packages.state(name)
    }

    /// The runtime manager.
    pub fn manager(&self) -> &RuntimeManager {
        &self.manager
    }

    /// The package loader.
    pub fn packages(&self) -> &PackageLoader {
        &self.packages
    }

    /// The module loader.
    pub fn modules(&self) -> &ModuleLoader {
        &self.modules
    }

    /// The method registry.
    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }
}

/// Make `bridge` the process-wide bridge.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidConfig`] if a bridge is already installed.
pub fn install_global(bridge: RuntimeBridge) -> Result<&'static RuntimeBridge, BridgeError> {
    let mut installed = false;
    let current = GLOBAL.get_or_init(|| {
        installed = true;
        bridge
    });

    if installed {
        Ok(current)
    } else {
        Err(BridgeError::invalid_config(
            "a global runtime bridge is already installed",
        ))
    }
}

/// The process-wide bridge, if one was installed.
pub fn global() -> Option<&'static RuntimeBridge> {
    GLOBAL.get()
}
