//! Bundled statistics for calc-bridge.
//!
//! The catalog is everything static about the bridge:
//! - [`table`]: the dependency table and bundled packages
//! - [`contracts`]: the method registry
//! - [`operations`]: typed host operations
//! - [`verify`]: registry verification
//!
//! [`Catalog`] combines the bundled pieces with anything declared in a config
//! file and builds a [`RuntimeBridge`] from them.
//!
//! # Example
//!
//! ```no_run
//! # async fn example() -> Result<(), calc_bridge_common::BridgeError> {
//! use calc_bridge_catalog::{Catalog, operations};
//!
//! let bridge = Catalog::bundled()?.into_bridge()?;
//! let clusters = operations::cluster_analysis(&bridge, &[1.0, 2.0, 3.0, 10.0, 11.0, 12.0]).await?;
//! assert_eq!(clusters.labels, vec![0, 0, 0, 1, 1, 1]);
//! # Ok(())
//! # }
//! ```

pub mod contracts;
pub mod operations;
pub mod table;
pub mod verify;

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use calc_bridge_common::{BridgeConfig, BridgeError, ConfigFile};
use calc_bridge_core::{CallContract, MethodRegistry, ModuleDeclaration, PackageSource, RuntimeBridge};
use calc_bridge_host::{FilePackageSource, LayeredPackageSource, WasmRuntimeFactory, module_declarations};

pub use contracts::{CONTRACTS, bundled_registry};
pub use table::{DEPENDENCY_TABLE, bundled_declarations, bundled_packages};
pub use verify::Violation;

/// Everything needed to build a bridge.
pub struct Catalog {
    config: BridgeConfig,
    declarations: Vec<ModuleDeclaration>,
    registry: MethodRegistry,
    /// Consulted before the configured and bundled packages.
    overrides: Vec<Arc<dyn PackageSource>>,
    files: FilePackageSource,
}

impl Catalog {
    /// The bundled modules and contracts with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled registry is inconsistent.
    pub fn bundled() -> Result<Self, BridgeError> {
        Ok(Self {
            config: BridgeConfig::default(),
            declarations: bundled_declarations(),
            registry: bundled_registry()?,
            overrides: Vec::new(),
            files: FilePackageSource::default(),
        })
    }

    /// The bundled catalog extended by a config file.
    ///
    /// Paths in the file resolve against `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if a module file cannot be read, or a module id,
    /// exposed name or contract target collides with an existing one.
    pub fn with_config_file(file: &ConfigFile, base_dir: &Path) -> Result<Self, BridgeError> {
        let mut catalog = Self::bundled()?;
        catalog.config = file.bridge.clone();

        catalog
            .declarations
            .extend(module_declarations(&file.modules, base_dir)?);

        let contracts = file
            .contracts
            .iter()
            .map(CallContract::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        catalog.registry.extend(contracts)?;

        catalog.files = FilePackageSource::from_entries(&file.packages, base_dir);

        debug!(
            modules = catalog.declarations.len(),
            contracts = catalog.registry.len(),
            packages = file.packages.len(),
            "Catalog extended from config file"
        );

        Ok(catalog)
    }

    /// Serve packages from `source` ahead of every other source.
    #[must_use]
    pub fn with_package_source(mut self, source: Arc<dyn PackageSource>) -> Self {
        self.overrides.push(source);
        self
    }

    /// Replace the bridge configuration.
    #[must_use]
    pub fn with_config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// The bridge configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// All module declarations, bundled first.
    pub fn declarations(&self) -> &[ModuleDeclaration] {
        &self.declarations
    }

    /// The method registry.
    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Run every verification pass.
    ///
    /// Coverage is checked for the bundled contracts only; contracts added by
    /// a config file have no typed host operation.
    ///
    /// # Errors
    ///
    /// Returns an error if verification itself cannot run.
    pub fn verify(&self) -> Result<Vec<Violation>, BridgeError> {
        let mut violations = verify::verify_sources(&self.declarations, &self.registry)?;
        violations.extend(verify::verify_coverage(&bundled_registry()?));
        Ok(violations)
    }

    /// Build the bridge. Nothing is booted until first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or module ids collide.
    pub fn into_bridge(self) -> Result<RuntimeBridge, BridgeError> {
        let packages = self
            .overrides
            .into_iter()
            .fold(LayeredPackageSource::new(), LayeredPackageSource::layer)
            .layer(Arc::new(self.files))
            .layer(Arc::new(bundled_packages()));

        let factory = WasmRuntimeFactory::new(
            self.config.engine.clone(),
            self.config.execution.clone(),
            Arc::new(packages),
        );

        RuntimeBridge::new(
            &self.config,
            Arc::new(factory),
            self.declarations,
            self.registry,
        )
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("modules", &self.declarations.len())
            .field("contracts", &self.registry.len())
            .field("overrides", &self.overrides.len())
            .finish_non_exhaustive()
    }
}
