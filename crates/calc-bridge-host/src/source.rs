//! Where package source comes from.
//!
//! - [`StaticPackageSource`]: source held in memory (bundled packages)
//! - [`FilePackageSource`]: source read from disk on every fetch
//! - [`LayeredPackageSource`]: the first of several sources that provides a package

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use calc_bridge_common::{BridgeError, PackageEntry};
use calc_bridge_core::{ModuleSource, PackageSource};

/// Packages held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticPackageSource {
    packages: HashMap<String, ModuleSource>,
}

impl StaticPackageSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a package.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, source: ModuleSource) -> Self {
        self.packages.insert(name.into(), source);
        self
    }

    /// Names of the packages held, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.packages.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl PackageSource for StaticPackageSource {
    fn provides(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    async fn fetch(&self, name: &str) -> Result<ModuleSource, BridgeError> {
        self.packages
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::package_unavailable(name, "not bundled"))
    }
}

/// Packages read from `.wat` or `.wasm` files.
///
/// Files are read on every fetch, so a package that was missing or broken on
/// one attempt can succeed on the next.
#[derive(Debug, Clone, Default)]
pub struct FilePackageSource {
    paths: HashMap<String, PathBuf>,
}

impl FilePackageSource {
    /// Create a source from config entries. Relative paths resolve against `base_dir`.
    pub fn from_entries(entries: &[PackageEntry], base_dir: &Path) -> Self {
        let paths = entries
            .iter()
            .map(|entry| (entry.name.clone(), base_dir.join(&entry.path)))
            .collect();

        Self { paths }
    }

    /// Add a package file.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(name.into(), path.into());
        self
    }
}

#[async_trait]
impl PackageSource for FilePackageSource {
    fn provides(&self, name: &str) -> bool {
        self.paths.contains_key(name)
    }

    async fn fetch(&self, name: &str) -> Result<ModuleSource, BridgeError> {
        let path = self
            .paths
            .get(name)
            .ok_or_else(|| BridgeError::package_unavailable(name, "no file configured"))?;

        let bytes = tokio::fs::read(path).await.map_err(|e| {
            BridgeError::package_unavailable(name, format!("{}: {e}", path.display()))
        })?;
        debug!(package = %name, path = %path.display(), bytes = bytes.len(), "Package file read");

        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        ModuleSource::from_file_bytes(file_name, bytes)
            .map_err(|e| BridgeError::package_unavailable(name, e.to_string()))
    }
}

/// Tries sources in order; the first one that provides a package serves it.
#[derive(Clone, Default)]
pub struct LayeredPackageSource {
    layers: Vec<Arc<dyn PackageSource>>,
}

impl LayeredPackageSource {
    /// Create a source with no layers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer below the existing ones.
    #[must_use]
    pub fn layer(mut self, source: Arc<dyn PackageSource>) -> Self {
        self.layers.push(source);
        self
    }
}

#[async_trait]
impl PackageSource for LayeredPackageSource {
    fn provides(&self, name: &str) -> bool {
        self.layers.iter().any(|layer| layer.provides(name))
    }

    async fn fetch(&self, name: &str) -> Result<ModuleSource, BridgeError> {
        match self.layers.iter().find(|layer| layer.provides(name)) {
            Some(layer) => layer.fetch(name).await,
            None => Err(BridgeError::package_unavailable(
                name,
                "no package source provides it",
            )),
        }
    }
}

impl std::fmt::Debug for LayeredPackageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayeredPackageSource")
            .field("layers", &self.layers.len())
            .finish()
    }
}
