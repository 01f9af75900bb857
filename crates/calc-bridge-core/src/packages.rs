//! Package loading.
//!
//! The [`PackageLoader`] is the only writer of package state. Package records
//! are shared by every module that declares the package: once a package is
//! loaded for one module it is skipped for all others.
//!
//! Each package gets a bounded number of back-to-back attempts. When they are
//! all used up the whole batch stops and the dependent module is reported as
//! unable to run; a partially loaded dependency set is never accepted.

use std::collections::BTreeSet;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::EmbeddedRuntime;
use crate::retry::retry;
use calc_bridge_common::BridgeError;

/// Lifecycle of a package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PackageState {
    #[default]
    NotLoaded,
    Loading,
    Loaded,
    /// Every attempt failed; holds the last loader error.
    Failed(String),
}

#[derive(Debug, Default)]
struct PackageRecord {
    state: PackageState,
    /// Modules that declared this package.
    dependents: BTreeSet<String>,
    /// Install attempts made over the loader's lifetime.
    attempts: u32,
}

/// Loads packages into the embedded runtime with bounded retry.
#[derive(Debug)]
pub struct PackageLoader {
    max_retries: u32,
    records: DashMap<String, PackageRecord>,
    /// Serializes installation work across concurrent batches.
    install_lock: Mutex<()>,
}

impl PackageLoader {
    /// Create a loader that makes up to `max_retries` attempts per package.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.max(1),
            records: DashMap::new(),
            install_lock: Mutex::new(()),
        }
    }

    /// Attempts made per package before giving up.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Load `names` in order on behalf of `module_id`.
    ///
    /// Already-loaded packages are skipped. The first package to exhaust its
    /// attempts aborts the batch.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::PackageLoad`] naming the package, the module, and
    /// the last loader error.
    #[instrument(skip(self, runtime, names), fields(module = %module_id, count = names.len()))]
    pub async fn load_packages(
        &self,
        runtime: &dyn EmbeddedRuntime,
        names: &[String],
        module_id: &str,
    ) -> Result<(), BridgeError> {
        if names.is_empty() {
            return Ok(());
        }

        let start = Instant::now();

        for name in names {
            self.records
                .entry(name.clone())
                .or_default()
                .dependents
                .insert(module_id.to_string());

            self.load_one(runtime, name, module_id).await?;
        }

        debug!(
            duration_ms = start.elapsed().as_millis(),
            "Package batch loaded"
        );

        Ok(())
    }

    async fn load_one(
        &self,
        runtime: &dyn EmbeddedRuntime,
        name: &str,
        module_id: &str,
    ) -> Result<(), BridgeError> {
        let _install = self.install_lock.lock().await;

        if self.state(name) == PackageState::Loaded {
            debug!(package = %name, "Package already loaded");
            return Ok(());
        }

        let install = InstallAttempt::start(self, name);
        let start = Instant::now();

        let outcome = retry(self.max_retries, |attempt| async move {
            self.count_attempt(name);
            let result = runtime.install_package(name).await;
            if let Err(ref e) = result {
                warn!(package = %name, attempt, max = self.max_retries, error = %e, "Package load attempt failed");
            }
            result
        })
        .await;

        match outcome {
            Ok(()) => {
                install.finish(PackageState::Loaded);
                info!(
                    package = %name,
                    duration_ms = start.elapsed().as_millis(),
                    "Package loaded"
                );
                Ok(())
            }
            Err(exhausted) => {
                let reason = exhausted.last_error.to_string();
                install.finish(PackageState::Failed(reason.clone()));
                error!(
                    package = %name,
                    module = %module_id,
                    attempts = exhausted.attempts,
                    error = %reason,
                    "Package failed to load"
                );
                Err(BridgeError::package_load(
                    name,
                    module_id,
                    exhausted.attempts,
                    reason,
                ))
            }
        }
    }

    fn set_state(&self, name: &str, state: PackageState) {
        self.records.entry(name.to_string()).or_default().state = state;
    }

    fn count_attempt(&self, name: &str) {
        self.records.entry(name.to_string()).or_default().attempts += 1;
    }

    /// Snapshot of a package's state. Unknown packages are `NotLoaded`.
    pub fn state(&self, name: &str) -> PackageState {
        self.records
            .get(name)
            .map(|record| record.state.clone())
            .unwrap_or_default()
    }

    /// Modules that have declared `name`, sorted.
    pub fn dependents(&self, name: &str) -> Vec<String> {
        self.records
            .get(name)
            .map(|record| record.dependents.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Install attempts made for `name`.
    pub fn attempts(&self, name: &str) -> u32 {
        self.records.get(name).map_or(0, |record| record.attempts)
    }

    /// Names of all loaded packages, sorted.
    pub fn loaded(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .records
            .iter()
            .filter(|entry| entry.state == PackageState::Loaded)
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}

/// One package installation. Dropping it unfinished puts the package back in
/// the state it was in before the installation started.
struct InstallAttempt<'a> {
    loader: &'a PackageLoader,
    name: &'a str,
    previous: Option<PackageState>,
}

impl<'a> InstallAttempt<'a> {
    fn start(loader: &'a PackageLoader, name: &'a str) -> Self {
        let previous = loader.state(name);
        loader.set_state(name, PackageState::Loading);
        Self {
            loader,
            name,
            previous: Some(previous),
        }
    }

    fn finish(mut self, next: PackageState) {
        self.previous = None;
        self.loader.set_state(self.name, next);
    }
}

impl Drop for InstallAttempt<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            warn!(package = %self.name, "Package installation abandoned before completion");
            self.loader.set_state(self.name, previous);
        }
    }
}

impl Default for PackageLoader {
    fn default() -> Self {
        Self::new(3)
    }
}
