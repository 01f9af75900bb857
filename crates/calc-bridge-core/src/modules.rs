//! Module loading.
//!
//! The [`ModuleLoader`] owns the module table and is the only writer of module
//! state. Bringing a module to `Ready` always happens in two steps, in this
//! order:
//!
//! 1. load every declared package through the [`PackageLoader`]
//! 2. execute the module source in the runtime
//!
//! Module source imports from its packages unconditionally, so running it
//! first would surface as an unresolved import instead of a package failure.
//!
//! Concurrent requests for the same module coalesce: only one load runs, and
//! everyone who was waiting on it sees its outcome. A load whose caller is
//! dropped midway (for example by a timeout) leaves the module as it found it,
//! so the next caller starts over.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::{EmbeddedRuntime, ModuleDeclaration, PackageLoader};
use calc_bridge_common::BridgeError;

/// Lifecycle of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleState {
    Unloaded,
    Loading,
    Ready,
    Failed(BridgeError),
}

impl ModuleState {
    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// `Ready` is terminal. `Failed` may only go back to `Loading`.
    pub fn can_transition_to(&self, next: &ModuleState) -> bool {
        matches!(
            (self, next),
            (ModuleState::Unloaded | ModuleState::Failed(_), ModuleState::Loading)
                | (ModuleState::Loading, ModuleState::Ready | ModuleState::Failed(_))
        )
    }

    /// Short name of the state, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            ModuleState::Unloaded => "unloaded",
            ModuleState::Loading => "loading",
            ModuleState::Ready => "ready",
            ModuleState::Failed(_) => "failed",
        }
    }
}

/// What to do when the module is found in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnFailed {
    /// Run the full load sequence again.
    Reload,
    /// Report the recorded failure.
    Report,
}

struct ModuleSlot {
    declaration: ModuleDeclaration,
    state: RwLock<ModuleState>,
    /// Held for the duration of one load; waiters queue here.
    load_guard: Mutex<()>,
    /// Completed load attempts, used to tell waiters apart from fresh callers.
    completed: AtomicU64,
}

impl ModuleSlot {
    fn snapshot(&self) -> ModuleState {
        self.state.read().clone()
    }

    fn transition(&self, next: ModuleState) {
        let mut state = self.state.write();
        debug_assert!(
            state.can_transition_to(&next),
            "illegal module transition {} -> {} for '{}'",
            state.name(),
            next.name(),
            self.declaration.id
        );
        debug!(
            module = %self.declaration.id,
            from = state.name(),
            to = next.name(),
            "Module state transition"
        );
        *state = next;
    }
}

/// One in-flight load. Dropping it unfinished puts the slot back in the state
/// it was in before the load started.
struct LoadAttempt<'a> {
    slot: &'a ModuleSlot,
    previous: Option<ModuleState>,
}

impl<'a> LoadAttempt<'a> {
    fn start(slot: &'a ModuleSlot) -> Self {
        let previous = slot.snapshot();
        slot.transition(ModuleState::Loading);
        Self {
            slot,
            previous: Some(previous),
        }
    }

    fn finish(mut self, next: ModuleState) {
        self.previous = None;
        self.slot.transition(next);
    }
}

impl Drop for LoadAttempt<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            warn!(
                module = %self.slot.declaration.id,
                restored = previous.name(),
                "Module load abandoned before completion"
            );
            *self.slot.state.write() = previous;
        }
    }
}

/// Owns the module table and drives modules to `Ready`.
pub struct ModuleLoader {
    modules: HashMap<String, Arc<ModuleSlot>>,
    packages: Arc<PackageLoader>,
}

impl ModuleLoader {
    /// Build the module table.
    ///
    /// # Errors
    ///
    /// Returns an error if two declarations share an id.
    pub fn new(
        declarations: impl IntoIterator<Item = ModuleDeclaration>,
        packages: Arc<PackageLoader>,
    ) -> Result<Self, BridgeError> {
        let mut modules = HashMap::new();

        for declaration in declarations {
            let id = declaration.id.clone();
            let slot = Arc::new(ModuleSlot {
                declaration,
                state: RwLock::new(ModuleState::Unloaded),
                load_guard: Mutex::new(()),
                completed: AtomicU64::new(0),
            });

            if modules.insert(id.clone(), slot).is_some() {
                return Err(BridgeError::invalid_config(format!(
                    "module '{id}' is declared more than once"
                )));
            }
        }

        Ok(Self { modules, packages })
    }

    fn slot(&self, module_id: &str) -> Result<&Arc<ModuleSlot>, BridgeError> {
        self.modules
            .get(module_id)
            .ok_or_else(|| BridgeError::module_not_found(module_id))
    }

    /// The declaration of a module.
    pub fn declaration(&self, module_id: &str) -> Option<&ModuleDeclaration> {
        self.modules.get(module_id).map(|slot| &slot.declaration)
    }

    /// All declared module ids, sorted.
    pub fn module_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Snapshot of a module's state.
    pub fn state(&self, module_id: &str) -> Result<ModuleState, BridgeError> {
        self.slot(module_id).map(|slot| slot.snapshot())
    }

    /// The package loader used for dependencies.
    pub fn packages(&self) -> &PackageLoader {
        &self.packages
    }

    /// Bring a module to `Ready`.
    ///
    /// A `Ready` module returns immediately. A `Failed` module is loaded again
    /// from scratch, packages first.
    ///
    /// # Errors
    ///
    /// Returns the package or execution failure that left the module `Failed`.
    pub async fn ensure_ready(
        &self,
        runtime: &dyn EmbeddedRuntime,
        module_id: &str,
    ) -> Result<(), BridgeError> {
        self.drive(runtime, module_id, OnFailed::Reload).await
    }

    /// Like [`ensure_ready`](Self::ensure_ready), but a `Failed` module reports
    /// its recorded failure without running anything.
    pub async fn require_ready(
        &self,
        runtime: &dyn EmbeddedRuntime,
        module_id: &str,
    ) -> Result<(), BridgeError> {
        self.drive(runtime, module_id, OnFailed::Report).await
    }

    #[instrument(skip(self, runtime), fields(module = %module_id))]
    async fn drive(
        &self,
        runtime: &dyn EmbeddedRuntime,
        module_id: &str,
        on_failed: OnFailed,
    ) -> Result<(), BridgeError> {
        let slot = self.slot(module_id)?;

        match slot.snapshot() {
            ModuleState::Ready => return Ok(()),
            ModuleState::Failed(err) if on_failed == OnFailed::Report => return Err(err),
            _ => {}
        }

        let seen = slot.completed.load(Ordering::Acquire);
        let _load = slot.load_guard.lock().await;

        match slot.snapshot() {
            ModuleState::Ready => return Ok(()),
            ModuleState::Failed(err)
                if on_failed == OnFailed::Report
                    || slot.completed.load(Ordering::Acquire) != seen =>
            {
                // The load we queued behind failed.
                return Err(err);
            }
            _ => {}
        }

        let attempt = LoadAttempt::start(slot);
        let start = Instant::now();

        let result = self.load(runtime, &slot.declaration).await;

        match &result {
            Ok(()) => {
                attempt.finish(ModuleState::Ready);
                info!(
                    weight = %slot.declaration.weight,
                    duration_ms = start.elapsed().as_millis(),
                    "Module ready"
                );
            }
            Err(e) => {
                attempt.finish(ModuleState::Failed(e.clone()));
                error!(error = %e, "Module failed to load");
            }
        }

        slot.completed.fetch_add(1, Ordering::Release);
        result
    }

    async fn load(
        &self,
        runtime: &dyn EmbeddedRuntime,
        declaration: &ModuleDeclaration,
    ) -> Result<(), BridgeError> {
        if !declaration.required_packages.is_empty() {
            self.packages
                .load_packages(runtime, &declaration.required_packages, &declaration.id)
                .await?;
        }

        runtime
            .execute_module(&declaration.id, &declaration.source)
            .await
    }
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("modules", &self.module_ids())
            .finish_non_exhaustive()
    }
}
