//! Runtime lifecycle.
//!
//! [`RuntimeManager`] owns the single embedded runtime instance. Booting is
//! lazy and idempotent: the first caller of [`initialize`](RuntimeManager::initialize)
//! boots the runtime, concurrent callers wait on that same boot and share its
//! outcome, and later callers get the existing instance immediately.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::{EmbeddedRuntime, RuntimeFactory};
use calc_bridge_common::BridgeError;

/// Owns the embedded runtime and its boot state.
pub struct RuntimeManager {
    factory: Arc<dyn RuntimeFactory>,
    runtime: OnceLock<Arc<dyn EmbeddedRuntime>>,
    /// Held for the duration of one boot; waiters queue here.
    boot_guard: Mutex<()>,
    /// Boots that ran to completion, used to tell waiters apart from fresh callers.
    completed: AtomicU64,
    last_failure: SyncMutex<Option<BridgeError>>,
    boot_attempts: AtomicU32,
}

impl RuntimeManager {
    /// Create a manager that boots through `factory` on first use.
    pub fn new(factory: Arc<dyn RuntimeFactory>) -> Self {
        Self {
            factory,
            runtime: OnceLock::new(),
            boot_guard: Mutex::new(()),
            completed: AtomicU64::new(0),
            last_failure: SyncMutex::new(None),
            boot_attempts: AtomicU32::new(0),
        }
    }

    /// Boot the runtime if needed and return it.
    ///
    /// Callers that arrive while a boot is in flight receive that boot's
    /// result, failure included. A failed boot is not retried here; the next
    /// call to `initialize` after it completed makes a fresh attempt.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::RuntimeBoot`] if the factory fails.
    pub async fn initialize(&self) -> Result<Arc<dyn EmbeddedRuntime>, BridgeError> {
        if let Some(runtime) = self.runtime.get() {
            return Ok(Arc::clone(runtime));
        }

        let seen = self.completed.load(Ordering::Acquire);
        let _boot = self.boot_guard.lock().await;

        if let Some(runtime) = self.runtime.get() {
            return Ok(Arc::clone(runtime));
        }
        if self.completed.load(Ordering::Acquire) != seen {
            if let Some(err) = self.last_failure.lock().clone() {
                debug!("Sharing failure of the boot this caller waited on");
                return Err(err);
            }
        }

        let attempt = self.boot_attempts.fetch_add(1, Ordering::Relaxed) + 1;
        let start = Instant::now();
        info!(attempt, "Booting embedded runtime");

        let outcome = match self.factory.boot().await {
            Ok(runtime) => {
                info!(
                    duration_ms = start.elapsed().as_millis(),
                    "Embedded runtime ready"
                );
                *self.last_failure.lock() = None;
                Ok(Arc::clone(self.runtime.get_or_init(|| runtime)))
            }
            Err(e) => {
                error!(attempt, error = %e, "Embedded runtime failed to boot");
                let err = match e {
                    BridgeError::RuntimeBoot { .. } => e,
                    other => BridgeError::runtime_boot(other.to_string()),
                };
                *self.last_failure.lock() = Some(err.clone());
                Err(err)
            }
        };

        self.completed.fetch_add(1, Ordering::Release);
        outcome
    }

    /// Whether the runtime has finished booting. Never blocks.
    pub fn is_initialized(&self) -> bool {
        self.runtime.get().is_some()
    }

    /// The booted runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::RuntimeNotInitialized`] before a successful boot.
    pub fn runtime(&self) -> Result<Arc<dyn EmbeddedRuntime>, BridgeError> {
        self.runtime
            .get()
            .cloned()
            .ok_or(BridgeError::RuntimeNotInitialized)
    }

    /// Number of boots started, successful or not.
    pub fn boot_attempts(&self) -> u32 {
        self.boot_attempts.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for RuntimeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeManager")
            .field("initialized", &self.is_initialized())
            .field("boot_attempts", &self.boot_attempts())
            .finish_non_exhaustive()
    }
}
