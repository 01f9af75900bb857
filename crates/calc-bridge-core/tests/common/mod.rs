//! Scripted embedded runtime shared by the integration tests.
//!
//! [`ScriptedRuntime`] does not run any code. It records every operation it
//! receives and answers from a script, so tests can assert on ordering and
//! call counts.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use calc_bridge_common::{BridgeConfig, BridgeError, LoaderConfig};
use calc_bridge_core::{
    CallAbi, CallContract, EmbeddedRuntime, MethodRegistry, ModuleDeclaration, ModuleSource,
    RuntimeBridge, RuntimeFactory, Weight,
};

/// One operation received by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Install(String),
    Execute(String),
    Invoke(String, String),
}

#[derive(Default)]
struct Script {
    /// Packages that fail this many more times before succeeding.
    failures: HashMap<String, u32>,
    /// Packages that never load.
    broken: HashSet<String>,
    /// Modules whose source fails to execute.
    failing_modules: HashSet<String>,
    /// Canned results per `module::function`.
    responses: HashMap<String, Value>,
    /// Module functions that trap.
    traps: HashSet<String>,
}

/// In-memory runtime that follows a script.
#[derive(Default)]
pub struct ScriptedRuntime {
    events: Mutex<Vec<Event>>,
    script: Mutex<Script>,
    executed: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail every install of `package` with a network error.
    pub fn break_package(&self, package: &str) {
        self.script.lock().broken.insert(package.to_string());
    }

    /// Fail the next `times` installs of `package`.
    pub fn fail_package(&self, package: &str, times: u32) {
        self.script
            .lock()
            .failures
            .insert(package.to_string(), times);
    }

    /// Fail every execution of `module`'s source.
    pub fn fail_module(&self, module: &str) {
        self.script.lock().failing_modules.insert(module.to_string());
    }

    /// Return `value` from `module::function`.
    pub fn respond(&self, module: &str, function: &str, value: Value) {
        self.script
            .lock()
            .responses
            .insert(format!("{module}::{function}"), value);
    }

    /// Make `module::function` trap.
    pub fn trap(&self, module: &str, function: &str) {
        self.script
            .lock()
            .traps
            .insert(format!("{module}::{function}"));
    }

    /// Sleep this long inside every install and execute.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn installs(&self, package: &str) -> usize {
        self.count(|e| matches!(e, Event::Install(p) if p == package))
    }

    pub fn executions(&self, module: &str) -> usize {
        self.count(|e| matches!(e, Event::Execute(m) if m == module))
    }

    pub fn invocations(&self) -> usize {
        self.count(|e| matches!(e, Event::Invoke(..)))
    }

    fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    fn record(&self, event: Event) {
        self.events.lock().push(event);
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl EmbeddedRuntime for ScriptedRuntime {
    async fn install_package(&self, name: &str) -> Result<(), BridgeError> {
        self.record(Event::Install(name.to_string()));
        self.pause().await;

        let mut script = self.script.lock();
        if script.broken.contains(name) {
            return Err(BridgeError::package_unavailable(name, "Network error"));
        }
        if let Some(remaining) = script.failures.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BridgeError::package_unavailable(name, "Network error"));
            }
        }
        Ok(())
    }

    async fn execute_module(
        &self,
        module_id: &str,
        _source: &ModuleSource,
    ) -> Result<(), BridgeError> {
        self.record(Event::Execute(module_id.to_string()));
        self.pause().await;

        if self.script.lock().failing_modules.contains(module_id) {
            return Err(BridgeError::module_execution(
                module_id,
                "source raised",
                vec!["ERROR source raised".to_string()],
            ));
        }

        self.executed.lock().insert(module_id.to_string());
        Ok(())
    }

    async fn has_function(&self, module_id: &str, function: &str) -> bool {
        self.executed.lock().contains(module_id)
            && self
                .script
                .lock()
                .responses
                .contains_key(&format!("{module_id}::{function}"))
    }

    async fn invoke(
        &self,
        module_id: &str,
        function: &str,
        _abi: CallAbi,
        _args: Value,
    ) -> Result<Value, BridgeError> {
        self.record(Event::Invoke(module_id.to_string(), function.to_string()));

        let key = format!("{module_id}::{function}");
        let script = self.script.lock();
        if script.traps.contains(&key) {
            return Err(BridgeError::domain(module_id, function, "unreachable"));
        }
        script
            .responses
            .get(&key)
            .cloned()
            .ok_or_else(|| BridgeError::function_not_found(module_id, function))
    }
}

/// Factory that hands out one shared scripted runtime.
pub struct ScriptedFactory {
    runtime: Arc<ScriptedRuntime>,
    boots: AtomicU32,
    failures_left: AtomicU32,
    delay: Option<Duration>,
}

impl ScriptedFactory {
    fn build(runtime: Arc<ScriptedRuntime>, failures: u32, delay: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            runtime,
            boots: AtomicU32::new(0),
            failures_left: AtomicU32::new(failures),
            delay,
        })
    }

    pub fn new(runtime: Arc<ScriptedRuntime>) -> Arc<Self> {
        Self::build(runtime, 0, None)
    }

    /// A factory whose first `failures` boots fail.
    pub fn failing(runtime: Arc<ScriptedRuntime>, failures: u32) -> Arc<Self> {
        Self::build(runtime, failures, None)
    }

    /// A factory that takes `delay` to boot.
    pub fn slow(runtime: Arc<ScriptedRuntime>, delay: Duration) -> Arc<Self> {
        Self::build(runtime, 0, Some(delay))
    }

    /// A factory that takes `delay` to fail every boot.
    pub fn slow_broken(runtime: Arc<ScriptedRuntime>, delay: Duration) -> Arc<Self> {
        Self::build(runtime, u32::MAX, Some(delay))
    }

    pub fn boots(&self) -> u32 {
        self.boots.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuntimeFactory for ScriptedFactory {
    async fn boot(&self) -> Result<Arc<dyn EmbeddedRuntime>, BridgeError> {
        self.boots.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(BridgeError::runtime_boot("interpreter unavailable"));
        }

        Ok(Arc::clone(&self.runtime) as Arc<dyn EmbeddedRuntime>)
    }
}

fn source() -> ModuleSource {
    ModuleSource::Wat("(module)".to_string())
}

/// The statistics table: one light module with no packages and one heavy
/// module with two.
pub fn declarations() -> Vec<ModuleDeclaration> {
    vec![
        ModuleDeclaration::new("descriptive", source()),
        ModuleDeclaration::new("heavy-stats", source())
            .with_packages(["scientific-lib", "ml-lib"])
            .with_weight(Weight::Heavy),
    ]
}

pub fn registry() -> MethodRegistry {
    MethodRegistry::new([
        CallContract::new("mean", "descriptive", "mean", CallAbi::Vector),
        CallContract::new("stddev", "heavy-stats", "standard_deviation", CallAbi::Vector),
        CallContract::new("zscores", "heavy-stats", "zscores", CallAbi::Vector),
    ])
    .expect("registry is valid")
}

/// A bridge over `runtime` with `max_retries` attempts per package.
pub fn bridge_with(
    runtime: &Arc<ScriptedRuntime>,
    max_retries: u32,
) -> (RuntimeBridge, Arc<ScriptedFactory>) {
    let factory = ScriptedFactory::new(Arc::clone(runtime));
    let bridge = bridge_over(Arc::clone(&factory) as Arc<dyn RuntimeFactory>, max_retries);
    (bridge, factory)
}

pub fn bridge_over(factory: Arc<dyn RuntimeFactory>, max_retries: u32) -> RuntimeBridge {
    let config = BridgeConfig {
        loader: LoaderConfig { max_retries },
        ..Default::default()
    };

    RuntimeBridge::new(&config, factory, declarations(), registry()).expect("bridge is valid")
}

/// Scripted runtime answering the statistics contracts.
pub fn statistics_runtime() -> Arc<ScriptedRuntime> {
    let runtime = ScriptedRuntime::new();
    runtime.respond("descriptive", "mean", Value::from(2.5));
    runtime.respond("heavy-stats", "standard_deviation", Value::from(2.0));
    runtime.respond(
        "heavy-stats",
        "zscores",
        Value::from(vec![-1.0, 0.0, 1.0]),
    );
    runtime
}
