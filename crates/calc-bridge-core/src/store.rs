//! Store data for the embedded runtime.
//!
//! This module provides:
//! - [`BridgeContext`]: State reachable from host functions while guest code runs
//! - [`LogEntry`] and [`LogLevel`]: Structured logging from guest code
//! - [`ExecutionMetrics`]: Counters for the lifetime of the runtime

use std::time::{Duration, Instant};

use wasmtime::Store;

use crate::WasmEngine;
use calc_bridge_common::{BridgeError, ExecutionConfig};

/// Data stored alongside the single runtime [`Store`].
///
/// Host functions reach it through [`wasmtime::Caller::data_mut`].
#[derive(Debug, Default)]
pub struct BridgeContext {
    /// What the runtime is currently executing (`package`, `module` or `module::function`).
    pub activity: Option<String>,

    /// Logs collected from guest code since the last [`take_logs`](Self::take_logs).
    pub logs: Vec<LogEntry>,

    /// Execution metrics.
    pub metrics: ExecutionMetrics,
}

/// A single log entry from guest code.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Log level (debug, info, warn, error).
    pub level: LogLevel,

    /// Log message content.
    pub message: String,

    /// Timestamp when the log was recorded.
    pub timestamp: Instant,
}

/// Log level for guest logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug-level messages.
    Debug,
    /// Informational messages.
    Info,
    /// Warning messages.
    Warn,
    /// Error messages.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Runtime-wide execution counters.
#[derive(Debug, Clone, Default)]
pub struct ExecutionMetrics {
    /// Calls dispatched into guest functions.
    pub calls: u64,

    /// Fuel consumed across all calls.
    pub fuel_consumed: u64,

    /// Wall time spent inside guest calls.
    pub busy: Duration,
}

impl BridgeContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a log entry.
    pub fn log(&mut self, level: LogLevel, message: String) {
        self.logs.push(LogEntry {
            level,
            message,
            timestamp: Instant::now(),
        });
    }

    /// Mark what the runtime is executing, for log attribution.
    pub fn begin(&mut self, activity: impl Into<String>) {
        self.activity = Some(activity.into());
    }

    /// Clear the current activity.
    pub fn end(&mut self) {
        self.activity = None;
    }

    /// Drain collected guest logs as `LEVEL message` lines.
    pub fn take_logs(&mut self) -> Vec<String> {
        self.logs
            .drain(..)
            .map(|entry| format!("{} {}", entry.level, entry.message))
            .collect()
    }

    /// Record one finished call.
    pub fn record_call(&mut self, fuel_consumed: u64, elapsed: Duration) {
        self.metrics.calls += 1;
        self.metrics.fuel_consumed += fuel_consumed;
        self.metrics.busy += elapsed;
    }
}

/// Create the runtime store.
///
/// # Errors
///
/// Returns an error if fuel cannot be set on the store.
pub fn create_store(
    engine: &WasmEngine,
    config: &ExecutionConfig,
) -> Result<Store<BridgeContext>, BridgeError> {
    let mut store = Store::new(engine.inner(), BridgeContext::new());

    if engine.is_fuel_metered() {
        refuel(&mut store, config.max_fuel)?;
    }

    Ok(store)
}

/// Reset the store's fuel to `amount`.
pub fn refuel(store: &mut Store<BridgeContext>, amount: u64) -> Result<(), BridgeError> {
    store
        .set_fuel(amount)
        .map_err(|e| BridgeError::invalid_config(format!("Failed to set fuel: {e}")))
}

/// Get remaining fuel from a store.
pub fn get_remaining_fuel(store: &Store<BridgeContext>) -> Option<u64> {
    store.get_fuel().ok()
}

/// Calculate fuel consumed.
pub fn calculate_fuel_consumed(initial_fuel: u64, store: &Store<BridgeContext>) -> u64 {
    let remaining = get_remaining_fuel(store).unwrap_or(0);
    initial_fuel.saturating_sub(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calc_bridge_common::EngineConfig;

    #[test]
    fn test_context_logging() {
        let mut ctx = BridgeContext::new();

        ctx.log(LogLevel::Info, "Hello".into());
        ctx.log(LogLevel::Error, "World".into());

        assert_eq!(ctx.logs.len(), 2);
        assert_eq!(ctx.logs[0].level, LogLevel::Info);
        assert_eq!(ctx.take_logs(), vec!["INFO Hello", "ERROR World"]);
        assert!(ctx.logs.is_empty());
    }

    #[test]
    fn test_activity() {
        let mut ctx = BridgeContext::new();
        ctx.begin("heavy-stats::zscores");
        assert_eq!(ctx.activity.as_deref(), Some("heavy-stats::zscores"));
        ctx.end();
        assert!(ctx.activity.is_none());
    }

    #[test]
    fn test_record_call() {
        let mut ctx = BridgeContext::new();
        ctx.record_call(100, Duration::from_millis(2));
        ctx.record_call(50, Duration::from_millis(3));

        assert_eq!(ctx.metrics.calls, 2);
        assert_eq!(ctx.metrics.fuel_consumed, 150);
        assert_eq!(ctx.metrics.busy, Duration::from_millis(5));
    }

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Debug.to_string(), "DEBUG");
        assert_eq!(LogLevel::Warn.to_string(), "WARN");
    }

    #[test]
    fn test_store_fuel() {
        let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
        let exec_config = ExecutionConfig { max_fuel: 1000 };

        let store = create_store(&engine, &exec_config).unwrap();

        assert_eq!(get_remaining_fuel(&store), Some(1000));
        assert_eq!(calculate_fuel_consumed(1000, &store), 0);
    }

    #[test]
    fn test_store_unmetered() {
        let engine = WasmEngine::new(&EngineConfig {
            fuel_metering: false,
            ..Default::default()
        })
        .unwrap();

        let store = create_store(&engine, &ExecutionConfig::default()).unwrap();
        assert_eq!(get_remaining_fuel(&store), None);
    }
}
