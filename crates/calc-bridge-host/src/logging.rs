//! Guest logging.
//!
//! Guest code logs through `env.log`. Every line is kept in the
//! [`BridgeContext`] so that a failing module source can report it as a
//! diagnostic, and is also emitted through `tracing` tagged with whatever the
//! runtime was executing at the time.

use calc_bridge_core::{BridgeContext, LogLevel};
use tracing::{debug, error, info, warn};

/// Host implementation of guest logging.
pub struct LoggingHost;

impl LoggingHost {
    /// Record a guest log line and emit it via `tracing`.
    pub fn log(ctx: &mut BridgeContext, level: LogLevel, message: &str) {
        ctx.log(level, message.to_string());

        let activity = ctx.activity.as_deref().unwrap_or("idle");
        match level {
            LogLevel::Debug => debug!(activity, guest_log = true, "{}", message),
            LogLevel::Info => info!(activity, guest_log = true, "{}", message),
            LogLevel::Warn => warn!(activity, guest_log = true, "{}", message),
            LogLevel::Error => error!(activity, guest_log = true, "{}", message),
        }
    }
}

/// Convert the numeric level guests pass to [`LogLevel`].
///
/// 0=debug, 1=info, 2=warn, 3=error; anything else is info.
pub fn level_from_i32(level: i32) -> LogLevel {
    match level {
        0 => LogLevel::Debug,
        2 => LogLevel::Warn,
        3 => LogLevel::Error,
        _ => LogLevel::Info,
    }
}
