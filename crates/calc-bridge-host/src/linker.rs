//! Host function registration for the runtime linker.

use calc_bridge_common::BridgeError;
use calc_bridge_core::BridgeContext;
use tracing::warn;
use wasmtime::{Caller, Extern, Linker};

use crate::logging::{LoggingHost, level_from_i32};

/// Register every host function guests may import.
///
/// Currently:
/// - `env::log`
///
/// # Errors
///
/// Returns an error if function registration fails.
pub fn register_all(linker: &mut Linker<BridgeContext>) -> Result<(), BridgeError> {
    register_logging(linker)?;
    Ok(())
}

/// Register `env::log(level: i32, ptr: i32, len: i32)`.
///
/// The message is `len` bytes of UTF-8 at `ptr` in the caller's exported
/// `memory`. Malformed calls are dropped with a warning rather than trapping
/// the guest.
///
/// # Errors
///
/// Returns an error if the function cannot be defined.
pub fn register_logging(linker: &mut Linker<BridgeContext>) -> Result<(), BridgeError> {
    linker
        .func_wrap(
            "env",
            "log",
            |mut caller: Caller<'_, BridgeContext>, level: i32, ptr: i32, len: i32| {
                let (Ok(start), Ok(len)) = (usize::try_from(ptr), usize::try_from(len)) else {
                    warn!(ptr, len, "Guest log with negative pointer or length");
                    return;
                };

                let Some(memory) = caller.get_export("memory").and_then(Extern::into_memory)
                else {
                    warn!("Guest log from a module without exported memory");
                    return;
                };

                let message = {
                    let data = memory.data(&caller);
                    let Some(bytes) = start
                        .checked_add(len)
                        .and_then(|end| data.get(start..end))
                    else {
                        warn!(start, len, memory_size = data.len(), "Guest log out of bounds");
                        return;
                    };
                    String::from_utf8_lossy(bytes).into_owned()
                };

                LoggingHost::log(caller.data_mut(), level_from_i32(level), &message);
            },
        )
        .map_err(|e| BridgeError::invalid_config(format!("Failed to register log function: {e}")))?;

    Ok(())
}
