//! Error types for calc-bridge.
//!
//! Every bridge operation fails with a [`BridgeError`]. The variants follow the
//! path a call takes through the bridge: booting the runtime, loading packages,
//! executing module source, resolving the function, marshaling values, and
//! finally the callee's own failure.
//!
//! The error is `Clone` so that callers coalesced onto one in-flight module
//! load all observe the same failure.

use thiserror::Error;

/// Errors surfaced by the runtime bridge.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The embedded runtime could not be created.
    #[error("Runtime boot failed: {reason}")]
    RuntimeBoot {
        /// Description of the boot failure.
        reason: String,
    },

    /// The embedded runtime has not finished booting.
    #[error("Runtime not initialized")]
    RuntimeNotInitialized,

    /// A single attempt to fetch or install a package failed.
    #[error("Package '{package}' unavailable: {reason}")]
    PackageUnavailable {
        /// The package that could not be installed.
        package: String,
        /// The underlying loader error.
        reason: String,
    },

    /// A package failed on every attempt; the dependent module cannot run.
    #[error(
        "Failed to load package '{package}' after {attempts} attempt(s): {reason}. \
         Module '{module}' cannot run without {package}"
    )]
    PackageLoad {
        /// The package that failed to load.
        package: String,
        /// The module that declared the package.
        module: String,
        /// Number of attempts made.
        attempts: u32,
        /// Error text from the last attempt.
        reason: String,
    },

    /// The requested module is not declared.
    #[error("Module not found: {module_id}")]
    ModuleNotFound {
        /// The identifier of the module that was not found.
        module_id: String,
    },

    /// Module source failed while being executed in the runtime.
    #[error("Module '{module}' failed during execution: {message}")]
    ModuleExecution {
        /// The module whose source failed.
        module: String,
        /// Description of the failure.
        message: String,
        /// Guest log lines captured while the source ran.
        diagnostics: Vec<String>,
    },

    /// The function does not exist in the module or in the method registry.
    #[error("Function '{function}' not found in module '{module}'")]
    FunctionNotFound {
        /// The module that was searched.
        module: String,
        /// The function that was requested.
        function: String,
    },

    /// No call contract exists for the exposed operation name.
    #[error("Unknown operation: {name}")]
    UnknownOperation {
        /// The exposed name that was requested.
        name: String,
    },

    /// A value could not cross the host/runtime boundary.
    #[error("Marshal error in {target}: {reason}")]
    Marshal {
        /// `module::function` or another description of the boundary crossed.
        target: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The callee reported a failure.
    #[error("{module}::{function} failed: {message}")]
    Domain {
        /// The module that was called.
        module: String,
        /// The function that was called.
        function: String,
        /// The callee's failure message.
        message: String,
    },

    /// The callee exhausted its execution budget.
    #[error("{module}::{function} exceeded its fuel budget")]
    ExecutionLimit {
        /// The module that was called.
        module: String,
        /// The function that was called.
        function: String,
    },

    /// Module or package source could not be compiled.
    #[error("Compilation failed: {reason}")]
    CompilationFailed {
        /// Description of the compilation failure.
        reason: String,
    },

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

/// Discriminant of a [`BridgeError`], for callers that branch on the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RuntimeBoot,
    RuntimeNotInitialized,
    PackageLoad,
    ModuleNotFound,
    ModuleExecution,
    FunctionNotFound,
    Marshal,
    Domain,
    ExecutionLimit,
    Compilation,
    InvalidConfig,
}

impl BridgeError {
    /// Create a new `RuntimeBoot` error.
    pub fn runtime_boot(reason: impl Into<String>) -> Self {
        Self::RuntimeBoot {
            reason: reason.into(),
        }
    }

    /// Create a new `PackageUnavailable` error.
    pub fn package_unavailable(package: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PackageUnavailable {
            package: package.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `PackageLoad` error.
    pub fn package_load(
        package: impl Into<String>,
        module: impl Into<String>,
        attempts: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self::PackageLoad {
            package: package.into(),
            module: module.into(),
            attempts,
            reason: reason.into(),
        }
    }

    /// Create a new `ModuleNotFound` error.
    pub fn module_not_found(module_id: impl Into<String>) -> Self {
        Self::ModuleNotFound {
            module_id: module_id.into(),
        }
    }

    /// Create a new `ModuleExecution` error.
    pub fn module_execution(
        module: impl Into<String>,
        message: impl Into<String>,
        diagnostics: Vec<String>,
    ) -> Self {
        Self::ModuleExecution {
            module: module.into(),
            message: message.into(),
            diagnostics,
        }
    }

    /// Create a new `FunctionNotFound` error.
    pub fn function_not_found(module: impl Into<String>, function: impl Into<String>) -> Self {
        Self::FunctionNotFound {
            module: module.into(),
            function: function.into(),
        }
    }

    /// Create a new `UnknownOperation` error.
    pub fn unknown_operation(name: impl Into<String>) -> Self {
        Self::UnknownOperation { name: name.into() }
    }

    /// Create a new `Marshal` error.
    pub fn marshal(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Marshal {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `Domain` error.
    pub fn domain(
        module: impl Into<String>,
        function: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Domain {
            module: module.into(),
            function: function.into(),
            message: message.into(),
        }
    }

    /// Create a new `ExecutionLimit` error.
    pub fn execution_limit(module: impl Into<String>, function: impl Into<String>) -> Self {
        Self::ExecutionLimit {
            module: module.into(),
            function: function.into(),
        }
    }

    /// Create a new `CompilationFailed` error.
    pub fn compilation_failed(reason: impl Into<String>) -> Self {
        Self::CompilationFailed {
            reason: reason.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// The failure class of this error.
    ///
    /// A single failed package attempt reports [`ErrorKind::PackageLoad`] just like
    /// an exhausted one; only the latter ever reaches callers of the bridge.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RuntimeBoot { .. } => ErrorKind::RuntimeBoot,
            Self::RuntimeNotInitialized => ErrorKind::RuntimeNotInitialized,
            Self::PackageUnavailable { .. } | Self::PackageLoad { .. } => ErrorKind::PackageLoad,
            Self::ModuleNotFound { .. } => ErrorKind::ModuleNotFound,
            Self::ModuleExecution { .. } => ErrorKind::ModuleExecution,
            Self::FunctionNotFound { .. } | Self::UnknownOperation { .. } => {
                ErrorKind::FunctionNotFound
            }
            Self::Marshal { .. } => ErrorKind::Marshal,
            Self::Domain { .. } => ErrorKind::Domain,
            Self::ExecutionLimit { .. } => ErrorKind::ExecutionLimit,
            Self::CompilationFailed { .. } => ErrorKind::Compilation,
            Self::InvalidConfig { .. } => ErrorKind::InvalidConfig,
        }
    }

    /// Returns `true` if retrying the whole call may succeed without any change.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RuntimeNotInitialized)
    }

    /// Returns `true` if this error indicates a registry/implementation mismatch.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::FunctionNotFound { .. } | Self::UnknownOperation { .. } | Self::ModuleNotFound { .. }
        )
    }
}
