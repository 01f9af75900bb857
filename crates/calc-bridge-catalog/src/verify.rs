//! Registry verification.
//!
//! Three checks keep the registry, the module sources and the host operations
//! in agreement:
//!
//! - every contract targets a function its module exports
//! - every module imports only from host functions and its declared packages
//! - every host operation in `operations.rs` has exactly one contract, and
//!   every bundled contract is used by one

use std::collections::HashMap;

use thiserror::Error;

use calc_bridge_common::{BridgeError, EngineConfig};
use calc_bridge_core::{
    CompiledModule, MethodRegistry, ModuleDeclaration, RegistryViolation, WasmEngine,
};

/// Namespace of host functions linked into every runtime.
pub const HOST_NAMESPACE: &str = "env";

const OPERATIONS_SOURCE: &str = include_str!("operations.rs");

/// A verification failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error(transparent)]
    Registry(#[from] RegistryViolation),

    #[error("module '{module}' does not compile: {reason}")]
    Compile { module: String, reason: String },

    #[error("module '{module}' imports from '{namespace}', which it does not declare")]
    UndeclaredImport { module: String, namespace: String },
}

/// Exposed names invoked by the host operations, one entry per call site.
pub fn host_operations() -> Vec<String> {
    const CALL: &str = ".invoke(\"";

    OPERATIONS_SOURCE
        .match_indices(CALL)
        .filter_map(|(at, _)| {
            let rest = &OPERATIONS_SOURCE[at + CALL.len()..];
            rest.find('"').map(|end| rest[..end].to_string())
        })
        .collect()
}

/// Check contracts against module exports and modules against their declared packages.
///
/// # Errors
///
/// Returns an error only if the engine cannot be created; findings are returned
/// as violations.
pub fn verify_sources(
    declarations: &[ModuleDeclaration],
    registry: &MethodRegistry,
) -> Result<Vec<Violation>, BridgeError> {
    let engine = WasmEngine::new(&EngineConfig::default())?;
    let mut violations = Vec::new();
    let mut exports: HashMap<&str, Vec<String>> = HashMap::new();

    for declaration in declarations {
        let compiled = match CompiledModule::from_source(engine.inner(), &declaration.source) {
            Ok(compiled) => compiled,
            Err(e) => {
                violations.push(Violation::Compile {
                    module: declaration.id.clone(),
                    reason: e.to_string(),
                });
                exports.insert(&declaration.id, Vec::new());
                continue;
            }
        };

        violations.extend(
            compiled
                .import_namespaces()
                .into_iter()
                .filter(|ns| ns != HOST_NAMESPACE && !declaration.required_packages.contains(ns))
                .map(|namespace| Violation::UndeclaredImport {
                    module: declaration.id.clone(),
                    namespace,
                }),
        );

        exports.insert(&declaration.id, compiled.exported_functions());
    }

    violations.extend(
        registry
            .verify_exports(|module| exports.get(module).cloned())
            .into_iter()
            .map(Violation::from),
    );

    Ok(violations)
}

/// Check the registry against the host operations in `operations.rs`.
pub fn verify_coverage(registry: &MethodRegistry) -> Vec<Violation> {
    registry
        .verify_coverage(&host_operations())
        .into_iter()
        .map(Violation::from)
        .collect()
}
