//! WebAssembly module compilation.
//!
//! [`CompiledModule`] wraps a Wasmtime [`Module`] compiled from a
//! [`ModuleSource`]. Compilation validates the source and lists its imports and
//! exports without instantiating anything, which is what the registry verifier
//! relies on: it never needs the module's packages to be loaded.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Instant;

use tracing::{debug, instrument};
use wasmtime::{Engine, ExternType, Module};

use crate::ModuleSource;
use calc_bridge_common::BridgeError;

/// A compiled WebAssembly module.
#[derive(Clone)]
pub struct CompiledModule {
    module: Module,

    /// Hash of the original source bytes.
    content_hash: String,
}

impl CompiledModule {
    /// Compile a module from text or binary source.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is not a valid WebAssembly module.
    #[instrument(skip(engine, source), fields(source_len = source.len()))]
    pub fn from_source(engine: &Engine, source: &ModuleSource) -> Result<Self, BridgeError> {
        let start = Instant::now();

        let module = match source {
            ModuleSource::Wat(text) => Module::new(engine, text).map_err(|e| {
                BridgeError::compilation_failed(format!("WAT compilation failed: {e}"))
            })?,
            ModuleSource::Binary(bytes) => {
                Self::validate_wasm_header(bytes)?;
                Module::new(engine, bytes).map_err(|e| {
                    BridgeError::compilation_failed(format!("Module compilation failed: {e}"))
                })?
            }
        };

        let content_hash = compute_hash(source.as_bytes());

        debug!(
            content_hash = %content_hash,
            duration_ms = start.elapsed().as_millis(),
            "Module compiled"
        );

        Ok(Self {
            module,
            content_hash,
        })
    }

    /// Get the inner Wasmtime module.
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Get the content hash of the original source.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Names of all exported functions.
    pub fn exported_functions(&self) -> Vec<String> {
        self.module
            .exports()
            .filter(|export| matches!(export.ty(), ExternType::Func(_)))
            .map(|export| export.name().to_string())
            .collect()
    }

    /// Distinct namespaces the module imports from, in first-seen order.
    pub fn import_namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = Vec::new();
        for import in self.module.imports() {
            if !namespaces.iter().any(|ns| ns == import.module()) {
                namespaces.push(import.module().to_string());
            }
        }
        namespaces
    }

    /// Validate WebAssembly header (magic number).
    fn validate_wasm_header(bytes: &[u8]) -> Result<(), BridgeError> {
        if bytes.len() < 8 {
            return Err(BridgeError::compilation_failed(
                "Invalid Wasm: file too small",
            ));
        }

        // Check magic number: \0asm
        if &bytes[0..4] != b"\0asm" {
            return Err(BridgeError::compilation_failed(
                "Invalid Wasm: bad magic number",
            ));
        }

        Ok(())
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("content_hash", &self.content_hash)
            .finish_non_exhaustive()
    }
}

/// Compute a hash of the given bytes.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WasmEngine;
    use calc_bridge_common::EngineConfig;

    // Minimal valid Wasm module (empty module)
    const MINIMAL_WASM: &[u8] = &[
        0x00, 0x61, 0x73, 0x6d, // magic: \0asm
        0x01, 0x00, 0x00, 0x00, // version: 1
    ];

    fn engine() -> WasmEngine {
        WasmEngine::new(&EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_validate_wasm_header() {
        assert!(CompiledModule::validate_wasm_header(MINIMAL_WASM).is_ok());
        assert!(CompiledModule::validate_wasm_header(&[0x00, 0x61]).is_err());
        assert!(
            CompiledModule::validate_wasm_header(&[0, 0, 0, 0, 1, 0, 0, 0]).is_err()
        );
    }

    #[test]
    fn test_compute_hash() {
        let hash1 = compute_hash(b"hello");
        let hash2 = compute_hash(b"hello");
        let hash3 = compute_hash(b"world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 16);
    }

    #[test]
    fn test_binary_compilation() {
        let engine = engine();
        let module =
            CompiledModule::from_source(engine.inner(), &ModuleSource::Binary(MINIMAL_WASM.to_vec()))
                .unwrap();

        assert!(module.exported_functions().is_empty());
        assert!(!module.content_hash().is_empty());
    }

    #[test]
    fn test_exports_and_imports() {
        let wat = r#"
            (module
                (import "scientific-lib" "sqrt" (func (param f64) (result f64)))
                (import "env" "log" (func (param i32 i32 i32)))
                (import "scientific-lib" "square" (func (param f64) (result f64)))
                (memory (export "memory") 1)
                (func (export "mean") (param i32 i32) (result f64) (f64.const 0))
                (func (export "alloc") (param i32) (result i32) (i32.const 0))
            )
        "#;
        let engine = engine();
        let module =
            CompiledModule::from_source(engine.inner(), &ModuleSource::Wat(wat.into())).unwrap();

        assert_eq!(module.exported_functions(), vec!["mean", "alloc"]);
        assert_eq!(module.import_namespaces(), vec!["scientific-lib", "env"]);
    }

    #[test]
    fn test_invalid_wat() {
        let engine = engine();
        let err = CompiledModule::from_source(engine.inner(), &ModuleSource::Wat("(module".into()))
            .unwrap_err();

        assert!(matches!(err, BridgeError::CompilationFailed { .. }));
    }
}
