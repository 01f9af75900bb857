//! Integration tests for the Wasmtime-backed runtime.
//!
//! These tests drive [`WasmRuntime`] directly and through a bridge:
//! - package registration and import resolution
//! - scalar and vector calling conventions
//! - trap and fuel classification
//! - marshal failures

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use wasmtime::Linker;

use calc_bridge_common::{BridgeConfig, BridgeError, EngineConfig, ErrorKind, ExecutionConfig};
use calc_bridge_core::{
    CallAbi, CallContract, EmbeddedRuntime, MethodRegistry, ModuleDeclaration, ModuleSource,
    PackageSource, RuntimeBridge, RuntimeFactory, WasmEngine, WasmRuntime,
};

const MATHLIB: &str = r#"
    (module
        (func (export "double") (param f64) (result f64)
            (f64.mul (local.get 0) (f64.const 2))))
"#;

const CALC: &str = r#"
    (module
        (import "mathlib" "double" (func $double (param f64) (result f64)))

        (memory (export "memory") 1)
        (global $heap (mut i32) (i32.const 1024))

        (func (export "alloc") (param $bytes i32) (result i32)
            (local $ptr i32)
            (local.set $ptr (global.get $heap))
            (global.set $heap (i32.add (global.get $heap) (local.get $bytes)))
            (local.get $ptr))

        (func (export "reset")
            (global.set $heap (i32.const 1024)))

        (func (export "add") (param i32 i32) (result i32)
            (i32.add (local.get 0) (local.get 1)))

        (func (export "twice") (param f64) (result f64)
            (call $double (local.get 0)))

        (func (export "heap") (result i32)
            (global.get $heap))

        (func (export "sum") (param $ptr i32) (param $len i32) (result f64)
            (local $i i32)
            (local $acc f64)
            (block $done
                (loop $next
                    (br_if $done (i32.ge_u (local.get $i) (local.get $len)))
                    (local.set $acc
                        (f64.add
                            (local.get $acc)
                            (f64.load
                                (i32.add (local.get $ptr) (i32.shl (local.get $i) (i32.const 3))))))
                    (local.set $i (i32.add (local.get $i) (i32.const 1)))
                    (br $next)))
            (local.get $acc))

        (func (export "scale") (param $ptr i32) (param $len i32) (result i64)
            (local $i i32)
            (local $addr i32)
            (block $done
                (loop $next
                    (br_if $done (i32.ge_u (local.get $i) (local.get $len)))
                    (local.set $addr
                        (i32.add (local.get $ptr) (i32.shl (local.get $i) (i32.const 3))))
                    (f64.store (local.get $addr) (call $double (f64.load (local.get $addr))))
                    (local.set $i (i32.add (local.get $i) (i32.const 1)))
                    (br $next)))
            (i64.or
                (i64.shl (i64.extend_i32_u (local.get $ptr)) (i64.const 32))
                (i64.extend_i32_u (local.get $len))))

        (func (export "fail") (param $ptr i32) (param $len i32) (result f64)
            (unreachable))

        ;; Claims 0xFFFFFFFF values at offset 0.
        (func (export "runaway") (param $ptr i32) (param $len i32) (result i64)
            (i64.const 0xFFFFFFFF))

        ;; Claims one value just past the end of memory.
        (func (export "past_end") (param $ptr i32) (param $len i32) (result i64)
            (i64.const 0x0001000000000001))

        (func (export "spin")
            (loop $forever (br $forever))))
"#;

/// Packages served from memory.
struct MemoryPackages {
    packages: HashMap<String, String>,
}

impl MemoryPackages {
    fn with_mathlib() -> Arc<Self> {
        Arc::new(Self {
            packages: HashMap::from([("mathlib".to_string(), MATHLIB.to_string())]),
        })
    }
}

#[async_trait]
impl PackageSource for MemoryPackages {
    fn provides(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    async fn fetch(&self, name: &str) -> Result<ModuleSource, BridgeError> {
        self.packages
            .get(name)
            .map(|wat| ModuleSource::Wat(wat.clone()))
            .ok_or_else(|| BridgeError::package_unavailable(name, "not found"))
    }
}

fn runtime_with(exec_config: ExecutionConfig) -> WasmRuntime {
    let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
    let linker = Linker::new(engine.inner());
    WasmRuntime::new(engine, linker, MemoryPackages::with_mathlib(), exec_config).unwrap()
}

async fn ready_runtime() -> WasmRuntime {
    let runtime = runtime_with(ExecutionConfig::default());
    runtime.install_package("mathlib").await.unwrap();
    runtime
        .execute_module("calc", &ModuleSource::Wat(CALC.to_string()))
        .await
        .unwrap();
    runtime
}

// ============================================================================
// Test: Loading
// ============================================================================

#[tokio::test]
async fn test_module_before_package_fails_on_import() {
    let runtime = runtime_with(ExecutionConfig::default());

    let err = runtime
        .execute_module("calc", &ModuleSource::Wat(CALC.to_string()))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ModuleExecution);
    assert!(err.to_string().contains("mathlib"), "{err}");
    assert!(!runtime.has_function("calc", "twice").await);
}

#[tokio::test]
async fn test_package_then_module() {
    let runtime = ready_runtime().await;

    assert!(runtime.has_function("calc", "twice").await);
    assert!(!runtime.has_function("calc", "median").await);
    assert!(!runtime.has_function("mathlib", "double").await);
    assert_eq!(runtime.executed_modules().await, vec!["calc".to_string()]);
}

#[tokio::test]
async fn test_unknown_package() {
    let runtime = runtime_with(ExecutionConfig::default());

    let err = runtime.install_package("ml-lib").await.unwrap_err();

    assert!(matches!(err, BridgeError::PackageUnavailable { ref package, .. } if package == "ml-lib"));
}

#[tokio::test]
async fn test_invalid_module_source() {
    let runtime = runtime_with(ExecutionConfig::default());

    let err = runtime
        .execute_module("broken", &ModuleSource::Wat("(module (func".to_string()))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ModuleExecution);
}

// ============================================================================
// Test: Calling Conventions
// ============================================================================

#[tokio::test]
async fn test_scalar_calls() {
    let runtime = ready_runtime().await;

    let sum = runtime
        .invoke("calc", "add", CallAbi::Scalar, json!([40, 2]))
        .await
        .unwrap();
    let doubled = runtime
        .invoke("calc", "twice", CallAbi::Scalar, json!(21.0))
        .await
        .unwrap();

    assert_eq!(sum, json!(42));
    assert_eq!(doubled, json!(42.0));
}

#[tokio::test]
async fn test_vector_scalar_result() {
    let runtime = ready_runtime().await;

    let sum = runtime
        .invoke("calc", "sum", CallAbi::Vector, json!([1.0, 2.0, 3.0, 4.0]))
        .await
        .unwrap();

    assert_eq!(sum, json!(10.0));
}

#[tokio::test]
async fn test_vector_result() {
    let runtime = ready_runtime().await;

    let scaled = runtime
        .invoke("calc", "scale", CallAbi::Vector, json!([1.0, 2.5, -3.0]))
        .await
        .unwrap();

    assert_eq!(scaled, json!([2.0, 5.0, -6.0]));
}

#[tokio::test]
async fn test_vector_memory_is_reset_between_calls() {
    let runtime = ready_runtime().await;

    for _ in 0..3 {
        runtime
            .invoke("calc", "sum", CallAbi::Vector, json!([1.0, 2.0]))
            .await
            .unwrap();
    }
    let heap = runtime
        .invoke("calc", "heap", CallAbi::Scalar, Value::Null)
        .await
        .unwrap();

    assert_eq!(heap, json!(1024 + 16));
}

#[tokio::test]
async fn test_empty_vector() {
    let runtime = ready_runtime().await;

    let sum = runtime
        .invoke("calc", "sum", CallAbi::Vector, json!([]))
        .await
        .unwrap();

    assert_eq!(sum, json!(0.0));
}

// ============================================================================
// Test: Failures
// ============================================================================

#[tokio::test]
async fn test_trap_is_domain_error() {
    let runtime = ready_runtime().await;

    let err = runtime
        .invoke("calc", "fail", CallAbi::Vector, json!([1.0]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BridgeError::Domain { ref module, ref function, .. } if module == "calc" && function == "fail"
    ));
}

#[tokio::test]
async fn test_fuel_exhaustion_is_execution_limit() {
    let runtime = runtime_with(ExecutionConfig { max_fuel: 10_000 });
    runtime.install_package("mathlib").await.unwrap();
    runtime
        .execute_module("calc", &ModuleSource::Wat(CALC.to_string()))
        .await
        .unwrap();

    let err = runtime
        .invoke("calc", "spin", CallAbi::Scalar, Value::Null)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExecutionLimit);

    // Fuel is granted per call, so the runtime stays usable.
    let sum = runtime
        .invoke("calc", "add", CallAbi::Scalar, json!([1, 1]))
        .await
        .unwrap();
    assert_eq!(sum, json!(2));
    assert_eq!(runtime.metrics().await.calls, 2);
}

#[tokio::test]
async fn test_marshal_failures() {
    let runtime = ready_runtime().await;

    let arity = runtime
        .invoke("calc", "add", CallAbi::Scalar, json!([1]))
        .await
        .unwrap_err();
    let not_a_vector = runtime
        .invoke("calc", "sum", CallAbi::Vector, json!({"values": [1.0]}))
        .await
        .unwrap_err();
    let wrong_shape = runtime
        .invoke("calc", "twice", CallAbi::Vector, json!([1.0]))
        .await
        .unwrap_err();
    let overflow = runtime
        .invoke("calc", "add", CallAbi::Scalar, json!([i64::MAX, 1]))
        .await
        .unwrap_err();

    for err in [arity, not_a_vector, wrong_shape, overflow] {
        assert_eq!(err.kind(), ErrorKind::Marshal, "{err}");
    }
}

#[tokio::test]
async fn test_result_vector_out_of_bounds() {
    let runtime = ready_runtime().await;

    for function in ["runaway", "past_end"] {
        let err = runtime
            .invoke("calc", function, CallAbi::Vector, json!([1.0]))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Marshal, "{err}");
        assert!(err.to_string().contains("out of bounds"), "{err}");
    }

    // The runtime survives and keeps serving calls.
    let scaled = runtime
        .invoke("calc", "scale", CallAbi::Vector, json!([1.0]))
        .await
        .unwrap();
    assert_eq!(scaled, json!([2.0]));
}

// ============================================================================
// Test: Through the Bridge
// ============================================================================

struct CalcFactory;

#[async_trait]
impl RuntimeFactory for CalcFactory {
    async fn boot(&self) -> Result<Arc<dyn EmbeddedRuntime>, BridgeError> {
        Ok(Arc::new(runtime_with(ExecutionConfig::default())))
    }
}

#[tokio::test]
async fn test_bridge_over_wasm_runtime() {
    let bridge = RuntimeBridge::new(
        &BridgeConfig::default(),
        Arc::new(CalcFactory),
        [ModuleDeclaration::new("calc", ModuleSource::Wat(CALC.to_string()))
            .with_packages(["mathlib"])],
        MethodRegistry::new([
            CallContract::new("total", "calc", "sum", CallAbi::Vector),
            CallContract::new("scale", "calc", "scale", CallAbi::Vector),
        ])
        .unwrap(),
    )
    .unwrap();

    let total: f64 = bridge.invoke("total", &[1.5, 2.5]).await.unwrap();
    let scaled: Vec<f64> = bridge.call("calc", "scale", &[1.0, 2.0]).await.unwrap();
    let unregistered = bridge
        .call::<_, f64>("calc", "twice", &[1.0])
        .await
        .unwrap_err();

    assert!((total - 4.0).abs() < f64::EPSILON);
    assert_eq!(scaled, vec![2.0, 4.0]);
    assert_eq!(unregistered.kind(), ErrorKind::FunctionNotFound);
    assert_eq!(bridge.packages().loaded(), vec!["mathlib".to_string()]);
}
