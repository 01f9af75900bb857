//! Value conversion across the host/runtime boundary.
//!
//! Host values travel as [`serde_json::Value`]. Two conventions exist for
//! getting them into guest code:
//!
//! - **Scalar**: the arguments are numbers passed as the function's parameters,
//!   converted to each parameter's declared type.
//! - **Vector**: the arguments are one array of numbers, written into guest
//!   memory as little-endian `f64`s. The guest receives `(ptr, len)` and returns
//!   either an `f64` or a packed `(ptr << 32) | len` output vector.
//!
//! Anything that does not fit is a marshal error, never a silent coercion.

use std::ops::Range;

use serde_json::{Number, Value};
use wasmtime::{Val, ValType};

use calc_bridge_common::BridgeError;

/// Size of one vector element in guest memory.
pub const F64_BYTES: usize = std::mem::size_of::<f64>();

/// Convert call arguments to parameters of the given types.
///
/// `null` means no arguments, an array is positional, and any other value is a
/// single argument.
pub fn scalar_params(target: &str, params: &[ValType], args: &Value) -> Result<Vec<Val>, BridgeError> {
    let items: Vec<&Value> = match args {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    if items.len() != params.len() {
        return Err(BridgeError::marshal(
            target,
            format!("expected {} argument(s), got {}", params.len(), items.len()),
        ));
    }

    params
        .iter()
        .zip(items)
        .enumerate()
        .map(|(index, (ty, value))| to_val(target, index, ty, value))
        .collect()
}

fn to_val(target: &str, index: usize, ty: &ValType, value: &Value) -> Result<Val, BridgeError> {
    #[allow(clippy::cast_possible_truncation)]
    let converted = match ty {
        ValType::I32 => value
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(Val::I32),
        ValType::I64 => value.as_i64().map(Val::I64),
        ValType::F32 => value.as_f64().map(|v| Val::F32((v as f32).to_bits())),
        ValType::F64 => value.as_f64().map(|v| Val::F64(v.to_bits())),
        _ => {
            return Err(BridgeError::marshal(
                target,
                format!("parameter {index} has unsupported type {ty}"),
            ));
        }
    };

    converted.ok_or_else(|| {
        BridgeError::marshal(
            target,
            format!("argument {index} ({value}) does not fit parameter type {ty}"),
        )
    })
}

/// Convert function results to a host value.
///
/// No results map to `null`, one result to a number, several to an array.
pub fn scalar_results(target: &str, results: &[Val]) -> Result<Value, BridgeError> {
    let mut values = results
        .iter()
        .map(|val| from_val(target, val))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(match values.len() {
        0 => Value::Null,
        1 => values.remove(0),
        _ => Value::Array(values),
    })
}

fn from_val(target: &str, val: &Val) -> Result<Value, BridgeError> {
    match val {
        Val::I32(v) => Ok(Value::from(*v)),
        Val::I64(v) => Ok(Value::from(*v)),
        Val::F32(bits) => finite(target, f64::from(f32::from_bits(*bits))),
        Val::F64(bits) => finite(target, f64::from_bits(*bits)),
        other => Err(BridgeError::marshal(
            target,
            format!("unsupported result type {}", val_kind(other)),
        )),
    }
}

/// Wrap a float, rejecting NaN and infinities.
pub fn finite(target: &str, value: f64) -> Result<Value, BridgeError> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| BridgeError::marshal(target, format!("non-finite result {value}")))
}

/// Extract the numbers of a vector argument.
pub fn f64_vector(target: &str, args: &Value) -> Result<Vec<f64>, BridgeError> {
    let Value::Array(items) = args else {
        return Err(BridgeError::marshal(
            target,
            format!("expected an array of numbers, got {}", kind_of(args)),
        ));
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            item.as_f64().ok_or_else(|| {
                BridgeError::marshal(target, format!("element {index} ({item}) is not a number"))
            })
        })
        .collect()
}

/// Convert a guest output vector to a host value.
pub fn vector_result(target: &str, values: &[f64]) -> Result<Value, BridgeError> {
    values
        .iter()
        .map(|v| finite(target, *v))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

/// Encode numbers as little-endian `f64` bytes.
pub fn encode_f64s(values: &[f64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode little-endian `f64` bytes. Trailing partial elements are ignored.
pub fn decode_f64s(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(F64_BYTES)
        .map(|chunk| {
            let mut raw = [0u8; F64_BYTES];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect()
}

/// Pack an output vector location the way guests return it.
#[allow(clippy::cast_possible_wrap)]
pub fn pack(ptr: u32, len: u32) -> i64 {
    ((u64::from(ptr) << 32) | u64::from(len)) as i64
}

/// Split a packed `(ptr << 32) | len` result.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
pub fn unpack(packed: i64) -> (u32, u32) {
    let raw = packed as u64;
    ((raw >> 32) as u32, raw as u32)
}

/// Byte range of an output vector of `len` values at `ptr`, if it lies within
/// `memory_size` bytes of guest memory.
pub fn output_range(ptr: u32, len: u32, memory_size: usize) -> Option<Range<usize>> {
    let start = usize::try_from(ptr).ok()?;
    let bytes = usize::try_from(len).ok()?.checked_mul(F64_BYTES)?;
    let end = start.checked_add(bytes)?;
    (end <= memory_size).then_some(start..end)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn val_kind(val: &Val) -> &'static str {
    match val {
        Val::I32(_) => "i32",
        Val::I64(_) => "i64",
        Val::F32(_) => "f32",
        Val::F64(_) => "f64",
        Val::V128(_) => "v128",
        _ => "reference",
    }
}
