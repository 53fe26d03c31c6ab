//! Conversion of core ABI scalars to and from engine-native values.
//!
//! Arguments are read from a flat, little-endian buffer in linear memory: I32
//! and F32 take 4 bytes, I64 and F64 take 8, with no padding between them.

use crate::core_val::CoreVal;
use crate::engine::{GuestMemory, MemoryError, NativeValue};

use super::descriptor::CoreSignature;
use super::error::{BridgeError, BridgeResult};

/// A core scalar ready to be stored into linear memory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawValue {
    I32(u32),
    I64(u64),
    F32(f32),
    F64(f64),
}

impl RawValue {
    pub fn kind(&self) -> CoreVal {
        match self {
            RawValue::I32(_) => CoreVal::I32,
            RawValue::I64(_) => CoreVal::I64,
            RawValue::F32(_) => CoreVal::F32,
            RawValue::F64(_) => CoreVal::F64,
        }
    }

    pub fn to_le_bytes(self) -> Vec<u8> {
        match self {
            RawValue::I32(v) => v.to_le_bytes().to_vec(),
            RawValue::I64(v) => v.to_le_bytes().to_vec(),
            RawValue::F32(v) => v.to_le_bytes().to_vec(),
            RawValue::F64(v) => v.to_le_bytes().to_vec(),
        }
    }
}

/// Build the engine argument list for a call.
///
/// With `paramptr` the list collapses to the raw argument pointer and the
/// buffer is not decoded.
pub fn marshal_args<V: NativeValue, M: GuestMemory>(
    memory: &M,
    sig: &CoreSignature,
    argptr: u32,
) -> BridgeResult<Vec<V>> {
    let mut args = Vec::with_capacity(sig.params.len() + usize::from(sig.retptr));
    if sig.paramptr {
        args.push(V::from_u32(argptr));
        return Ok(args);
    }
    if sig.params.is_empty() {
        return Ok(args);
    }
    if argptr == 0 {
        return Err(BridgeError::NullArgs {
            count: sig.params.len(),
        });
    }

    let mut cursor = argptr;
    for &kind in &sig.params {
        let value = match kind {
            CoreVal::I32 => V::from_u32(memory.read_u32(cursor)?),
            CoreVal::I64 => to_bigint64(memory.read_u64(cursor)?),
            CoreVal::F32 => V::from_f64(f64::from(f32::from_bits(memory.read_u32(cursor)?))),
            CoreVal::F64 => V::from_f64(f64::from_bits(memory.read_u64(cursor)?)),
        };
        args.push(value);
        cursor = cursor
            .checked_add(kind.byte_width())
            .ok_or(MemoryError::OutOfBounds {
                addr: cursor,
                len: kind.byte_width() as usize,
                size: memory.size(),
            })?;
    }
    Ok(args)
}

/// Convert a fulfilled result into the declared return kind.
pub fn unmarshal_result<V: NativeValue>(kind: CoreVal, value: &V) -> BridgeResult<RawValue> {
    match kind {
        CoreVal::I32 => value
            .as_int32_bits()
            .map(RawValue::I32)
            .ok_or_else(|| not_a(kind, value)),
        CoreVal::I64 => from_bigint64(value).map(RawValue::I64),
        CoreVal::F32 => value
            .as_f64()
            .map(|v| RawValue::F32(v as f32))
            .ok_or_else(|| not_a(kind, value)),
        CoreVal::F64 => value
            .as_f64()
            .map(RawValue::F64)
            .ok_or_else(|| not_a(kind, value)),
    }
}

/// Store `raw` at `addr`.
pub fn write_result<M: GuestMemory>(memory: &mut M, addr: u32, raw: RawValue) -> BridgeResult<()> {
    memory.write(addr, &raw.to_le_bytes())?;
    Ok(())
}

/// Read a big integer as an unsigned 64-bit word. Values outside
/// `0..=u64::MAX` are an internal consistency error.
pub fn from_bigint64<V: NativeValue>(value: &V) -> BridgeResult<u64> {
    value.as_bigint_u64().ok_or_else(|| {
        BridgeError::Conversion(format!(
            "coreabi_from_bigint64: {value} is not a BigInt representable as u64"
        ))
    })
}

pub fn to_bigint64<V: NativeValue>(value: u64) -> V {
    V::from_bigint_u64(value)
}

fn not_a<V: NativeValue>(kind: CoreVal, value: &V) -> BridgeError {
    BridgeError::Conversion(format!("expected a number for {kind} result, got {value}"))
}
