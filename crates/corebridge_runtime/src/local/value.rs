use std::fmt;

use crate::engine::NativeValue;

const TWO_POW_32: f64 = 4_294_967_296.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PromiseId(pub(crate) usize);

/// Script value of the [`LocalEngine`](super::LocalEngine).
///
/// Numbers use the int32/double split of a JS engine: integral values in the
/// int32 range are stored as `Int32`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Bool(bool),
    Int32(i32),
    Double(f64),
    BigInt(i128),
    String(String),
    Function(FunctionId),
    Promise(PromiseId),
}

impl Value {
    pub fn number(value: f64) -> Self {
        let is_negative_zero = value == 0.0 && value.is_sign_negative();
        if value.fract() == 0.0
            && value >= f64::from(i32::MIN)
            && value <= f64::from(i32::MAX)
            && !is_negative_zero
        {
            Value::Int32(value as i32)
        } else {
            Value::Double(value)
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Value::String(value.into())
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int32(_) | Value::Double(_))
    }
}

impl NativeValue for Value {
    fn from_u32(value: u32) -> Self {
        Value::number(f64::from(value))
    }

    fn from_f64(value: f64) -> Self {
        Value::number(value)
    }

    fn from_bigint_u64(value: u64) -> Self {
        Value::BigInt(i128::from(value))
    }

    fn as_int32_bits(&self) -> Option<u32> {
        match *self {
            Value::Int32(v) => Some(v as u32),
            Value::Double(v) if !v.is_finite() => Some(0),
            // ToInt32: truncate, then wrap modulo 2^32.
            Value::Double(v) => Some(v.trunc().rem_euclid(TWO_POW_32) as u32),
            _ => None,
        }
    }

    fn as_bigint_u64(&self) -> Option<u64> {
        match *self {
            Value::BigInt(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Int32(v) => Some(f64::from(v)),
            Value::Double(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::BigInt(v) => write!(f, "{v}n"),
            Value::String(v) => f.write_str(v),
            Value::Function(id) => write!(f, "[function #{}]", id.0),
            Value::Promise(id) => write!(f, "[promise #{}]", id.0),
        }
    }
}
