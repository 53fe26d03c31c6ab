use std::fmt;

/// Core wasm value kind crossing the host/guest boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreVal {
    I32,
    I64,
    F32,
    F64,
}

impl CoreVal {
    /// Width of the descriptor token naming a kind (`i32`, `f64`, ...).
    pub const TOKEN_LEN: usize = 3;

    pub fn as_str(self) -> &'static str {
        match self {
            CoreVal::I32 => "i32",
            CoreVal::I64 => "i64",
            CoreVal::F32 => "f32",
            CoreVal::F64 => "f64",
        }
    }

    pub fn from_token(token: &[u8]) -> Option<Self> {
        match token {
            b"i32" => Some(CoreVal::I32),
            b"i64" => Some(CoreVal::I64),
            b"f32" => Some(CoreVal::F32),
            b"f64" => Some(CoreVal::F64),
            _ => None,
        }
    }

    /// Number of bytes the kind occupies in a flat argument buffer.
    /// I32/F32 take one 32-bit slot, I64/F64 take two.
    pub fn byte_width(self) -> u32 {
        match self {
            CoreVal::I32 | CoreVal::F32 => 4,
            CoreVal::I64 | CoreVal::F64 => 8,
        }
    }
}

impl fmt::Display for CoreVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
