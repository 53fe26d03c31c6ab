use std::fmt;

use thiserror::Error;

use crate::core_val::CoreVal;

/// Marker prefix selecting pointer passing (paramptr / retptr).
const PTR_MARKER: u8 = b'*';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid type descriptor {descriptor:?} at offset {offset}: {reason}")]
pub struct DescriptorError {
    pub descriptor: String,
    pub offset: usize,
    pub reason: DescriptorErrorReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorErrorReason {
    #[error("unknown core type {0:?}")]
    UnknownToken(String),
    #[error("expected `,`")]
    ExpectedComma,
    #[error("trailing `,`")]
    TrailingComma,
    #[error("missing core type after `*`")]
    MissingReturnKind,
    #[error("unexpected trailing text")]
    TrailingText,
}

/// Core ABI shape of one export.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoreSignature {
    pub params: Vec<CoreVal>,
    /// All parameters are passed as one pointer to a packed block.
    pub paramptr: bool,
    pub ret: Option<CoreVal>,
    /// The result is written through a caller-supplied buffer.
    pub retptr: bool,
    /// Size in bytes of the result buffer.
    pub retsize: u32,
}

impl CoreSignature {
    pub fn parse(args: &str, ret: &str, retsize: u32) -> Result<Self, DescriptorError> {
        let (paramptr, params) = parse_params(args)?;
        let (retptr, ret) = parse_return(ret)?;
        Ok(Self {
            params,
            paramptr,
            ret,
            retptr,
            retsize,
        })
    }
}

impl fmt::Display for CoreSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        if self.paramptr {
            f.write_str("*")?;
        }
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(param.as_str())?;
        }
        f.write_str(")")?;
        if let Some(ret) = self.ret {
            f.write_str(" -> ")?;
            if self.retptr {
                f.write_str("*")?;
            }
            f.write_str(ret.as_str())?;
        }
        Ok(())
    }
}

/// A bound export: its name, core signature and the engine callable.
#[derive(Debug, Clone)]
pub struct CoreFn<F> {
    pub name: String,
    pub sig: CoreSignature,
    pub func: F,
}

/// Parse a parameter descriptor: `['*'] [kind (',' kind)*]`.
pub fn parse_params(descriptor: &str) -> Result<(bool, Vec<CoreVal>), DescriptorError> {
    let bytes = descriptor.as_bytes();
    let mut pos = 0;
    let paramptr = bytes.first() == Some(&PTR_MARKER);
    if paramptr {
        pos += 1;
    }

    let mut params = Vec::new();
    if pos == bytes.len() {
        return Ok((paramptr, params));
    }

    loop {
        params.push(parse_kind(descriptor, pos)?);
        pos += CoreVal::TOKEN_LEN;
        match bytes.get(pos) {
            None => break,
            Some(b',') => {
                pos += 1;
                if pos == bytes.len() {
                    return Err(error(descriptor, pos - 1, DescriptorErrorReason::TrailingComma));
                }
            }
            Some(_) => {
                return Err(error(descriptor, pos, DescriptorErrorReason::ExpectedComma));
            }
        }
    }

    Ok((paramptr, params))
}

/// Parse a return descriptor: empty, or `['*'] kind`.
pub fn parse_return(descriptor: &str) -> Result<(bool, Option<CoreVal>), DescriptorError> {
    let bytes = descriptor.as_bytes();
    if bytes.is_empty() {
        return Ok((false, None));
    }

    let retptr = bytes[0] == PTR_MARKER;
    let pos = usize::from(retptr);
    if pos == bytes.len() {
        return Err(error(descriptor, pos, DescriptorErrorReason::MissingReturnKind));
    }

    let kind = parse_kind(descriptor, pos)?;
    let end = pos + CoreVal::TOKEN_LEN;
    if end != bytes.len() {
        return Err(error(descriptor, end, DescriptorErrorReason::TrailingText));
    }
    Ok((retptr, Some(kind)))
}

fn parse_kind(descriptor: &str, pos: usize) -> Result<CoreVal, DescriptorError> {
    let bytes = descriptor.as_bytes();
    let end = (pos + CoreVal::TOKEN_LEN).min(bytes.len());
    let token = &bytes[pos..end];
    CoreVal::from_token(token).ok_or_else(|| {
        error(
            descriptor,
            pos,
            DescriptorErrorReason::UnknownToken(String::from_utf8_lossy(token).into_owned()),
        )
    })
}

fn error(descriptor: &str, offset: usize, reason: DescriptorErrorReason) -> DescriptorError {
    DescriptorError {
        descriptor: descriptor.to_string(),
        offset,
        reason,
    }
}
