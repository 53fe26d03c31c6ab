use corebridge_config::ConfigError;
use thiserror::Error;

use crate::engine::{EngineError, MemoryError};

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Initialization outcome reported by `check_init`.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitError {
    #[default]
    None = 0,
    /// An export could not be bound to a callable.
    FnList = 1,
    /// An export descriptor could not be parsed.
    TypeParse = 2,
}

/// Unrecoverable bridge failure. The top-level entry point terminates the
/// process on any of these.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("(call) unexpected call state, post_call was not called after call({active})")]
    CallWhileActive { active: u32 },

    #[error("(post_call) unexpected call state, post_call({index}) does not match {active:?}")]
    PostCallMismatch { index: u32, active: Option<u32> },

    #[error("(call) function index {index} out of range for {count} exports")]
    IndexOutOfRange { index: u32, count: usize },

    #[error("(call) runtime was not initialized: {0:?}")]
    NotInitialized(InitError),

    #[error("(call) null argument pointer for {count} arguments")]
    NullArgs { count: usize },

    #[error("(call) runtime error: {0}")]
    Engine(#[from] EngineError),

    #[error("(call) unable to obtain call promise")]
    NotDeferred,

    #[error("(call) unexpected promise state pending")]
    PromisePending,

    #[error("(call) unexpected promise state rejected")]
    PromiseRejected,

    #[error("(cabi_realloc) unable to realloc {size} bytes")]
    OutOfMemory { size: u32 },

    #[error("internal bindgen error: {0}")]
    Conversion(String),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to install bindings: {0}")]
    Install(String),

    #[error("engine initialization failed: {0:#}")]
    PreInitialize(anyhow::Error),
}

impl BridgeError {
    /// The host broke the call/post_call contract.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            BridgeError::CallWhileActive { .. }
                | BridgeError::PostCallMismatch { .. }
                | BridgeError::IndexOutOfRange { .. }
                | BridgeError::NotInitialized(_)
                | BridgeError::NullArgs { .. }
        )
    }
}
