//! The seam between the call bridge and the embedded script engine.
//!
//! The bridge never looks inside engine values, promises or the scheduler. It
//! only needs the operations below, which keeps it independent of the engine
//! that actually hosts the guest script.

mod memory;

use std::fmt;
use std::time::Instant;

use thiserror::Error;

use crate::bridge::Bindings;

pub use memory::{GuestMemory, MemoryError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// An exception escaped into the bridge. Carries the rendered report.
    #[error("uncaught exception: {0}")]
    Exception(String),

    #[error("event loop error: {0}")]
    EventLoop(String),

    #[error("{0}")]
    Other(String),
}

/// Settlement state of a deferred completion value.
#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState<V> {
    Pending,
    Fulfilled(V),
    Rejected(V),
}

/// Reaction invoked by the engine when a promise settles.
///
/// Returning `false` signals failure; the engine treats it like a thrown
/// exception inside the reaction job.
pub type ReactionFn<E> = fn(&mut E, &<E as Engine>::Value) -> bool;

/// Conversions between engine-native values and core ABI scalars.
pub trait NativeValue: Clone + fmt::Debug + fmt::Display {
    /// Numeric value of an unsigned 32-bit integer.
    fn from_u32(value: u32) -> Self;

    fn from_f64(value: f64) -> Self;

    /// Big-integer value of an unsigned 64-bit word.
    fn from_bigint_u64(value: u64) -> Self;

    /// The value truncated to 32 bits, or `None` if it is not a number.
    fn as_int32_bits(&self) -> Option<u32>;

    /// `None` unless the value is a big integer in `0..=u64::MAX`.
    fn as_bigint_u64(&self) -> Option<u64>;

    /// Integral or floating numbers as `f64`, `None` otherwise.
    fn as_f64(&self) -> Option<f64>;
}

pub trait Engine: Sized {
    type Value: NativeValue;
    type Function: Clone;
    type Promise: Clone;
    type Memory: GuestMemory;

    /// Engine-side initialization: evaluates the guest script and warms the
    /// engine up before it is snapshotted.
    fn pre_initialize(&mut self) -> anyhow::Result<()>;

    /// Install the bindings namespace (`$bindings`) into the initializer namespace.
    fn install_bindings(&mut self, bindings: Bindings<Self>) -> Result<(), EngineError>;

    /// Namespace object of the evaluated source module.
    fn script_namespace(&mut self) -> Result<Self::Value, EngineError>;

    fn string_value(&mut self, value: &str) -> Self::Value;

    fn set_initializer_property(&mut self, name: &str, value: Self::Value)
    -> Result<(), EngineError>;

    /// Resolve a callable bound on the initializer namespace.
    fn get_initializer_function(&mut self, name: &str) -> Option<Self::Function>;

    /// Call a function of the initializer namespace by name. An exception
    /// thrown by the callee stays pending until [`Engine::take_pending_exception`].
    fn call_initializer_function(
        &mut self,
        name: &str,
        args: &[Self::Value],
    ) -> Result<Self::Value, EngineError>;

    /// Call a bound export. An escaping exception is reported and cleared.
    fn call_function(
        &mut self,
        func: &Self::Function,
        args: &[Self::Value],
    ) -> Result<Self::Value, EngineError>;

    fn as_promise(&self, value: &Self::Value) -> Option<Self::Promise>;

    fn add_promise_reactions(
        &mut self,
        promise: &Self::Promise,
        on_fulfilled: ReactionFn<Self>,
        on_rejected: ReactionFn<Self>,
    ) -> Result<(), EngineError>;

    fn incr_event_loop_interest(&mut self);

    fn decr_event_loop_interest(&mut self);

    /// Run queued tasks until the queue is empty and nothing is awaited.
    fn run_event_loop(&mut self) -> Result<(), EngineError>;

    fn promise_state(&self, promise: &Self::Promise) -> PromiseState<Self::Value>;

    fn take_pending_exception(&mut self) -> Option<EngineError>;

    /// Report an error value to the diagnostic stream.
    fn dump_error(&mut self, value: &Self::Value);

    fn init_debugger(&mut self);

    fn reset_random_seed(&mut self);

    fn set_time_origin(&mut self, origin: Instant);

    fn memory(&self) -> &Self::Memory;

    fn memory_mut(&mut self) -> &mut Self::Memory;
}
