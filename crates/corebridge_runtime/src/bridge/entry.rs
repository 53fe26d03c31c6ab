use super::error::{BridgeError, BridgeResult};
use super::runtime::Runtime;
use crate::engine::Engine;

/// Host-facing entry points with raw core ABI results.
///
/// Every fatal [`BridgeError`] is reported and terminates the process; the
/// host contract leaves nothing to recover.
pub struct Entry<E: Engine> {
    runtime: Runtime<E>,
}

impl<E: Engine> Entry<E> {
    pub fn new(runtime: Runtime<E>) -> Self {
        Self { runtime }
    }

    pub fn check_init(&mut self) -> u32 {
        self.runtime.check_init() as u32
    }

    pub fn call(&mut self, fn_idx: u32, argptr: u32) -> u32 {
        or_abort(self.runtime.call(fn_idx, argptr))
    }

    pub fn post_call(&mut self, fn_idx: u32) {
        or_abort(self.runtime.post_call(fn_idx))
    }

    pub fn cabi_realloc(&mut self, ptr: u32, old_size: u32, align: u32, new_size: u32) -> u32 {
        or_abort(self.runtime.cabi_realloc(ptr, old_size, align, new_size))
    }

    pub fn cabi_realloc_adapter(
        &mut self,
        ptr: u32,
        old_size: u32,
        align: u32,
        new_size: u32,
    ) -> u32 {
        self.runtime.cabi_realloc_adapter(ptr, old_size, align, new_size)
    }

    pub fn cabi_free(&mut self, ptr: u32) {
        self.runtime.cabi_free(ptr)
    }

    pub fn runtime(&self) -> &Runtime<E> {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut Runtime<E> {
        &mut self.runtime
    }
}

fn or_abort<T>(result: BridgeResult<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => fatal(err),
    }
}

fn fatal(err: BridgeError) -> ! {
    if err.is_protocol_violation() {
        tracing::error!("protocol violation: {err}");
    } else {
        tracing::error!("{err}");
    }
    std::process::abort()
}
