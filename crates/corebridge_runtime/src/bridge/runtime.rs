use std::time::Instant;

use crate::engine::{Engine, GuestMemory, NativeValue, PromiseState};

use super::alloc::{self, FreeList};
use super::config::RuntimeConfig;
use super::descriptor::CoreFn;
use super::error::{BridgeError, BridgeResult, InitError};
use super::imports::{self, ImportLinker};
use super::marshal;
use super::table;

/// The embedding's runtime state. Exactly one exists per component instance;
/// the host drives it through strictly alternating `call`/`post_call` pairs.
pub struct Runtime<E: Engine> {
    engine: E,
    /// Export table, indexed by call index in declared order.
    fns: Vec<CoreFn<E::Function>>,
    /// Index of the call in flight, if any.
    cur_fn_idx: Option<u32>,
    free_list: FreeList,
    init_err: InitError,
    debug: bool,
    clocks: bool,
    first_call: bool,
    source_name: String,
}

impl<E: Engine> Runtime<E> {
    /// Install the bindings, pre-initialize the engine and build the export table.
    ///
    /// Export binding and descriptor failures are recorded for
    /// [`Runtime::check_init`]; install and engine failures are returned.
    pub fn initialize<L: ImportLinker<E>>(
        mut engine: E,
        config: &RuntimeConfig,
        linker: &mut L,
    ) -> BridgeResult<Self> {
        let free_list = FreeList::default();

        let bindings = imports::create_bindings(&config.imports, &free_list, linker)?;
        tracing::debug!("(install) setting the binding global");
        engine
            .install_bindings(bindings)
            .map_err(|e| BridgeError::Install(e.to_string()))?;

        engine
            .pre_initialize()
            .map_err(BridgeError::PreInitialize)?;

        let mut runtime = Self {
            engine,
            fns: vec![],
            cur_fn_idx: None,
            free_list,
            init_err: InitError::None,
            debug: config.debug,
            clocks: config.clocks,
            first_call: true,
            source_name: config.source_name.clone(),
        };

        match table::build_export_table(&mut runtime.engine, config) {
            Ok(fns) => runtime.fns = fns,
            Err(err) => runtime.init_err = err,
        }
        Ok(runtime)
    }

    /// Report the initialization outcome, draining any exception left
    /// pending by initialization.
    pub fn check_init(&mut self) -> InitError {
        if let Some(exc) = self.engine.take_pending_exception() {
            tracing::error!("(check_init) {exc}");
        }
        self.init_err
    }

    /// Invoke export `fn_idx` and return the address of its result buffer,
    /// or 0 when the export declares no return value.
    pub fn call(&mut self, fn_idx: u32, argptr: u32) -> BridgeResult<u32> {
        if self.first_call {
            self.warm_up();
        }
        if let Some(active) = self.cur_fn_idx {
            return Err(BridgeError::CallWhileActive { active });
        }
        if self.init_err != InitError::None {
            return Err(BridgeError::NotInitialized(self.init_err));
        }
        let func = self
            .fns
            .get(fn_idx as usize)
            .ok_or(BridgeError::IndexOutOfRange {
                index: fn_idx,
                count: self.fns.len(),
            })?;
        self.cur_fn_idx = Some(fn_idx);

        if self.debug {
            tracing::info!("(call) Function [{fn_idx}] - {}", func.sig);
        }

        invoke(&mut self.engine, &self.free_list, func, argptr)
    }

    /// Release every buffer tracked since the matching `call`.
    pub fn post_call(&mut self, fn_idx: u32) -> BridgeResult<()> {
        tracing::trace!("(post_call) Function [{fn_idx}]");
        if self.cur_fn_idx != Some(fn_idx) {
            return Err(BridgeError::PostCallMismatch {
                index: fn_idx,
                active: self.cur_fn_idx,
            });
        }
        self.cur_fn_idx = None;
        for ptr in self.free_list.take() {
            self.cabi_free(ptr);
        }
        debug_assert!(self.free_list.is_empty());
        tracing::trace!("(post_call) end");
        Ok(())
    }

    /// Canonical reallocation entry point. The buffer is tracked and freed by
    /// the next `post_call`.
    pub fn cabi_realloc(
        &mut self,
        ptr: u32,
        old_size: u32,
        align: u32,
        new_size: u32,
    ) -> BridgeResult<u32> {
        alloc::tracked_realloc(
            self.engine.memory_mut(),
            &self.free_list,
            ptr,
            old_size,
            align,
            new_size,
        )
    }

    /// Untracked reallocation for the engine's own memory growth.
    pub fn cabi_realloc_adapter(
        &mut self,
        ptr: u32,
        old_size: u32,
        align: u32,
        new_size: u32,
    ) -> u32 {
        alloc::untracked_realloc(self.engine.memory_mut(), ptr, old_size, align, new_size)
    }

    pub fn cabi_free(&mut self, ptr: u32) {
        tracing::trace!("(cabi_free) {ptr:#x}");
        self.engine.memory_mut().free(ptr);
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn functions(&self) -> &[CoreFn<E::Function>] {
        &self.fns
    }

    pub fn current_call(&self) -> Option<u32> {
        self.cur_fn_idx
    }

    /// Buffers currently tracked for release by the next `post_call`.
    pub fn tracked_allocations(&self) -> Vec<u32> {
        self.free_list.to_vec()
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// One-time engine warm-up before any export logic runs.
    fn warm_up(&mut self) {
        self.engine.init_debugger();
        self.engine.reset_random_seed();
        self.first_call = false;
        if self.clocks {
            self.engine.set_time_origin(Instant::now());
        }
    }
}

fn invoke<E: Engine>(
    engine: &mut E,
    free_list: &FreeList,
    func: &CoreFn<E::Function>,
    argptr: u32,
) -> BridgeResult<u32> {
    let sig = &func.sig;

    tracing::trace!("(call) setting args");
    let mut args = marshal::marshal_args::<E::Value, _>(engine.memory(), sig, argptr)?;

    let mut retptr = 0;
    if sig.retptr {
        let align = sig.ret.map_or(4, |kind| kind.byte_width());
        retptr = alloc::untracked_realloc(engine.memory_mut(), 0, 0, align, sig.retsize);
        if retptr == 0 {
            return Err(BridgeError::OutOfMemory { size: sig.retsize });
        }
        // Allocated on the engine path but still released by post_call.
        free_list.adopt(retptr);
        tracing::trace!("(call) setting retptr at arg {}", args.len());
        args.push(<E::Value as NativeValue>::from_u32(retptr));
    }

    tracing::trace!("(call) lowering call");
    engine.incr_event_loop_interest();
    let result = engine.call_function(&func.func, &args)?;

    // All exports are async functions; a guest-level error is encoded in the
    // fulfilled value, so only critical failures surface here.
    let promise = engine.as_promise(&result).ok_or(BridgeError::NotDeferred)?;

    tracing::trace!("(call) adding promise reactions");
    engine.add_promise_reactions(&promise, call_then_handler::<E>, call_catch_handler::<E>)?;

    tracing::trace!("(call) driving event loop to promise completion");
    engine.run_event_loop()?;

    tracing::trace!("(call) retrieving promise result");
    let value = match engine.promise_state(&promise) {
        PromiseState::Fulfilled(value) => value,
        PromiseState::Pending => return Err(BridgeError::PromisePending),
        PromiseState::Rejected(_) => return Err(BridgeError::PromiseRejected),
    };

    if !sig.retptr {
        if let Some(kind) = sig.ret {
            tracing::trace!("(call) singular return");
            let size = sig.retsize.max(kind.byte_width());
            retptr = alloc::tracked_realloc(
                engine.memory_mut(),
                free_list,
                0,
                0,
                kind.byte_width(),
                size,
            )?;
            let raw = marshal::unmarshal_result(kind, &value)?;
            marshal::write_result(engine.memory_mut(), retptr, raw)?;
        }
    }

    tracing::trace!("(call) end");
    Ok(retptr)
}

fn call_then_handler<E: Engine>(engine: &mut E, _value: &E::Value) -> bool {
    tracing::trace!("(call) call then handler");
    engine.decr_event_loop_interest();
    true
}

fn call_catch_handler<E: Engine>(engine: &mut E, reason: &E::Value) -> bool {
    tracing::trace!("(call) call catch handler");
    engine.decr_event_loop_interest();
    engine.dump_error(reason);
    false
}
