//! In-process engine with a cooperative, single-threaded job queue.
//!
//! Guest logic is written as host closures. Async functions return a promise
//! settled by a queued job, so every export call must drive the queue to see
//! its result.

mod memory;
mod value;

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng as _};

use crate::bridge::{Bindings, BufferView};
use crate::engine::{Engine, EngineError, PromiseState, ReactionFn};

pub use memory::{HEAP_BASE, LinearMemory, PAGE_SIZE};
pub use value::{FunctionId, PromiseId, Value};

/// Host closure standing in for a script function. `Err` is a thrown value.
pub type HostFn = Rc<dyn Fn(&mut LocalEngine, &[Value]) -> Result<Value, Value>>;

type Job = Box<dyn FnOnce(&mut LocalEngine)>;

type PreInitHook = Box<dyn FnOnce(&mut LocalEngine) -> anyhow::Result<()>>;

/// Seed used before the first call reseeds the generator.
const SNAPSHOT_SEED: u64 = 0;

enum Reaction {
    Host {
        on_fulfilled: ReactionFn<LocalEngine>,
        on_rejected: ReactionFn<LocalEngine>,
    },
    /// Settle another promise the same way (promise adoption).
    Forward(PromiseId),
}

enum Settlement {
    Pending(Vec<Reaction>),
    Fulfilled(Value),
    Rejected(Value),
}

pub struct LocalEngine {
    memory: LinearMemory,
    functions: Vec<HostFn>,
    /// Initializer namespace: globals visible to the binding logic.
    globals: HashMap<String, Value>,
    module_namespace: Value,
    promises: Vec<Settlement>,
    jobs: VecDeque<Job>,
    interest: u32,
    pending_exception: Option<Value>,
    bindings: Option<Bindings<LocalEngine>>,
    pre_init: Option<PreInitHook>,
    rng: StdRng,
    debugger_initialized: bool,
    reseed_count: u32,
    time_origin: Option<Instant>,
    reported_errors: Vec<String>,
}

impl LocalEngine {
    pub fn new() -> Self {
        Self::with_memory(LinearMemory::default())
    }

    pub fn with_memory(memory: LinearMemory) -> Self {
        Self {
            memory,
            functions: vec![],
            globals: HashMap::new(),
            module_namespace: Value::Undefined,
            promises: vec![],
            jobs: VecDeque::new(),
            interest: 0,
            pending_exception: None,
            bindings: None,
            pre_init: None,
            rng: StdRng::seed_from_u64(SNAPSHOT_SEED),
            debugger_initialized: false,
            reseed_count: 0,
            time_origin: None,
            reported_errors: vec![],
        }
    }

    /// Run `hook` during engine pre-initialization, i.e. where the guest
    /// script would be evaluated.
    pub fn on_pre_initialize<F>(&mut self, hook: F)
    where
        F: FnOnce(&mut LocalEngine) -> anyhow::Result<()> + 'static,
    {
        self.pre_init = Some(Box::new(hook));
    }

    pub fn set_module_namespace(&mut self, value: Value) {
        self.module_namespace = value;
    }

    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Register a synchronous function.
    pub fn function<F>(&mut self, f: F) -> Value
    where
        F: Fn(&mut LocalEngine, &[Value]) -> Result<Value, Value> + 'static,
    {
        let id = FunctionId(self.functions.len());
        self.functions.push(Rc::new(f));
        Value::Function(id)
    }

    /// Register an async function: calling it returns a promise that a queued
    /// job settles with the closure's result. A returned promise is adopted.
    pub fn async_function<F>(&mut self, f: F) -> Value
    where
        F: Fn(&mut LocalEngine, &[Value]) -> Result<Value, Value> + 'static,
    {
        let body: HostFn = Rc::new(f);
        self.function(move |engine, args| {
            let promise = engine.new_promise();
            let body = Rc::clone(&body);
            let args = args.to_vec();
            engine.enqueue_job(move |engine| match body(engine, &args) {
                Ok(value) => engine.resolve_promise(promise, value),
                Err(reason) => engine.reject_promise(promise, reason),
            });
            Ok(Value::Promise(promise))
        })
    }

    pub fn define_function<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&mut LocalEngine, &[Value]) -> Result<Value, Value> + 'static,
    {
        let value = self.function(f);
        self.set_global(name, value);
    }

    pub fn define_async_function<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&mut LocalEngine, &[Value]) -> Result<Value, Value> + 'static,
    {
        let value = self.async_function(f);
        self.set_global(name, value);
    }

    pub fn call(&mut self, func: FunctionId, args: &[Value]) -> Result<Value, Value> {
        let f = self
            .functions
            .get(func.0)
            .cloned()
            .ok_or_else(|| Value::string(format!("TypeError: unknown function #{}", func.0)))?;
        f(self, args)
    }

    pub fn new_promise(&mut self) -> PromiseId {
        let id = PromiseId(self.promises.len());
        self.promises.push(Settlement::Pending(vec![]));
        id
    }

    pub fn resolve_promise(&mut self, promise: PromiseId, value: Value) {
        if let Value::Promise(inner) = value {
            self.add_reaction(inner, Reaction::Forward(promise));
            return;
        }
        self.settle(promise, Settlement::Fulfilled(value));
    }

    pub fn reject_promise(&mut self, promise: PromiseId, reason: Value) {
        self.settle(promise, Settlement::Rejected(reason));
    }

    pub fn enqueue_job<F>(&mut self, job: F)
    where
        F: FnOnce(&mut LocalEngine) + 'static,
    {
        self.jobs.push_back(Box::new(job));
    }

    pub fn pending_jobs(&self) -> usize {
        self.jobs.len()
    }

    pub fn event_loop_interest(&self) -> u32 {
        self.interest
    }

    /// Guest-side `memory.buffer`.
    pub fn memory_buffer(&self) -> Option<BufferView> {
        let bindings = self.bindings.as_ref()?;
        Some(bindings.memory.view(&self.memory))
    }

    /// Guest-side `realloc`: tracked for the current call.
    pub fn realloc(
        &mut self,
        ptr: u32,
        old_size: u32,
        align: u32,
        new_size: u32,
    ) -> Result<u32, Value> {
        let realloc = self
            .bindings
            .as_ref()
            .map(|bindings| bindings.realloc.clone())
            .ok_or_else(|| Value::string("ReferenceError: $bindings is not defined"))?;
        realloc
            .call(&mut self.memory, ptr, old_size, align, new_size)
            .map_err(|e| Value::string(e.to_string()))
    }

    /// Call a host import through its bound thunk.
    pub fn call_import(&mut self, name: &str, args: &[Value]) -> Result<Value, Value> {
        let thunk = self
            .bindings
            .as_ref()
            .and_then(|bindings| bindings.import(name))
            .cloned()
            .ok_or_else(|| Value::string(format!("TypeError: import `{name}` is not bound")))?;
        thunk
            .call(self, args)
            .map_err(|e| Value::string(e.to_string()))
    }

    pub fn bindings(&self) -> Option<&Bindings<LocalEngine>> {
        self.bindings.as_ref()
    }

    /// `Math.random()`.
    pub fn random(&mut self) -> f64 {
        self.rng.random()
    }

    pub fn debugger_initialized(&self) -> bool {
        self.debugger_initialized
    }

    pub fn reseed_count(&self) -> u32 {
        self.reseed_count
    }

    pub fn time_origin(&self) -> Option<Instant> {
        self.time_origin
    }

    /// Errors reported through [`Engine::dump_error`], oldest first.
    pub fn reported_errors(&self) -> &[String] {
        &self.reported_errors
    }

    fn add_reaction(&mut self, promise: PromiseId, reaction: Reaction) {
        let Some(slot) = self.promises.get_mut(promise.0) else {
            return;
        };
        match slot {
            Settlement::Pending(reactions) => reactions.push(reaction),
            Settlement::Fulfilled(value) => {
                let value = value.clone();
                self.enqueue_reaction(reaction, Ok(value));
            }
            Settlement::Rejected(reason) => {
                let reason = reason.clone();
                self.enqueue_reaction(reaction, Err(reason));
            }
        }
    }

    fn settle(&mut self, promise: PromiseId, settlement: Settlement) {
        let Some(slot) = self.promises.get_mut(promise.0) else {
            return;
        };
        if !matches!(slot, Settlement::Pending(_)) {
            return;
        }
        let outcome = match &settlement {
            Settlement::Fulfilled(value) => Ok(value.clone()),
            Settlement::Rejected(reason) => Err(reason.clone()),
            Settlement::Pending(_) => return,
        };
        let Settlement::Pending(reactions) = std::mem::replace(slot, settlement) else {
            return;
        };
        for reaction in reactions {
            self.enqueue_reaction(reaction, outcome.clone());
        }
    }

    fn enqueue_reaction(&mut self, reaction: Reaction, outcome: Result<Value, Value>) {
        self.enqueue_job(move |engine| match reaction {
            Reaction::Host {
                on_fulfilled,
                on_rejected,
            } => {
                let ok = match &outcome {
                    Ok(value) => on_fulfilled(engine, value),
                    Err(reason) => on_rejected(engine, reason),
                };
                if !ok {
                    tracing::debug!("promise reaction handler failed");
                }
            }
            Reaction::Forward(target) => match outcome {
                Ok(value) => engine.resolve_promise(target, value),
                Err(reason) => engine.reject_promise(target, reason),
            },
        });
    }
}

impl Default for LocalEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for LocalEngine {
    type Value = Value;
    type Function = FunctionId;
    type Promise = PromiseId;
    type Memory = LinearMemory;

    fn pre_initialize(&mut self) -> anyhow::Result<()> {
        match self.pre_init.take() {
            Some(hook) => hook(self),
            None => Ok(()),
        }
    }

    fn install_bindings(&mut self, bindings: Bindings<Self>) -> Result<(), EngineError> {
        if self.bindings.is_some() {
            return Err(EngineError::Other(
                "$bindings is already defined".to_string(),
            ));
        }
        self.bindings = Some(bindings);
        Ok(())
    }

    fn script_namespace(&mut self) -> Result<Value, EngineError> {
        Ok(self.module_namespace.clone())
    }

    fn string_value(&mut self, value: &str) -> Value {
        Value::string(value)
    }

    fn set_initializer_property(&mut self, name: &str, value: Value) -> Result<(), EngineError> {
        self.set_global(name, value);
        Ok(())
    }

    fn get_initializer_function(&mut self, name: &str) -> Option<FunctionId> {
        match self.globals.get(name) {
            Some(Value::Function(id)) => Some(*id),
            _ => None,
        }
    }

    fn call_initializer_function(
        &mut self,
        name: &str,
        args: &[Value],
    ) -> Result<Value, EngineError> {
        let result = match self.get_initializer_function(name) {
            Some(func) => self.call(func, args),
            None => Err(Value::string(format!("TypeError: {name} is not a function"))),
        };
        result.map_err(|exc| {
            let report = EngineError::Exception(exc.to_string());
            self.pending_exception = Some(exc);
            report
        })
    }

    fn call_function(&mut self, func: &FunctionId, args: &[Value]) -> Result<Value, EngineError> {
        self.call(*func, args)
            .map_err(|exc| EngineError::Exception(exc.to_string()))
    }

    fn as_promise(&self, value: &Value) -> Option<PromiseId> {
        match value {
            Value::Promise(id) => Some(*id),
            _ => None,
        }
    }

    fn add_promise_reactions(
        &mut self,
        promise: &PromiseId,
        on_fulfilled: ReactionFn<Self>,
        on_rejected: ReactionFn<Self>,
    ) -> Result<(), EngineError> {
        if promise.0 >= self.promises.len() {
            return Err(EngineError::Other(format!(
                "unknown promise #{}",
                promise.0
            )));
        }
        self.add_reaction(
            *promise,
            Reaction::Host {
                on_fulfilled,
                on_rejected,
            },
        );
        Ok(())
    }

    fn incr_event_loop_interest(&mut self) {
        self.interest += 1;
    }

    fn decr_event_loop_interest(&mut self) {
        self.interest = self.interest.saturating_sub(1);
    }

    fn run_event_loop(&mut self) -> Result<(), EngineError> {
        while let Some(job) = self.jobs.pop_front() {
            job(self);
        }
        if self.interest > 0 {
            // Nothing external can wake us up; the caller inspects the promise.
            tracing::debug!(
                "event loop drained with {} unit(s) of interest outstanding",
                self.interest
            );
        }
        Ok(())
    }

    fn promise_state(&self, promise: &PromiseId) -> PromiseState<Value> {
        match self.promises.get(promise.0) {
            Some(Settlement::Fulfilled(value)) => PromiseState::Fulfilled(value.clone()),
            Some(Settlement::Rejected(reason)) => PromiseState::Rejected(reason.clone()),
            Some(Settlement::Pending(_)) | None => PromiseState::Pending,
        }
    }

    fn take_pending_exception(&mut self) -> Option<EngineError> {
        self.pending_exception
            .take()
            .map(|exc| EngineError::Exception(exc.to_string()))
    }

    fn dump_error(&mut self, value: &Value) {
        tracing::error!("{value}");
        self.reported_errors.push(value.to_string());
    }

    fn init_debugger(&mut self) {
        self.debugger_initialized = true;
    }

    fn reset_random_seed(&mut self) {
        self.rng = StdRng::from_os_rng();
        self.reseed_count += 1;
    }

    fn set_time_origin(&mut self, origin: Instant) {
        self.time_origin = Some(origin);
    }

    fn memory(&self) -> &LinearMemory {
        &self.memory
    }

    fn memory_mut(&mut self) -> &mut LinearMemory {
        &mut self.memory
    }
}
