//! The bindings namespace installed into the engine before the export table
//! is built: `[memory, realloc, import_0, .., import_{n-1}]`.
//!
//! Generating the typed thunk bodies is done by an external build step; this
//! module only consumes its result through [`ImportLinker`].

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::engine::{Engine, EngineError, GuestMemory};

use super::alloc::{FreeList, tracked_realloc};
use super::config::ImportSpec;
use super::error::{BridgeError, BridgeResult};

/// Typed native entry point callable from guest script.
pub type ImportFn<E> = Rc<
    dyn Fn(&mut E, &[<E as Engine>::Value]) -> Result<<E as Engine>::Value, EngineError>,
>;

/// Produces the entry point for each configured import.
pub trait ImportLinker<E: Engine> {
    /// Returns `None` if the import cannot be created.
    fn link(&mut self, index: usize, name: &str, argcnt: u32) -> Option<ImportFn<E>>;
}

impl<E, F> ImportLinker<E> for F
where
    E: Engine,
    F: FnMut(usize, &str, u32) -> Option<ImportFn<E>>,
{
    fn link(&mut self, index: usize, name: &str, argcnt: u32) -> Option<ImportFn<E>> {
        self(index, name, argcnt)
    }
}

/// Links every import to a thunk that throws when called.
#[derive(Debug, Default)]
pub struct UnlinkedImports;

impl<E: Engine + 'static> ImportLinker<E> for UnlinkedImports {
    fn link(&mut self, _index: usize, name: &str, _argcnt: u32) -> Option<ImportFn<E>> {
        let name = name.to_string();
        Some(Rc::new(move |_engine: &mut E, _args: &[E::Value]| {
            Err(EngineError::Exception(format!(
                "import `{name}` is not linked"
            )))
        }))
    }
}

pub struct ImportThunk<E: Engine> {
    pub name: String,
    /// Declared arity, exposed to the guest as the function length.
    pub argcnt: u32,
    entry: ImportFn<E>,
}

impl<E: Engine> ImportThunk<E> {
    pub fn call(&self, engine: &mut E, args: &[E::Value]) -> Result<E::Value, EngineError> {
        let entry = Rc::clone(&self.entry);
        entry(engine, args)
    }
}

impl<E: Engine> Clone for ImportThunk<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            argcnt: self.argcnt,
            entry: Rc::clone(&self.entry),
        }
    }
}

impl<E: Engine> fmt::Debug for ImportThunk<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportThunk")
            .field("name", &self.name)
            .field("argcnt", &self.argcnt)
            .finish_non_exhaustive()
    }
}

/// Snapshot of linear memory handed to the guest by `memory.buffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferView {
    pub byte_length: u32,
    /// Bumped every time the view is re-materialized after growth.
    pub generation: u64,
}

/// The `memory.buffer` accessor. Re-materializes the view whenever the memory
/// size changed since the previous access.
#[derive(Debug, Default)]
pub struct MemoryBuffer {
    last_size: Cell<Option<u32>>,
    generation: Cell<u64>,
}

impl MemoryBuffer {
    pub fn view<M: GuestMemory>(&self, memory: &M) -> BufferView {
        let size = memory.size();
        if self.last_size.get() != Some(size) {
            self.last_size.set(Some(size));
            self.generation.set(self.generation.get() + 1);
        }
        BufferView {
            byte_length: size,
            generation: self.generation.get(),
        }
    }
}

/// The guest-callable `realloc`. Same semantics as the host's tracked path.
#[derive(Debug, Clone)]
pub struct ReallocBinding {
    free_list: FreeList,
}

impl ReallocBinding {
    pub fn call<M: GuestMemory>(
        &self,
        memory: &mut M,
        ptr: u32,
        old_size: u32,
        align: u32,
        new_size: u32,
    ) -> BridgeResult<u32> {
        tracked_realloc(memory, &self.free_list, ptr, old_size, align, new_size)
    }
}

pub struct Bindings<E: Engine> {
    pub memory: Rc<MemoryBuffer>,
    pub realloc: ReallocBinding,
    pub imports: Vec<ImportThunk<E>>,
}

impl<E: Engine> Bindings<E> {
    pub fn import(&self, name: &str) -> Option<&ImportThunk<E>> {
        self.imports.iter().find(|thunk| thunk.name == name)
    }
}

impl<E: Engine> fmt::Debug for Bindings<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bindings")
            .field("memory", &self.memory)
            .field("realloc", &self.realloc)
            .field("imports", &self.imports)
            .finish()
    }
}

pub(crate) fn create_bindings<E: Engine, L: ImportLinker<E>>(
    imports: &[ImportSpec],
    free_list: &FreeList,
    linker: &mut L,
) -> BridgeResult<Bindings<E>> {
    tracing::debug!("(install) create the {} import functions", imports.len());
    let mut thunks = Vec::with_capacity(imports.len());
    for (index, import) in imports.iter().enumerate() {
        let entry = linker
            .link(index, &import.name, import.argcnt)
            .ok_or_else(|| {
                BridgeError::Install(format!("unable to create import `{}`", import.name))
            })?;
        thunks.push(ImportThunk {
            name: import.name.clone(),
            argcnt: import.argcnt,
            entry,
        });
    }

    Ok(Bindings {
        memory: Rc::new(MemoryBuffer::default()),
        realloc: ReallocBinding {
            free_list: free_list.clone(),
        },
        imports: thunks,
    })
}
