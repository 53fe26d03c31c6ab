//! Call bridge between the core ABI exports of a component and the
//! asynchronous functions of the embedded script engine.
//!
//! Split into focused submodules; the public surface is re-exported here.

mod alloc;
mod config;
mod descriptor;
mod entry;
mod error;
mod imports;
mod marshal;
mod runtime;
mod table;

pub use alloc::FreeList;
pub use config::{ExportSpec, ImportSpec, RuntimeConfig};
pub use descriptor::{
    CoreFn, CoreSignature, DescriptorError, DescriptorErrorReason, parse_params, parse_return,
};
pub use entry::Entry;
pub use error::{BridgeError, BridgeResult, InitError};
pub use imports::{
    Bindings, BufferView, ImportFn, ImportLinker, ImportThunk, MemoryBuffer, ReallocBinding,
    UnlinkedImports,
};
pub use marshal::{
    RawValue, from_bigint64, marshal_args, to_bigint64, unmarshal_result, write_result,
};
pub use runtime::Runtime;
pub use table::{BIND_EXPORTS_FUNCTION, SOURCE_MOD_PROPERTY};
