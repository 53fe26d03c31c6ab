//! Core ABI call bridge for script-engine guests.
//!
//! [`bridge`] holds the export table, the `call`/`post_call` protocol and
//! allocation tracking. [`engine`] is the seam to the embedded engine and
//! [`local`] is an in-process engine implementing it.

pub mod bridge;
mod core_val;
pub mod engine;
pub mod local;

pub use core_val::CoreVal;
