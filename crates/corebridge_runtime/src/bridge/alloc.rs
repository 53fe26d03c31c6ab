use std::cell::RefCell;
use std::rc::Rc;

use crate::engine::GuestMemory;

use super::error::{BridgeError, BridgeResult};

/// Buffers allocated during the current call cycle. Every entry is freed by
/// the matching `post_call`.
///
/// Shared between the runtime and the `realloc` binding installed in the
/// engine, so guest-side reallocations land in the same list.
#[derive(Debug, Clone, Default)]
pub struct FreeList {
    ptrs: Rc<RefCell<Vec<u32>>>,
}

impl FreeList {
    /// Record `new_ptr` as the result of reallocating `old_ptr`.
    ///
    /// A moved block replaces its old entry in place; the old block was
    /// already released by the reallocation and must not be freed twice.
    pub(crate) fn record(&self, old_ptr: u32, new_ptr: u32) {
        let mut ptrs = self.ptrs.borrow_mut();
        if old_ptr != 0 {
            if let Some(slot) = ptrs.iter_mut().find(|p| **p == old_ptr) {
                *slot = new_ptr;
                return;
            }
        }
        if !ptrs.contains(&new_ptr) {
            ptrs.push(new_ptr);
        }
    }

    /// Track a buffer that was allocated outside the tracked path.
    pub(crate) fn adopt(&self, ptr: u32) {
        self.record(0, ptr);
    }

    pub(crate) fn take(&self) -> Vec<u32> {
        std::mem::take(&mut *self.ptrs.borrow_mut())
    }

    pub fn is_empty(&self) -> bool {
        self.ptrs.borrow().is_empty()
    }

    pub fn to_vec(&self) -> Vec<u32> {
        self.ptrs.borrow().clone()
    }
}

/// Tracked reallocation: the result is appended to the free list and freed
/// by the next `post_call`. Failure is fatal.
///
/// NOTE: avoid host calls (including logging) in here; the host may be in a
/// state where leaving the component is not allowed while it reallocates.
pub(crate) fn tracked_realloc<M: GuestMemory>(
    memory: &mut M,
    free_list: &FreeList,
    ptr: u32,
    old_size: u32,
    align: u32,
    new_size: u32,
) -> BridgeResult<u32> {
    let ret = memory
        .realloc(ptr, old_size, align, new_size)
        .ok_or(BridgeError::OutOfMemory { size: new_size })?;
    free_list.record(ptr, ret);
    Ok(ret)
}

/// Untracked reallocation for engine-internal growth. Returns 0 on failure.
pub(crate) fn untracked_realloc<M: GuestMemory>(
    memory: &mut M,
    ptr: u32,
    old_size: u32,
    align: u32,
    new_size: u32,
) -> u32 {
    memory.realloc(ptr, old_size, align, new_size).unwrap_or(0)
}
