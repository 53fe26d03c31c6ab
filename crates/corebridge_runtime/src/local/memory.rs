use std::collections::BTreeMap;

use crate::engine::{GuestMemory, MemoryError};

/// Wasm page size (64KB).
pub const PAGE_SIZE: u32 = 65536;

/// First address handed out by the allocator; keeps 0 reserved as null.
pub const HEAP_BASE: u32 = 64;

/// Largest page count whose byte size still fits in a 32-bit address.
const MAX_PAGES: u32 = 65535;

/// Byte-addressed linear memory with a first-fit allocator.
#[derive(Debug, Clone)]
pub struct LinearMemory {
    data: Vec<u8>,
    max_pages: u32,
    /// End of the bump region.
    top: u32,
    /// Live blocks: address -> size.
    live: BTreeMap<u32, u32>,
    /// Released blocks available for reuse: address -> size.
    free_blocks: BTreeMap<u32, u32>,
    invalid_frees: usize,
}

impl LinearMemory {
    pub fn new(initial_pages: u32, max_pages: u32) -> Self {
        let max_pages = max_pages.clamp(1, MAX_PAGES);
        let initial_pages = initial_pages.clamp(1, max_pages);
        Self {
            data: vec![0; (initial_pages * PAGE_SIZE) as usize],
            max_pages,
            top: HEAP_BASE,
            live: BTreeMap::new(),
            free_blocks: BTreeMap::new(),
            invalid_frees: 0,
        }
    }

    pub fn pages(&self) -> u32 {
        (self.data.len() / PAGE_SIZE as usize) as u32
    }

    /// Grow by `delta` pages. Returns the previous page count.
    pub fn grow(&mut self, delta: u32) -> Option<u32> {
        let old = self.pages();
        let new = old.checked_add(delta)?;
        if new > self.max_pages {
            return None;
        }
        self.data.resize((new * PAGE_SIZE) as usize, 0);
        Some(old)
    }

    pub fn live_allocations(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, ptr: u32) -> bool {
        self.live.contains_key(&ptr)
    }

    pub fn allocation_size(&self, ptr: u32) -> Option<u32> {
        self.live.get(&ptr).copied()
    }

    /// Number of `free` calls on addresses that were not live.
    pub fn invalid_frees(&self) -> usize {
        self.invalid_frees
    }

    fn allocate(&mut self, size: u32, align: u32) -> Option<u32> {
        let size = size.max(1);
        let align = align.clamp(1, PAGE_SIZE).next_power_of_two();

        let reuse = self.free_blocks.iter().find_map(|(&addr, &len)| {
            let start = align_up(addr, align)?;
            let end = start.checked_add(size)?;
            (end <= addr + len).then_some((addr, len, start))
        });
        if let Some((addr, len, start)) = reuse {
            self.free_blocks.remove(&addr);
            if start > addr {
                self.free_blocks.insert(addr, start - addr);
            }
            let end = start + size;
            if addr + len > end {
                self.free_blocks.insert(end, addr + len - end);
            }
            self.live.insert(start, size);
            return Some(start);
        }

        let start = align_up(self.top, align)?;
        let end = start.checked_add(size)?;
        self.ensure_size(end)?;
        if start > self.top {
            self.free_blocks.insert(self.top, start - self.top);
        }
        self.top = end;
        self.live.insert(start, size);
        Some(start)
    }

    fn ensure_size(&mut self, end: u32) -> Option<()> {
        let len = self.data.len() as u64;
        if u64::from(end) <= len {
            return Some(());
        }
        let missing = u64::from(end) - len;
        let delta = missing.div_ceil(u64::from(PAGE_SIZE));
        self.grow(u32::try_from(delta).ok()?)?;
        Some(())
    }

    fn check_bounds(&self, addr: u32, len: usize) -> Result<std::ops::Range<usize>, MemoryError> {
        let start = addr as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(start..end),
            _ => Err(MemoryError::OutOfBounds {
                addr,
                len,
                size: self.size(),
            }),
        }
    }
}

impl Default for LinearMemory {
    fn default() -> Self {
        Self::new(1, 256)
    }
}

impl GuestMemory for LinearMemory {
    fn realloc(&mut self, ptr: u32, old_size: u32, align: u32, new_size: u32) -> Option<u32> {
        if ptr == 0 {
            return self.allocate(new_size, align);
        }
        let cur = *self.live.get(&ptr)?;
        if new_size <= cur {
            return Some(ptr);
        }
        let new_ptr = self.allocate(new_size, align)?;
        let n = old_size.min(cur) as usize;
        let src = ptr as usize;
        self.data.copy_within(src..src + n, new_ptr as usize);
        self.free(ptr);
        Some(new_ptr)
    }

    fn free(&mut self, ptr: u32) {
        if ptr == 0 {
            return;
        }
        match self.live.remove(&ptr) {
            Some(len) => {
                self.free_blocks.insert(ptr, len);
            }
            None => {
                tracing::warn!("free of non-live address {ptr:#x}");
                self.invalid_frees += 1;
            }
        }
    }

    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        let range = self.check_bounds(addr, buf.len())?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), MemoryError> {
        let range = self.check_bounds(addr, data.len())?;
        self.data[range].copy_from_slice(data);
        Ok(())
    }

    fn size(&self) -> u32 {
        self.data.len() as u32
    }
}

fn align_up(addr: u32, align: u32) -> Option<u32> {
    Some(addr.checked_add(align - 1)? & !(align - 1))
}
