use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("out of bounds memory access: {len} bytes at {addr:#x} (memory size {size:#x})")]
    OutOfBounds { addr: u32, len: usize, size: u32 },
}

/// Linear memory shared between the host and the engine.
///
/// Addresses are 32-bit offsets and every multi-byte access is little-endian.
/// `realloc` follows the canonical ABI shape: `ptr == 0` allocates, otherwise
/// the block is resized (possibly moved, in which case the old block is released).
pub trait GuestMemory {
    /// Returns `None` when the allocation cannot be satisfied.
    fn realloc(&mut self, ptr: u32, old_size: u32, align: u32, new_size: u32) -> Option<u32>;

    fn free(&mut self, ptr: u32);

    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<(), MemoryError>;

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<(), MemoryError>;

    /// Current size of the memory in bytes.
    fn size(&self) -> u32;

    fn read_u32(&self, addr: u32) -> Result<u32, MemoryError> {
        let mut buf = [0u8; 4];
        self.read(addr, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&self, addr: u32) -> Result<u64, MemoryError> {
        let mut buf = [0u8; 8];
        self.read(addr, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
}
