use corebridge_runtime::engine::{GuestMemory, MemoryError};
use corebridge_runtime::local::{HEAP_BASE, LinearMemory, PAGE_SIZE};

#[test]
fn allocations_are_aligned_and_disjoint() {
    let mut memory = LinearMemory::default();
    let a = memory.realloc(0, 0, 4, 12).unwrap();
    let b = memory.realloc(0, 0, 8, 8).unwrap();
    assert!(a >= HEAP_BASE);
    assert_eq!(a % 4, 0);
    assert_eq!(b % 8, 0);
    assert!(b >= a + 12);
    assert_eq!(memory.live_allocations(), 2);
}

#[test]
fn freed_blocks_are_reused() {
    let mut memory = LinearMemory::default();
    let a = memory.realloc(0, 0, 4, 16).unwrap();
    memory.free(a);
    assert!(!memory.is_live(a));
    let b = memory.realloc(0, 0, 4, 16).unwrap();
    assert_eq!(a, b);
}

#[test]
fn realloc_moves_and_copies() {
    let mut memory = LinearMemory::default();
    let a = memory.realloc(0, 0, 4, 4).unwrap();
    memory.write(a, &[1, 2, 3, 4]).unwrap();
    // Pin the space right after `a` so growing must move.
    let _pin = memory.realloc(0, 0, 4, 4).unwrap();

    let b = memory.realloc(a, 4, 4, 64).unwrap();
    assert_ne!(a, b);
    assert!(!memory.is_live(a));
    assert_eq!(memory.allocation_size(b), Some(64));
    let mut buf = [0u8; 4];
    memory.read(b, &mut buf).unwrap();
    assert_eq!(buf, [1, 2, 3, 4]);
}

#[test]
fn shrinking_stays_in_place() {
    let mut memory = LinearMemory::default();
    let a = memory.realloc(0, 0, 4, 32).unwrap();
    assert_eq!(memory.realloc(a, 32, 4, 8), Some(a));
}

#[test]
fn grows_pages_on_demand() {
    let mut memory = LinearMemory::new(1, 4);
    assert_eq!(memory.size(), PAGE_SIZE);
    let ptr = memory.realloc(0, 0, 8, PAGE_SIZE).unwrap();
    assert_eq!(memory.pages(), 2);
    memory.write(ptr + PAGE_SIZE - 1, &[0xff]).unwrap();
}

#[test]
fn allocation_fails_past_max_pages() {
    let mut memory = LinearMemory::new(1, 1);
    assert_eq!(memory.realloc(0, 0, 4, PAGE_SIZE), None);
    assert_eq!(memory.grow(1), None);
}

#[test]
fn out_of_bounds_access_is_an_error() {
    let memory = LinearMemory::new(1, 1);
    let mut buf = [0u8; 8];
    let err = memory.read(PAGE_SIZE - 4, &mut buf).unwrap_err();
    assert_eq!(
        err,
        MemoryError::OutOfBounds {
            addr: PAGE_SIZE - 4,
            len: 8,
            size: PAGE_SIZE,
        }
    );
}

#[test]
fn invalid_free_is_counted() {
    let mut memory = LinearMemory::default();
    memory.free(0);
    assert_eq!(memory.invalid_frees(), 0);
    memory.free(1234);
    assert_eq!(memory.invalid_frees(), 1);
}
