//! Heap backends: where the allocator gets its bytes from.

use std::ptr::{self, NonNull};

use libc::{c_void, intptr_t, sbrk};
use log::warn;

/// Default capacity of an [`ArenaHeap`]: 20 MiB.
pub const MAX_HEAP: usize = 20 * (1 << 20);

/// A monotonically growing, contiguous memory region.
///
/// # Safety
///
/// Every pointer returned by `grow_heap` must point to `bytes` writable bytes
/// that start exactly where the previous grant ended, the first grant must be
/// 8-byte aligned, and all granted bytes must stay valid and unmoved for as
/// long as the grower lives.
pub unsafe trait HeapGrower {
  /// Extends the region by `bytes`, returning the start of the new bytes
  /// (the old break), or `None` if the region cannot grow.
  fn grow_heap(
    &mut self,
    bytes: usize,
  ) -> Option<NonNull<u8>>;
}

/// A fixed-capacity region whose break only moves forward.
pub struct ArenaHeap {
  mem: NonNull<[u64]>,
  brk: usize,
}

impl ArenaHeap {
  /// Reserves `capacity` bytes (rounded down to a multiple of 8).
  pub fn new(capacity: usize) -> Self {
    let words = vec![0u64; capacity / 8].into_boxed_slice();

    Self {
      mem: NonNull::from(Box::leak(words)),
      brk: 0,
    }
  }

  pub fn capacity(&self) -> usize {
    self.mem.len() * 8
  }

  /// Bytes handed out so far.
  pub fn used(&self) -> usize {
    self.brk
  }
}

impl Default for ArenaHeap {
  fn default() -> Self {
    Self::new(MAX_HEAP)
  }
}

impl Drop for ArenaHeap {
  fn drop(&mut self) {
    // SAFETY: `mem` came from `Box::leak` in `new` and is released only here.
    drop(unsafe { Box::from_raw(self.mem.as_ptr()) });
  }
}

// SAFETY: the slice is 8-aligned, never reallocated while `self` lives, and
// `brk` only grows, so grants are disjoint and contiguous.
unsafe impl HeapGrower for ArenaHeap {
  fn grow_heap(
    &mut self,
    bytes: usize,
  ) -> Option<NonNull<u8>> {
    let new_brk = self.brk.checked_add(bytes)?;
    if new_brk > self.capacity() {
      warn!(
        "arena out of memory: {} of {} bytes used, {} requested",
        self.brk,
        self.capacity(),
        bytes
      );
      return None;
    }

    // SAFETY: `brk <= capacity`, so the offset stays inside the allocation.
    let old_brk = unsafe { self.mem.cast::<u8>().add(self.brk) };
    self.brk = new_brk;

    Some(old_brk)
  }
}

/// Grows the process data segment with `sbrk(2)`.
///
/// The program break is shared with every other `sbrk` caller in the process
/// (the system `malloc` among them). A grant that does not start where the
/// previous one ended is refused, and those bytes are leaked.
pub struct SbrkHeap {
  start: *mut u8,
  size: usize,
}

impl SbrkHeap {
  pub fn new() -> Self {
    Self {
      start: ptr::null_mut(),
      size: 0,
    }
  }

  unsafe fn sbrk(increment: usize) -> Option<*mut u8> {
    let increment = intptr_t::try_from(increment).ok()?;
    let address = unsafe { sbrk(increment) };

    if address == usize::MAX as *mut c_void {
      return None;
    }

    Some(address.cast())
  }
}

impl Default for SbrkHeap {
  fn default() -> Self {
    Self::new()
  }
}

// SAFETY: `sbrk` memory is never moved, the first grant is padded to 8 bytes
// and non-contiguous grants are rejected.
unsafe impl HeapGrower for SbrkHeap {
  fn grow_heap(
    &mut self,
    bytes: usize,
  ) -> Option<NonNull<u8>> {
    unsafe {
      if self.start.is_null() {
        let current = Self::sbrk(0)?;
        let padding = current.align_offset(crate::ALIGNMENT);
        let address = Self::sbrk(padding.checked_add(bytes)?)?.add(padding);

        self.start = address;
        self.size = bytes;
        return NonNull::new(address);
      }

      let expected = self.start.add(self.size);
      let address = Self::sbrk(bytes)?;

      if address != expected {
        warn!(
          "program break moved by another caller: expected {:?}, got {:?}",
          expected, address
        );
        return None;
      }

      self.size += bytes;
      NonNull::new(address)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_arena_grants_are_contiguous() {
    let mut arena = ArenaHeap::new(64);

    let first = arena.grow_heap(16).unwrap();
    let second = arena.grow_heap(32).unwrap();

    assert_eq!(first.as_ptr() as usize % 8, 0);
    assert_eq!(unsafe { first.add(16) }, second);
    assert_eq!(arena.used(), 48);
  }

  #[test]
  fn test_arena_refuses_past_capacity() {
    let mut arena = ArenaHeap::new(64);

    assert!(arena.grow_heap(48).is_some());
    assert!(arena.grow_heap(24).is_none());
    assert_eq!(arena.used(), 48);
    assert!(arena.grow_heap(16).is_some());
    assert!(arena.grow_heap(1).is_none());
  }

  #[test]
  fn test_arena_capacity_rounds_down() {
    let arena = ArenaHeap::new(100);
    assert_eq!(arena.capacity(), 96);
  }

  #[test]
  fn test_sbrk_grants_are_aligned_and_contiguous() {
    let mut heap = SbrkHeap::new();

    let first = heap.grow_heap(16).unwrap();
    assert_eq!(first.as_ptr() as usize % 8, 0);

    // Other threads may move the break in between; such a grant is refused.
    if let Some(second) = heap.grow_heap(32) {
      assert_eq!(unsafe { first.add(16) }, second);
    }
  }

  #[test]
  fn test_arena_zero_grant() {
    let mut arena = ArenaHeap::new(0);
    assert!(arena.grow_heap(0).is_some());
    assert!(arena.grow_heap(8).is_none());
  }
}
