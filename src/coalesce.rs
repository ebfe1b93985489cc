use log::trace;

use crate::allocator::Allocator;
use crate::heap::HeapGrower;

impl<H: HeapGrower> Allocator<H> {
  /// Merges the free block at `payload` with whichever neighbours are free
  /// and returns the payload of the resulting block, which is always on the
  /// free list afterwards.
  ///
  /// `payload` must already carry free tags and must not be on the list.
  /// The prologue and epilogue are permanently allocated, so both neighbour
  /// lookups stay inside the heap.
  pub(crate) fn coalesce(
    &mut self,
    payload: usize,
  ) -> usize {
    let prev = self.prev_block(payload);
    let next = self.next_block(payload);
    let size = self.block_size(payload);

    match (self.is_allocated(prev), self.is_allocated(next)) {
      (true, true) => {
        self.insert_free(payload);
        payload
      }
      (true, false) => {
        trace!("coalesce {:#x} with next {:#x}", payload, next);
        self.remove_free(next);
        self.write_tags(payload, size + self.block_size(next), false);
        self.insert_free(payload);
        payload
      }
      (false, true) => {
        // `prev` keeps its place in the list.
        trace!("coalesce {:#x} with prev {:#x}", payload, prev);
        self.write_tags(prev, size + self.block_size(prev), false);
        prev
      }
      (false, false) => {
        trace!("coalesce {:#x} with prev {:#x} and next {:#x}", payload, prev, next);
        self.remove_free(next);
        let merged = self.block_size(prev) + size + self.block_size(next);
        self.write_tags(prev, merged, false);
        prev
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::allocator::{Allocator, CHUNK_SIZE, FIRST_BLOCK};
  use crate::block::BlockInfo;
  use crate::heap::ArenaHeap;

  /// Three adjacent 32-byte blocks at the start of the heap, a 16-byte guard
  /// after them, and the rest of the chunk free.
  fn three_blocks() -> (Allocator<ArenaHeap>, [*mut u8; 3]) {
    let mut allocator = Allocator::new(ArenaHeap::new(4096));
    allocator.init().unwrap();
    let blocks = [(); 3].map(|_| allocator.allocate(24));
    allocator.allocate(8);
    (allocator, blocks)
  }

  fn free(allocator: &Allocator<ArenaHeap>) -> Vec<BlockInfo> {
    allocator.free_blocks().collect()
  }

  #[test]
  fn test_no_free_neighbours() {
    let (mut allocator, [_, middle, _]) = three_blocks();

    unsafe { allocator.deallocate(middle) };

    assert_eq!(free(&allocator)[0], BlockInfo::new(FIRST_BLOCK + 32, 32, false));
    allocator.check_heap(false).unwrap();
  }

  #[test]
  fn test_free_next_only() {
    let (mut allocator, [first, middle, _]) = three_blocks();

    unsafe {
      allocator.deallocate(middle);
      allocator.deallocate(first);
    }

    assert_eq!(free(&allocator)[0], BlockInfo::new(FIRST_BLOCK, 64, false));
    assert_eq!(free(&allocator).len(), 2);
    allocator.check_heap(false).unwrap();
  }

  #[test]
  fn test_free_prev_only() {
    let (mut allocator, [first, middle, _]) = three_blocks();

    unsafe { allocator.deallocate(first) };
    let before = free(&allocator).len();
    unsafe { allocator.deallocate(middle) };

    // The merged block stays where the previous one was in the list.
    assert_eq!(free(&allocator).len(), before);
    assert!(free(&allocator).contains(&BlockInfo::new(FIRST_BLOCK, 64, false)));
    allocator.check_heap(false).unwrap();
  }

  #[test]
  fn test_free_both() {
    let (mut allocator, [first, middle, last]) = three_blocks();

    unsafe {
      allocator.deallocate(first);
      allocator.deallocate(last);
      allocator.deallocate(middle);
    }

    assert!(free(&allocator).contains(&BlockInfo::new(FIRST_BLOCK, 96, false)));
    assert_eq!(free(&allocator).len(), 2);
    allocator.check_heap(false).unwrap();
  }

  #[test]
  fn test_last_block_merges_into_trailing_space() {
    let mut allocator = Allocator::new(ArenaHeap::new(4096));
    allocator.init().unwrap();
    let only = allocator.allocate(24);

    unsafe { allocator.deallocate(only) };

    assert_eq!(free(&allocator), vec![BlockInfo::new(FIRST_BLOCK, CHUNK_SIZE, false)]);
  }
}
