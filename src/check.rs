//! Heap walking and consistency checking.

use log::info;

use crate::ALIGNMENT;
use crate::allocator::{Allocator, FIRST_BLOCK, PROLOGUE, SENTINEL};
use crate::block::{self, BlockInfo, MIN_BLOCK_SIZE};
use crate::error::HeapError;
use crate::heap::HeapGrower;

impl<H: HeapGrower> Allocator<H> {
  /// Walks every block between the prologue and the epilogue, in address
  /// order.
  pub fn blocks(&self) -> Blocks<'_, H> {
    Blocks {
      allocator: self,
      next: self.is_initialized().then_some(FIRST_BLOCK),
    }
  }

  /// Verifies the heap invariants:
  ///
  /// - prologue and epilogue are intact;
  /// - every block is at least 16 bytes, inside the heap, and has matching
  ///   header and footer tags;
  /// - no two free blocks are adjacent;
  /// - the free list holds exactly the free blocks, each once, with
  ///   consistent back links.
  ///
  /// With `verbose` set, every block is logged at info level.
  pub fn check_heap(
    &self,
    verbose: bool,
  ) -> Result<(), HeapError> {
    if !self.is_initialized() {
      return Err(HeapError::NotInitialized);
    }

    let prologue = block::pack(ALIGNMENT as u32, true);
    for tag in [
      self.get(block::header(PROLOGUE)),
      self.get(block::footer(PROLOGUE, ALIGNMENT)),
    ] {
      if tag != prologue {
        return Err(HeapError::BadPrologue { tag });
      }
    }

    let free = self.check_blocks(verbose)?;
    self.check_free_list(&free)?;

    if verbose {
      info!(
        "heap ok: {} bytes, {} free blocks",
        self.heap_size(),
        free.len()
      );
    }

    Ok(())
  }

  /// Returns the payload offsets of all free blocks, in address order.
  fn check_blocks(
    &self,
    verbose: bool,
  ) -> Result<Vec<usize>, HeapError> {
    let mut free = Vec::new();
    let mut payload = FIRST_BLOCK;
    let mut prev_free = false;

    loop {
      let header = self.get(block::header(payload));
      let size = block::size(header) as usize;

      if size == 0 {
        if !block::allocated(header) || payload != self.heap_size() {
          return Err(HeapError::BadEpilogue {
            offset: payload,
            tag: header,
          });
        }
        return Ok(free);
      }

      if size < MIN_BLOCK_SIZE {
        return Err(HeapError::BadSize {
          offset: payload,
          size,
        });
      }
      if payload + size > self.heap_size() {
        return Err(HeapError::OutOfBounds { offset: payload });
      }

      let footer = self.get(block::footer(payload, size));
      if header != footer {
        return Err(HeapError::TagMismatch {
          offset: payload,
          header,
          footer,
        });
      }

      let allocated = block::allocated(header);
      if verbose {
        info!(
          "{:#010x}: {:>8} bytes {}",
          payload,
          size,
          if allocated { "allocated" } else { "free" }
        );
      }

      if !allocated {
        if prev_free {
          return Err(HeapError::AdjacentFree {
            offset: payload - block::size(self.get(block::prev_footer(payload))) as usize,
            next: payload,
          });
        }
        free.push(payload);
      }

      prev_free = !allocated;
      payload += size;
    }
  }

  fn check_free_list(
    &self,
    free: &[usize],
  ) -> Result<(), HeapError> {
    let mut seen = vec![false; free.len()];
    let mut prev = SENTINEL;
    let mut current = self.succ(SENTINEL);

    while current != SENTINEL {
      if current < FIRST_BLOCK || current + MIN_BLOCK_SIZE > self.heap_size() {
        return Err(HeapError::OutOfBounds { offset: current });
      }

      let Ok(index) = free.binary_search(&current) else {
        return Err(HeapError::NotFree { offset: current });
      };
      if seen[index] {
        return Err(HeapError::Cycle);
      }
      seen[index] = true;

      let back = self.prev(current);
      if back != prev {
        return Err(HeapError::BrokenLink {
          offset: current,
          expected: prev,
          found: back,
        });
      }

      prev = current;
      current = self.succ(current);
    }

    match seen.iter().position(|&listed| !listed) {
      Some(index) => Err(HeapError::NotInFreeList {
        offset: free[index],
      }),
      None => Ok(()),
    }
  }
}

/// Iterator returned by [`Allocator::blocks`].
pub struct Blocks<'a, H: HeapGrower> {
  allocator: &'a Allocator<H>,
  next: Option<usize>,
}

impl<H: HeapGrower> Iterator for Blocks<'_, H> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<Self::Item> {
    let payload = self.next?;
    let size = self.allocator.block_size(payload);

    if size == 0 {
      self.next = None;
      return None;
    }

    self.next = Some(payload + size);

    Some(BlockInfo::new(
      payload,
      size,
      self.allocator.is_allocated(payload),
    ))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::heap::ArenaHeap;

  fn allocator() -> Allocator<ArenaHeap> {
    let mut allocator = Allocator::new(ArenaHeap::new(4096));
    allocator.init().unwrap();
    allocator
  }

  #[test]
  fn test_not_initialized() {
    let allocator = Allocator::new(ArenaHeap::new(4096));
    assert_eq!(allocator.check_heap(false), Err(HeapError::NotInitialized));
    assert_eq!(allocator.blocks().count(), 0);
  }

  #[test]
  fn test_blocks_in_address_order() {
    let mut allocator = allocator();
    allocator.allocate(24);
    allocator.allocate(40);

    assert_eq!(
      allocator.blocks().collect::<Vec<_>>(),
      vec![
        BlockInfo::new(16, 32, true),
        BlockInfo::new(48, 48, true),
        BlockInfo::new(96, 48, false),
      ]
    );
  }

  #[test]
  fn test_detects_damaged_prologue() {
    let mut allocator = allocator();
    allocator.put(block::header(PROLOGUE), 0);

    assert_eq!(
      allocator.check_heap(false),
      Err(HeapError::BadPrologue { tag: 0 })
    );
  }

  #[test]
  fn test_detects_tag_mismatch() {
    let mut allocator = allocator();
    let address = allocator.allocate(24);
    let payload = allocator.offset(address);
    allocator.put(block::footer(payload, 32), block::pack(32, false));

    assert_eq!(
      allocator.check_heap(false),
      Err(HeapError::TagMismatch {
        offset: payload,
        header: block::pack(32, true),
        footer: block::pack(32, false),
      })
    );
  }

  #[test]
  fn test_detects_uncoalesced_neighbours() {
    let mut allocator = allocator();
    let address = allocator.allocate(24);
    let payload = allocator.offset(address);

    // Mark the block free behind the allocator's back, list and all.
    allocator.write_tags(payload, 32, false);
    allocator.insert_free(payload);

    assert_eq!(
      allocator.check_heap(false),
      Err(HeapError::AdjacentFree {
        offset: payload,
        next: payload + 32,
      })
    );
  }

  #[test]
  fn test_detects_free_block_missing_from_list() {
    let mut allocator = allocator();
    let rest = allocator.free_blocks().next().unwrap().payload;
    allocator.remove_free(rest);

    assert_eq!(
      allocator.check_heap(false),
      Err(HeapError::NotInFreeList { offset: rest })
    );
  }

  #[test]
  fn test_detects_allocated_block_in_list() {
    let mut allocator = allocator();
    let address = allocator.allocate(24);
    allocator.insert_free(allocator.offset(address));

    assert_eq!(
      allocator.check_heap(false),
      Err(HeapError::NotFree {
        offset: allocator.offset(address)
      })
    );
  }

  #[test]
  fn test_detects_broken_back_link() {
    let mut allocator = allocator();
    let first = allocator.allocate(24);
    allocator.allocate(8);
    unsafe { allocator.deallocate(first) };
    let [head, tail] = [0, 1].map(|i| allocator.free_blocks().nth(i).unwrap().payload);

    allocator.put(block::prev_link(tail), 0);

    assert_eq!(
      allocator.check_heap(false),
      Err(HeapError::BrokenLink {
        offset: tail,
        expected: head,
        found: 0,
      })
    );
  }

  #[test]
  fn test_detects_cycle() {
    let mut allocator = allocator();
    let rest = allocator.free_blocks().next().unwrap().payload;
    allocator.put(block::succ_link(rest), rest as u32);
    allocator.put(block::prev_link(rest), 0);

    assert_eq!(allocator.check_heap(false), Err(HeapError::Cycle));
  }

  #[test]
  fn test_detects_damaged_epilogue() {
    let mut allocator = allocator();
    let end = allocator.heap_size();
    allocator.put(block::header(end), block::pack(0, false));

    assert_eq!(
      allocator.check_heap(false),
      Err(HeapError::BadEpilogue {
        offset: end,
        tag: 0,
      })
    );
  }

  #[test]
  fn test_detects_undersized_block() {
    let mut allocator = allocator();
    let address = allocator.allocate(24);
    let payload = allocator.offset(address);
    allocator.put(block::header(payload), block::pack(8, true));

    assert_eq!(
      allocator.check_heap(false),
      Err(HeapError::BadSize {
        offset: payload,
        size: 8,
      })
    );
  }

  #[test]
  fn test_detects_block_past_heap_end() {
    let mut allocator = allocator();
    let end = allocator.heap_size();
    allocator.put(block::header(FIRST_BLOCK), block::pack(end as u32, false));

    assert_eq!(
      allocator.check_heap(false),
      Err(HeapError::OutOfBounds {
        offset: FIRST_BLOCK
      })
    );
  }

  #[test]
  fn test_payload_addresses_are_aligned() {
    let mut allocator = allocator();
    for size in [1, 7, 24, 33, 100] {
      allocator.allocate(size);
    }

    for block in allocator.blocks() {
      assert_eq!(allocator.pointer(block.payload) as usize % ALIGNMENT, 0);
    }
    allocator.check_heap(false).unwrap();
  }

  #[test]
  fn test_verbose_check_passes() {
    let mut allocator = allocator();
    allocator.allocate(100);
    assert_eq!(allocator.check_heap(true), Ok(()));
  }
}
