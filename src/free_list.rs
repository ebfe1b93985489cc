//! The explicit free list.
//!
//! Free blocks are threaded through their own payloads. Links are 4-byte
//! offsets from the heap base; offset 0 is the sentinel, so a successor of 0
//! ends a forward walk and a predecessor of 0 means "first in the list".
//!
//! ```text
//!   sentinel ──succ──▶ A ──succ──▶ B ──succ──▶ 0
//!       ▲              │           │
//!       └─────prev─────┘◀───prev───┘
//! ```

use crate::allocator::{Allocator, SENTINEL};
use crate::block::{self, BlockInfo};
use crate::heap::HeapGrower;

impl<H: HeapGrower> Allocator<H> {
  /// First free block of at least `size` bytes, in list order.
  pub(crate) fn find_fit(
    &self,
    size: usize,
  ) -> Option<usize> {
    let mut block = self.succ(SENTINEL);

    while block != SENTINEL {
      if self.block_size(block) >= size {
        return Some(block);
      }
      block = self.succ(block);
    }

    None
  }

  /// Pushes `block` right after the sentinel.
  pub(crate) fn insert_free(
    &mut self,
    block: usize,
  ) {
    let head = self.succ(SENTINEL);

    self.set_prev(block, SENTINEL);
    self.set_succ(block, head);
    self.set_succ(SENTINEL, block);

    if head != SENTINEL {
      self.set_prev(head, block);
    }
  }

  /// Splices `block` out of the list using its own links.
  pub(crate) fn remove_free(
    &mut self,
    block: usize,
  ) {
    let prev = self.prev(block);
    let succ = self.succ(block);

    self.set_succ(prev, succ);

    if succ != SENTINEL {
      self.set_prev(succ, prev);
    }
  }

  /// Walks the free list from the sentinel.
  ///
  /// The walk trusts the links; use [`check_heap`](Self::check_heap) first
  /// on a heap that may be corrupted.
  pub fn free_blocks(&self) -> FreeBlocks<'_, H> {
    let next = if self.is_initialized() {
      self.succ(SENTINEL)
    } else {
      SENTINEL
    };

    FreeBlocks {
      allocator: self,
      next,
    }
  }

  pub(crate) fn succ(
    &self,
    block: usize,
  ) -> usize {
    self.get(block::succ_link(block)) as usize
  }

  pub(crate) fn prev(
    &self,
    block: usize,
  ) -> usize {
    self.get(block::prev_link(block)) as usize
  }

  fn set_succ(
    &mut self,
    block: usize,
    succ: usize,
  ) {
    self.put(block::succ_link(block), succ as u32);
  }

  fn set_prev(
    &mut self,
    block: usize,
    prev: usize,
  ) {
    self.put(block::prev_link(block), prev as u32);
  }
}

/// Iterator returned by [`Allocator::free_blocks`].
pub struct FreeBlocks<'a, H: HeapGrower> {
  allocator: &'a Allocator<H>,
  next: usize,
}

impl<H: HeapGrower> Iterator for FreeBlocks<'_, H> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<Self::Item> {
    if self.next == SENTINEL {
      return None;
    }

    let payload = self.next;
    self.next = self.allocator.succ(payload);

    Some(BlockInfo::new(
      payload,
      self.allocator.block_size(payload),
      self.allocator.is_allocated(payload),
    ))
  }
}
