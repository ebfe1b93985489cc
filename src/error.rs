use thiserror::Error;

/// Why [`Allocator::init`](crate::Allocator::init) failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
  #[error("heap is already initialized")]
  AlreadyInitialized,
  #[error("heap backend refused to grow by {requested} bytes")]
  OutOfMemory { requested: usize },
  #[error("heap base {address:#x} is not 8-byte aligned")]
  Misaligned { address: usize },
}

/// An invariant violation found by [`Allocator::check_heap`](crate::Allocator::check_heap).
///
/// Offsets are payload offsets from the heap base.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
  #[error("heap is not initialized")]
  NotInitialized,
  #[error("prologue block is damaged (tag {tag:#x})")]
  BadPrologue { tag: u32 },
  #[error("epilogue at {offset:#x} is damaged (tag {tag:#x})")]
  BadEpilogue { offset: usize, tag: u32 },
  #[error("block at {offset:#x}: header {header:#x} does not match footer {footer:#x}")]
  TagMismatch {
    offset: usize,
    header: u32,
    footer: u32,
  },
  #[error("block at {offset:#x} has invalid size {size}")]
  BadSize { offset: usize, size: usize },
  #[error("block at {offset:#x} runs past the heap end")]
  OutOfBounds { offset: usize },
  #[error("free blocks at {offset:#x} and {next:#x} were not coalesced")]
  AdjacentFree { offset: usize, next: usize },
  #[error("free block at {offset:#x} is not in the free list")]
  NotInFreeList { offset: usize },
  #[error("free list entry at {offset:#x} is not a free block")]
  NotFree { offset: usize },
  #[error("free list entry at {offset:#x} has back link {found:#x}, expected {expected:#x}")]
  BrokenLink {
    offset: usize,
    expected: usize,
    found: usize,
  },
  #[error("free list loops back before reaching the sentinel")]
  Cycle,
}
