//! Boundary-tag encoding.
//!
//! ```text
//!   Allocated block                 Free block
//!   ┌──────────────┐ ← header       ┌──────────────┐ ← header
//!   │ size | 1     │   (4 bytes)    │ size | 0     │
//!   ├──────────────┤ ← payload      ├──────────────┤ ← payload
//!   │              │                │ succ offset  │
//!   │   caller     │                │ prev offset  │
//!   │   bytes      │                │   unused     │
//!   ├──────────────┤                ├──────────────┤
//!   │ size | 1     │ ← footer       │ size | 0     │ ← footer
//!   └──────────────┘                └──────────────┘
//! ```
//!
//! Blocks are addressed by the offset of their payload from the heap base.

/// Word size: one boundary tag or one free-list link.
pub const WSIZE: usize = 4;

/// Double word: header plus footer overhead of every block.
pub const DSIZE: usize = 8;

/// Smallest block that can hold a header, a footer and both list links.
pub const MIN_BLOCK_SIZE: usize = 16;

const ALLOC_BIT: u32 = 0x1;
const SIZE_MASK: u32 = !0x7;

/// Packs a block size and its allocated bit into one tag word.
pub fn pack(
  size: u32,
  allocated: bool,
) -> u32 {
  debug_assert_eq!(size & !SIZE_MASK, 0, "block size {size} is not 8-aligned");
  size | u32::from(allocated)
}

pub fn size(tag: u32) -> u32 {
  tag & SIZE_MASK
}

pub fn allocated(tag: u32) -> bool {
  tag & ALLOC_BIT != 0
}

/// Offset of the header of the block whose payload starts at `payload`.
pub fn header(payload: usize) -> usize {
  payload - WSIZE
}

/// Offset of the footer of a block of `size` bytes.
pub fn footer(
  payload: usize,
  size: usize,
) -> usize {
  payload + size - DSIZE
}

/// Offset of the footer belonging to the block just before `payload`.
pub fn prev_footer(payload: usize) -> usize {
  payload - DSIZE
}

/// Offset of the successor link inside a free block.
pub fn succ_link(payload: usize) -> usize {
  payload
}

/// Offset of the predecessor link inside a free block.
pub fn prev_link(payload: usize) -> usize {
  payload + WSIZE
}

/// A decoded view of one block, as reported by the heap walkers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Payload offset from the heap base.
  pub payload: usize,
  /// Whole block size, header and footer included.
  pub size: usize,
  pub allocated: bool,
}

impl BlockInfo {
  pub fn new(
    payload: usize,
    size: usize,
    allocated: bool,
  ) -> Self {
    Self {
      payload,
      size,
      allocated,
    }
  }

  /// Bytes available to the caller.
  pub fn usable(&self) -> usize {
    self.size - DSIZE
  }
}
