//! # tagalloc - A Boundary-Tag Memory Allocator
//!
//! This crate provides a general-purpose allocator with `allocate`,
//! `deallocate`, `reallocate` and `zero_allocate` over one contiguous heap
//! that only ever grows. Memory comes from a [`HeapGrower`]: the process data
//! segment via `sbrk` ([`SbrkHeap`]) or a fixed in-memory arena
//! ([`ArenaHeap`]).
//!
//! ## Overview
//!
//! Every block carries its size and an allocated bit twice, once in a header
//! before the payload and once in a footer after it:
//!
//! ```text
//!   ┌────────┬──────────────────────────────┬────────┐
//!   │ header │           payload            │ footer │
//!   │ size|a │                              │ size|a │
//!   └────────┴──────────────────────────────┴────────┘
//!            ▲
//!            └── pointer returned to the caller (8-byte aligned)
//! ```
//!
//! The footer lets a block find its left neighbour without any index, so a
//! freed block merges with free neighbours on both sides in constant time:
//!
//! ```text
//!   before free(B):   [ A free ][ B alloc ][ C free ]
//!   after  free(B):   [           A + B + C free     ]
//! ```
//!
//! Free blocks are additionally linked into one explicit free list through
//! their payloads. Allocation scans that list first-fit, splits off any
//! remainder of 16 bytes or more, and grows the heap only when nothing fits.
//!
//! ## Crate Structure
//!
//! ```text
//!   tagalloc
//!   ├── align      - Alignment macro (align!)
//!   ├── block      - Boundary-tag encoding
//!   ├── heap       - HeapGrower trait, ArenaHeap, SbrkHeap
//!   ├── free_list  - Explicit free list (insert, remove, first fit)
//!   ├── coalesce   - Merging with free neighbours
//!   ├── allocator  - Allocator: init, growth, allocate, free, realloc
//!   ├── check      - Heap walkers and consistency checker
//!   └── error      - InitError, HeapError
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagalloc::{Allocator, ArenaHeap};
//!
//! let mut allocator = Allocator::new(ArenaHeap::default());
//! allocator.init().unwrap();
//!
//! let ptr = allocator.allocate(24) as *mut u64;
//! assert!(!ptr.is_null());
//!
//! unsafe {
//!     *ptr = 42;
//!     assert_eq!(*ptr, 42);
//!     allocator.deallocate(ptr as *mut u8);
//! }
//!
//! allocator.check_heap(false).unwrap();
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: callers sharing an allocator across threads
//!   must serialize every call themselves
//! - **First fit**: no size classes, no best-fit search
//! - **Copying realloc**: blocks are never grown or shrunk in place
//! - **No misuse detection**: double frees and foreign pointers are
//!   undefined behaviour
//! - **4 GiB heap**: free-list links are 4-byte offsets
//!
//! ## Logging
//!
//! Heap growth, splitting and coalescing are reported through the [`log`]
//! facade at `debug` and `trace` level. No logger is installed by this crate.

pub mod align;
mod allocator;
pub mod block;
mod check;
mod coalesce;
mod error;
mod free_list;
mod heap;

/// Alignment of every payload and every block size: one double word.
pub const ALIGNMENT: usize = 8;

pub use allocator::{Allocator, CHUNK_SIZE};
pub use block::{BlockInfo, MIN_BLOCK_SIZE};
pub use check::Blocks;
pub use error::{HeapError, InitError};
pub use free_list::FreeBlocks;
pub use heap::{ArenaHeap, HeapGrower, MAX_HEAP, SbrkHeap};
