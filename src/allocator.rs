use std::ptr;

use log::{debug, trace, warn};

use crate::ALIGNMENT;
use crate::block::{self, DSIZE, MIN_BLOCK_SIZE, WSIZE};
use crate::error::InitError;
use crate::heap::HeapGrower;

/// Default growth quantum in bytes.
pub const CHUNK_SIZE: usize = 1 << 7;

/// Offset of the free-list sentinel: the very first word of the heap.
pub(crate) const SENTINEL: usize = 0;

/// Payload offset of the prologue block.
pub(crate) const PROLOGUE: usize = 2 * WSIZE;

/// Payload offset of the first real block.
pub(crate) const FIRST_BLOCK: usize = 4 * WSIZE;

/// Links are 4-byte offsets, so the heap can never span more than this.
const MAX_HEAP_SPAN: usize = u32::MAX as usize & !(ALIGNMENT - 1);

/// A boundary-tag allocator with an explicit LIFO free list, drawing memory
/// from a [`HeapGrower`].
///
/// ```text
///   base
///   ▼
///   ┌──────┬──────┬──────┬─────────────── ─ ─ ──────────┬──────┐
///   │ succ │ 8|1  │ 8|1  │  blocks ...                  │ 0|1  │
///   └──────┴──────┴──────┴─────────────── ─ ─ ──────────┴──────┘
///   sentinel  prologue     first block at base + 16      epilogue
/// ```
///
/// Only the sentinel's successor word is ever written; the word that would
/// hold its predecessor link doubles as the prologue header.
pub struct Allocator<H: HeapGrower> {
  heap: H,
  base: *mut u8,
  size: usize,
  chunk_size: usize,
}

impl<H: HeapGrower> Allocator<H> {
  /// Creates an allocator that grows `heap` by [`CHUNK_SIZE`] at a time.
  ///
  /// No memory is requested until [`init`](Self::init) or the first
  /// allocation.
  pub fn new(heap: H) -> Self {
    Self::with_chunk_size(heap, CHUNK_SIZE)
  }

  /// Creates an allocator with a custom growth quantum, rounded up to a
  /// multiple of 8 and to at least one minimum block.
  pub fn with_chunk_size(
    heap: H,
    chunk_size: usize,
  ) -> Self {
    let chunk_size = crate::align!(chunk_size.min(MAX_HEAP_SPAN)).max(MIN_BLOCK_SIZE);

    Self {
      heap,
      base: ptr::null_mut(),
      size: 0,
      chunk_size,
    }
  }

  /// Lays down the sentinel, prologue and epilogue, then grows the heap by
  /// one chunk.
  pub fn init(&mut self) -> Result<(), InitError> {
    if self.is_initialized() {
      return Err(InitError::AlreadyInitialized);
    }

    let requested = 4 * WSIZE;
    let base = self
      .heap
      .grow_heap(requested)
      .ok_or(InitError::OutOfMemory { requested })?
      .as_ptr();

    if base as usize % ALIGNMENT != 0 {
      return Err(InitError::Misaligned {
        address: base as usize,
      });
    }

    self.base = base;
    self.size = requested;

    self.put(SENTINEL, 0);
    self.put(block::header(PROLOGUE), block::pack(ALIGNMENT as u32, true));
    self.put(block::footer(PROLOGUE, ALIGNMENT), block::pack(ALIGNMENT as u32, true));
    self.put(block::header(FIRST_BLOCK), block::pack(0, true));

    debug!("heap initialized at {:?}", base);

    if self.extend_heap(self.chunk_size / WSIZE).is_none() {
      self.base = ptr::null_mut();
      self.size = 0;
      return Err(InitError::OutOfMemory {
        requested: self.chunk_size,
      });
    }

    Ok(())
  }

  pub fn is_initialized(&self) -> bool {
    !self.base.is_null()
  }

  /// Bytes granted by the heap backend so far.
  pub fn heap_size(&self) -> usize {
    self.size
  }

  pub fn chunk_size(&self) -> usize {
    self.chunk_size
  }

  pub fn heap(&self) -> &H {
    &self.heap
  }

  /// Allocates at least `size` bytes, 8-byte aligned.
  ///
  /// Returns null when `size` is zero or the heap cannot grow enough. An
  /// allocator that was never initialized is initialized first.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    if size == 0 {
      return ptr::null_mut();
    }

    if !self.is_initialized() {
      if let Err(err) = self.init() {
        warn!("lazy heap initialization failed: {}", err);
        return ptr::null_mut();
      }
    }

    let Some(asize) = adjusted_size(size) else {
      warn!("allocation of {} bytes exceeds the heap span", size);
      return ptr::null_mut();
    };

    let payload = match self.find_fit(asize) {
      Some(payload) => payload,
      None => {
        let extend = asize.max(self.chunk_size);
        match self.extend_heap(extend / WSIZE) {
          Some(payload) => payload,
          None => return ptr::null_mut(),
        }
      }
    };

    self.place(payload, asize);
    trace!("allocate({}) -> {:#x} ({} byte block)", size, payload, asize);

    self.pointer(payload)
  }

  /// Returns a block to the heap, merging it with free neighbours.
  ///
  /// # Safety
  ///
  /// `address` must be null or a live pointer returned by this allocator.
  pub unsafe fn deallocate(
    &mut self,
    address: *mut u8,
  ) {
    if address.is_null() {
      return;
    }

    let payload = self.offset(address);
    let size = self.block_size(payload);
    self.write_tags(payload, size, false);
    trace!("deallocate({:#x}) ({} byte block)", payload, size);

    self.coalesce(payload);
  }

  /// Moves an allocation into a fresh block of `size` bytes.
  ///
  /// A zero `size` frees `address` and returns null; a null `address`
  /// behaves like [`allocate`](Self::allocate). When no new block can be
  /// found the old one is left untouched and null is returned.
  ///
  /// # Safety
  ///
  /// `address` must be null or a live pointer returned by this allocator.
  /// On success it must no longer be used.
  pub unsafe fn reallocate(
    &mut self,
    address: *mut u8,
    size: usize,
  ) -> *mut u8 {
    unsafe {
      if size == 0 {
        self.deallocate(address);
        return ptr::null_mut();
      }

      if address.is_null() {
        return self.allocate(size);
      }

      let moved = self.allocate(size);
      if moved.is_null() {
        debug!("reallocate to {} bytes failed, keeping {:?}", size, address);
        return ptr::null_mut();
      }

      let count = self.usable_size(address).min(size);
      ptr::copy_nonoverlapping(address, moved, count);
      self.deallocate(address);

      moved
    }
  }

  /// Allocates room for `count` elements of `size` bytes, all zeroed.
  ///
  /// Returns null if `count * size` overflows or is zero.
  pub fn zero_allocate(
    &mut self,
    count: usize,
    size: usize,
  ) -> *mut u8 {
    let Some(bytes) = count.checked_mul(size) else {
      warn!("zero_allocate({}, {}) overflows", count, size);
      return ptr::null_mut();
    };

    let address = self.allocate(bytes);
    if !address.is_null() {
      // SAFETY: the block just allocated holds at least `bytes` bytes.
      unsafe { ptr::write_bytes(address, 0, bytes) };
    }

    address
  }

  /// Bytes the caller may use behind `address`; 0 for null.
  ///
  /// # Safety
  ///
  /// `address` must be null or a live pointer returned by this allocator.
  pub unsafe fn usable_size(
    &self,
    address: *mut u8,
  ) -> usize {
    if address.is_null() {
      return 0;
    }

    self.block_size(self.offset(address)) - DSIZE
  }

  /// Grows the heap by `words` words (rounded up to an even count) and
  /// returns the resulting free block after coalescing.
  pub(crate) fn extend_heap(
    &mut self,
    words: usize,
  ) -> Option<usize> {
    let words = if words % 2 == 1 { words + 1 } else { words };
    let bytes = words.checked_mul(WSIZE)?;

    if self.size.checked_add(bytes)? > MAX_HEAP_SPAN {
      warn!("extending by {} bytes would exceed the heap span", bytes);
      return None;
    }

    let Some(granted) = self.heap.grow_heap(bytes) else {
      warn!("heap backend refused to grow by {} bytes", bytes);
      return None;
    };

    let payload = (granted.as_ptr() as usize).wrapping_sub(self.base as usize);
    if payload != self.size {
      warn!("heap backend returned a region that does not continue the heap");
      return None;
    }

    self.size += bytes;

    // The old epilogue becomes the new block's header.
    self.write_tags(payload, bytes, false);
    self.put(block::header(payload + bytes), block::pack(0, true));
    debug!("heap extended by {} bytes to {}", bytes, self.size);

    Some(self.coalesce(payload))
  }

  /// Carves `size` bytes out of the free block at `payload`, returning the
  /// remainder to the free list when it can stand on its own.
  pub(crate) fn place(
    &mut self,
    payload: usize,
    size: usize,
  ) {
    let block_size = self.block_size(payload);
    self.remove_free(payload);

    if block_size - size < MIN_BLOCK_SIZE {
      self.write_tags(payload, block_size, true);
      return;
    }

    self.write_tags(payload, size, true);

    let rest = payload + size;
    self.write_tags(rest, block_size - size, false);
    self.insert_free(rest);
    trace!("split {:#x}: {} + {}", payload, size, block_size - size);
  }

  pub(crate) fn get(
    &self,
    offset: usize,
  ) -> u32 {
    debug_assert!(offset + WSIZE <= self.size, "read at {offset:#x} past heap end");
    // SAFETY: offsets stay inside granted memory and are 4-aligned from an
    // 8-aligned base.
    unsafe { self.base.add(offset).cast::<u32>().read() }
  }

  pub(crate) fn put(
    &mut self,
    offset: usize,
    value: u32,
  ) {
    debug_assert!(offset + WSIZE <= self.size, "write at {offset:#x} past heap end");
    // SAFETY: see `get`.
    unsafe { self.base.add(offset).cast::<u32>().write(value) }
  }

  pub(crate) fn block_size(
    &self,
    payload: usize,
  ) -> usize {
    block::size(self.get(block::header(payload))) as usize
  }

  pub(crate) fn is_allocated(
    &self,
    payload: usize,
  ) -> bool {
    block::allocated(self.get(block::header(payload)))
  }

  pub(crate) fn write_tags(
    &mut self,
    payload: usize,
    size: usize,
    allocated: bool,
  ) {
    let tag = block::pack(size as u32, allocated);
    self.put(block::header(payload), tag);
    self.put(block::footer(payload, size), tag);
  }

  pub(crate) fn next_block(
    &self,
    payload: usize,
  ) -> usize {
    payload + self.block_size(payload)
  }

  pub(crate) fn prev_block(
    &self,
    payload: usize,
  ) -> usize {
    payload - block::size(self.get(block::prev_footer(payload))) as usize
  }

  pub(crate) fn pointer(
    &self,
    payload: usize,
  ) -> *mut u8 {
    // SAFETY: `payload` lies inside the granted heap.
    unsafe { self.base.add(payload) }
  }

  pub(crate) fn offset(
    &self,
    address: *mut u8,
  ) -> usize {
    address as usize - self.base as usize
  }
}

impl<H: HeapGrower + Default> Default for Allocator<H> {
  fn default() -> Self {
    Self::new(H::default())
  }
}

/// Block size needed for a `size`-byte request: payload plus header and
/// footer, 8-aligned, never below the minimum block.
fn adjusted_size(size: usize) -> Option<usize> {
  let padded = size.checked_add(DSIZE)?;
  if padded > MAX_HEAP_SPAN {
    return None;
  }

  Some(crate::align!(padded).max(MIN_BLOCK_SIZE))
}
