use std::{io::Read, ptr};

use libc::sbrk;
use tagalloc::{Allocator, SbrkHeap};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap` or
/// `gdb`, or just watch how the program break moves.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn print_heap(allocator: &Allocator<SbrkHeap>) {
  println!("    heap: {} bytes", allocator.heap_size());
  for block in allocator.blocks() {
    println!(
      "    {:#06x} {:>6} bytes {}",
      block.payload,
      block.size,
      if block.allocated { "allocated" } else { "free" }
    );
  }
}

fn main() {
  env_logger::init();

  let mut allocator = Allocator::new(SbrkHeap::new());

  print_program_break("start");
  if let Err(err) = allocator.init() {
    eprintln!("cannot initialize heap: {err}");
    return;
  }
  print_program_break("after init");
  print_heap(&allocator);
  block_until_enter_pressed();

  // 1) Two small blocks carved out of the first chunk.
  let first = allocator.allocate(24);
  let second = allocator.allocate(24);
  println!("\n[1] allocate(24) twice: {:?}, {:?}", first, second);
  if first.is_null() || second.is_null() {
    eprintln!("heap refused to grow");
    return;
  }
  unsafe { ptr::write_bytes(first, 0xAB, 24) };
  print_heap(&allocator);
  block_until_enter_pressed();

  // 2) Free the first one and ask for something smaller: first fit reuses it.
  unsafe { allocator.deallocate(first) };
  let third = allocator.allocate(16);
  println!(
    "\n[2] allocate(16) after freeing the first block: {:?} (reused: {})",
    third,
    third == first
  );
  print_heap(&allocator);
  block_until_enter_pressed();

  // 3) Grow a block past what the heap holds: realloc copies into fresh space.
  let grown = unsafe { allocator.reallocate(third, 1000) };
  println!("\n[3] reallocate to 1000 bytes: {:?}", grown);
  print_program_break("after realloc");
  print_heap(&allocator);
  block_until_enter_pressed();

  // 4) Zeroed array.
  let zeroed = allocator.zero_allocate(5, 8);
  let all_zero = !zeroed.is_null() && (0..40).all(|i| unsafe { zeroed.add(i).read() } == 0);
  println!("\n[4] zero_allocate(5, 8): {:?}, all zero: {}", zeroed, all_zero);
  block_until_enter_pressed();

  // 5) Free everything: the heap collapses back into one free block.
  unsafe {
    allocator.deallocate(second);
    allocator.deallocate(grown);
    allocator.deallocate(zeroed);
  }
  println!("\n[5] everything freed");
  print_heap(&allocator);

  match allocator.check_heap(true) {
    Ok(()) => println!("    heap is consistent"),
    Err(err) => println!("    heap is corrupted: {err}"),
  }
}
