use std::io::Read;

use dmalloc::{HEADER_SIZE, Heap, SbrkGrower};

/// Waits until the user presses ENTER when `--step` is passed.
/// Useful for inspecting the process with `pmap` or `gdb` between steps.
fn pause(step: bool) {
  if step {
    println!("\n>>> Press ENTER to continue...");
    let _ = std::io::stdin().bytes().next();
  }
}

fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    SbrkGrower::program_break(),
  );
}

fn main() {
  env_logger::init();

  let step = std::env::args().any(|arg| arg == "--step");
  let mut heap = Heap::<SbrkGrower>::default();

  println!("BLOCK HEADER SIZE : {} bytes", HEADER_SIZE);
  print_program_break("start");

  let a = heap.allocate(64).ok();
  let b = heap.allocate(128).ok();
  let c = heap.allocate(64).ok();

  println!("\nAfter 3 allocations (64, 128, 64):");
  print!("{}", heap.dump());
  pause(step);

  println!("\nFreeing middle block (b = 128):");
  unsafe { heap.release(b) };
  print!("{}", heap.dump());
  pause(step);

  println!("\nAllocating 52 bytes:");
  let d = heap.allocate(52).ok();
  print!("{}", heap.dump());
  pause(step);

  println!("\nAllocating 16 bytes:");
  let e = heap.allocate(16).ok();
  print!("{}", heap.dump());
  pause(step);

  println!("\nGrowing the 16 byte block to 256 bytes:");
  let e = unsafe { heap.reallocate(e, 256) }.ok().flatten();
  print!("{}", heap.dump());
  pause(step);

  println!("\nFree all blocks:");
  unsafe {
    heap.release(a);
    heap.release(c);
    heap.release(d);
    heap.release(e);
  }
  print!("{}", heap.dump());

  print_program_break("end");
}
