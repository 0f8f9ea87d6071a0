//! # dmalloc - A First-Fit Free-List Heap
//!
//! This crate replaces the `malloc` family (allocate, zero-allocate, resize,
//! release) with a heap that manages one contiguous, growable region on its
//! own. By default the region is the program data segment, extended with the
//! `sbrk` system call.
//!
//! ## Overview
//!
//! Every chunk handed out is prefixed by a small header. The headers form a
//! singly linked list in address order, stored inside the managed memory:
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                         HEAP REGION                                  │
//!   │                                                                      │
//!   │   ┌───┬──────┬───┬──────────┬───┬──────┬───┬────────┐                │
//!   │   │ H │ used │ H │   free   │ H │ used │ H │  free  │                │
//!   │   └───┴──────┴───┴──────────┴───┴──────┴───┴────────┘                │
//!   │     │          ▲ │            ▲ │        ▲             ▲             │
//!   │     └──────────┘ └────────────┘ └────────┘             │             │
//!   │        next          next          next             Program          │
//!   │                                                      Break           │
//!   └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! * **Allocation** scans the list from the head and takes the first free
//!   block large enough (first-fit). A block with room to spare is split and
//!   the remainder stays on the list as a new free block. Only when nothing
//!   fits is the region grown by one header plus the aligned payload.
//! * **Release** marks the block free and then merges every run of adjacent
//!   free blocks in a single pass over the list.
//! * **Resize** shrinks in place, grows in place over a free successor, and
//!   otherwise moves the contents to a fresh block.
//!
//! ## Crate Structure
//!
//! ```text
//!   dmalloc
//!   ├── align      - ALIGNMENT and the align! macro
//!   ├── block      - Block header and header/payload conversions (internal)
//!   ├── coalesce   - merging of adjacent free blocks (internal)
//!   ├── dump       - printable heap state
//!   ├── error      - AllocError
//!   ├── grow       - Grower trait, SbrkGrower, ArenaGrower
//!   ├── heap       - Heap: allocate, zero_allocate, reallocate, release
//!   ├── list       - BlockList and its read-only traversal
//!   └── placement  - first-fit search and splitting (internal)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use dmalloc::{ArenaGrower, Heap};
//!
//! let mut heap = Heap::new(ArenaGrower::new(4096).unwrap());
//!
//! let ptr = heap.allocate(64).unwrap();
//! unsafe {
//!   ptr.as_ptr().write_bytes(0x2A, 64);
//!
//!   let ptr = heap.reallocate(Some(ptr), 16).unwrap();
//!   heap.release(ptr);
//! }
//!
//! println!("{}", heap.dump());
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: `Heap` is neither `Send` nor `Sync`
//! - **No shrinking**: memory is never returned to the operating system
//! - **Fixed alignment**: payloads are aligned to 8 bytes, nothing more
//! - **Unchecked frees**: double frees and foreign pointers are not detected
//!
//! ## Safety
//!
//! `release` and `reallocate` trust that the pointer they are given came from
//! the same heap and is still live. Both are `unsafe` for that reason.

pub mod align;
mod block;
mod coalesce;
mod dump;
mod error;
mod grow;
mod heap;
mod list;
mod placement;

pub use block::HEADER_SIZE;
pub use dump::HeapDump;
pub use error::AllocError;
#[cfg(unix)]
pub use grow::SbrkGrower;
pub use grow::{ArenaGrower, Grower};
pub use heap::Heap;
pub use list::{BlockInfo, Blocks};
