use std::{mem, ptr::NonNull};

use crate::align::ALIGNMENT;

/// Header stored immediately before every payload.
///
/// ```text
///   ┌───────────────────────┬────────────────────────────────┐
///   │    Block Header       │         Payload                │
///   │  size, is_free, next  │      `size` bytes              │
///   └───────────────────────┴────────────────────────────────┘
///                           ▲
///                           └── Pointer returned to the caller
/// ```
#[repr(C, align(8))]
pub struct Block {
  pub size: usize,
  pub is_free: bool,
  pub next: *mut Block,
}

pub const HEADER_SIZE: usize = mem::size_of::<Block>();

/// Smallest footprint worth carving off as a separate free block.
pub const MIN_SPLIT: usize = HEADER_SIZE + ALIGNMENT;

const _: () = assert!(HEADER_SIZE % ALIGNMENT == 0);
const _: () = assert!(mem::align_of::<Block>() == ALIGNMENT);

impl Block {
  pub fn new(
    size: usize,
    is_free: bool,
    next: *mut Block,
  ) -> Self {
    Self { size, is_free, next }
  }

  /// Writes a fresh header at `address` and returns it as a block pointer.
  ///
  /// # Safety
  ///
  /// `address` must be `ALIGNMENT`-aligned and valid for `HEADER_SIZE + size`
  /// bytes of writes.
  pub unsafe fn write(
    address: NonNull<u8>,
    size: usize,
    is_free: bool,
    next: *mut Block,
  ) -> *mut Block {
    let block = address.as_ptr() as *mut Block;
    unsafe { block.write(Block::new(size, is_free, next)) };
    block
  }

  /// Payload address of `block`.
  pub fn payload(block: *mut Block) -> *mut u8 {
    (block as *mut u8).wrapping_add(HEADER_SIZE)
  }

  /// Recovers the header from a payload address handed out earlier.
  pub fn from_payload(payload: *mut u8) -> *mut Block {
    payload.wrapping_sub(HEADER_SIZE) as *mut Block
  }

  /// Header plus payload.
  pub fn footprint(&self) -> usize {
    HEADER_SIZE + self.size
  }

  /// First address past this block's payload.
  ///
  /// # Safety
  ///
  /// `block` must point to a live header.
  pub unsafe fn end(block: *const Block) -> usize {
    block as usize + unsafe { (*block).footprint() }
  }

  /// True when `next` starts exactly where `block` ends.
  ///
  /// # Safety
  ///
  /// `block` must point to a live header.
  pub unsafe fn abuts(
    block: *const Block,
    next: *const Block,
  ) -> bool {
    !next.is_null() && unsafe { Block::end(block) } == next as usize
  }
}
