use std::{marker::PhantomData, ptr::{self, NonNull}};

use crate::block::Block;

/// Address-ordered, singly linked chain of every block carved out of the
/// region. The links live inside the managed memory itself.
///
/// ```text
///   head
///    │
///    ▼
///   ┌────────┬─────────┐   ┌────────┬─────────┐   ┌────────┬─────────┐
///   │ header │ payload │──▶│ header │ payload │──▶│ header │ payload │──▶ null
///   └────────┴─────────┘   └────────┴─────────┘   └────────┴─────────┘
/// ```
pub struct BlockList {
  pub(crate) head: *mut Block,
}

impl BlockList {
  pub const fn new() -> Self {
    Self { head: ptr::null_mut() }
  }

  pub fn is_empty(&self) -> bool {
    self.head.is_null()
  }

  /// Wraps freshly grown memory in a used block of `size` payload bytes and
  /// links it at the tail.
  ///
  /// # Safety
  ///
  /// `memory` must come straight from the region growth primitive, be valid
  /// for `HEADER_SIZE + size` bytes and lie above every block already listed.
  pub unsafe fn append(
    &mut self,
    memory: NonNull<u8>,
    size: usize,
  ) -> *mut Block {
    unsafe {
      let block = Block::write(memory, size, false, ptr::null_mut());

      if self.head.is_null() {
        self.head = block;
        return block;
      }

      let mut current = self.head;
      while !(*current).next.is_null() {
        current = (*current).next;
      }
      (*current).next = block;

      block
    }
  }

  pub fn iter(&self) -> Blocks<'_> {
    Blocks {
      current: self.head,
      _list: PhantomData,
    }
  }
}

impl Default for BlockList {
  fn default() -> Self {
    Self::new()
  }
}

/// Snapshot of one block, as seen by diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Address of the header.
  pub address: NonNull<u8>,
  pub payload_size: usize,
  pub is_free: bool,
  /// Address handed to callers.
  pub payload: NonNull<u8>,
}

impl BlockInfo {
  /// Header plus payload.
  pub fn footprint(&self) -> usize {
    self.payload.as_ptr() as usize - self.address.as_ptr() as usize + self.payload_size
  }
}

/// Read-only walk over a [`BlockList`] in address order.
pub struct Blocks<'a> {
  current: *mut Block,
  _list: PhantomData<&'a BlockList>,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    let block = NonNull::new(self.current)?;

    let header = unsafe { block.as_ref() };
    self.current = header.next;

    Some(BlockInfo {
      address: block.cast(),
      payload_size: header.size,
      is_free: header.is_free,
      payload: unsafe { NonNull::new_unchecked(Block::payload(block.as_ptr())) },
    })
  }
}
