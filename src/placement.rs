//! First-fit search and block splitting.

use std::ptr::{self, NonNull};

use log::trace;

use crate::{
  align::ALIGNMENT,
  block::{Block, HEADER_SIZE, MIN_SPLIT},
  list::BlockList,
};

impl BlockList {
  /// Returns the first free block, in address order, that can hold `size`
  /// bytes, or null when the region has to grow.
  ///
  /// A block large enough to leave a usable remainder is split; the returned
  /// block is then already marked used. Exact and near fits are returned
  /// untouched and still marked free.
  ///
  /// `size` must already be aligned.
  pub fn find_free(
    &mut self,
    size: usize,
  ) -> *mut Block {
    let mut current = self.head;

    unsafe {
      while !current.is_null() {
        let block = &*current;

        if block.is_free {
          if block.size == size {
            trace!("perfect fit for {} bytes at {:?}", size, current);
            return current;
          }

          if block.size >= size.saturating_add(HEADER_SIZE + ALIGNMENT) {
            return self.split_block(current, size);
          }

          if block.size >= size {
            trace!(
              "using {} byte block at {:?} for {} bytes without splitting",
              block.size, current, size
            );
            return current;
          }
        }

        current = block.next;
      }
    }

    ptr::null_mut()
  }

  /// Shrinks `block` to `size` (aligned) and turns the rest into a new free
  /// block right after it. If the remainder would be too small to be useful
  /// the whole block is kept. Either way the block is marked used.
  ///
  /// # Safety
  ///
  /// `block` must be a live block of this list.
  pub unsafe fn split_block(
    &mut self,
    block: *mut Block,
    size: usize,
  ) -> *mut Block {
    unsafe {
      let aligned = crate::align::checked_align(size).unwrap_or(usize::MAX);
      let leftover = (*block)
        .size
        .checked_sub(aligned)
        .and_then(|rest| rest.checked_sub(HEADER_SIZE));

      let leftover = match leftover {
        Some(leftover) if leftover > MIN_SPLIT => leftover,
        _ => {
          trace!(
            "leftover of {} byte block at {:?} too small to split for {} bytes",
            (*block).size, block, size
          );
          (*block).is_free = false;
          return block;
        }
      };

      let remainder_at = NonNull::new_unchecked(Block::payload(block).add(aligned));
      let remainder = Block::write(remainder_at, leftover, true, (*block).next);

      (*block).size = aligned;
      (*block).is_free = false;
      (*block).next = remainder;

      trace!(
        "split {:?}: {} bytes used, {} byte free remainder at {:?}",
        block, aligned, leftover, remainder
      );

      block
    }
  }
}
