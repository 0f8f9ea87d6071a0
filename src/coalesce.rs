//! Merging of adjacent free blocks.

use log::trace;

use crate::{
  block::{Block, HEADER_SIZE},
  list::BlockList,
};

impl BlockList {
  /// Single left-to-right pass that collapses every run of adjacent free
  /// blocks into its first block.
  ///
  /// Blocks are only merged when they physically abut: two extensions of a
  /// shared program break can have foreign memory between them.
  pub fn coalesce(&mut self) {
    let mut current = self.head;

    unsafe {
      while !current.is_null() && !(*current).next.is_null() {
        let next = (*current).next;

        if (*current).is_free && (*next).is_free && Block::abuts(current, next) {
          self.absorb_next(current);
          // Stay put, the new neighbour may be free as well.
        } else {
          current = next;
        }
      }
    }
  }

  /// Folds the successor of `block` (header and payload) into `block`'s
  /// payload. Keeps `block`'s free flag.
  ///
  /// # Safety
  ///
  /// `block` must be a live block of this list whose successor exists and
  /// abuts it.
  pub(crate) unsafe fn absorb_next(
    &mut self,
    block: *mut Block,
  ) {
    unsafe {
      let next = (*block).next;

      trace!(
        "merging {:?} ({} bytes) with {:?} ({} bytes)",
        block,
        (*block).size,
        next,
        (*next).size
      );

      (*block).size += HEADER_SIZE + (*next).size;
      (*block).next = (*next).next;
    }
  }
}
