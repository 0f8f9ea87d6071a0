use std::ptr::{self, NonNull};

use log::debug;

#[cfg(unix)]
use crate::grow::SbrkGrower;
use crate::{
  align::checked_align,
  block::{Block, HEADER_SIZE},
  dump::HeapDump,
  error::AllocError,
  grow::Grower,
  list::{BlockList, Blocks},
};

/// A growable heap managed through an intrusive, address-ordered block list.
///
/// Every allocation is served first-fit from the free blocks already carved
/// out of the region; on a miss the region is grown by exactly one header plus
/// the aligned payload. Freed blocks are merged with their free neighbours.
///
/// The heap holds raw pointers into its region and is therefore neither
/// `Send` nor `Sync`. Wrap it in a lock to share it.
pub struct Heap<G: Grower> {
  blocks: BlockList,
  grower: G,
}

impl<G: Grower> Heap<G> {
  pub fn new(grower: G) -> Self {
    Self {
      blocks: BlockList::new(),
      grower,
    }
  }

  /// Allocates a payload of at least `size` bytes, aligned to
  /// [`ALIGNMENT`](crate::align::ALIGNMENT).
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if size == 0 {
      return Err(AllocError::ZeroSize);
    }

    let size = checked_align(size).ok_or(AllocError::Overflow)?;

    let free_block = self.blocks.find_free(size);

    if let Some(block) = NonNull::new(free_block) {
      unsafe { (*block.as_ptr()).is_free = false };
      return Ok(payload_of(block));
    }

    let total_size = HEADER_SIZE.checked_add(size).ok_or(AllocError::Overflow)?;
    let memory = self.grower.grow(total_size)?;

    let block = unsafe { self.blocks.append(memory, size) };

    debug!("appended {} byte block at {:?}", size, block);

    Ok(payload_of(unsafe { NonNull::new_unchecked(block) }))
  }

  /// Allocates room for `count` elements of `size` bytes each and zeroes it.
  pub fn zero_allocate(
    &mut self,
    count: usize,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let total_size = count.checked_mul(size).ok_or(AllocError::Overflow)?;
    let payload = self.allocate(total_size)?;

    unsafe {
      let block = Block::from_payload(payload.as_ptr());
      ptr::write_bytes(payload.as_ptr(), 0, (*block).size);
    }

    Ok(payload)
  }

  /// Marks the block behind `ptr` free and merges adjacent free blocks.
  /// `None` is ignored.
  ///
  /// # Safety
  ///
  /// `ptr` must have been returned by this heap and not released since.
  /// Neither condition is checked: breaking them corrupts the block list.
  pub unsafe fn release(
    &mut self,
    ptr: Option<NonNull<u8>>,
  ) {
    let Some(ptr) = ptr else {
      return;
    };

    let block = Block::from_payload(ptr.as_ptr());
    unsafe { (*block).is_free = true };

    debug!("released {:?}", ptr);

    self.blocks.coalesce();
  }

  /// Resizes the allocation behind `ptr` to `size` bytes.
  ///
  /// * `None` behaves like [`Heap::allocate`].
  /// * A `size` of zero releases `ptr` and returns `Ok(None)`.
  /// * Shrinking, and growing into a free successor, keep the payload address.
  /// * Otherwise the contents move to a new block and the old one is released.
  ///   If that allocation fails the old block is left untouched.
  ///
  /// # Safety
  ///
  /// Same as [`Heap::release`].
  pub unsafe fn reallocate(
    &mut self,
    ptr: Option<NonNull<u8>>,
    size: usize,
  ) -> Result<Option<NonNull<u8>>, AllocError> {
    let Some(ptr) = ptr else {
      return self.allocate(size).map(Some);
    };

    if size == 0 {
      unsafe { self.release(Some(ptr)) };
      return Ok(None);
    }

    let aligned = checked_align(size).ok_or(AllocError::Overflow)?;
    let block = Block::from_payload(ptr.as_ptr());

    unsafe {
      if (*block).size == aligned {
        return Ok(Some(ptr));
      }

      if (*block).size > aligned {
        self.blocks.split_block(block, aligned);
        self.blocks.coalesce();
        return Ok(Some(ptr));
      }

      if self.grow_in_place(block, aligned) {
        return Ok(Some(ptr));
      }

      let moved = self.allocate(size)?;
      ptr::copy_nonoverlapping(ptr.as_ptr(), moved.as_ptr(), (*block).size.min(size));
      self.release(Some(ptr));

      debug!("moved {:?} to {:?} for {} bytes", ptr, moved, size);

      Ok(Some(moved))
    }
  }

  /// Extends `block` over its free successor when the two together hold
  /// `size` bytes.
  unsafe fn grow_in_place(
    &mut self,
    block: *mut Block,
    size: usize,
  ) -> bool {
    unsafe {
      let next = (*block).next;

      if next.is_null() || !(*next).is_free {
        return false;
      }

      self.blocks.coalesce();

      let next = (*block).next;

      if !Block::abuts(block, next) || !(*next).is_free {
        return false;
      }

      if (*block).size + HEADER_SIZE + (*next).size < size {
        return false;
      }

      self.blocks.absorb_next(block);
      self.blocks.split_block(block, size);

      debug!("grew {:?} in place to {} bytes", block, (*block).size);

      true
    }
  }

  /// True until the first block has been carved out of the region.
  pub fn is_empty(&self) -> bool {
    self.blocks.is_empty()
  }

  /// Walks every block in address order.
  pub fn blocks(&self) -> Blocks<'_> {
    self.blocks.iter()
  }

  /// Printable snapshot of the block list.
  pub fn dump(&self) -> HeapDump<'_> {
    HeapDump::new(&self.blocks)
  }

  pub fn grower(&self) -> &G {
    &self.grower
  }
}

#[cfg(unix)]
impl Default for Heap<SbrkGrower> {
  fn default() -> Self {
    Self::new(SbrkGrower::new())
  }
}

fn payload_of(block: NonNull<Block>) -> NonNull<u8> {
  unsafe { NonNull::new_unchecked(Block::payload(block.as_ptr())) }
}

#[cfg(test)]
mod tests {
  use test_log::test;

  use super::*;
  use crate::{
    align::ALIGNMENT,
    grow::ArenaGrower,
    list::BlockInfo,
  };

  fn arena_heap(capacity: usize) -> Heap<ArenaGrower> {
    Heap::new(ArenaGrower::new(capacity).unwrap())
  }

  fn shape<G: Grower>(heap: &Heap<G>) -> Vec<(usize, bool)> {
    heap.blocks().map(|b| (b.payload_size, b.is_free)).collect()
  }

  fn find<G: Grower>(
    heap: &Heap<G>,
    payload: NonNull<u8>,
  ) -> BlockInfo {
    heap.blocks().find(|b| b.payload == payload).unwrap()
  }

  /// Blocks tile the arena from its base with no gaps and no overlap.
  fn assert_tiled(heap: &Heap<ArenaGrower>) {
    let mut expected = heap.grower().base().as_ptr() as usize;

    for block in heap.blocks() {
      assert_eq!(block.address.as_ptr() as usize, expected);
      assert_eq!(block.payload.as_ptr() as usize % ALIGNMENT, 0);
      assert_eq!(block.payload_size % ALIGNMENT, 0);
      expected += block.footprint();
    }

    assert_eq!(expected, heap.grower().base().as_ptr() as usize + heap.grower().used());
  }

  #[test]
  fn test_allocate_is_aligned() {
    let mut heap = arena_heap(64 * 1024);

    for size in 1..=100 {
      let ptr = heap.allocate(size).unwrap();
      assert_eq!(ptr.as_ptr() as usize % ALIGNMENT, 0);
      assert_eq!(find(&heap, ptr).payload_size, crate::align!(size));
    }

    assert_tiled(&heap);
  }

  #[test]
  fn test_allocate_rejects_invalid_requests() {
    let mut heap = arena_heap(1024);

    assert_eq!(heap.allocate(0), Err(AllocError::ZeroSize));
    assert_eq!(heap.allocate(usize::MAX), Err(AllocError::Overflow));
    assert_eq!(heap.allocate(usize::MAX - ALIGNMENT + 1), Err(AllocError::Overflow));
    assert!(heap.is_empty());
  }

  #[test]
  fn test_allocate_out_of_memory() {
    let mut heap = arena_heap(256);

    let first = heap.allocate(128).unwrap();
    assert_eq!(heap.allocate(256), Err(AllocError::OutOfMemory));

    assert_eq!(shape(&heap), vec![(128, false)]);
    assert_eq!(find(&heap, first).payload_size, 128);
  }

  #[test]
  fn test_free_then_reuse() {
    let mut heap = arena_heap(1024);

    let a = heap.allocate(40).unwrap();
    let _b = heap.allocate(40).unwrap();

    unsafe { heap.release(Some(a)) };
    let used = heap.grower().used();

    let c = heap.allocate(40).unwrap();

    assert_eq!(a, c);
    assert_eq!(heap.grower().used(), used);
  }

  #[test]
  fn test_release_none_is_noop() {
    let mut heap = arena_heap(1024);
    let a = heap.allocate(8).unwrap();

    unsafe { heap.release(None) };

    assert!(!find(&heap, a).is_free);
  }

  #[test]
  fn test_release_coalesces_neighbours() {
    let mut heap = arena_heap(1024);

    let a = heap.allocate(16).unwrap();
    let b = heap.allocate(16).unwrap();
    let c = heap.allocate(16).unwrap();
    let _d = heap.allocate(16).unwrap();

    unsafe {
      heap.release(Some(a));
      heap.release(Some(c));
      assert_eq!(shape(&heap), vec![(16, true), (16, false), (16, true), (16, false)]);

      heap.release(Some(b));
    }

    assert_eq!(shape(&heap), vec![(48 + 2 * HEADER_SIZE, true), (16, false)]);
    assert_tiled(&heap);
  }

  #[test]
  fn test_zero_allocate_fills_payload() {
    let mut heap = arena_heap(1024);

    let dirty = heap.allocate(64).unwrap();
    unsafe {
      ptr::write_bytes(dirty.as_ptr(), 0xFF, 64);
      heap.release(Some(dirty));
    }

    let clean = heap.zero_allocate(8, 8).unwrap();
    assert_eq!(clean, dirty);

    let bytes = unsafe { std::slice::from_raw_parts(clean.as_ptr(), 64) };
    assert!(bytes.iter().all(|&b| b == 0));
  }

  #[test]
  fn test_zero_allocate_rejects_invalid_requests() {
    let mut heap = arena_heap(1024);

    assert_eq!(heap.zero_allocate(usize::MAX, 2), Err(AllocError::Overflow));
    assert_eq!(heap.zero_allocate(0, 8), Err(AllocError::ZeroSize));
    assert_eq!(heap.zero_allocate(8, 0), Err(AllocError::ZeroSize));
  }

  #[test]
  fn test_reallocate_none_allocates() {
    let mut heap = arena_heap(1024);

    let ptr = unsafe { heap.reallocate(None, 24) }.unwrap().unwrap();

    assert_eq!(shape(&heap), vec![(24, false)]);
    assert_eq!(find(&heap, ptr).payload_size, 24);
  }

  #[test]
  fn test_reallocate_zero_releases() {
    let mut heap = arena_heap(1024);
    let a = heap.allocate(24).unwrap();

    assert_eq!(unsafe { heap.reallocate(Some(a), 0) }, Ok(None));
    assert!(find(&heap, a).is_free);
  }

  #[test]
  fn test_reallocate_same_size() {
    let mut heap = arena_heap(1024);
    let a = heap.allocate(20).unwrap();

    assert_eq!(unsafe { heap.reallocate(Some(a), 24) }, Ok(Some(a)));
    assert_eq!(unsafe { heap.reallocate(Some(a), 17) }, Ok(Some(a)));
    assert_eq!(shape(&heap), vec![(24, false)]);
  }

  #[test]
  fn test_reallocate_shrink_is_stable() {
    let mut heap = arena_heap(1024);
    let a = heap.allocate(128).unwrap();
    let _b = heap.allocate(8).unwrap();

    unsafe { ptr::write_bytes(a.as_ptr(), 0x5A, 128) };

    let shrunk = unsafe { heap.reallocate(Some(a), 40) }.unwrap();

    assert_eq!(shrunk, Some(a));
    assert_eq!(
      shape(&heap),
      vec![(40, false), (128 - 40 - HEADER_SIZE, true), (8, false)]
    );

    let bytes = unsafe { std::slice::from_raw_parts(a.as_ptr(), 40) };
    assert!(bytes.iter().all(|&b| b == 0x5A));
    assert_tiled(&heap);
  }

  #[test]
  fn test_reallocate_shrink_merges_remainder() {
    let mut heap = arena_heap(1024);
    let a = heap.allocate(128).unwrap();
    let b = heap.allocate(64).unwrap();
    let _c = heap.allocate(8).unwrap();

    unsafe {
      heap.release(Some(b));
      assert_eq!(heap.reallocate(Some(a), 16), Ok(Some(a)));
    }

    assert_eq!(
      shape(&heap),
      vec![(16, false), (128 - 16 + 64, true), (8, false)]
    );
  }

  #[test]
  fn test_reallocate_grows_into_free_neighbour() {
    let mut heap = arena_heap(1024);
    let a = heap.allocate(32).unwrap();
    let b = heap.allocate(64).unwrap();
    let c = heap.allocate(64).unwrap();
    let _d = heap.allocate(8).unwrap();

    unsafe {
      for i in 0..32 {
        a.as_ptr().add(i).write(i as u8);
      }

      heap.release(Some(b));
      heap.release(Some(c));

      let grown = heap.reallocate(Some(a), 40).unwrap();
      assert_eq!(grown, Some(a));

      for i in 0..32 {
        assert_eq!(*a.as_ptr().add(i), i as u8);
      }
    }

    // 32 + 64 + 64 payload bytes plus two swallowed headers, minus the
    // 40 bytes now in use and the remainder's own header.
    assert_eq!(
      shape(&heap),
      vec![(40, false), (32 + 64 + 64 + HEADER_SIZE - 40, true), (8, false)]
    );
    assert_tiled(&heap);
  }

  #[test]
  fn test_reallocate_grows_whole_neighbour() {
    let mut heap = arena_heap(1024);
    let a = heap.allocate(32).unwrap();
    let b = heap.allocate(64).unwrap();
    let _c = heap.allocate(16).unwrap();

    unsafe {
      heap.release(Some(b));
      assert_eq!(heap.reallocate(Some(a), 80), Ok(Some(a)));
    }

    // The remainder would be too small to split off.
    assert_eq!(shape(&heap), vec![(32 + HEADER_SIZE + 64, false), (16, false)]);
  }

  #[test]
  fn test_reallocate_moves_and_copies() {
    let mut heap = arena_heap(1024);
    let a = heap.allocate(16).unwrap();
    let _b = heap.allocate(16).unwrap();

    unsafe {
      for i in 0..16 {
        a.as_ptr().add(i).write(0xA0 + i as u8);
      }

      let moved = heap.reallocate(Some(a), 64).unwrap().unwrap();
      assert_ne!(moved, a);

      for i in 0..16 {
        assert_eq!(*moved.as_ptr().add(i), 0xA0 + i as u8);
      }
    }

    assert_eq!(shape(&heap), vec![(16, true), (16, false), (64, false)]);
    assert_tiled(&heap);
  }

  #[test]
  fn test_reallocate_moves_when_neighbour_too_small() {
    let mut heap = arena_heap(1024);
    let a = heap.allocate(16).unwrap();
    let b = heap.allocate(16).unwrap();
    let _c = heap.allocate(16).unwrap();

    unsafe {
      a.as_ptr().write_bytes(0x33, 16);
      heap.release(Some(b));

      let moved = heap.reallocate(Some(a), 200).unwrap().unwrap();
      assert_ne!(moved, a);
      assert!(std::slice::from_raw_parts(moved.as_ptr(), 16).iter().all(|&b| b == 0x33));
    }

    assert_eq!(
      shape(&heap),
      vec![(32 + HEADER_SIZE, true), (16, false), (200, false)]
    );
  }

  #[test]
  fn test_reallocate_failure_keeps_old_block() {
    let mut heap = arena_heap(2 * HEADER_SIZE + 64);
    let a = heap.allocate(32).unwrap();

    unsafe {
      a.as_ptr().write_bytes(0x77, 32);

      assert_eq!(heap.reallocate(Some(a), 512), Err(AllocError::OutOfMemory));
      assert!(std::slice::from_raw_parts(a.as_ptr(), 32).iter().all(|&b| b == 0x77));
    }

    assert_eq!(shape(&heap), vec![(32, false)]);
  }

  #[test]
  fn test_no_overlap_under_mixed_workload() {
    let mut heap = arena_heap(64 * 1024);
    let mut live: Vec<(NonNull<u8>, usize, u8)> = Vec::new();

    for round in 0..200usize {
      let size = 1 + (round * 37) % 150;
      let tag = round as u8;

      match round % 5 {
        0 | 1 | 2 => {
          let ptr = heap.allocate(size).unwrap();
          unsafe { ptr.as_ptr().write_bytes(tag, size) };
          live.push((ptr, size, tag));
        }
        3 if !live.is_empty() => {
          let (ptr, _, _) = live.remove(round % live.len());
          unsafe { heap.release(Some(ptr)) };
        }
        _ if !live.is_empty() => {
          let index = round % live.len();
          let (ptr, old_size, old_tag) = live[index];
          let ptr = unsafe { heap.reallocate(Some(ptr), size) }.unwrap().unwrap();

          let kept = old_size.min(size);
          let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), kept) };
          assert!(bytes.iter().all(|&b| b == old_tag));

          unsafe { ptr.as_ptr().write_bytes(tag, size) };
          live[index] = (ptr, size, tag);
        }
        _ => {}
      }

      for &(ptr, size, tag) in &live {
        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), size) };
        assert!(bytes.iter().all(|&b| b == tag));
        assert!(!find(&heap, ptr).is_free);
      }

      assert_tiled(&heap);
    }
  }

  #[test]
  fn test_allocate_free_sequence() {
    let mut heap = arena_heap(4096);

    let a = heap.allocate(64).unwrap();
    let b = heap.allocate(128).unwrap();
    let c = heap.allocate(64).unwrap();
    assert_eq!(shape(&heap), vec![(64, false), (128, false), (64, false)]);

    unsafe { heap.release(Some(b)) };
    assert_eq!(shape(&heap), vec![(64, false), (128, true), (64, false)]);

    let d = heap.allocate(52).unwrap();
    assert_eq!(d, b);
    let leftover = 128 - 56 - HEADER_SIZE;
    assert_eq!(
      shape(&heap),
      vec![(64, false), (56, false), (leftover, true), (64, false)]
    );

    // Too little is left over after 16 bytes to split again.
    let e = heap.allocate(16).unwrap();
    assert_eq!(e.as_ptr() as usize, d.as_ptr() as usize + 56 + HEADER_SIZE);
    assert_eq!(
      shape(&heap),
      vec![(64, false), (56, false), (leftover, false), (64, false)]
    );

    unsafe {
      heap.release(Some(a));
      heap.release(Some(c));
      heap.release(Some(d));
      heap.release(Some(e));
    }

    assert_eq!(shape(&heap), vec![(64 + 128 + 64 + 2 * HEADER_SIZE, true)]);
    assert_eq!(heap.blocks().next().unwrap().payload, a);
    assert_tiled(&heap);
  }

  #[cfg(unix)]
  #[test]
  fn test_sbrk_heap() {
    let mut heap = Heap::<SbrkGrower>::default();

    let first = heap.allocate(24).unwrap();
    assert_eq!(first.as_ptr() as usize % ALIGNMENT, 0);

    unsafe {
      first.as_ptr().write_bytes(0x11, 24);
      heap.release(Some(first));
    }

    let second = heap.allocate(24).unwrap();
    assert_eq!(first, second);

    let zeroed = heap.zero_allocate(4, 8).unwrap();
    let bytes = unsafe { std::slice::from_raw_parts(zeroed.as_ptr(), 32) };
    assert!(bytes.iter().all(|&b| b == 0));
  }
}
