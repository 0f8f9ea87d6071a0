//! Region growth primitives.
//!
//! A [`Grower`] extends one contiguous, process-owned region and hands back
//! the start of each extension. The heap never gives memory back, so growers
//! only ever move forward.

use std::{alloc, ptr::NonNull};

use log::{debug, warn};

use crate::{align::ALIGNMENT, error::AllocError};

/// # Safety
///
/// Implementors must return `ALIGNMENT`-aligned memory that is valid for
/// `size` bytes of reads and writes, stays valid for as long as the grower
/// lives, and is never handed out twice.
pub unsafe trait Grower {
  /// Extends the region by exactly `size` bytes and returns the start of the
  /// new extension.
  fn grow(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError>;
}

/// Grows the program data segment with `sbrk(2)`.
///
/// The break is shared with everything else in the process that calls
/// `sbrk`, so consecutive extensions are not guaranteed to abut.
#[cfg(unix)]
#[derive(Debug, Default)]
pub struct SbrkGrower;

#[cfg(unix)]
impl SbrkGrower {
  pub fn new() -> Self {
    Self
  }

  /// Current program break (`sbrk(0)`).
  pub fn program_break() -> *mut u8 {
    unsafe { libc::sbrk(0) as *mut u8 }
  }
}

#[cfg(unix)]
unsafe impl Grower for SbrkGrower {
  fn grow(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    use libc::{c_void, intptr_t, sbrk};

    unsafe {
      let current = sbrk(0);

      if current == usize::MAX as *mut c_void {
        return Err(AllocError::OutOfMemory);
      }

      // Someone else may have left the break unaligned.
      let padding = crate::align!(current as usize) - current as usize;

      let increment = size
        .checked_add(padding)
        .and_then(|total| intptr_t::try_from(total).ok())
        .ok_or(AllocError::OutOfMemory)?;

      let address = sbrk(increment);

      if address == usize::MAX as *mut c_void {
        warn!("sbrk({}) failed", increment);
        return Err(AllocError::OutOfMemory);
      }

      debug!(
        "sbrk grew region by {} bytes ({} padding), program break = {:?}",
        increment,
        padding,
        sbrk(0)
      );

      NonNull::new((address as *mut u8).add(padding)).ok_or(AllocError::OutOfMemory)
    }
  }
}

/// Fixed-capacity region carved out of one up-front system allocation.
///
/// Growth bumps a top offset until the capacity runs out. Addresses are
/// deterministic relative to [`ArenaGrower::base`], which makes it the grower
/// of choice for inspecting heap shape.
pub struct ArenaGrower {
  base: NonNull<u8>,
  layout: alloc::Layout,
  top: usize,
}

impl ArenaGrower {
  /// Reserves `capacity` bytes (rounded up to the alignment).
  pub fn new(capacity: usize) -> Result<Self, AllocError> {
    let capacity = crate::align::checked_align(capacity.max(ALIGNMENT)).ok_or(AllocError::Overflow)?;
    let layout = alloc::Layout::from_size_align(capacity, ALIGNMENT).map_err(|_| AllocError::Overflow)?;
    let base = NonNull::new(unsafe { alloc::alloc(layout) }).ok_or(AllocError::OutOfMemory)?;

    Ok(Self { base, layout, top: 0 })
  }

  pub fn base(&self) -> NonNull<u8> {
    self.base
  }

  pub fn capacity(&self) -> usize {
    self.layout.size()
  }

  /// Bytes handed out so far.
  pub fn used(&self) -> usize {
    self.top
  }
}

unsafe impl Grower for ArenaGrower {
  fn grow(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if size > self.capacity() - self.top {
      warn!(
        "arena exhausted: requested {} bytes, {} of {} in use",
        size,
        self.top,
        self.capacity()
      );
      return Err(AllocError::OutOfMemory);
    }

    let address = unsafe { self.base.add(self.top) };
    self.top += size;

    debug!("arena grew region by {} bytes, top = {}", size, self.top);

    Ok(address)
  }
}

impl Drop for ArenaGrower {
  fn drop(&mut self) {
    unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) };
  }
}
