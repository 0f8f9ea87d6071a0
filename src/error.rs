use std::fmt;

/// Reasons an allocation request can fail.
///
/// `ZeroSize` and `Overflow` are both invalid requests: the caller asked for
/// something no heap could satisfy. `OutOfMemory` means the region growth
/// primitive refused to extend the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
  /// A zero-byte payload was requested.
  ZeroSize,

  /// A size computation (element count times element size, alignment
  /// rounding, or header plus payload) does not fit in `usize`.
  Overflow,

  /// The region could not be extended.
  OutOfMemory,
}

impl AllocError {
  pub fn is_invalid_request(self) -> bool {
    matches!(self, AllocError::ZeroSize | AllocError::Overflow)
  }
}

impl fmt::Display for AllocError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      AllocError::ZeroSize => f.write_str("zero-sized allocation request"),
      AllocError::Overflow => f.write_str("allocation size overflows usize"),
      AllocError::OutOfMemory => f.write_str("out of memory: region growth denied"),
    }
  }
}

impl std::error::Error for AllocError {}
