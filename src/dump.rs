use std::fmt;

use crate::list::BlockList;

/// Human readable listing of every block, one line per block:
///
/// ```text
/// Heap blocks:
///   Block 0x5581a2c3d000: size=64, free=0, user_ptr=0x5581a2c3d018
/// ```
pub struct HeapDump<'a> {
  blocks: &'a BlockList,
}

impl<'a> HeapDump<'a> {
  pub(crate) fn new(blocks: &'a BlockList) -> Self {
    Self { blocks }
  }
}

impl fmt::Display for HeapDump<'_> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    writeln!(f, "Heap blocks:")?;

    for block in self.blocks.iter() {
      writeln!(
        f,
        "  Block {:?}: size={}, free={}, user_ptr={:?}",
        block.address, block.payload_size, block.is_free as u8, block.payload
      )?;
    }

    Ok(())
  }
}
