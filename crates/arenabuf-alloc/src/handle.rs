use core::fmt;

const SLAB_FLAG: u64 = 0x4000_0000_0000_0000;
const BITMAP_MASK: u64 = 0x3FFF_FFFF;

/// Location of an allocation inside its chunk.
///
/// The low 32 bits hold the node of the page tree. Slab handles additionally
/// carry the slot index in bits 32..62 and set bit 62 so that slot 0 is told
/// apart from a plain run.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
  #[inline]
  pub const fn run(node: usize) -> Self {
    Self(node as u32 as u64)
  }

  #[inline]
  pub const fn slab(node: usize, slot: usize) -> Self {
    Self(SLAB_FLAG | ((slot as u64 & BITMAP_MASK) << 32) | node as u32 as u64)
  }

  #[inline]
  pub const fn node(self) -> usize {
    self.0 as u32 as usize
  }

  #[inline]
  pub const fn is_slab(self) -> bool {
    self.0 & SLAB_FLAG != 0
  }

  #[inline]
  pub const fn slot(self) -> Option<usize> {
    if self.is_slab() {
      Some(((self.0 >> 32) & BITMAP_MASK) as usize)
    } else {
      None
    }
  }

  #[inline]
  pub const fn raw(self) -> u64 {
    self.0
  }
}

impl fmt::Debug for Handle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.slot() {
      Some(slot) => write!(f, "Handle(node: {}, slot: {})", self.node(), slot),
      None => write!(f, "Handle(node: {})", self.node()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_run_handle() {
    let handle = Handle::run(2048);
    assert_eq!(handle.node(), 2048);
    assert!(!handle.is_slab());
    assert_eq!(handle.slot(), None);
    assert_eq!(handle.raw(), 2048);
  }

  #[test]
  fn test_slab_handle_slot_zero() {
    let handle = Handle::slab(4095, 0);
    assert!(handle.is_slab());
    assert_eq!(handle.slot(), Some(0));
    assert_eq!(handle.node(), 4095);
    assert_eq!(handle.raw(), 0x4000_0000_0000_0FFF);
  }

  #[test]
  fn test_slab_handle_layout() {
    let handle = Handle::slab(2049, 511);
    assert_eq!(handle.raw() >> 32, 0x4000_0000 | 511);
    assert_eq!(handle.slot(), Some(511));
    assert_eq!(handle.node(), 2049);
  }
}
