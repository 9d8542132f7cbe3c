use core::{
  mem::ManuallyDrop,
  ops::Range,
};

use crate::system::{
  Block,
  SysError,
  SysResult,
  System,
};

/// An owned block that goes back to its system when dropped.
pub struct Mapping<S>
where
  S: System,
{
  block: ManuallyDrop<Block>,
  system: S,
}

impl<S> Mapping<S>
where
  S: System,
{
  pub fn new(system: S, size: usize) -> SysResult<Self> {
    let block = system.map(size)?;
    Ok(Self {
      block: ManuallyDrop::new(block),
      system,
    })
  }

  pub fn check(&self, range: Range<usize>) -> SysResult<()> {
    if range.start > range.end || range.end > self.block.len() {
      return Err(SysError::InvalidArgument);
    }
    Ok(())
  }

  #[inline(always)]
  pub fn block(&self) -> &Block {
    &self.block
  }

  #[inline(always)]
  pub fn len(&self) -> usize {
    self.block.len()
  }

  #[inline(always)]
  pub fn is_empty(&self) -> bool {
    self.block.is_empty()
  }

  #[inline(always)]
  pub fn system(&self) -> &S {
    &self.system
  }

  /// Copies `len` bytes from `src` into `self`.
  ///
  /// # Safety
  ///
  /// Caller must ensure both ranges are exclusively owned by the caller and do
  /// not overlap.
  pub unsafe fn copy_from(
    &self,
    dst_offset: usize,
    src: &Mapping<S>,
    src_offset: usize,
    len: usize,
  ) {
    unsafe {
      self
        .system
        .copy(src.block(), src_offset, &self.block, dst_offset, len)
    };
  }
}

impl<S> Drop for Mapping<S>
where
  S: System,
{
  fn drop(&mut self) {
    let block = unsafe { ManuallyDrop::take(&mut self.block) };
    let len = block.len();
    if let Err(err) = unsafe { self.system.release(block) } {
      tracing::warn!(len, %err, "failed to release mapping");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    DirectSystem,
    HeapSystem,
    prim::page_size,
  };

  #[test]
  fn test_mapping_new() {
    let ps = page_size();
    let mapping = Mapping::new(DirectSystem, ps).unwrap();
    assert_eq!(mapping.len(), ps);
    assert!(!mapping.is_empty());
  }

  #[test]
  fn test_mapping_rounds_to_pages() {
    let ps = page_size();
    let mapping = Mapping::new(DirectSystem, ps + 1).unwrap();
    assert_eq!(mapping.len(), ps * 2);
  }

  #[test]
  fn test_mapping_zero_size() {
    assert!(Mapping::new(HeapSystem, 0).is_err());
  }

  #[test]
  fn test_mapping_check() {
    let mapping = Mapping::new(HeapSystem, 256).unwrap();
    assert!(mapping.check(0..128).is_ok());
    assert!(mapping.check(0..256).is_ok());
    assert!(mapping.check(100..100).is_ok());
    assert!(mapping.check(0..257).is_err());
    assert!(mapping.check(100..50).is_err());
  }

  #[test]
  fn test_mapping_copy_from() {
    let src = Mapping::new(HeapSystem, 128).unwrap();
    let dst = Mapping::new(HeapSystem, 128).unwrap();
    unsafe {
      core::slice::from_raw_parts_mut(src.block().as_ptr(), 128)[..4]
        .copy_from_slice(&[1, 2, 3, 4]);
      dst.copy_from(60, &src, 0, 4);
      let out = core::slice::from_raw_parts(dst.block().as_ptr(), 128);
      assert_eq!(&out[60..64], &[1, 2, 3, 4]);
    }
  }
}
