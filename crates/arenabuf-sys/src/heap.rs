use core::ptr::NonNull;
use std::alloc::{
  Layout,
  alloc_zeroed,
  dealloc,
};

use crate::{
  prim::min_align,
  system::{
    Block,
    SysError,
    SysResult,
    System,
    SystemKind,
  },
};

/// Memory taken from the global allocator.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapSystem;

impl HeapSystem {
  fn layout(size: usize) -> SysResult<Layout> {
    Layout::from_size_align(size, min_align()).map_err(|_| SysError::InvalidArgument)
  }
}

unsafe impl System for HeapSystem {
  const KIND: SystemKind = SystemKind::Heap;

  fn map(&self, size: usize) -> SysResult<Block> {
    if size == 0 {
      return Err(SysError::InvalidArgument);
    }
    let layout = Self::layout(size)?;
    let ptr = unsafe { alloc_zeroed(layout) };
    match NonNull::new(ptr) {
      Some(ptr) => Ok(unsafe { Block::from_raw_parts(ptr, size) }),
      None => {
        tracing::warn!(size, "heap allocation failed");
        Err(SysError::OutOfMemory(size))
      }
    }
  }

  unsafe fn release(&self, block: Block) -> SysResult<()> {
    let layout = Self::layout(block.len())?;
    unsafe { dealloc(block.as_ptr(), layout) };
    Ok(())
  }
}
