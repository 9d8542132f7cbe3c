use core::ptr::NonNull;

use crate::{
  prim::page_align,
  system::{
    Block,
    SysError,
    SysResult,
  },
};

const fn prot() -> i32 {
  libc::PROT_READ | libc::PROT_WRITE
}

const fn flags() -> i32 {
  libc::MAP_PRIVATE | libc::MAP_ANONYMOUS
}

const fn as_c(block: &Block) -> *mut libc::c_void {
  block.as_ptr() as *mut libc::c_void
}

/// Maps `size` bytes rounded up to whole pages.
pub fn map_pages(size: usize) -> SysResult<Block> {
  if size == 0 {
    return Err(SysError::InvalidArgument);
  }
  let len = page_align(size)?;

  let ptr = unsafe { libc::mmap(core::ptr::null_mut(), len, prot(), flags(), -1, 0) };
  if ptr == libc::MAP_FAILED {
    tracing::warn!(len, "mmap failed");
    return Err(SysError::OutOfMemory(len));
  }

  match NonNull::new(ptr as *mut u8) {
    Some(ptr) => Ok(unsafe { Block::from_raw_parts(ptr, len) }),
    None => Err(SysError::OutOfMemory(len)),
  }
}

/// # Safety
///
/// `block` must come from [`map_pages`] and must not be accessed afterwards.
pub unsafe fn unmap_pages(block: Block) -> SysResult<()> {
  let result = unsafe { libc::munmap(as_c(&block), block.len()) };
  if result == 0 {
    return Ok(());
  }

  Err(SysError::InvalidArgument)
}
