use core::ptr::NonNull;

use windows_sys::Win32::System::Memory::{
  MEM_COMMIT,
  MEM_RELEASE,
  MEM_RESERVE,
  PAGE_READWRITE,
  VirtualAlloc,
  VirtualFree,
};

use crate::{
  prim::page_align,
  system::{
    Block,
    SysError,
    SysResult,
  },
};

/// Commits `size` bytes rounded up to whole pages.
pub fn map_pages(size: usize) -> SysResult<Block> {
  if size == 0 {
    return Err(SysError::InvalidArgument);
  }
  let len = page_align(size)?;

  let ptr = unsafe {
    VirtualAlloc(
      core::ptr::null(),
      len,
      MEM_COMMIT | MEM_RESERVE,
      PAGE_READWRITE,
    )
  };
  match NonNull::new(ptr as *mut u8) {
    Some(ptr) => Ok(unsafe { Block::from_raw_parts(ptr, len) }),
    None => {
      tracing::warn!(len, "VirtualAlloc failed");
      Err(SysError::OutOfMemory(len))
    }
  }
}

/// # Safety
///
/// `block` must come from [`map_pages`] and must not be accessed afterwards.
pub unsafe fn unmap_pages(block: Block) -> SysResult<()> {
  let result = unsafe { VirtualFree(block.as_ptr().cast(), 0, MEM_RELEASE) };
  if result != 0 {
    return Ok(());
  }

  Err(SysError::InvalidArgument)
}
