use core::ptr::NonNull;

use thiserror::Error;

use crate::prim::PrimError;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum SysError {
  #[error("operation not supported on this platform")]
  Unsupported,
  #[error("system refused to map {0} bytes")]
  OutOfMemory(usize),
  #[error("invalid argument")]
  InvalidArgument,
  #[error(transparent)]
  Prim(#[from] PrimError),
}

pub type SysResult<T> = Result<T, SysError>;

/// Which kind of memory a [`System`] hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemKind {
  Heap,
  Direct,
}

impl SystemKind {
  pub const fn as_str(self) -> &'static str {
    match self {
      SystemKind::Heap => "heap",
      SystemKind::Direct => "direct",
    }
  }
}

impl core::fmt::Display for SystemKind {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A raw block of mapped memory.
///
/// `len` is the usable length, which may be larger than what was asked for
/// (direct mappings round up to whole pages).
#[derive(Debug)]
pub struct Block {
  ptr: NonNull<u8>,
  len: usize,
}

impl Block {
  /// # Safety
  ///
  /// `ptr` must point to `len` bytes that stay valid until the block is
  /// released by the system that produced it.
  pub const unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize) -> Self {
    Self { ptr, len }
  }

  #[inline(always)]
  pub const fn as_ptr(&self) -> *mut u8 {
    self.ptr.as_ptr()
  }

  #[inline(always)]
  pub const fn len(&self) -> usize {
    self.len
  }

  #[inline(always)]
  pub const fn is_empty(&self) -> bool {
    self.len == 0
  }

  #[inline(always)]
  pub fn addr(&self) -> usize {
    self.ptr.as_ptr() as usize
  }
}

unsafe impl Send for Block {}
unsafe impl Sync for Block {}

/// Backing memory capability of an arena.
///
/// # Safety
///
/// Implementors must ensure that:
/// - `map` returns a block of at least `size` readable and writable,
///   zero-initialized bytes that is not aliased by any other live block
/// - `release` accepts exactly the blocks produced by `map` on an equal system
pub unsafe trait System: Clone + Send + Sync + 'static {
  const KIND: SystemKind;

  /// Maps a new block of at least `size` bytes.
  fn map(&self, size: usize) -> SysResult<Block>;

  /// Returns a block to the operating system or allocator.
  ///
  /// # Safety
  ///
  /// Caller must ensure `block` came from `map` of this system and that no
  /// reference into it outlives this call.
  unsafe fn release(&self, block: Block) -> SysResult<()>;

  /// Copies `len` bytes between two mapped blocks.
  ///
  /// # Safety
  ///
  /// Caller must ensure the source and destination ranges do not overlap and
  /// that nobody else accesses them during the copy.
  unsafe fn copy(
    &self,
    src: &Block,
    src_offset: usize,
    dst: &Block,
    dst_offset: usize,
    len: usize,
  ) {
    if len == 0 {
      return;
    }
    assert!(src_offset + len <= src.len(), "copy source out of bounds");
    assert!(dst_offset + len <= dst.len(), "copy destination out of bounds");
    unsafe {
      core::ptr::copy_nonoverlapping(
        src.as_ptr().add(src_offset),
        dst.as_ptr().add(dst_offset),
        len,
      )
    };
  }
}

/// Off-heap memory mapped directly from the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectSystem;

unsafe impl System for DirectSystem {
  const KIND: SystemKind = SystemKind::Direct;

  #[cfg(unix)]
  fn map(&self, size: usize) -> SysResult<Block> {
    crate::unix::map_pages(size)
  }

  #[cfg(windows)]
  fn map(&self, size: usize) -> SysResult<Block> {
    crate::windows::map_pages(size)
  }

  #[cfg(not(any(unix, windows)))]
  fn map(&self, size: usize) -> SysResult<Block> {
    _ = size;
    Err(SysError::Unsupported)
  }

  #[cfg(unix)]
  unsafe fn release(&self, block: Block) -> SysResult<()> {
    unsafe { crate::unix::unmap_pages(block) }
  }

  #[cfg(windows)]
  unsafe fn release(&self, block: Block) -> SysResult<()> {
    unsafe { crate::windows::unmap_pages(block) }
  }

  #[cfg(not(any(unix, windows)))]
  unsafe fn release(&self, block: Block) -> SysResult<()> {
    _ = block;
    Err(SysError::Unsupported)
  }
}
