use core::fmt;
use std::sync::Arc;

use arenabuf_sys::{
  Mapping,
  System,
};
use getset::CopyGetters;

use crate::{
  arena::Arena,
  chunk::ChunkId,
  handle::Handle,
  tcache::ThreadCache,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
  Pooled { chunk: ChunkId, handle: Handle },
  Unpooled,
}

/// Backing range of a region, also the unit a thread cache keeps around.
pub struct Allocation<S>
where
  S: System,
{
  pub(crate) memory: Arc<Mapping<S>>,
  pub(crate) owner: Owner,
  pub(crate) offset: usize,
  pub(crate) max_length: usize,
}

impl<S> Allocation<S>
where
  S: System,
{
  #[inline]
  pub fn is_pooled(&self) -> bool {
    matches!(self.owner, Owner::Pooled { .. })
  }

  /// Copies `len` bytes at `src_offset` of `self` into `dst` at `dst_offset`.
  pub(crate) fn copy_to(
    &self,
    src_offset: usize,
    dst: &Allocation<S>,
    dst_offset: usize,
    len: usize,
  ) {
    assert!(src_offset + len <= self.max_length, "copy source out of bounds");
    assert!(dst_offset + len <= dst.max_length, "copy destination out of bounds");
    // Distinct allocations never overlap and both are owned by the caller.
    unsafe {
      dst
        .memory
        .copy_from(dst.offset + dst_offset, &self.memory, self.offset + src_offset, len)
    };
  }
}

impl<S> fmt::Debug for Allocation<S>
where
  S: System,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Allocation")
      .field("owner", &self.owner)
      .field("offset", &self.offset)
      .field("max_length", &self.max_length)
      .finish()
  }
}

/// An exclusively owned byte range handed out by an [`Arena`].
///
/// Dropping the region (or calling [`Region::release`]) returns the range to
/// the thread cache it came from, or to the arena when that cache is full.
#[derive(CopyGetters)]
pub struct Region<S>
where
  S: System,
{
  arena: Arc<Arena<S>>,
  allocation: Option<Allocation<S>>,
  length: usize,
  #[getset(get_copy = "pub")]
  max_capacity: usize,
  #[getset(get_copy = "pub")]
  reader_index: usize,
  #[getset(get_copy = "pub")]
  writer_index: usize,
  cache: Option<Arc<ThreadCache<S>>>,
}

impl<S> Region<S>
where
  S: System,
{
  pub(crate) fn new(
    arena: Arc<Arena<S>>,
    allocation: Allocation<S>,
    length: usize,
    max_capacity: usize,
    cache: Option<Arc<ThreadCache<S>>>,
  ) -> Self {
    debug_assert!(length <= allocation.max_length);
    Self {
      arena,
      allocation: Some(allocation),
      length,
      max_capacity,
      reader_index: 0,
      writer_index: 0,
      cache,
    }
  }

  #[inline]
  fn allocation(&self) -> &Allocation<S> {
    self.allocation.as_ref().expect("region holds an allocation until dropped")
  }

  /// Swaps in a new backing range and returns the previous one with its
  /// length and cache.
  pub(crate) fn replace(
    &mut self,
    allocation: Allocation<S>,
    length: usize,
    cache: Option<Arc<ThreadCache<S>>>,
  ) -> (Allocation<S>, usize, Option<Arc<ThreadCache<S>>>) {
    let old = self
      .allocation
      .replace(allocation)
      .expect("region holds an allocation until dropped");
    let old_length = core::mem::replace(&mut self.length, length);
    let old_cache = core::mem::replace(&mut self.cache, cache);
    (old, old_length, old_cache)
  }

  #[inline]
  pub fn arena(&self) -> &Arc<Arena<S>> {
    &self.arena
  }

  #[inline]
  pub fn cache(&self) -> Option<&Arc<ThreadCache<S>>> {
    self.cache.as_ref()
  }

  /// Usable bytes, the capacity that was asked for.
  #[inline]
  pub fn capacity(&self) -> usize {
    self.length
  }

  /// Bytes reserved behind the region, its normalized size.
  #[inline]
  pub fn max_length(&self) -> usize {
    self.allocation().max_length
  }

  #[inline]
  pub fn offset(&self) -> usize {
    self.allocation().offset
  }

  #[inline]
  pub fn is_pooled(&self) -> bool {
    self.allocation().is_pooled()
  }

  pub fn chunk(&self) -> Option<ChunkId> {
    match self.allocation().owner {
      Owner::Pooled { chunk, .. } => Some(chunk),
      Owner::Unpooled => None,
    }
  }

  pub fn handle(&self) -> Option<Handle> {
    match self.allocation().owner {
      Owner::Pooled { handle, .. } => Some(handle),
      Owner::Unpooled => None,
    }
  }

  pub(crate) fn allocation_ref(&self) -> &Allocation<S> {
    self.allocation()
  }

  pub fn set_index(&mut self, reader_index: usize, writer_index: usize) {
    assert!(
      reader_index <= writer_index && writer_index <= self.length,
      "indexes {reader_index}..{writer_index} out of bounds for capacity {}",
      self.length
    );
    self.reader_index = reader_index;
    self.writer_index = writer_index;
  }

  pub fn set_reader_index(&mut self, reader_index: usize) {
    self.set_index(reader_index, self.writer_index);
  }

  pub fn set_writer_index(&mut self, writer_index: usize) {
    self.set_index(self.reader_index, writer_index);
  }

  #[inline]
  pub fn readable_bytes(&self) -> usize {
    self.writer_index - self.reader_index
  }

  #[inline]
  pub fn writable_bytes(&self) -> usize {
    self.length - self.writer_index
  }

  pub fn clear(&mut self) {
    self.reader_index = 0;
    self.writer_index = 0;
  }

  #[inline]
  pub fn as_ptr(&self) -> *const u8 {
    let allocation = self.allocation();
    unsafe { allocation.memory.block().as_ptr().add(allocation.offset) }
  }

  pub fn as_slice(&self) -> &[u8] {
    // The range lies inside the mapping and belongs to this region alone.
    unsafe { core::slice::from_raw_parts(self.as_ptr(), self.length) }
  }

  pub fn as_mut_slice(&mut self) -> &mut [u8] {
    let length = self.length;
    let ptr = self.as_ptr() as *mut u8;
    unsafe { core::slice::from_raw_parts_mut(ptr, length) }
  }

  /// Returns the range right away.
  pub fn release(self) {
    drop(self);
  }
}

impl<S> Drop for Region<S>
where
  S: System,
{
  fn drop(&mut self) {
    if let Some(allocation) = self.allocation.take() {
      self.arena.free(allocation, self.cache.as_deref());
    }
  }
}

impl<S> fmt::Debug for Region<S>
where
  S: System,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Region")
      .field("kind", &S::KIND)
      .field("allocation", &self.allocation)
      .field("capacity", &self.length)
      .field("max_capacity", &self.max_capacity)
      .field("reader_index", &self.reader_index)
      .field("writer_index", &self.writer_index)
      .field("cached", &self.cache.is_some())
      .finish()
  }
}
