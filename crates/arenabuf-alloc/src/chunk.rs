use std::sync::Arc;

use arenabuf_list::{
  Link,
  Linked,
};
use arenabuf_sys::{
  Mapping,
  System,
  prelude::*,
};
use getset::CopyGetters;

use crate::{
  chunk_list::ListKind,
  config::ArenaConfig,
  error::AllocResult,
  handle::Handle,
  slab::{
    PageRef,
    SlabPage,
    SlabPools,
    SlotFree,
  },
};

/// Slot of a chunk in its arena's chunk table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(pub(crate) usize);

impl ChunkId {
  #[inline]
  pub const fn index(self) -> usize {
    self.0
  }
}

/// Shape shared by every chunk of an arena.
#[derive(Debug, Clone, Copy, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct Geometry {
  page_size: usize,
  page_shifts: usize,
  max_order: usize,
  chunk_size: usize,
  alignment: usize,
}

impl Geometry {
  pub fn new(config: &ArenaConfig) -> Self {
    Self {
      page_size: config.page_size(),
      page_shifts: config.page_shifts(),
      max_order: config.max_order(),
      chunk_size: config.chunk_size(),
      alignment: config.alignment(),
    }
  }

  #[inline]
  const fn log2_chunk_size(&self) -> usize {
    self.chunk_size.trailing_zeros() as usize
  }

  #[inline]
  const fn pages(&self) -> usize {
    1 << self.max_order
  }

  #[inline]
  const fn unusable(&self) -> u8 {
    (self.max_order + 1) as u8
  }
}

/// A contiguous block split into `2^max_order` pages handed out by a buddy
/// tree.
///
/// `memory_map[id]` is the depth of the shallowest completely free node below
/// `id` (the node itself counts). A free node stores its own depth, a node with
/// nothing left stores `max_order + 1`. Node 1 is the root, the children of
/// `id` are `2 * id` and `2 * id + 1`.
pub struct Chunk<S>
where
  S: System,
{
  memory: Arc<Mapping<S>>,
  offset: usize,
  geometry: Geometry,
  memory_map: Box<[u8]>,
  depth_map: Box<[u8]>,
  slabs: Box<[Option<SlabPage>]>,
  free_bytes: usize,
  pub(crate) link: Link<ChunkId>,
  pub(crate) list: Option<ListKind>,
}

impl<S> Chunk<S>
where
  S: System,
{
  /// Maps a fresh chunk. With an alignment configured the mapping carries
  /// enough slack to start the usable range on an aligned address.
  pub fn map(system: S, geometry: Geometry) -> AllocResult<Self> {
    let size = geometry.chunk_size + geometry.alignment;
    let memory = Arc::new(Mapping::new(system, size)?);
    let offset = if geometry.alignment == 0 {
      0
    } else {
      align_offset(memory.block().addr(), geometry.alignment).unwrap_or(0)
    };
    Ok(Self::with_memory(memory, offset, geometry))
  }

  pub fn with_memory(memory: Arc<Mapping<S>>, offset: usize, geometry: Geometry) -> Self {
    assert!(
      offset + geometry.chunk_size <= memory.len(),
      "chunk does not fit its mapping"
    );

    let nodes = geometry.pages() << 1;
    let mut memory_map = vec![0u8; nodes].into_boxed_slice();
    let mut id = 1;
    for depth in 0..=geometry.max_order {
      for _ in 0..(1usize << depth) {
        memory_map[id] = depth as u8;
        id += 1;
      }
    }
    let depth_map = memory_map.clone();

    Self {
      memory,
      offset,
      geometry,
      memory_map,
      depth_map,
      slabs: (0..geometry.pages()).map(|_| None).collect(),
      free_bytes: geometry.chunk_size,
      link: Link::default(),
      list: None,
    }
  }

  #[inline]
  pub fn memory(&self) -> &Arc<Mapping<S>> {
    &self.memory
  }

  #[inline]
  pub fn offset(&self) -> usize {
    self.offset
  }

  #[inline]
  pub fn chunk_size(&self) -> usize {
    self.geometry.chunk_size
  }

  #[inline]
  pub fn free_bytes(&self) -> usize {
    self.free_bytes
  }

  #[inline]
  pub fn list(&self) -> Option<ListKind> {
    self.list
  }

  /// Occupancy in percent.
  pub fn usage(&self) -> usize {
    if self.free_bytes == 0 {
      return 100;
    }
    let free_percentage = self.free_bytes * 100 / self.geometry.chunk_size;
    if free_percentage == 0 {
      return 99;
    }
    100 - free_percentage
  }

  #[inline]
  fn value(&self, id: usize) -> u8 {
    self.memory_map[id]
  }

  #[inline]
  fn set_value(&mut self, id: usize, value: u8) {
    self.memory_map[id] = value;
  }

  #[inline]
  fn depth(&self, id: usize) -> u8 {
    self.depth_map[id]
  }

  fn update_parents_alloc(&mut self, mut id: usize) {
    while id > 1 {
      let parent = id >> 1;
      let value = self.value(id).min(self.value(id ^ 1));
      self.set_value(parent, value);
      id = parent;
    }
  }

  fn update_parents_free(&mut self, mut id: usize) {
    let mut log_child = self.depth(id) + 1;
    while id > 1 {
      let parent = id >> 1;
      let left = self.value(id);
      let right = self.value(id ^ 1);
      log_child -= 1;

      if left == log_child && right == log_child {
        self.set_value(parent, log_child - 1);
      } else {
        self.set_value(parent, left.min(right));
      }
      id = parent;
    }
  }

  /// Finds and claims a free node at depth `depth`.
  fn allocate_node(&mut self, depth: usize) -> Option<usize> {
    let d = depth as u8;
    let first = 1usize << depth;

    let mut id = 1;
    let mut value = self.value(id);
    if value > d {
      return None;
    }

    while value < d || id < first {
      id <<= 1;
      value = self.value(id);
      if value > d {
        id ^= 1;
        value = self.value(id);
      }
    }

    assert!(
      value == d && id & !(first - 1) == first,
      "buddy tree is corrupt at node {id}"
    );
    self.set_value(id, self.geometry.unusable());
    self.update_parents_alloc(id);
    Some(id)
  }

  pub fn run_length(&self, id: usize) -> usize {
    1 << (self.geometry.log2_chunk_size() - self.depth(id) as usize)
  }

  pub fn run_offset(&self, id: usize) -> usize {
    let shift = id ^ (1 << self.depth(id));
    shift * self.run_length(id)
  }

  #[inline]
  fn page_idx(&self, id: usize) -> usize {
    id ^ self.geometry.pages()
  }

  /// Claims a run of `normalized` bytes, a power of two between one page and
  /// the chunk size.
  pub fn allocate_run(&mut self, normalized: usize) -> Option<Handle> {
    let pages_log = log2_floor(normalized) - self.geometry.page_shifts;
    let depth = self.geometry.max_order - pages_log;
    let id = self.allocate_node(depth)?;
    self.free_bytes -= self.run_length(id);
    Some(Handle::run(id))
  }

  /// Claims one page and carves it into `elem_size` slots. Returns the page
  /// index; the page is not yet pooled.
  fn allocate_page(&mut self, elem_size: usize) -> Option<usize> {
    let id = self.allocate_node(self.geometry.max_order)?;
    self.free_bytes -= self.geometry.page_size;

    let page = self.page_idx(id);
    let run_offset = self.run_offset(id);
    let page_size = self.geometry.page_size;
    match self.slabs[page].as_mut() {
      Some(slab) => slab.init(elem_size),
      None => self.slabs[page] = Some(SlabPage::new(id, run_offset, page_size, elem_size)),
    }
    Some(page)
  }

  /// Returns the run behind `node` to the tree.
  pub fn free_run(&mut self, id: usize) {
    assert!(
      self.value(id) == self.geometry.unusable(),
      "node {id} is not allocated"
    );
    self.free_bytes += self.run_length(id);
    let depth = self.depth(id);
    self.set_value(id, depth);
    self.update_parents_free(id);
  }

  pub fn slab(&self, page: usize) -> Option<&SlabPage> {
    self.slabs[page].as_ref()
  }

  fn slab_mut(&mut self, page: usize) -> Option<&mut SlabPage> {
    self.slabs[page].as_mut()
  }

  /// Byte offset of `handle` inside the mapping and the length it covers.
  pub fn locate(&self, handle: Handle) -> (usize, usize) {
    let id = handle.node();
    match handle.slot() {
      Some(slot) => {
        let slab = self
          .slab(self.page_idx(id))
          .expect("slab handle points at a carved page");
        (self.offset + slab.slot_offset(slot), slab.elem_size())
      }
      None => (self.offset + self.run_offset(id), self.run_length(id)),
    }
  }
}

/// Chunk table of an arena. Identifiers of destroyed chunks are reused.
pub struct Chunks<S>
where
  S: System,
{
  slots: Vec<Option<Chunk<S>>>,
  vacant: Vec<ChunkId>,
  live: usize,
}

impl<S> Default for Chunks<S>
where
  S: System,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<S> Chunks<S>
where
  S: System,
{
  pub const fn new() -> Self {
    Self {
      slots: Vec::new(),
      vacant: Vec::new(),
      live: 0,
    }
  }

  pub fn insert(&mut self, chunk: Chunk<S>) -> ChunkId {
    self.live += 1;
    match self.vacant.pop() {
      Some(id) => {
        self.slots[id.0] = Some(chunk);
        id
      }
      None => {
        self.slots.push(Some(chunk));
        ChunkId(self.slots.len() - 1)
      }
    }
  }

  pub fn remove(&mut self, id: ChunkId) -> Chunk<S> {
    let chunk = self.slots[id.0].take().expect("removing a vacant chunk slot");
    assert!(!chunk.link.linked(), "removing a chunk that is still listed");
    self.vacant.push(id);
    self.live -= 1;
    chunk
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.live
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.live == 0
  }

  pub fn get(&self, id: ChunkId) -> &Chunk<S> {
    self.slots[id.0].as_ref().expect("chunk id refers to a live chunk")
  }

  pub fn get_mut(&mut self, id: ChunkId) -> &mut Chunk<S> {
    self.slots[id.0].as_mut().expect("chunk id refers to a live chunk")
  }

  pub fn slab(&self, key: PageRef) -> &SlabPage {
    self
      .get(key.chunk)
      .slab(key.page)
      .expect("page ref refers to a carved page")
  }

  fn slab_mut(&mut self, key: PageRef) -> &mut SlabPage {
    self
      .get_mut(key.chunk)
      .slab_mut(key.page)
      .expect("page ref refers to a carved page")
  }

  /// Allocates `normalized` bytes from chunk `id`, carving a new slab page
  /// for sub-page sizes.
  pub fn allocate(
    &mut self,
    id: ChunkId,
    normalized: usize,
    pools: &mut SlabPools,
  ) -> Option<Handle> {
    let chunk = self.get_mut(id);
    if normalized >= chunk.geometry.page_size {
      return chunk.allocate_run(normalized);
    }

    let page = chunk.allocate_page(normalized)?;
    let key = PageRef { chunk: id, page };
    pools.pool_mut(normalized).push_front(self, key);
    let handle = self.allocate_slot(key, pools);
    assert!(handle.is_some(), "fresh slab page has no free slot");
    handle
  }

  /// Takes a slot from a pooled page, unpooling it once exhausted.
  pub fn allocate_slot(&mut self, key: PageRef, pools: &mut SlabPools) -> Option<Handle> {
    let slab = self.slab_mut(key);
    let slot = slab.allocate()?;
    let node = slab.node();
    let elem_size = slab.elem_size();

    if slab.is_exhausted() {
      pools.pool_mut(elem_size).remove(self, key);
    }
    Some(Handle::slab(node, slot))
  }

  /// Gives `handle` back to chunk `id`.
  pub fn free(&mut self, id: ChunkId, handle: Handle, pools: &mut SlabPools) {
    if let Some(slot) = handle.slot() {
      let page = self.get(id).page_idx(handle.node());
      if self.free_slot(PageRef { chunk: id, page }, slot, pools) {
        return;
      }
    }
    self.get_mut(id).free_run(handle.node());
  }

  /// Frees a slab slot. `false` means the page went back to the chunk tree's
  /// caller, who must release its run.
  fn free_slot(&mut self, key: PageRef, slot: usize, pools: &mut SlabPools) -> bool {
    let slab = self.slab_mut(key);
    let elem_size = slab.elem_size();

    match slab.free(slot) {
      SlotFree::Partial => true,
      SlotFree::Refilled => {
        pools.pool_mut(elem_size).push_front(self, key);
        true
      }
      SlotFree::Empty => {
        let pool = pools.pool_mut(elem_size);
        if pool.len() == 1 {
          // Last page of its size stays carved.
          return true;
        }
        self.slab_mut(key).retire();
        pool.remove(self, key);
        false
      }
    }
  }
}

impl<S> Linked<ChunkId> for Chunks<S>
where
  S: System,
{
  fn link(&self, key: ChunkId) -> &Link<ChunkId> {
    &self.get(key).link
  }

  fn link_mut(&mut self, key: ChunkId) -> &mut Link<ChunkId> {
    &mut self.get_mut(key).link
  }
}

impl<S> Linked<PageRef> for Chunks<S>
where
  S: System,
{
  fn link(&self, key: PageRef) -> &Link<PageRef> {
    &self.slab(key).link
  }

  fn link_mut(&mut self, key: PageRef) -> &mut Link<PageRef> {
    &mut self.slab_mut(key).link
  }
}

#[cfg(test)]
mod tests;
