use core::fmt;

use arenabuf_list::{
  Linked,
  List,
  ListIter,
};
use arenabuf_sys::System;
use getset::CopyGetters;

use crate::{
  chunk::{
    ChunkId,
    Chunks,
  },
  handle::Handle,
  slab::SlabPools,
};

/// The six occupancy bands, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
  QInit,
  Q000,
  Q025,
  Q050,
  Q075,
  Q100,
}

impl ListKind {
  pub const ALL: [ListKind; 6] = [
    ListKind::QInit,
    ListKind::Q000,
    ListKind::Q025,
    ListKind::Q050,
    ListKind::Q075,
    ListKind::Q100,
  ];

  /// Order in which lists are searched for a normal allocation.
  pub const SEARCH: [ListKind; 5] = [
    ListKind::Q050,
    ListKind::Q025,
    ListKind::Q000,
    ListKind::QInit,
    ListKind::Q075,
  ];

  #[inline]
  pub const fn index(self) -> usize {
    self as usize
  }

  /// `(min_usage, max_usage)` in percent.
  pub const fn bounds(self) -> (usize, usize) {
    match self {
      ListKind::QInit => (0, 25),
      ListKind::Q000 => (1, 50),
      ListKind::Q025 => (25, 75),
      ListKind::Q050 => (50, 100),
      ListKind::Q075 => (75, 100),
      ListKind::Q100 => (100, usize::MAX),
    }
  }

  pub const fn next(self) -> Option<ListKind> {
    match self {
      ListKind::QInit => Some(ListKind::Q000),
      ListKind::Q000 => Some(ListKind::Q025),
      ListKind::Q025 => Some(ListKind::Q050),
      ListKind::Q050 => Some(ListKind::Q075),
      ListKind::Q075 => Some(ListKind::Q100),
      ListKind::Q100 => None,
    }
  }

  /// Where a chunk goes when its usage drops below this band. `None` means
  /// the chunk is destroyed; qInit points at itself so its chunks survive.
  pub const fn prev(self) -> Option<ListKind> {
    match self {
      ListKind::QInit => Some(ListKind::QInit),
      ListKind::Q000 => None,
      ListKind::Q025 => Some(ListKind::Q000),
      ListKind::Q050 => Some(ListKind::Q025),
      ListKind::Q075 => Some(ListKind::Q050),
      ListKind::Q100 => Some(ListKind::Q075),
    }
  }

  /// Label used when rendering an arena.
  pub const fn label(self) -> &'static str {
    match self {
      ListKind::QInit => "0~25%",
      ListKind::Q000 => "0~50%",
      ListKind::Q025 => "25~75%",
      ListKind::Q050 => "50~100%",
      ListKind::Q075 => "75~100%",
      ListKind::Q100 => "100%",
    }
  }
}

impl fmt::Display for ListKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

#[derive(Debug, Clone, Copy, CopyGetters)]
pub struct ChunkList {
  #[getset(get_copy = "pub")]
  kind: ListKind,
  #[getset(get_copy = "pub")]
  min_usage: usize,
  #[getset(get_copy = "pub")]
  max_usage: usize,
  /// Largest request a chunk of this band can still satisfy.
  #[getset(get_copy = "pub")]
  max_capacity: usize,
  chunks: List<ChunkId>,
}

impl ChunkList {
  pub fn new(kind: ListKind, chunk_size: usize) -> Self {
    let (min_usage, max_usage) = kind.bounds();
    Self {
      kind,
      min_usage,
      max_usage,
      max_capacity: Self::calculate_max_capacity(min_usage, chunk_size),
      chunks: List::new(),
    }
  }

  const fn calculate_max_capacity(min_usage: usize, chunk_size: usize) -> usize {
    let min_usage = if min_usage < 1 { 1 } else { min_usage };
    if min_usage >= 100 {
      return 0;
    }
    chunk_size * (100 - min_usage) / 100
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.chunks.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.chunks.is_empty()
  }

  pub fn iter<'a, S>(&self, chunks: &'a Chunks<S>) -> ListIter<'a, ChunkId, Chunks<S>>
  where
    S: System,
  {
    self.chunks.iter(chunks)
  }
}

/// The six chunk lists of an arena wired into a chain.
#[derive(Debug)]
pub struct ChunkLists {
  lists: [ChunkList; 6],
}

impl ChunkLists {
  pub fn new(chunk_size: usize) -> Self {
    Self {
      lists: ListKind::ALL.map(|kind| ChunkList::new(kind, chunk_size)),
    }
  }

  #[inline]
  pub fn get(&self, kind: ListKind) -> &ChunkList {
    &self.lists[kind.index()]
  }

  #[inline]
  fn get_mut(&mut self, kind: ListKind) -> &mut ChunkList {
    &mut self.lists[kind.index()]
  }

  pub fn iter(&self) -> impl Iterator<Item = &ChunkList> {
    self.lists.iter()
  }

  /// Tries every list in search order and returns the chunk that satisfied
  /// the request.
  pub fn allocate<S>(
    &mut self,
    chunks: &mut Chunks<S>,
    pools: &mut SlabPools,
    normalized: usize,
  ) -> Option<(ChunkId, Handle)>
  where
    S: System,
  {
    ListKind::SEARCH
      .into_iter()
      .find_map(|kind| self.allocate_from(kind, chunks, pools, normalized))
  }

  fn allocate_from<S>(
    &mut self,
    kind: ListKind,
    chunks: &mut Chunks<S>,
    pools: &mut SlabPools,
    normalized: usize,
  ) -> Option<(ChunkId, Handle)>
  where
    S: System,
  {
    let list = self.get(kind);
    if list.is_empty() || normalized > list.max_capacity {
      return None;
    }
    let max_usage = list.max_usage;

    let mut cursor = list.chunks.head();
    while let Some(id) = cursor {
      cursor = chunks.link(id).next();
      if let Some(handle) = chunks.allocate(id, normalized, pools) {
        if chunks.get(id).usage() >= max_usage {
          self.remove(kind, chunks, id);
          if let Some(next) = kind.next() {
            self.add(next, chunks, id);
          }
        }
        return Some((id, handle));
      }
    }
    None
  }

  /// Frees `handle` inside chunk `id` and moves the chunk down the chain if
  /// its usage left the band. Returns `false` when the chunk fell off the
  /// chain and must be destroyed.
  pub fn free<S>(
    &mut self,
    chunks: &mut Chunks<S>,
    pools: &mut SlabPools,
    id: ChunkId,
    handle: Handle,
  ) -> bool
  where
    S: System,
  {
    chunks.free(id, handle, pools);

    let kind = chunks.get(id).list().expect("pooled chunk belongs to a list");
    if chunks.get(id).usage() < self.get(kind).min_usage {
      self.remove(kind, chunks, id);
      return self.move_down(kind, chunks, id);
    }
    true
  }

  /// Inserts a chunk into `kind`, cascading upwards while its usage is too
  /// high for the band.
  pub fn add<S>(&mut self, kind: ListKind, chunks: &mut Chunks<S>, id: ChunkId)
  where
    S: System,
  {
    let mut kind = kind;
    while chunks.get(id).usage() >= self.get(kind).max_usage {
      match kind.next() {
        Some(next) => kind = next,
        None => break,
      }
    }
    self.add0(kind, chunks, id);
  }

  fn add0<S>(&mut self, kind: ListKind, chunks: &mut Chunks<S>, id: ChunkId)
  where
    S: System,
  {
    chunks.get_mut(id).list = Some(kind);
    self.get_mut(kind).chunks.push_front(chunks, id);
  }

  fn remove<S>(&mut self, kind: ListKind, chunks: &mut Chunks<S>, id: ChunkId)
  where
    S: System,
  {
    self.get_mut(kind).chunks.remove(chunks, id);
    chunks.get_mut(id).list = None;
  }

  /// Hands an unlisted chunk to the band below `from`, cascading downwards.
  fn move_down<S>(&mut self, from: ListKind, chunks: &mut Chunks<S>, id: ChunkId) -> bool
  where
    S: System,
  {
    let mut kind = from;
    loop {
      let Some(prev) = kind.prev() else {
        assert_eq!(chunks.get(id).usage(), 0, "destroying a chunk in use");
        return false;
      };

      let usage = chunks.get(id).usage();
      let target = self.get(prev);
      assert!(usage < target.max_usage, "chunk usage above its target band");
      if usage < target.min_usage {
        kind = prev;
        continue;
      }

      tracing::trace!(chunk = id.index(), usage, from = %from, to = %prev, "chunk moved down");
      self.add0(prev, chunks, id);
      return true;
    }
  }
}

#[cfg(test)]
mod tests {
  use arenabuf_sys::HeapSystem;

  use super::*;
  use crate::{
    chunk::{
      Chunk,
      Geometry,
    },
    classes::SizeClasses,
    config::ArenaConfig,
  };

  const PAGE: usize = 4096;

  struct Fixture {
    lists: ChunkLists,
    chunks: Chunks<HeapSystem>,
    pools: SlabPools,
    geometry: Geometry,
  }

  impl Fixture {
    fn new() -> Self {
      let config = ArenaConfig::new(PAGE, 4, 0);
      Self {
        lists: ChunkLists::new(config.chunk_size()),
        chunks: Chunks::new(),
        pools: SlabPools::new(&SizeClasses::new(&config)),
        geometry: Geometry::new(&config),
      }
    }

    fn chunk_size(&self) -> usize {
      self.geometry.chunk_size()
    }

    fn allocate(&mut self, size: usize) -> (ChunkId, Handle) {
      if let Some(found) = self.lists.allocate(&mut self.chunks, &mut self.pools, size) {
        return found;
      }
      let id = self
        .chunks
        .insert(Chunk::map(HeapSystem, self.geometry).unwrap());
      let handle = self
        .chunks
        .allocate(id, size, &mut self.pools)
        .unwrap();
      self.lists.add(ListKind::QInit, &mut self.chunks, id);
      (id, handle)
    }

    fn free(&mut self, id: ChunkId, handle: Handle) -> bool {
      self
        .lists
        .free(&mut self.chunks, &mut self.pools, id, handle)
    }

    fn kind(&self, id: ChunkId) -> Option<ListKind> {
      self.chunks.get(id).list()
    }

    fn assert_bands(&self) {
      for list in self.lists.iter() {
        for id in list.iter(&self.chunks) {
          let usage = self.chunks.get(id).usage();
          assert_eq!(self.chunks.get(id).list(), Some(list.kind()));
          if list.kind() != ListKind::QInit {
            assert!(usage >= list.min_usage(), "{usage} below {:?}", list.kind());
          }
          assert!(usage < list.max_usage(), "{usage} above {:?}", list.kind());
        }
      }
    }
  }

  #[test]
  fn test_bounds_and_capacity() {
    let size = 16 * PAGE;
    let q_init = ChunkList::new(ListKind::QInit, size);
    assert_eq!(q_init.max_capacity(), size * 99 / 100);
    let q050 = ChunkList::new(ListKind::Q050, size);
    assert_eq!(q050.max_capacity(), size / 2);
    let q100 = ChunkList::new(ListKind::Q100, size);
    assert_eq!(q100.max_capacity(), 0);
  }

  #[test]
  fn test_chain_wiring() {
    assert_eq!(ListKind::QInit.prev(), Some(ListKind::QInit));
    assert_eq!(ListKind::Q000.prev(), None);
    assert_eq!(ListKind::Q100.next(), None);
    for pair in ListKind::ALL.windows(2) {
      assert_eq!(pair[0].next(), Some(pair[1]));
    }
  }

  #[test]
  fn test_new_chunk_lands_in_qinit() {
    let mut fx = Fixture::new();
    let (id, _) = fx.allocate(PAGE);
    assert_eq!(fx.kind(id), Some(ListKind::QInit));
    fx.assert_bands();
  }

  #[test]
  fn test_chunk_migrates_up_and_down() {
    let mut fx = Fixture::new();
    let (id, _) = fx.allocate(PAGE);

    let mut handles = Vec::new();
    for _ in 0..7 {
      let (same, handle) = fx.allocate(PAGE);
      assert_eq!(same, id);
      handles.push(handle);
    }
    // 8 of 16 pages in use.
    assert_eq!(fx.chunks.get(id).usage(), 50);
    assert_eq!(fx.kind(id), Some(ListKind::Q025));
    fx.assert_bands();

    for _ in 0..5 {
      handles.push(fx.allocate(PAGE).1);
    }
    assert_eq!(fx.chunks.get(id).usage(), 82);
    assert_eq!(fx.kind(id), Some(ListKind::Q050));
    fx.assert_bands();

    for handle in handles.drain(6..) {
      assert!(fx.free(id, handle));
    }
    assert_eq!(fx.chunks.get(id).usage(), 44);
    assert_eq!(fx.kind(id), Some(ListKind::Q025));
    fx.assert_bands();
  }

  #[test]
  fn test_full_chunk_reaches_q100() {
    let mut fx = Fixture::new();
    let (id, handle) = fx.allocate(16 * PAGE);
    assert_eq!(fx.kind(id), Some(ListKind::Q100));

    let (other, _) = fx.allocate(PAGE);
    assert_ne!(other, id, "full chunk is never searched");

    assert!(!fx.free(id, handle), "emptied chunk cascades off the chain");
    assert_eq!(fx.kind(id), None);
    drop(fx.chunks.remove(id));
    fx.assert_bands();
  }

  #[test]
  fn test_qinit_chunk_survives_empty() {
    let mut fx = Fixture::new();
    let (id, handle) = fx.allocate(PAGE);
    assert!(fx.free(id, handle));
    assert_eq!(fx.kind(id), Some(ListKind::QInit));
    assert_eq!(fx.chunks.get(id).usage(), 0);
  }

  #[test]
  fn test_q000_chunk_destroyed_when_empty() {
    let mut fx = Fixture::new();
    let (id, first) = fx.allocate(8 * PAGE);
    assert_eq!(fx.kind(id), Some(ListKind::Q025));

    let (same, second) = fx.allocate(4 * PAGE);
    assert_eq!(same, id);
    assert_eq!(fx.kind(id), Some(ListKind::Q050));

    assert!(fx.free(id, first));
    assert_eq!(fx.chunks.get(id).usage(), 25);
    assert_eq!(fx.kind(id), Some(ListKind::Q025));

    assert!(!fx.free(id, second), "empty chunk falls off the chain below q000");
    assert_eq!(fx.kind(id), None);
    drop(fx.chunks.remove(id));
    assert!(fx.chunks.is_empty());
  }

  #[test]
  fn test_fuller_lists_searched_first() {
    let mut fx = Fixture::new();
    let (a, _) = fx.allocate(8 * PAGE);
    fx.allocate(4 * PAGE);
    assert_eq!(fx.kind(a), Some(ListKind::Q050));

    let (b, _) = fx.allocate(8 * PAGE);
    assert_ne!(a, b);
    assert_eq!(fx.kind(b), Some(ListKind::Q025));

    let (chosen, _) = fx.allocate(PAGE);
    assert_eq!(chosen, a, "q050 is searched before q025");
    fx.assert_bands();
  }

  #[test]
  fn test_search_walks_past_fragmented_head() {
    let mut fx = Fixture::new();
    let (roomy, _) = fx.allocate(8 * PAGE);
    let (same, _) = fx.allocate(4 * PAGE);
    assert_eq!(same, roomy);
    assert_eq!(fx.kind(roomy), Some(ListKind::Q050));

    // Every other page of the first half free: 75% used, no two-page run.
    let fragmented = fx
      .chunks
      .insert(Chunk::map(HeapSystem, fx.geometry).unwrap());
    let handles: Vec<_> = (0..16)
      .map(|_| fx.chunks.allocate(fragmented, PAGE, &mut fx.pools).unwrap())
      .collect();
    for &handle in handles.iter().step_by(2).take(4) {
      fx.chunks.free(fragmented, handle, &mut fx.pools);
    }
    fx.lists.add(ListKind::QInit, &mut fx.chunks, fragmented);
    assert_eq!(fx.chunks.get(fragmented).usage(), 75);
    assert_eq!(fx.kind(fragmented), Some(ListKind::Q050));
    assert_eq!(fx.lists.get(ListKind::Q050).chunks.head(), Some(fragmented));

    let (chosen, _) = fx.allocate(2 * PAGE);
    assert_eq!(chosen, roomy);
    assert_eq!(fx.chunks.get(fragmented).usage(), 75);
    assert_eq!(fx.lists.get(ListKind::Q050).len(), 2);
    fx.assert_bands();
  }
}
