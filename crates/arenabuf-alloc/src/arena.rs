use core::{
  fmt,
  sync::atomic::{
    AtomicUsize,
    Ordering,
  },
};
use std::sync::Arc;

use arenabuf_list::List;
use arenabuf_sys::{
  Mapping,
  System,
  SystemKind,
  prelude::*,
};
use spin::Mutex;

use crate::{
  chunk::{
    Chunk,
    ChunkId,
    Chunks,
    Geometry,
  },
  chunk_list::{
    ChunkLists,
    ListKind,
  },
  classes::{
    SizeClass,
    SizeClasses,
  },
  config::ArenaConfig,
  error::{
    AllocError,
    AllocResult,
  },
  handle::Handle,
  metrics::{
    ArenaMetrics,
    ChunkListMetric,
    ChunkMetric,
    ClassCounts,
    SubpageMetric,
  },
  region::{
    Allocation,
    Owner,
    Region,
  },
  slab::{
    PageRef,
    SlabPools,
  },
  tcache::ThreadCache,
};

/// Everything the arena lock guards.
struct ArenaState<S>
where
  S: System,
{
  chunks: Chunks<S>,
  lists: ChunkLists,
  pools: SlabPools,
  allocations_normal: usize,
  deallocations: [usize; 3],
  active_bytes: [usize; 3],
}

impl<S> ArenaState<S>
where
  S: System,
{
  #[inline]
  fn slot(class: SizeClass) -> usize {
    match class {
      SizeClass::Tiny => 0,
      SizeClass::Small => 1,
      SizeClass::Normal => 2,
      SizeClass::Huge => unreachable!("huge regions are not pooled"),
    }
  }

  fn allocation(&self, id: ChunkId, handle: Handle) -> Allocation<S> {
    let chunk = self.chunks.get(id);
    let (offset, max_length) = chunk.locate(handle);
    Allocation {
      memory: Arc::clone(chunk.memory()),
      owner: Owner::Pooled { chunk: id, handle },
      offset,
      max_length,
    }
  }

  fn chunk_metric(&self, id: ChunkId) -> ChunkMetric {
    let chunk = self.chunks.get(id);
    ChunkMetric::new(chunk.usage(), chunk.chunk_size(), chunk.free_bytes())
  }

  fn subpage_metric(&self, key: PageRef) -> SubpageMetric {
    let slab = self.chunks.slab(key);
    SubpageMetric::new(
      slab.elem_size(),
      slab.max_elems(),
      slab.num_avail(),
      slab.page_size(),
    )
  }
}

/// A pool of chunks and huge regions backed by one [`System`].
///
/// Pooled sizes are served from chunks kept in six occupancy lists, sub-page
/// sizes from slab pages carved out of those chunks. Sizes above the chunk
/// size get a mapping of their own. An optional [`ThreadCache`] sits in front
/// of the pooled paths.
///
/// All chunk and list state sits behind one spin lock; tiny, small and huge
/// allocation counts are kept in atomics next to it.
pub struct Arena<S>
where
  S: System,
{
  system: S,
  classes: SizeClasses,
  geometry: Geometry,
  state: Mutex<ArenaState<S>>,
  allocations_tiny: AtomicUsize,
  allocations_small: AtomicUsize,
  allocations_huge: AtomicUsize,
  deallocations_huge: AtomicUsize,
  active_bytes_huge: AtomicUsize,
  thread_caches: AtomicUsize,
}

impl<S> Arena<S>
where
  S: System,
{
  pub fn new(system: S, config: ArenaConfig) -> AllocResult<Arc<Self>> {
    config.validate()?;
    let classes = SizeClasses::new(&config);
    let geometry = Geometry::new(&config);

    Ok(Arc::new(Self {
      system,
      classes,
      geometry,
      state: Mutex::new(ArenaState {
        chunks: Chunks::new(),
        lists: ChunkLists::new(geometry.chunk_size()),
        pools: SlabPools::new(&classes),
        allocations_normal: 0,
        deallocations: [0; 3],
        active_bytes: [0; 3],
      }),
      allocations_tiny: AtomicUsize::new(0),
      allocations_small: AtomicUsize::new(0),
      allocations_huge: AtomicUsize::new(0),
      deallocations_huge: AtomicUsize::new(0),
      active_bytes_huge: AtomicUsize::new(0),
      thread_caches: AtomicUsize::new(0),
    }))
  }

  #[inline]
  pub fn kind(&self) -> SystemKind {
    S::KIND
  }

  #[inline]
  pub fn system(&self) -> &S {
    &self.system
  }

  #[inline]
  pub fn classes(&self) -> &SizeClasses {
    &self.classes
  }

  #[inline]
  pub fn geometry(&self) -> &Geometry {
    &self.geometry
  }

  pub fn num_thread_caches(&self) -> usize {
    self.thread_caches.load(Ordering::Relaxed)
  }

  pub(crate) fn thread_cache_opened(&self) {
    self.thread_caches.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn thread_cache_closed(&self) {
    self.thread_caches.fetch_sub(1, Ordering::Relaxed);
  }

  /// Hands out a region of `requested` bytes that may later grow up to
  /// `max_capacity`.
  ///
  /// `cache` must belong to this arena. Errors leave the arena untouched,
  /// except for a failed mapping of a new chunk.
  pub fn allocate(
    self: &Arc<Self>,
    cache: Option<&Arc<ThreadCache<S>>>,
    requested: usize,
    max_capacity: usize,
  ) -> AllocResult<Region<S>> {
    if requested > max_capacity {
      return Err(AllocError::InvalidCapacity {
        requested,
        max: max_capacity,
      });
    }
    if let Some(cache) = cache {
      assert!(
        Arc::ptr_eq(cache.arena(), self),
        "thread cache belongs to another arena"
      );
    }

    let normalized = self.normalize(requested)?;
    let allocation = self.allocate_normalized(cache.map(Arc::as_ref), normalized)?;
    Ok(Region::new(
      Arc::clone(self),
      allocation,
      requested,
      max_capacity,
      cache.cloned(),
    ))
  }

  /// Normalized size actually reserved for `requested`; zero-length regions
  /// take the smallest slot.
  fn normalize(&self, requested: usize) -> AllocResult<usize> {
    let normalized = self.classes.normalize(requested)?;
    Ok(normalized.max(self.classes.min_element()))
  }

  fn allocate_normalized(
    &self,
    cache: Option<&ThreadCache<S>>,
    normalized: usize,
  ) -> AllocResult<Allocation<S>> {
    let class = self.classes.classify(normalized);
    if class == SizeClass::Huge {
      return self.allocate_huge(normalized);
    }

    if let Some(allocation) = cache.and_then(|cache| cache.take(class, normalized)) {
      return Ok(allocation);
    }

    let allocation = {
      let mut guard = self.state.lock();
      let state = &mut *guard;

      let (id, handle) = match class {
        SizeClass::Tiny | SizeClass::Small => match state.pools.pool(normalized).head() {
          Some(key) => {
            let handle = state
              .chunks
              .allocate_slot(key, &mut state.pools)
              .expect("pooled slab page has a free slot");
            (key.chunk, handle)
          }
          None => self.allocate_normal(state, normalized)?,
        },
        _ => {
          let found = self.allocate_normal(state, normalized)?;
          state.allocations_normal += 1;
          found
        }
      };

      state.active_bytes[ArenaState::<S>::slot(class)] += normalized;
      state.allocation(id, handle)
    };

    let counter = match class {
      SizeClass::Tiny => Some(&self.allocations_tiny),
      SizeClass::Small => Some(&self.allocations_small),
      _ => None,
    };
    if let Some(counter) = counter {
      counter.fetch_add(1, Ordering::Relaxed);
    }
    Ok(allocation)
  }

  /// Finds room in the listed chunks or maps a new chunk into qInit.
  fn allocate_normal(
    &self,
    state: &mut ArenaState<S>,
    normalized: usize,
  ) -> AllocResult<(ChunkId, Handle)> {
    if let Some(found) = state
      .lists
      .allocate(&mut state.chunks, &mut state.pools, normalized)
    {
      return Ok(found);
    }

    let chunk = Chunk::map(self.system.clone(), self.geometry).inspect_err(|err| {
      tracing::warn!(
        kind = %S::KIND,
        chunk_size = self.geometry.chunk_size(),
        %err,
        "failed to map chunk"
      )
    })?;
    let id = state.chunks.insert(chunk);
    tracing::debug!(
      kind = %S::KIND,
      chunk = id.index(),
      chunk_size = self.geometry.chunk_size(),
      "mapped chunk"
    );

    let handle = state
      .chunks
      .allocate(id, normalized, &mut state.pools)
      .expect("fresh chunk fits any pooled size");
    state.lists.add(ListKind::QInit, &mut state.chunks, id);
    Ok((id, handle))
  }

  fn allocate_huge(&self, size: usize) -> AllocResult<Allocation<S>> {
    let alignment = self.classes.alignment();
    let memory = Mapping::new(self.system.clone(), size + alignment)
      .inspect_err(|err| tracing::warn!(kind = %S::KIND, size, %err, "failed to map huge region"))?;
    let offset = match alignment {
      0 => 0,
      _ => align_offset(memory.block().addr(), alignment).unwrap_or(0),
    };

    self.allocations_huge.fetch_add(1, Ordering::Relaxed);
    self.active_bytes_huge.fetch_add(size, Ordering::Relaxed);
    tracing::debug!(kind = %S::KIND, size, "mapped huge region");

    Ok(Allocation {
      memory: Arc::new(memory),
      owner: Owner::Unpooled,
      offset,
      max_length: size,
    })
  }

  /// Takes back a released allocation, parking pooled ones in `cache` when
  /// it has room.
  pub(crate) fn free(&self, allocation: Allocation<S>, cache: Option<&ThreadCache<S>>) {
    if !allocation.is_pooled() {
      self.deallocations_huge.fetch_add(1, Ordering::Relaxed);
      self
        .active_bytes_huge
        .fetch_sub(allocation.max_length, Ordering::Relaxed);
      tracing::debug!(kind = %S::KIND, size = allocation.max_length, "released huge region");
      return;
    }

    let class = self.classes.classify(allocation.max_length);
    let allocation = match cache {
      Some(cache) => match cache.add(class, allocation) {
        Ok(()) => return,
        Err(rejected) => rejected,
      },
      None => allocation,
    };
    self.free_pooled(class, allocation);
  }

  /// Reclaims an allocation evicted from a thread cache.
  pub(crate) fn free_cached(&self, allocation: Allocation<S>) {
    let class = self.classes.classify(allocation.max_length);
    self.free_pooled(class, allocation);
  }

  fn free_pooled(&self, class: SizeClass, allocation: Allocation<S>) {
    let Owner::Pooled { chunk: id, handle } = allocation.owner else {
      unreachable!("unpooled allocations never reach the chunk lists");
    };

    let destroyed = {
      let mut guard = self.state.lock();
      let state = &mut *guard;

      let slot = ArenaState::<S>::slot(class);
      state.deallocations[slot] += 1;
      state.active_bytes[slot] -= allocation.max_length;

      if state
        .lists
        .free(&mut state.chunks, &mut state.pools, id, handle)
      {
        None
      } else {
        Some(state.chunks.remove(id))
      }
    };

    drop(allocation);
    if let Some(chunk) = destroyed {
      tracing::debug!(
        kind = %S::KIND,
        chunk = id.index(),
        chunk_size = chunk.chunk_size(),
        "destroying empty chunk"
      );
      drop(chunk);
    }
  }

  /// Moves `region` to a new allocation of `new_capacity` bytes.
  ///
  /// Growing copies the whole old capacity. Shrinking copies the readable
  /// bytes that still fit and clamps the indexes; when the reader index lies
  /// past the new capacity both indexes move to it. With `free_old` unset the
  /// previous allocation is returned as its own region.
  pub fn reallocate(
    self: &Arc<Self>,
    region: &mut Region<S>,
    new_capacity: usize,
    free_old: bool,
  ) -> AllocResult<Option<Region<S>>> {
    assert!(
      Arc::ptr_eq(region.arena(), self),
      "region belongs to another arena"
    );

    let max_capacity = region.max_capacity();
    if new_capacity > max_capacity {
      return Err(AllocError::InvalidCapacity {
        requested: new_capacity,
        max: max_capacity,
      });
    }

    let old_capacity = region.capacity();
    if new_capacity == old_capacity {
      return Ok(None);
    }

    let cache = region.cache().cloned();
    let normalized = self.normalize(new_capacity)?;
    let allocation = self.allocate_normalized(cache.as_deref(), normalized)?;

    let mut reader_index = region.reader_index();
    let mut writer_index = region.writer_index();
    let (old, old_length, old_cache) = region.replace(allocation, new_capacity, cache);

    if new_capacity > old_capacity {
      old.copy_to(0, region.allocation_ref(), 0, old_capacity);
    } else if reader_index < new_capacity {
      writer_index = writer_index.min(new_capacity);
      old.copy_to(
        reader_index,
        region.allocation_ref(),
        reader_index,
        writer_index - reader_index,
      );
    } else {
      reader_index = new_capacity;
      writer_index = new_capacity;
    }
    region.set_index(reader_index, writer_index);

    let old = Region::new(Arc::clone(self), old, old_length, max_capacity, old_cache);
    if free_old {
      old.release();
      return Ok(None);
    }
    Ok(Some(old))
  }

  /// Takes a consistent snapshot of the arena's counters and lists.
  pub fn metrics(&self) -> ArenaMetrics {
    let state = self.state.lock();

    let chunk_lists = state
      .lists
      .iter()
      .map(|list| {
        let chunks = list
          .iter(&state.chunks)
          .map(|id| state.chunk_metric(id))
          .collect();
        ChunkListMetric::new(list.kind(), chunks)
      })
      .collect();

    let subpages = |pools: &[List<PageRef>]| -> Vec<Vec<SubpageMetric>> {
      pools
        .iter()
        .map(|pool| {
          pool
            .iter(&state.chunks)
            .map(|key| state.subpage_metric(key))
            .collect()
        })
        .collect()
    };
    let tiny_subpages = subpages(state.pools.tiny());
    let small_subpages = subpages(state.pools.small());

    let active_bytes_huge = self.active_bytes_huge.load(Ordering::Relaxed);
    let allocations = ClassCounts::new(
      self.allocations_tiny.load(Ordering::Relaxed),
      self.allocations_small.load(Ordering::Relaxed),
      state.allocations_normal,
      self.allocations_huge.load(Ordering::Relaxed),
    );
    let deallocations = ClassCounts::new(
      state.deallocations[0],
      state.deallocations[1],
      state.deallocations[2],
      self.deallocations_huge.load(Ordering::Relaxed),
    );
    let active_bytes = ClassCounts::new(
      state.active_bytes[0],
      state.active_bytes[1],
      state.active_bytes[2],
      active_bytes_huge,
    );
    let resident_bytes = state.chunks.len() * self.geometry.chunk_size() + active_bytes_huge;

    ArenaMetrics::new(
      S::KIND,
      self.num_thread_caches(),
      chunk_lists,
      tiny_subpages,
      small_subpages,
      allocations,
      deallocations,
      active_bytes,
      resident_bytes,
    )
  }
}

impl<S> fmt::Display for Arena<S>
where
  S: System,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(&self.metrics(), f)
  }
}

impl<S> fmt::Debug for Arena<S>
where
  S: System,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Arena")
      .field("kind", &S::KIND)
      .field("classes", &self.classes)
      .field("thread_caches", &self.num_thread_caches())
      .finish_non_exhaustive()
  }
}
