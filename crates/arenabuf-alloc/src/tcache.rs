use core::sync::atomic::{
  AtomicBool,
  AtomicUsize,
  Ordering,
};
use std::sync::Arc;

use arenabuf_ring::{
  Ring,
  RingError,
};
use arenabuf_sys::{
  System,
  prelude::*,
};

use crate::{
  arena::Arena,
  classes::{
    NUM_TINY_POOLS,
    SizeClass,
    SizeClasses,
  },
  config::CacheConfig,
  error::AllocResult,
  region::{
    Allocation,
    Region,
  },
};

/// Freed allocations of one size waiting to be handed out again.
pub struct RegionCache<S>
where
  S: System,
{
  class: SizeClass,
  ring: Ring<Allocation<S>>,
  allocations: AtomicUsize,
}

impl<S> RegionCache<S>
where
  S: System,
{
  fn new(size: usize, class: SizeClass) -> Self {
    Self {
      class,
      ring: Ring::new(next_pow2_saturating(size)),
      allocations: AtomicUsize::new(0),
    }
  }

  #[inline]
  pub fn class(&self) -> SizeClass {
    self.class
  }

  #[inline]
  pub fn capacity(&self) -> usize {
    self.ring.capacity()
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.ring.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.ring.is_empty()
  }

  fn add(&self, allocation: Allocation<S>) -> Result<(), Allocation<S>> {
    self.ring.push(allocation).map_err(RingError::into_inner)
  }

  fn allocate(&self) -> Option<Allocation<S>> {
    let allocation = self.ring.pop()?;
    self.allocations.fetch_add(1, Ordering::Relaxed);
    Some(allocation)
  }

  /// Returns up to `max` queued allocations to `arena`.
  fn free(&self, max: usize, arena: &Arena<S>) -> usize {
    let mut freed = 0;
    while freed < max {
      match self.ring.pop() {
        Some(allocation) => {
          arena.free_cached(allocation);
          freed += 1;
        }
        None => break,
      }
    }
    freed
  }

  /// Evicts what was not reused since the last trim.
  fn trim(&self, arena: &Arena<S>) -> usize {
    let used = self.allocations.swap(0, Ordering::Relaxed);
    let free = self.capacity().saturating_sub(used);
    if free == 0 {
      return 0;
    }
    self.free(free, arena)
  }
}

/// Per-thread front of one arena.
///
/// The owning thread allocates through it; any thread may give regions back
/// to it. Every `trim_interval` allocation attempts the caches are trimmed.
/// [`ThreadCache::free`] or dropping the last reference hands every queued
/// allocation back to the arena.
pub struct ThreadCache<S>
where
  S: System,
{
  arena: Arc<Arena<S>>,
  tiny: Box<[RegionCache<S>]>,
  small: Box<[RegionCache<S>]>,
  normal: Box<[RegionCache<S>]>,
  trim_interval: usize,
  allocations: AtomicUsize,
  freed: AtomicBool,
}

impl<S> ThreadCache<S>
where
  S: System,
{
  pub fn new(arena: Arc<Arena<S>>, config: &CacheConfig) -> AllocResult<Arc<Self>> {
    config.validate()?;
    let classes = *arena.classes();

    let tiny = Self::subpage_caches(config.tiny_cache_size(), NUM_TINY_POOLS, SizeClass::Tiny);
    let small = Self::subpage_caches(
      config.small_cache_size(),
      classes.num_small_pools(),
      SizeClass::Small,
    );
    let normal = Self::normal_caches(
      config.normal_cache_size(),
      config.max_cached_buffer_capacity(),
      &classes,
    );

    arena.thread_cache_opened();
    Ok(Arc::new(Self {
      arena,
      tiny,
      small,
      normal,
      trim_interval: config.trim_interval(),
      allocations: AtomicUsize::new(0),
      freed: AtomicBool::new(false),
    }))
  }

  fn subpage_caches(size: usize, count: usize, class: SizeClass) -> Box<[RegionCache<S>]> {
    if size == 0 {
      return Box::new([]);
    }
    (0..count).map(|_| RegionCache::new(size, class)).collect()
  }

  fn normal_caches(size: usize, max_cached: usize, classes: &SizeClasses) -> Box<[RegionCache<S>]> {
    if size == 0 || max_cached == 0 {
      return Box::new([]);
    }
    let max = classes.chunk_size().min(max_cached);
    let count = (log2_floor(max / classes.page_size()) + 1).max(1);
    (0..count)
      .map(|_| RegionCache::new(size, SizeClass::Normal))
      .collect()
  }

  #[inline]
  pub fn arena(&self) -> &Arc<Arena<S>> {
    &self.arena
  }

  pub fn is_freed(&self) -> bool {
    self.freed.load(Ordering::Acquire)
  }

  /// Allocates through this cache from its arena.
  pub fn allocate(
    self: &Arc<Self>,
    requested: usize,
    max_capacity: usize,
  ) -> AllocResult<Region<S>> {
    self.arena.allocate(Some(self), requested, max_capacity)
  }

  pub fn cache_for(&self, class: SizeClass, normalized: usize) -> Option<&RegionCache<S>> {
    match class {
      SizeClass::Tiny => self.tiny.get(SizeClasses::tiny_idx(normalized)),
      SizeClass::Small => self.small.get(SizeClasses::small_idx(normalized)),
      SizeClass::Normal => self
        .normal
        .get(self.arena.classes().normal_idx(normalized)),
      SizeClass::Huge => None,
    }
  }

  /// Pops a cached allocation of `normalized` bytes.
  pub(crate) fn take(&self, class: SizeClass, normalized: usize) -> Option<Allocation<S>> {
    let cache = self.cache_for(class, normalized)?;
    let allocation = cache.allocate();

    if self.allocations.fetch_add(1, Ordering::Relaxed) + 1 >= self.trim_interval {
      self.allocations.store(0, Ordering::Relaxed);
      self.trim();
    }

    if allocation.is_some() {
      tracing::trace!(?class, normalized, "thread cache hit");
    }
    allocation
  }

  /// Queues a freed allocation. Hands it back when there is no room or the
  /// cache was torn down.
  pub(crate) fn add(
    &self,
    class: SizeClass,
    allocation: Allocation<S>,
  ) -> Result<(), Allocation<S>> {
    if self.is_freed() {
      return Err(allocation);
    }
    match self.cache_for(class, allocation.max_length) {
      Some(cache) => cache.add(allocation),
      None => Err(allocation),
    }
  }

  fn caches(&self) -> impl Iterator<Item = &RegionCache<S>> {
    self
      .tiny
      .iter()
      .chain(self.small.iter())
      .chain(self.normal.iter())
  }

  /// Returns what every cache did not reuse since the last trim.
  pub fn trim(&self) -> usize {
    let trimmed: usize = self.caches().map(|cache| cache.trim(&self.arena)).sum();
    if trimmed > 0 {
      tracing::debug!(kind = ?S::KIND, trimmed, "trimmed thread cache");
    }
    trimmed
  }

  /// Number of allocations currently queued.
  pub fn cached(&self) -> usize {
    self.caches().map(RegionCache::len).sum()
  }

  /// Tears the cache down: drains every queue into the arena. Only the first
  /// call does anything.
  pub fn free(&self) -> usize {
    if self
      .freed
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      return 0;
    }

    let freed = self.drain();
    self.arena.thread_cache_closed();
    if freed > 0 {
      tracing::debug!(kind = ?S::KIND, freed, "freed thread-local regions");
    }
    freed
  }

  fn drain(&self) -> usize {
    self
      .caches()
      .map(|cache| cache.free(usize::MAX, &self.arena))
      .sum()
  }
}

impl<S> Drop for ThreadCache<S>
where
  S: System,
{
  fn drop(&mut self) {
    self.free();
    // Regions released on other threads may have raced the teardown.
    self.drain();
  }
}
