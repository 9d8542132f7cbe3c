//! Pooled byte-region allocator with heap and direct arenas.
//!
//! [`PooledAllocator`] owns a fixed set of arenas per backing system and binds
//! every thread cache to the arena fewest caches use.

use std::sync::Arc;

use arenabuf_alloc::{
  Arena,
  Region,
  ThreadCache,
  config::AllocatorConfig,
  error::{
    AllocError,
    AllocResult,
  },
  metrics::ArenaMetrics,
};
use arenabuf_sys::{
  DirectSystem,
  HeapSystem,
  System,
};
use getset::Getters;
use serde::Serialize;

pub mod prelude {
  pub use arenabuf_alloc::prelude::*;
  pub use arenabuf_sys::prelude::*;

  pub use super::{
    AllocatorMetrics,
    PooledAllocator,
    ThreadCaches,
  };
}

/// The caches one thread allocates through, one per backing system.
#[derive(Clone)]
pub struct ThreadCaches {
  heap: Option<Arc<ThreadCache<HeapSystem>>>,
  direct: Option<Arc<ThreadCache<DirectSystem>>>,
}

impl ThreadCaches {
  pub fn heap(&self) -> Option<&Arc<ThreadCache<HeapSystem>>> {
    self.heap.as_ref()
  }

  pub fn direct(&self) -> Option<&Arc<ThreadCache<DirectSystem>>> {
    self.direct.as_ref()
  }

  /// Drains both caches back into their arenas.
  pub fn free(&self) -> usize {
    let heap = self.heap.as_ref().map_or(0, |cache| cache.free());
    let direct = self.direct.as_ref().map_or(0, |cache| cache.free());
    heap + direct
  }
}

#[derive(Debug, Clone, Serialize, Getters)]
#[getset(get = "pub")]
pub struct AllocatorMetrics {
  heap: Vec<ArenaMetrics>,
  direct: Vec<ArenaMetrics>,
}

impl AllocatorMetrics {
  pub fn active_bytes(&self) -> usize {
    self
      .heap
      .iter()
      .chain(self.direct.iter())
      .map(|arena| arena.active_bytes().total())
      .sum()
  }

  pub fn num_thread_caches(&self) -> usize {
    self
      .heap
      .iter()
      .chain(self.direct.iter())
      .map(ArenaMetrics::num_thread_caches)
      .sum()
  }
}

pub struct PooledAllocator {
  config: AllocatorConfig,
  heap_arenas: Vec<Arc<Arena<HeapSystem>>>,
  direct_arenas: Vec<Arc<Arena<DirectSystem>>>,
}

impl PooledAllocator {
  pub fn new(config: AllocatorConfig) -> AllocResult<Self> {
    config.validate()?;
    if config.heap_arenas() == 0 && config.direct_arenas() == 0 {
      return Err(AllocError::InvalidConfig("at least one arena is required"));
    }

    let heap_arenas = (0..config.heap_arenas())
      .map(|_| Arena::new(HeapSystem, config.arena()))
      .collect::<AllocResult<Vec<_>>>()?;
    let direct_arenas = (0..config.direct_arenas())
      .map(|_| Arena::new(DirectSystem, config.arena()))
      .collect::<AllocResult<Vec<_>>>()?;

    tracing::debug!(
      heap_arenas = heap_arenas.len(),
      direct_arenas = direct_arenas.len(),
      chunk_size = config.arena().chunk_size(),
      "created pooled allocator"
    );
    Ok(Self {
      config,
      heap_arenas,
      direct_arenas,
    })
  }

  #[inline]
  pub fn config(&self) -> &AllocatorConfig {
    &self.config
  }

  pub fn heap_arenas(&self) -> &[Arc<Arena<HeapSystem>>] {
    &self.heap_arenas
  }

  pub fn direct_arenas(&self) -> &[Arc<Arena<DirectSystem>>] {
    &self.direct_arenas
  }

  fn least_used<S>(arenas: &[Arc<Arena<S>>]) -> Option<&Arc<Arena<S>>>
  where
    S: System,
  {
    arenas.iter().min_by_key(|arena| arena.num_thread_caches())
  }

  /// Opens caches for the calling thread on the least used arenas.
  pub fn thread_cache(&self) -> AllocResult<ThreadCaches> {
    let cache = self.config.cache();
    let heap = Self::least_used(&self.heap_arenas)
      .map(|arena| ThreadCache::new(Arc::clone(arena), &cache))
      .transpose()?;
    let direct = Self::least_used(&self.direct_arenas)
      .map(|arena| ThreadCache::new(Arc::clone(arena), &cache))
      .transpose()?;
    Ok(ThreadCaches { heap, direct })
  }

  pub fn heap_buffer(
    &self,
    caches: Option<&ThreadCaches>,
    initial_capacity: usize,
    max_capacity: usize,
  ) -> AllocResult<Region<HeapSystem>> {
    match caches.and_then(ThreadCaches::heap) {
      Some(cache) => cache.allocate(initial_capacity, max_capacity),
      None => Self::least_used(&self.heap_arenas)
        .ok_or(AllocError::InvalidConfig("no heap arenas configured"))?
        .allocate(None, initial_capacity, max_capacity),
    }
  }

  pub fn direct_buffer(
    &self,
    caches: Option<&ThreadCaches>,
    initial_capacity: usize,
    max_capacity: usize,
  ) -> AllocResult<Region<DirectSystem>> {
    match caches.and_then(ThreadCaches::direct) {
      Some(cache) => cache.allocate(initial_capacity, max_capacity),
      None => Self::least_used(&self.direct_arenas)
        .ok_or(AllocError::InvalidConfig("no direct arenas configured"))?
        .allocate(None, initial_capacity, max_capacity),
    }
  }

  pub fn metrics(&self) -> AllocatorMetrics {
    AllocatorMetrics {
      heap: self.heap_arenas.iter().map(|arena| arena.metrics()).collect(),
      direct: self.direct_arenas.iter().map(|arena| arena.metrics()).collect(),
    }
  }
}
