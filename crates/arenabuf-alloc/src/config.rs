use getset::{
  CopyGetters,
  Setters,
};
use serde::{
  Deserialize,
  Serialize,
};

use crate::{
  classes::QUANTUM,
  error::{
    AllocError,
    AllocResult,
  },
};

pub const DEFAULT_PAGE_SIZE: usize = 8192;
pub const DEFAULT_MAX_ORDER: usize = 11;
pub const MIN_PAGE_SIZE: usize = 4096;
pub const MAX_ORDER: usize = 14;
pub const MAX_CHUNK_SIZE: usize = 1 << 30;

pub const DEFAULT_TINY_CACHE_SIZE: usize = 512;
pub const DEFAULT_SMALL_CACHE_SIZE: usize = 256;
pub const DEFAULT_NORMAL_CACHE_SIZE: usize = 64;
pub const DEFAULT_MAX_CACHED_BUFFER_CAPACITY: usize = 32 * 1024;
pub const DEFAULT_TRIM_INTERVAL: usize = 8192;

/// Geometry of every chunk an arena maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters, Setters, Serialize, Deserialize)]
#[serde(default)]
#[getset(get_copy = "pub", set = "pub")]
pub struct ArenaConfig {
  page_size: usize,
  max_order: usize,
  /// Alignment of every region start, `0` to disable.
  alignment: usize,
}

impl Default for ArenaConfig {
  fn default() -> Self {
    Self {
      page_size: DEFAULT_PAGE_SIZE,
      max_order: DEFAULT_MAX_ORDER,
      alignment: 0,
    }
  }
}

impl ArenaConfig {
  pub const fn new(page_size: usize, max_order: usize, alignment: usize) -> Self {
    Self {
      page_size,
      max_order,
      alignment,
    }
  }

  #[inline]
  pub const fn chunk_size(&self) -> usize {
    self.page_size << self.max_order
  }

  #[inline]
  pub const fn page_shifts(&self) -> usize {
    self.page_size.trailing_zeros() as usize
  }

  pub fn validate(&self) -> AllocResult<()> {
    if self.page_size < MIN_PAGE_SIZE {
      return Err(AllocError::InvalidConfig("page size must be at least 4096"));
    }
    if !self.page_size.is_power_of_two() {
      return Err(AllocError::InvalidConfig("page size must be a power of two"));
    }
    if self.max_order > MAX_ORDER {
      return Err(AllocError::InvalidConfig("max order must be at most 14"));
    }
    if self.page_size > MAX_CHUNK_SIZE >> self.max_order {
      return Err(AllocError::InvalidConfig("chunk size must not exceed 1 GiB"));
    }
    if self.alignment != 0
      && (!self.alignment.is_power_of_two()
        || self.alignment < QUANTUM
        || self.alignment > self.page_size)
    {
      return Err(AllocError::InvalidConfig(
        "alignment must be 0 or a power of two between 16 and the page size",
      ));
    }
    Ok(())
  }
}

/// Sizing of the per-thread region caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters, Setters, Serialize, Deserialize)]
#[serde(default)]
#[getset(get_copy = "pub", set = "pub")]
pub struct CacheConfig {
  tiny_cache_size: usize,
  small_cache_size: usize,
  normal_cache_size: usize,
  max_cached_buffer_capacity: usize,
  /// Allocation attempts between two trims.
  trim_interval: usize,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      tiny_cache_size: DEFAULT_TINY_CACHE_SIZE,
      small_cache_size: DEFAULT_SMALL_CACHE_SIZE,
      normal_cache_size: DEFAULT_NORMAL_CACHE_SIZE,
      max_cached_buffer_capacity: DEFAULT_MAX_CACHED_BUFFER_CAPACITY,
      trim_interval: DEFAULT_TRIM_INTERVAL,
    }
  }
}

impl CacheConfig {
  pub const fn disabled() -> Self {
    Self {
      tiny_cache_size: 0,
      small_cache_size: 0,
      normal_cache_size: 0,
      max_cached_buffer_capacity: 0,
      trim_interval: DEFAULT_TRIM_INTERVAL,
    }
  }

  pub const fn is_enabled(&self) -> bool {
    self.tiny_cache_size > 0
      || self.small_cache_size > 0
      || (self.normal_cache_size > 0 && self.max_cached_buffer_capacity > 0)
  }

  pub fn validate(&self) -> AllocResult<()> {
    if self.is_enabled() && self.trim_interval == 0 {
      return Err(AllocError::InvalidConfig("trim interval must be positive"));
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters, Setters, Serialize, Deserialize)]
#[serde(default)]
#[getset(get_copy = "pub", set = "pub")]
pub struct AllocatorConfig {
  heap_arenas: usize,
  direct_arenas: usize,
  arena: ArenaConfig,
  cache: CacheConfig,
}

impl Default for AllocatorConfig {
  fn default() -> Self {
    let arenas = default_arena_count();
    Self {
      heap_arenas: arenas,
      direct_arenas: arenas,
      arena: ArenaConfig::default(),
      cache: CacheConfig::default(),
    }
  }
}

impl AllocatorConfig {
  pub fn validate(&self) -> AllocResult<()> {
    self.arena.validate()?;
    self.cache.validate()
  }
}

/// Two arenas per available core.
pub fn default_arena_count() -> usize {
  std::thread::available_parallelism()
    .map(|n| n.get())
    .unwrap_or(1)
    * 2
}
