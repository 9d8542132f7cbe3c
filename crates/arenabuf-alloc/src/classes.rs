use arenabuf_sys::prelude::*;
use getset::CopyGetters;

use crate::{
  config::ArenaConfig,
  error::{
    AllocError,
    AllocResult,
  },
};

/// Spacing of tiny sizes.
pub const QUANTUM: usize = 16;
/// First size that is not tiny.
pub const TINY_LIMIT: usize = 512;
pub const NUM_TINY_POOLS: usize = TINY_LIMIT >> 4;
/// Largest capacity any region may ask for.
pub const MAX_CAPACITY: usize = isize::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeClass {
  Tiny,
  Small,
  Normal,
  Huge,
}

impl SizeClass {
  pub const fn is_subpage(self) -> bool {
    matches!(self, SizeClass::Tiny | SizeClass::Small)
  }
}

/// Maps requested capacities onto the sizes the arena actually hands out.
#[derive(Debug, Clone, Copy, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct SizeClasses {
  page_size: usize,
  page_shifts: usize,
  chunk_size: usize,
  alignment: usize,
}

impl SizeClasses {
  pub fn new(config: &ArenaConfig) -> Self {
    Self {
      page_size: config.page_size(),
      page_shifts: config.page_shifts(),
      chunk_size: config.chunk_size(),
      alignment: config.alignment(),
    }
  }

  /// Rounds `capacity` up to the alignment. The result must itself be a
  /// valid request.
  fn align(&self, capacity: usize) -> AllocResult<usize> {
    if self.alignment == 0 {
      return Ok(capacity);
    }
    match align_up(capacity, self.alignment) {
      Some(aligned) if aligned <= MAX_CAPACITY => Ok(aligned),
      _ => Err(AllocError::InvalidCapacity {
        requested: capacity,
        max: MAX_CAPACITY,
      }),
    }
  }

  /// Rounds `requested` up to the size every region of its class shares.
  ///
  /// Huge requests keep their size (aligned if configured); everything from
  /// 512 bytes up becomes the next power of two; tiny requests become the next
  /// multiple of 16. The result is stable under repeated normalization.
  pub fn normalize(&self, requested: usize) -> AllocResult<usize> {
    if requested > MAX_CAPACITY {
      return Err(AllocError::InvalidCapacity {
        requested,
        max: MAX_CAPACITY,
      });
    }

    if requested >= self.chunk_size {
      return self.align(requested);
    }

    if !Self::is_tiny(requested) {
      return self.align(next_pow2_saturating(requested));
    }

    if self.alignment > 0 {
      return self.align(requested);
    }

    if requested & (QUANTUM - 1) == 0 {
      return Ok(requested);
    }
    Ok((requested & !(QUANTUM - 1)) + QUANTUM)
  }

  /// Smallest element a slab page is carved into.
  #[inline]
  pub fn min_element(&self) -> usize {
    QUANTUM.max(self.alignment)
  }

  pub fn classify(&self, normalized: usize) -> SizeClass {
    if normalized > self.chunk_size {
      SizeClass::Huge
    } else if !self.is_subpage(normalized) {
      SizeClass::Normal
    } else if Self::is_tiny(normalized) {
      SizeClass::Tiny
    } else {
      SizeClass::Small
    }
  }

  #[inline]
  pub const fn is_tiny(capacity: usize) -> bool {
    capacity & !(TINY_LIMIT - 1) == 0
  }

  #[inline]
  pub const fn is_subpage(&self, capacity: usize) -> bool {
    capacity & !(self.page_size - 1) == 0
  }

  #[inline]
  pub const fn tiny_idx(normalized: usize) -> usize {
    normalized >> 4
  }

  pub const fn small_idx(normalized: usize) -> usize {
    let mut idx = 0;
    let mut i = normalized >> 10;
    while i != 0 {
      i >>= 1;
      idx += 1;
    }
    idx
  }

  #[inline]
  pub const fn normal_idx(&self, normalized: usize) -> usize {
    log2_floor(normalized >> self.page_shifts)
  }

  #[inline]
  pub const fn num_small_pools(&self) -> usize {
    self.page_shifts - 9
  }
}
