use arenabuf_bitmap::Bitmap;
use arenabuf_list::{
  Link,
  List,
};
use getset::CopyGetters;

use crate::{
  chunk::ChunkId,
  classes::{
    NUM_TINY_POOLS,
    SizeClasses,
  },
};

/// Key of a slab page: the chunk it lives in and its page index there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRef {
  pub chunk: ChunkId,
  pub page: usize,
}

/// What a freed slot did to its page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotFree {
  /// The page had no free slot before and must go back into its pool.
  Refilled,
  /// The page still has live slots.
  Partial,
  /// Every slot is free again.
  Empty,
}

/// One chunk page split into equally sized slots.
#[derive(Debug, CopyGetters)]
pub struct SlabPage {
  #[getset(get_copy = "pub")]
  node: usize,
  #[getset(get_copy = "pub")]
  run_offset: usize,
  #[getset(get_copy = "pub")]
  page_size: usize,
  #[getset(get_copy = "pub")]
  elem_size: usize,
  #[getset(get_copy = "pub")]
  max_elems: usize,
  #[getset(get_copy = "pub")]
  num_avail: usize,
  next_avail: Option<usize>,
  bitmap: Bitmap,
  pub(crate) link: Link<PageRef>,
  #[getset(get_copy = "pub")]
  do_not_destroy: bool,
}

impl SlabPage {
  pub fn new(node: usize, run_offset: usize, page_size: usize, elem_size: usize) -> Self {
    let mut page = Self {
      node,
      run_offset,
      page_size,
      elem_size: 0,
      max_elems: 0,
      num_avail: 0,
      next_avail: None,
      bitmap: Bitmap::zero(page_size / elem_size),
      link: Link::default(),
      do_not_destroy: false,
    };
    page.init(elem_size);
    page
  }

  /// Re-carves the page for `elem_size`. The page must not be in any pool.
  pub fn init(&mut self, elem_size: usize) {
    assert!(
      elem_size > 0 && elem_size <= self.page_size,
      "slab element size out of range"
    );
    assert!(!self.link.linked(), "re-initialising a pooled slab page");

    self.do_not_destroy = true;
    self.elem_size = elem_size;
    self.max_elems = self.page_size / elem_size;
    self.num_avail = self.max_elems;
    self.next_avail = Some(0);
    self.bitmap.reset(self.max_elems);
  }

  /// Takes one slot. `None` once the page is exhausted or retired.
  pub fn allocate(&mut self) -> Option<usize> {
    if self.num_avail == 0 || !self.do_not_destroy {
      return None;
    }

    let slot = match self.next_avail.take() {
      Some(slot) => slot,
      None => self.bitmap.find_fc()?,
    };
    self
      .bitmap
      .set(slot)
      .expect("slot index is inside the page bitmap");
    self.num_avail -= 1;
    Some(slot)
  }

  pub fn free(&mut self, slot: usize) -> SlotFree {
    assert!(
      self.bitmap.get(slot) == Ok(true),
      "freeing slot {slot} that is not allocated"
    );
    self
      .bitmap
      .clear(slot)
      .expect("slot index is inside the page bitmap");
    self.next_avail = Some(slot);
    self.num_avail += 1;

    if self.num_avail == 1 {
      SlotFree::Refilled
    } else if self.num_avail == self.max_elems {
      SlotFree::Empty
    } else {
      SlotFree::Partial
    }
  }

  /// Marks the page as handed back to the chunk tree.
  pub fn retire(&mut self) {
    self.do_not_destroy = false;
  }

  #[inline]
  pub fn is_exhausted(&self) -> bool {
    self.num_avail == 0
  }

  #[inline]
  pub fn slot_offset(&self, slot: usize) -> usize {
    self.run_offset + slot * self.elem_size
  }
}

/// Heads of the per-element-size slab page pools of an arena.
#[derive(Debug)]
pub struct SlabPools {
  tiny: Box<[List<PageRef>]>,
  small: Box<[List<PageRef>]>,
}

impl SlabPools {
  pub fn new(classes: &SizeClasses) -> Self {
    Self {
      tiny: (0..NUM_TINY_POOLS).map(|_| List::new()).collect(),
      small: (0..classes.num_small_pools()).map(|_| List::new()).collect(),
    }
  }

  pub fn pool(&self, elem_size: usize) -> &List<PageRef> {
    if SizeClasses::is_tiny(elem_size) {
      &self.tiny[SizeClasses::tiny_idx(elem_size)]
    } else {
      &self.small[SizeClasses::small_idx(elem_size)]
    }
  }

  pub fn pool_mut(&mut self, elem_size: usize) -> &mut List<PageRef> {
    if SizeClasses::is_tiny(elem_size) {
      &mut self.tiny[SizeClasses::tiny_idx(elem_size)]
    } else {
      &mut self.small[SizeClasses::small_idx(elem_size)]
    }
  }

  pub fn tiny(&self) -> &[List<PageRef>] {
    &self.tiny
  }

  pub fn small(&self) -> &[List<PageRef>] {
    &self.small
  }
}
