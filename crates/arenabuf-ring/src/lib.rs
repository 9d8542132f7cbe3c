#![cfg_attr(not(test), no_std)]

//! Bounded ring that many threads may push into and that is drained by one
//! owner at a time.
//!
//! Every slot carries a sequence number. A producer claims a slot by moving the
//! tail forward once the slot's sequence equals the tail. A consumer then waits
//! for the sequence to reach `head + 1`. Nothing allocates after construction.

extern crate alloc;

use alloc::boxed::Box;
use core::{
  cell::UnsafeCell,
  mem::MaybeUninit,
  sync::atomic::{
    AtomicUsize,
    Ordering,
  },
};

use crossbeam_utils::CachePadded;

#[derive(Debug, PartialEq, Eq)]
pub enum RingError<T> {
  Full(T),
}

impl<T> RingError<T> {
  pub fn into_inner(self) -> T {
    match self {
      RingError::Full(val) => val,
    }
  }
}

struct Slot<T> {
  seq: AtomicUsize,
  value: UnsafeCell<MaybeUninit<T>>,
}

pub struct Ring<T> {
  slots: Box<[Slot<T>]>,
  mask: usize,
  head: CachePadded<AtomicUsize>,
  tail: CachePadded<AtomicUsize>,
}

unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
  /// Creates a ring with room for at least `capacity` items. The real capacity
  /// is the next power of two.
  pub fn new(capacity: usize) -> Self {
    let capacity = capacity.max(1).next_power_of_two();
    let slots = (0..capacity)
      .map(|seq| Slot {
        seq: AtomicUsize::new(seq),
        value: UnsafeCell::new(MaybeUninit::uninit()),
      })
      .collect();

    Self {
      slots,
      mask: capacity - 1,
      head: CachePadded::new(AtomicUsize::new(0)),
      tail: CachePadded::new(AtomicUsize::new(0)),
    }
  }

  #[inline]
  pub fn capacity(&self) -> usize {
    self.slots.len()
  }

  /// Approximate number of queued items.
  pub fn len(&self) -> usize {
    let head = self.head.load(Ordering::Acquire);
    let tail = self.tail.load(Ordering::Acquire);
    tail.wrapping_sub(head).min(self.capacity())
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn is_full(&self) -> bool {
    self.len() == self.capacity()
  }

  pub fn push(&self, val: T) -> Result<(), RingError<T>> {
    let mut pos = self.tail.load(Ordering::Relaxed);
    loop {
      let slot = &self.slots[pos & self.mask];
      let seq = slot.seq.load(Ordering::Acquire);
      let diff = seq.wrapping_sub(pos) as isize;

      if diff == 0 {
        match self
          .tail
          .compare_exchange_weak(pos, pos.wrapping_add(1), Ordering::Relaxed, Ordering::Relaxed)
        {
          Ok(_) => {
            unsafe { (*slot.value.get()).write(val) };
            slot.seq.store(pos.wrapping_add(1), Ordering::Release);
            return Ok(());
          }
          Err(current) => pos = current,
        }
      } else if diff < 0 {
        return Err(RingError::Full(val));
      } else {
        pos = self.tail.load(Ordering::Relaxed);
      }
    }
  }

  pub fn pop(&self) -> Option<T> {
    let mut pos = self.head.load(Ordering::Relaxed);
    loop {
      let slot = &self.slots[pos & self.mask];
      let seq = slot.seq.load(Ordering::Acquire);
      let diff = seq.wrapping_sub(pos.wrapping_add(1)) as isize;

      if diff == 0 {
        match self
          .head
          .compare_exchange_weak(pos, pos.wrapping_add(1), Ordering::Relaxed, Ordering::Relaxed)
        {
          Ok(_) => {
            let val = unsafe { (*slot.value.get()).assume_init_read() };
            slot
              .seq
              .store(pos.wrapping_add(self.mask + 1), Ordering::Release);
            return Some(val);
          }
          Err(current) => pos = current,
        }
      } else if diff < 0 {
        return None;
      } else {
        pos = self.head.load(Ordering::Relaxed);
      }
    }
  }
}

impl<T> Drop for Ring<T> {
  fn drop(&mut self) {
    while self.pop().is_some() {}
  }
}
