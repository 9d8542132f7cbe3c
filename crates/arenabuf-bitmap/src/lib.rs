#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::{
  boxed::Box,
  vec,
};

use thiserror::Error;

#[cfg(test)]
pub mod tests;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BitmapError {
  #[error("bit {index} out of bounds for bitmap of {size} bits")]
  OutOfBounds { index: usize, size: usize },
}

pub type BitmapResult<T> = Result<T, BitmapError>;

pub type BitmapWord = usize;

const WORD_BITS: usize = BitmapWord::BITS as usize;

/// Fixed-size bitmap that owns its words and can be re-sized in place.
#[derive(Debug, Clone)]
pub struct Bitmap {
  store: Box<[BitmapWord]>,
  bits: usize,
  used: usize,
}

impl Bitmap {
  #[inline(always)]
  pub const fn words(fields: usize) -> usize {
    fields.div_ceil(WORD_BITS)
  }

  pub fn zero(bits: usize) -> Self {
    Self {
      store: vec![0; Self::words(bits)].into_boxed_slice(),
      bits,
      used: 0,
    }
  }

  /// Clears the bitmap and changes its logical size, reusing the word store
  /// when it is large enough.
  pub fn reset(&mut self, bits: usize) {
    let words = Self::words(bits);
    if words > self.store.len() {
      self.store = vec![0; words].into_boxed_slice();
    }
    self.bits = bits;
    self.clear_all();
  }

  #[inline(always)]
  pub fn available(&self) -> usize {
    self.store.len() * WORD_BITS
  }

  #[inline(always)]
  pub fn store(&self) -> &[BitmapWord] {
    &self.store[..Self::words(self.bits)]
  }

  #[inline(always)]
  pub const fn bits(&self) -> usize {
    self.bits
  }

  #[inline(always)]
  pub const fn used(&self) -> usize {
    self.used
  }

  const fn position(&self, index: usize) -> BitmapResult<(usize, usize)> {
    if index >= self.bits {
      return Err(BitmapError::OutOfBounds {
        index,
        size: self.bits,
      });
    }
    Ok((index / WORD_BITS, index % WORD_BITS))
  }

  #[inline]
  pub fn set(&mut self, index: usize) -> BitmapResult<()> {
    let (word_index, bit_index) = self.position(index)?;
    let mask = 1 << bit_index;
    if self.store[word_index] & mask == 0 {
      self.store[word_index] |= mask;
      self.used += 1;
    }
    Ok(())
  }

  #[inline]
  pub fn clear(&mut self, index: usize) -> BitmapResult<()> {
    let (word_index, bit_index) = self.position(index)?;
    let mask = 1 << bit_index;
    if self.store[word_index] & mask != 0 {
      self.store[word_index] &= !mask;
      self.used -= 1;
    }
    Ok(())
  }

  #[inline]
  pub fn get(&self, index: usize) -> BitmapResult<bool> {
    let (word_index, bit_index) = self.position(index)?;
    Ok(self.store[word_index] & (1 << bit_index) != 0)
  }

  pub fn clear_all(&mut self) {
    self.store.fill(0);
    self.used = 0;
  }

  /// First clear bit.
  pub fn find_fc(&self) -> Option<usize> {
    if self.is_full() {
      return None;
    }
    for (word_index, &value) in self.store().iter().enumerate() {
      let inverted = !value;
      if inverted != 0 {
        let global_index = word_index * WORD_BITS + inverted.trailing_zeros() as usize;
        if global_index < self.bits {
          return Some(global_index);
        }
      }
    }
    None
  }

  #[inline]
  pub const fn is_clear(&self) -> bool {
    self.used == 0
  }

  #[inline]
  pub const fn is_full(&self) -> bool {
    self.used == self.bits
  }
}
