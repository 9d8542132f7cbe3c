use core::sync::atomic::{
  AtomicUsize,
  Ordering,
};

use thiserror::Error;

use crate::math::align_up;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum PrimError {
  #[error("value overflows the address space when aligned")]
  Overflow,
}

pub type PrimResult<T> = Result<T, PrimError>;

#[cfg(not(unix))]
const COMMON_PAGE_SIZE: usize = 4096;

pub const fn min_align() -> usize {
  core::mem::align_of::<u128>()
}

#[cfg(unix)]
fn page_size_helper() -> usize {
  unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

#[cfg(not(unix))]
fn page_size_helper() -> usize {
  COMMON_PAGE_SIZE
}

/// Operating system page size, queried once.
pub fn page_size() -> usize {
  static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

  match PAGE_SIZE.load(Ordering::Acquire) {
    0 => {
      let size = page_size_helper();
      PAGE_SIZE.store(size, Ordering::Release);
      size
    }
    size => size,
  }
}

pub fn page_align(value: usize) -> PrimResult<usize> {
  align_up(value, page_size()).ok_or(PrimError::Overflow)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_min_align() {
    assert_eq!(min_align(), core::mem::align_of::<u128>());
  }

  #[test]
  fn test_page_size() {
    let size = page_size();
    assert!(size > 0);
    assert!(size.is_power_of_two());
    assert_eq!(page_size(), size);
  }

  #[test]
  fn test_page_align() {
    let ps = page_size();
    assert_eq!(page_align(0), Ok(0));
    assert_eq!(page_align(1), Ok(ps));
    assert_eq!(page_align(ps), Ok(ps));
    assert_eq!(page_align(ps + 1), Ok(ps * 2));

    assert_eq!(page_align(usize::MAX), Err(PrimError::Overflow));
  }
}
