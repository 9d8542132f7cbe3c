pub const fn align_up(value: usize, align: usize) -> Option<usize> {
  if !align.is_power_of_two() {
    return None;
  }

  let mask = align - 1;
  if let Some(sum) = value.checked_add(mask) {
    return Some(sum & !mask);
  }

  None
}

/// Bytes to skip from `addr` to reach the next multiple of `align`.
pub const fn align_offset(addr: usize, align: usize) -> Option<usize> {
  if !align.is_power_of_two() {
    return None;
  }

  match align_up(addr, align) {
    Some(aligned) => Some(aligned - addr),
    None => None,
  }
}

/// Rounds `value` up to a power of two by smearing the highest set bit of
/// `value - 1` into every lower bit and adding one.
///
/// If the increment runs past the top bit the result is halved, so the
/// function saturates at the largest representable power of two instead of
/// wrapping to zero. `0` maps to `0`.
pub const fn next_pow2_saturating(value: usize) -> usize {
  if value == 0 {
    return 0;
  }
  let mut n = value - 1;
  let mut shift = 1;
  while shift < usize::BITS {
    n |= n >> shift;
    shift <<= 1;
  }
  let (rounded, overflow) = n.overflowing_add(1);
  if overflow {
    return 1 << (usize::BITS - 1);
  }
  rounded
}

/// Floor of the base-two logarithm, with `log2_floor(0) == 0`.
pub const fn log2_floor(mut value: usize) -> usize {
  let mut log = 0;
  while value > 1 {
    value >>= 1;
    log += 1;
  }
  log
}
