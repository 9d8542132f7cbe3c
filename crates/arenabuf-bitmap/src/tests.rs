use super::*;

#[test]
fn test_multi_word_operations() {
  let mut bitmap = Bitmap::zero(128);

  bitmap.set(0).unwrap();
  bitmap.set(63).unwrap();
  bitmap.set(64).unwrap();
  bitmap.set(99).unwrap();

  assert!(bitmap.get(0).unwrap());
  assert!(bitmap.get(63).unwrap());
  assert!(bitmap.get(64).unwrap());
  assert!(bitmap.get(99).unwrap());
  assert!(!bitmap.get(32).unwrap());
  assert!(!bitmap.get(96).unwrap());
  assert_eq!(bitmap.used(), 4);
}

#[test]
fn test_set_twice_counts_once() {
  let mut bitmap = Bitmap::zero(16);
  bitmap.set(3).unwrap();
  bitmap.set(3).unwrap();
  assert_eq!(bitmap.used(), 1);

  bitmap.clear(3).unwrap();
  bitmap.clear(3).unwrap();
  assert_eq!(bitmap.used(), 0);
  assert!(bitmap.is_clear());
}

#[test]
fn test_bulk_operations() {
  let mut bitmap = Bitmap::zero(192);

  bitmap.set(5).unwrap();
  bitmap.set(35).unwrap();
  bitmap.set(65).unwrap();

  bitmap.clear_all();
  assert!(!bitmap.get(5).unwrap());
  assert!(!bitmap.get(35).unwrap());
  assert!(!bitmap.get(65).unwrap());
  assert!(bitmap.is_clear());

  for i in 0..192 {
    bitmap.set(i).unwrap();
  }
  assert!(bitmap.is_full());
  assert_eq!(bitmap.find_fc(), None);
}

#[test]
fn test_search_operations() {
  let mut bitmap = Bitmap::zero(128);

  assert_eq!(bitmap.find_fc(), Some(0));

  bitmap.set(5).unwrap();
  bitmap.set(65).unwrap();
  assert_eq!(bitmap.find_fc(), Some(0));

  bitmap.set(0).unwrap();
  assert_eq!(bitmap.find_fc(), Some(1));

  for i in 1..64 {
    bitmap.set(i).unwrap();
  }
  assert_eq!(bitmap.find_fc(), Some(64));
  bitmap.clear(5).unwrap();
  assert_eq!(bitmap.find_fc(), Some(5));
}

#[test]
fn test_partial_word_search() {
  let mut bitmap = Bitmap::zero(70);
  for i in 0..69 {
    bitmap.set(i).unwrap();
  }
  assert_eq!(bitmap.find_fc(), Some(69));
  bitmap.set(69).unwrap();
  assert_eq!(bitmap.find_fc(), None);
  assert!(bitmap.is_full());
}

#[test]
fn test_error_handling() {
  let mut bitmap = Bitmap::zero(64);

  assert!(bitmap.set(63).is_ok());
  assert_eq!(
    bitmap.set(64),
    Err(BitmapError::OutOfBounds { index: 64, size: 64 })
  );
  assert!(bitmap.get(64).is_err());
  assert!(bitmap.clear(64).is_err());
}

#[test]
fn test_reset_reuses_and_grows() {
  let mut bitmap = Bitmap::zero(512);
  bitmap.set(400).unwrap();
  let available = bitmap.available();

  bitmap.reset(16);
  assert_eq!(bitmap.bits(), 16);
  assert_eq!(bitmap.available(), available);
  assert!(bitmap.is_clear());
  assert!(bitmap.get(16).is_err());

  bitmap.reset(1024);
  assert_eq!(bitmap.bits(), 1024);
  assert!(bitmap.available() >= 1024);
  assert_eq!(bitmap.find_fc(), Some(0));
}

#[test]
fn test_const_functionality() {
  const WORDS_FOR_64_BITS: usize = Bitmap::words(64);

  assert_eq!(WORDS_FOR_64_BITS, 1);
  assert_eq!(Bitmap::words(65), 2);
  assert_eq!(Bitmap::words(8192 / 16), 8);
}
