use arenabuf_sys::HeapSystem;
use proptest::prelude::*;

use super::*;
use crate::classes::SizeClasses;

const PAGE: usize = 4096;

fn geometry(max_order: usize) -> Geometry {
  Geometry::new(&ArenaConfig::new(PAGE, max_order, 0))
}

fn chunk(max_order: usize) -> Chunk<HeapSystem> {
  Chunk::map(HeapSystem, geometry(max_order)).unwrap()
}

fn table(max_order: usize) -> (Chunks<HeapSystem>, ChunkId, SlabPools) {
  let config = ArenaConfig::new(PAGE, max_order, 0);
  let mut chunks = Chunks::new();
  let id = chunks.insert(Chunk::map(HeapSystem, Geometry::new(&config)).unwrap());
  (chunks, id, SlabPools::new(&SizeClasses::new(&config)))
}

#[test]
fn test_fresh_chunk() {
  let chunk = chunk(3);
  assert_eq!(chunk.chunk_size(), 8 * PAGE);
  assert_eq!(chunk.free_bytes(), 8 * PAGE);
  assert_eq!(chunk.usage(), 0);
  assert_eq!(chunk.offset(), 0);
  assert!(chunk.memory().len() >= chunk.chunk_size());
}

#[test]
fn test_single_pages_are_sequential() {
  let mut chunk = chunk(3);
  for i in 0..8 {
    let handle = chunk.allocate_run(PAGE).unwrap();
    assert_eq!(handle.node(), 8 + i);
    assert_eq!(chunk.locate(handle), (i * PAGE, PAGE));
  }
  assert_eq!(chunk.usage(), 100);
  assert!(chunk.allocate_run(PAGE).is_none());
}

#[test]
fn test_whole_chunk_run() {
  let mut chunk = chunk(3);
  let handle = chunk.allocate_run(8 * PAGE).unwrap();
  assert_eq!(handle.node(), 1);
  assert_eq!(chunk.free_bytes(), 0);
  assert!(chunk.allocate_run(PAGE).is_none());

  chunk.free_run(handle.node());
  assert_eq!(chunk.free_bytes(), 8 * PAGE);
  assert_eq!(chunk.usage(), 0);
}

#[test]
fn test_buddies_merge() {
  let mut chunk = chunk(3);
  let a = chunk.allocate_run(PAGE).unwrap();
  let b = chunk.allocate_run(PAGE).unwrap();
  assert!(chunk.allocate_run(8 * PAGE).is_none());

  chunk.free_run(a.node());
  assert!(chunk.allocate_run(8 * PAGE).is_none());
  chunk.free_run(b.node());

  let whole = chunk.allocate_run(8 * PAGE).unwrap();
  assert_eq!(whole.node(), 1);
}

#[test]
fn test_run_skips_fragmented_half() {
  let mut chunk = chunk(3);
  let page = chunk.allocate_run(PAGE).unwrap();
  assert_eq!(page.node(), 8);

  let run = chunk.allocate_run(4 * PAGE).unwrap();
  assert_eq!(run.node(), 3);
  assert_eq!(chunk.locate(run), (4 * PAGE, 4 * PAGE));

  let pair = chunk.allocate_run(2 * PAGE).unwrap();
  assert_eq!(pair.node(), 5);
  assert_eq!(chunk.locate(pair).0, 2 * PAGE);
  assert!(chunk.allocate_run(2 * PAGE).is_none());
  assert!(chunk.allocate_run(PAGE).is_some());
}

#[test]
fn test_usage_rounds_to_99() {
  let mut chunk = chunk(7);
  for _ in 0..127 {
    chunk.allocate_run(PAGE).unwrap();
  }
  assert_eq!(chunk.free_bytes(), PAGE);
  assert_eq!(chunk.usage(), 99);
}

#[test]
#[should_panic(expected = "not allocated")]
fn test_double_free_run() {
  let mut chunk = chunk(3);
  let handle = chunk.allocate_run(PAGE).unwrap();
  chunk.free_run(handle.node());
  chunk.free_run(handle.node());
}

#[test]
fn test_aligned_chunk() {
  let config = ArenaConfig::new(PAGE, 3, 64);
  let chunk = Chunk::map(HeapSystem, Geometry::new(&config)).unwrap();
  assert_eq!((chunk.memory().block().addr() + chunk.offset()) % 64, 0);
  assert!(chunk.offset() + chunk.chunk_size() <= chunk.memory().len());
}

#[test]
fn test_slab_through_table() {
  let (mut chunks, id, mut pools) = table(3);

  let first = chunks.allocate(id, 16, &mut pools).unwrap();
  assert!(first.is_slab());
  assert_eq!(first.slot(), Some(0));
  assert_eq!(pools.pool(16).len(), 1);
  assert_eq!(chunks.get(id).free_bytes(), 7 * PAGE);

  let key = pools.pool(16).head().unwrap();
  let max = chunks.slab(key).max_elems();
  assert_eq!(max, PAGE / 16);

  let mut handles = vec![first];
  for _ in 1..max {
    handles.push(chunks.allocate_slot(key, &mut pools).unwrap());
  }
  assert!(pools.pool(16).is_empty(), "exhausted page leaves its pool");

  chunks.free(id, handles.pop().unwrap(), &mut pools);
  assert_eq!(pools.pool(16).head(), Some(key), "refilled page rejoins its pool");

  for handle in handles {
    chunks.free(id, handle, &mut pools);
  }
  assert_eq!(pools.pool(16).len(), 1, "last page of a size is kept");
  assert_eq!(chunks.get(id).free_bytes(), 7 * PAGE);
}

#[test]
fn test_empty_page_released_when_not_last() {
  let (mut chunks, id, mut pools) = table(3);

  let a = chunks.allocate(id, 2048, &mut pools).unwrap();
  let b = chunks.allocate(id, 2048, &mut pools).unwrap();
  assert_eq!(pools.pool(2048).len(), 2);
  assert_eq!(chunks.get(id).free_bytes(), 6 * PAGE);

  chunks.free(id, a, &mut pools);
  assert_eq!(pools.pool(2048).len(), 1);
  assert_eq!(chunks.get(id).free_bytes(), 7 * PAGE);

  chunks.free(id, b, &mut pools);
  assert_eq!(pools.pool(2048).len(), 1);
  assert_eq!(chunks.get(id).free_bytes(), 7 * PAGE);
}

#[test]
fn test_page_reinit_for_other_size() {
  let (mut chunks, id, mut pools) = table(3);

  let a = chunks.allocate(id, 1024, &mut pools).unwrap();
  let b = chunks.allocate(id, 1024, &mut pools).unwrap();
  let keep = chunks.allocate(id, 1024, &mut pools).unwrap();
  let page_a = a.node();
  chunks.free(id, a, &mut pools);
  chunks.free(id, b, &mut pools);
  assert_eq!(pools.pool(1024).len(), 1);

  let c = chunks.allocate(id, 256, &mut pools).unwrap();
  assert_eq!(c.node(), page_a, "released page is recarved");
  let (offset, len) = chunks.get(id).locate(c);
  assert_eq!(len, 256);
  assert_eq!(offset, chunks.get(id).run_offset(page_a));
  chunks.free(id, keep, &mut pools);
}

#[test]
fn test_chunk_ids_reused() {
  let (mut chunks, id, _) = table(3);
  let other = chunks.insert(chunk(3));
  assert_ne!(id, other);
  assert_eq!(chunks.len(), 2);

  drop(chunks.remove(id));
  let again = chunks.insert(chunk(3));
  assert_eq!(again, id);
  assert_eq!(chunks.len(), 2);
}

proptest! {
  #[test]
  fn prop_runs_never_overlap(orders in proptest::collection::vec(0usize..4, 1..40)) {
    let mut chunk = chunk(5);
    let mut live: Vec<(Handle, usize, usize)> = Vec::new();

    for order in orders {
      if let Some(handle) = chunk.allocate_run(PAGE << order) {
        let (offset, len) = chunk.locate(handle);
        prop_assert_eq!(len, PAGE << order);
        prop_assert_eq!(offset % len, 0);
        for &(_, other_offset, other_len) in &live {
          prop_assert!(offset + len <= other_offset || other_offset + other_len <= offset);
        }
        live.push((handle, offset, len));
      }
    }

    let used: usize = live.iter().map(|&(_, _, len)| len).sum();
    prop_assert_eq!(chunk.free_bytes(), chunk.chunk_size() - used);

    for (handle, _, _) in live {
      chunk.free_run(handle.node());
    }
    prop_assert_eq!(chunk.free_bytes(), chunk.chunk_size());
    prop_assert!(chunk.allocate_run(chunk.chunk_size()).is_some());
  }
}
