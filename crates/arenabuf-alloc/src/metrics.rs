use core::fmt;

use arenabuf_sys::SystemKind;
use getset::{
  CopyGetters,
  Getters,
};
use serde::{
  Serialize,
  Serializer,
};

use crate::chunk_list::ListKind;

fn serialize_display<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
  T: fmt::Display,
  S: Serializer,
{
  serializer.collect_str(value)
}

/// One counter per size class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct ClassCounts {
  tiny: usize,
  small: usize,
  normal: usize,
  huge: usize,
}

impl ClassCounts {
  pub const fn new(tiny: usize, small: usize, normal: usize, huge: usize) -> Self {
    Self {
      tiny,
      small,
      normal,
      huge,
    }
  }

  #[inline]
  pub const fn total(&self) -> usize {
    self.tiny + self.small + self.normal + self.huge
  }

  /// Per-class difference, floored at zero.
  pub const fn saturating_sub(&self, other: &ClassCounts) -> ClassCounts {
    ClassCounts {
      tiny: self.tiny.saturating_sub(other.tiny),
      small: self.small.saturating_sub(other.small),
      normal: self.normal.saturating_sub(other.normal),
      huge: self.huge.saturating_sub(other.huge),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct ChunkMetric {
  usage: usize,
  chunk_size: usize,
  free_bytes: usize,
}

impl ChunkMetric {
  pub const fn new(usage: usize, chunk_size: usize, free_bytes: usize) -> Self {
    Self {
      usage,
      chunk_size,
      free_bytes,
    }
  }
}

impl fmt::Display for ChunkMetric {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "Chunk({}%, {}/{})",
      self.usage,
      self.chunk_size - self.free_bytes,
      self.chunk_size
    )
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, CopyGetters, Getters)]
pub struct ChunkListMetric {
  #[getset(get_copy = "pub")]
  #[serde(serialize_with = "serialize_display")]
  kind: ListKind,
  #[getset(get_copy = "pub")]
  min_usage: usize,
  /// Capped at 100 for the topmost list.
  #[getset(get_copy = "pub")]
  max_usage: usize,
  #[getset(get = "pub")]
  chunks: Vec<ChunkMetric>,
}

impl ChunkListMetric {
  pub fn new(kind: ListKind, chunks: Vec<ChunkMetric>) -> Self {
    let (min_usage, max_usage) = kind.bounds();
    Self {
      kind,
      min_usage,
      max_usage: max_usage.min(100),
      chunks,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct SubpageMetric {
  elem_size: usize,
  max_num_elems: usize,
  num_available: usize,
  page_size: usize,
}

impl SubpageMetric {
  pub const fn new(
    elem_size: usize,
    max_num_elems: usize,
    num_available: usize,
    page_size: usize,
  ) -> Self {
    Self {
      elem_size,
      max_num_elems,
      num_available,
      page_size,
    }
  }
}

impl fmt::Display for SubpageMetric {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "({}/{}, length: {}, elemSize: {})",
      self.max_num_elems - self.num_available,
      self.max_num_elems,
      self.page_size,
      self.elem_size
    )
  }
}

/// Snapshot of an arena, taken under its lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, CopyGetters, Getters)]
pub struct ArenaMetrics {
  #[getset(get_copy = "pub")]
  #[serde(serialize_with = "serialize_display")]
  kind: SystemKind,
  #[getset(get_copy = "pub")]
  num_thread_caches: usize,
  #[getset(get = "pub")]
  chunk_lists: Vec<ChunkListMetric>,
  /// Pooled pages per tiny element size, indexed by `size >> 4`.
  #[getset(get = "pub")]
  tiny_subpages: Vec<Vec<SubpageMetric>>,
  #[getset(get = "pub")]
  small_subpages: Vec<Vec<SubpageMetric>>,
  #[getset(get_copy = "pub")]
  allocations: ClassCounts,
  #[getset(get_copy = "pub")]
  deallocations: ClassCounts,
  #[getset(get_copy = "pub")]
  active_bytes: ClassCounts,
  /// Bytes held by live chunks and huge regions.
  #[getset(get_copy = "pub")]
  resident_bytes: usize,
}

impl ArenaMetrics {
  #[allow(clippy::too_many_arguments)]
  pub(crate) fn new(
    kind: SystemKind,
    num_thread_caches: usize,
    chunk_lists: Vec<ChunkListMetric>,
    tiny_subpages: Vec<Vec<SubpageMetric>>,
    small_subpages: Vec<Vec<SubpageMetric>>,
    allocations: ClassCounts,
    deallocations: ClassCounts,
    active_bytes: ClassCounts,
    resident_bytes: usize,
  ) -> Self {
    Self {
      kind,
      num_thread_caches,
      chunk_lists,
      tiny_subpages,
      small_subpages,
      allocations,
      deallocations,
      active_bytes,
      resident_bytes,
    }
  }

  /// Regions handed out by the arena and not yet given back to it. Regions
  /// parked in thread caches count as active.
  pub fn active_allocations(&self) -> ClassCounts {
    self.allocations.saturating_sub(&self.deallocations)
  }

  pub fn num_chunks(&self) -> usize {
    self.chunk_lists.iter().map(|list| list.chunks.len()).sum()
  }

  pub fn chunk_list(&self, kind: ListKind) -> &ChunkListMetric {
    &self.chunk_lists[kind.index()]
  }

  fn fmt_subpages(f: &mut fmt::Formatter<'_>, pools: &[Vec<SubpageMetric>]) -> fmt::Result {
    for (idx, pages) in pools.iter().enumerate() {
      if pages.is_empty() {
        continue;
      }
      write!(f, "{idx}: ")?;
      for page in pages {
        write!(f, "{page}")?;
      }
      writeln!(f)?;
    }
    Ok(())
  }
}

impl fmt::Display for ArenaMetrics {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let active = self.active_allocations();
    writeln!(f, "Arena({}):", self.kind)?;
    writeln!(f, "Thread caches: {}", self.num_thread_caches)?;
    writeln!(
      f,
      "Allocations: {} (tiny {}, small {}, normal {}, huge {}), active {}",
      self.allocations.total(),
      self.allocations.tiny,
      self.allocations.small,
      self.allocations.normal,
      self.allocations.huge,
      active.total()
    )?;
    writeln!(
      f,
      "Active bytes: {}, resident bytes: {}",
      self.active_bytes.total(),
      self.resident_bytes
    )?;

    for list in &self.chunk_lists {
      writeln!(f, "Chunk(s) at {}:", list.kind)?;
      if list.chunks.is_empty() {
        writeln!(f, "none")?;
        continue;
      }
      for chunk in &list.chunks {
        writeln!(f, "{chunk}")?;
      }
    }

    writeln!(f, "tiny subpages:")?;
    Self::fmt_subpages(f, &self.tiny_subpages)?;
    writeln!(f, "small subpages:")?;
    Self::fmt_subpages(f, &self.small_subpages)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_class_counts() {
    let a = ClassCounts::new(5, 3, 2, 1);
    let b = ClassCounts::new(2, 4, 2, 0);
    assert_eq!(a.total(), 11);
    assert_eq!(a.saturating_sub(&b), ClassCounts::new(3, 0, 0, 1));
  }

  #[test]
  fn test_list_metric_caps_usage() {
    let q100 = ChunkListMetric::new(ListKind::Q100, Vec::new());
    assert_eq!(q100.min_usage(), 100);
    assert_eq!(q100.max_usage(), 100);
    let q025 = ChunkListMetric::new(ListKind::Q025, Vec::new());
    assert_eq!((q025.min_usage(), q025.max_usage()), (25, 75));
  }

  #[test]
  fn test_render() {
    let lists = ListKind::ALL
      .iter()
      .map(|&kind| {
        let chunks = if kind == ListKind::QInit {
          vec![ChunkMetric::new(1, 1 << 24, (1 << 24) - 8192)]
        } else {
          Vec::new()
        };
        ChunkListMetric::new(kind, chunks)
      })
      .collect();
    let mut tiny = vec![Vec::new(); 32];
    tiny[7] = vec![SubpageMetric::new(112, 73, 72, 8192)];

    let metrics = ArenaMetrics::new(
      SystemKind::Heap,
      1,
      lists,
      tiny,
      vec![Vec::new(); 4],
      ClassCounts::new(1, 0, 0, 0),
      ClassCounts::default(),
      ClassCounts::new(112, 0, 0, 0),
      1 << 24,
    );
    let text = metrics.to_string();
    assert!(text.contains("Chunk(s) at 0~25%:\nChunk(1%, 8192/16777216)"));
    assert!(text.contains("Chunk(s) at 100%:\nnone"));
    assert!(text.contains("tiny subpages:\n7: (1/73, length: 8192, elemSize: 112)"));
    assert_eq!(metrics.num_chunks(), 1);

    let json = serde_json::to_value(&metrics).unwrap();
    assert_eq!(json["kind"], "heap");
    assert_eq!(json["chunk_lists"][0]["kind"], "0~25%");
    assert_eq!(json["active_bytes"]["tiny"], 112);
  }
}
