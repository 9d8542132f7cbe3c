//! Pooled arena allocator for byte regions.
//!
//! Requests are normalized into size classes, served from per-thread caches
//! when possible and otherwise from an [`Arena`] of buddy-managed chunks.

pub mod arena;
pub mod chunk;
pub mod chunk_list;
pub mod classes;
pub mod config;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod region;
pub mod slab;
pub mod tcache;

pub use arena::Arena;
pub use error::{
  AllocError,
  AllocResult,
};
pub use region::Region;
pub use tcache::ThreadCache;

pub mod prelude {
  pub use super::{
    arena::Arena,
    chunk_list::ListKind,
    classes::{
      MAX_CAPACITY,
      SizeClass,
      SizeClasses,
    },
    config::{
      AllocatorConfig,
      ArenaConfig,
      CacheConfig,
    },
    error::{
      AllocError,
      AllocResult,
    },
    metrics::{
      ArenaMetrics,
      ClassCounts,
    },
    region::Region,
    tcache::ThreadCache,
  };
}
