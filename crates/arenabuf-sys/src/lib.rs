pub mod heap;
pub mod mapping;
pub mod math;
pub mod prim;
pub mod system;
#[cfg(unix)]
pub mod unix;
#[cfg(windows)]
pub mod windows;

pub use heap::HeapSystem;
pub use mapping::Mapping;
pub use system::{
  Block,
  DirectSystem,
  SysError,
  SysResult,
  System,
  SystemKind,
};

pub mod prelude {
  pub use super::{
    math::{
      align_offset,
      align_up,
      log2_floor,
      next_pow2_saturating,
    },
    prim::{
      min_align,
      page_align,
      page_size,
    },
    system::{
      Block,
      DirectSystem,
      SysError,
      SysResult,
      System,
      SystemKind,
    },
    heap::HeapSystem,
    mapping::Mapping,
  };
}
