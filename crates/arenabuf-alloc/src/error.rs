use arenabuf_sys::SysError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum AllocError {
  #[error("invalid capacity {requested} (expected: 0..={max})")]
  InvalidCapacity { requested: usize, max: usize },
  #[error("failed to map backing memory: {0}")]
  Map(#[from] SysError),
  #[error("invalid configuration: {0}")]
  InvalidConfig(&'static str),
}

pub type AllocResult<T> = Result<T, AllocError>;
