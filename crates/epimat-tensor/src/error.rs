use thiserror::Error;

use crate::dtype::DType;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorError {
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },
    #[error("tensor of shape {dims:?} has more elements than fit in usize")]
    TooLarge { dims: Vec<usize> },
    #[error("unsupported dtype: {0}")]
    UnsupportedDType(String),
}

pub type Result<T> = std::result::Result<T, TensorError>;
