//! `epimat-tensor` - Tensor handles for the epimat fused-epilog matmul facade.
//!
//! This crate provides:
//! - A `Tensor` type: a cheap, cloneable handle to a shared, lock-guarded buffer
//! - Typed host storage (`CpuStorage`) and the `Element` trait that indexes it
//! - Shape utilities
//! - Data type and device definitions

pub mod device;
pub mod dtype;
pub mod error;
pub mod shape;
pub mod storage;
pub mod tensor;

// Re-export primary types at the crate root for convenience.
pub use device::Device;
pub use dtype::DType;
pub use error::{Result, TensorError};
pub use shape::Shape;
pub use storage::{CpuStorage, Element};
pub use tensor::Tensor;

pub use half::f16;
