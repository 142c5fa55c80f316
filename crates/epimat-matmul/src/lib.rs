//! `epimat-matmul` - Fused-epilog matrix multiplication over pluggable backends.
//!
//! This crate provides:
//! - The `Matmul` facade: validate, allocate, enqueue, return
//! - The closed `Epilog` selector and its required/emitted auxiliary roles
//! - `AuxiliaryBundle` for threading side data from forward to backward passes
//! - A `ComputeBackend` trait and the reference `CpuBackend`
//! - `Stream`, an ordered device queue with explicit synchronization
//!
//! ```no_run
//! use std::sync::Arc;
//! use epimat_matmul::{CpuBackend, Epilog, Matmul, Stream};
//! use epimat_tensor::{DType, Tensor};
//!
//! # fn main() -> epimat_matmul::Result<()> {
//! let stream = Stream::new("main")?;
//! let mm = Matmul::new(Arc::new(CpuBackend::new()), stream.clone());
//! let a = Tensor::ones([64, 256], DType::F64);
//! let b = Tensor::ones([256, 128], DType::F64);
//!
//! let (_, aux) = mm.multiply(&a, &b, Epilog::ReluAux, ())?.into_parts();
//! let grad = mm.multiply(&a, &b, Epilog::DRelu, aux)?.into_result();
//! stream.synchronize()?;
//! assert_eq!(grad.shape().dims(), &[64, 128]);
//! # Ok(())
//! # }
//! ```

pub mod auxiliary;
pub mod backend;
pub mod cpu;
pub mod epilog;
pub mod error;
pub mod matmul;
pub mod options;
pub mod stream;

// Re-export primary types at the crate root for convenience.
pub use auxiliary::{AuxRole, AuxiliaryBundle, EpilogInputs};
pub use backend::{ComputeBackend, EpilogLaunch, EpilogOutputs, MatmulDims};
pub use cpu::CpuBackend;
pub use epilog::Epilog;
pub use error::{ErrorKind, MatmulError, Result};
pub use matmul::{Matmul, MatmulOutput};
pub use options::{Blocking, MatmulOptions};
pub use stream::{Job, Stream};
