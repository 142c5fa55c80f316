use std::fmt::Debug;

use epimat_tensor::{CpuStorage, DType, Device};

use crate::auxiliary::AuxRole;
use crate::epilog::Epilog;
use crate::error::{MatmulError, Result};

/// Problem size of `a[m, k] @ b[k, n]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatmulDims {
    pub m: usize,
    pub k: usize,
    pub n: usize,
}

/// Read-only view of everything a fused launch consumes.
///
/// All buffers are row-major. `bias` has `m` elements, `relu_aux` and
/// `gelu_aux` have `m * n`.
#[derive(Debug)]
pub struct EpilogLaunch<'a> {
    pub epilog: Epilog,
    pub dims: MatmulDims,
    pub a: &'a CpuStorage,
    pub b: &'a CpuStorage,
    pub bias: Option<&'a CpuStorage>,
    pub relu_aux: Option<&'a CpuStorage>,
    pub gelu_aux: Option<&'a CpuStorage>,
}

impl<'a> EpilogLaunch<'a> {
    /// Fetch a required input, failing with `MissingAuxiliaryInput`.
    pub fn input(&self, role: AuxRole) -> Result<&'a CpuStorage> {
        let slot = match role {
            AuxRole::Bias => self.bias,
            AuxRole::ReluAux => self.relu_aux,
            AuxRole::GeluAux => self.gelu_aux,
            AuxRole::BGrad => None,
        };
        slot.ok_or(MatmulError::MissingAuxiliaryInput {
            epilog: self.epilog,
            role,
        })
    }
}

/// Buffers a fused launch writes. Optional slots are present exactly when
/// the epilog emits that role.
#[derive(Debug)]
pub struct EpilogOutputs<'a> {
    pub result: &'a mut CpuStorage,
    pub relu_aux: Option<&'a mut CpuStorage>,
    pub gelu_aux: Option<&'a mut CpuStorage>,
    pub bgrad: Option<&'a mut CpuStorage>,
}

/// Trait for pluggable compute backends that execute fused-epilog matmuls.
///
/// `matmul_epilog` runs on a stream worker thread, after the facade has
/// validated shapes, dtypes and auxiliary roles.
pub trait ComputeBackend: Send + Sync + Debug {
    /// Returns the name of this backend (e.g., "cpu").
    fn name(&self) -> &str;

    /// Whether `epilog` can run on operands of `dtype` living on `device`.
    fn supports(&self, epilog: Epilog, dtype: DType, device: Device) -> bool;

    /// Compute `a @ b` with the fused epilog, writing every output slot.
    fn matmul_epilog(&self, launch: &EpilogLaunch<'_>, out: &mut EpilogOutputs<'_>) -> Result<()>;
}
