mod kernels;

use epimat_tensor::{CpuStorage, DType, Device, Element};
use num_traits::{AsPrimitive, Float};

use crate::auxiliary::AuxRole;
use crate::backend::{ComputeBackend, EpilogLaunch, EpilogOutputs, MatmulDims};
use crate::epilog::Epilog;
use crate::error::{MatmulError, Result};

/// Pure-Rust CPU compute backend.
///
/// Implements every epilog with straightforward loops optimized for
/// correctness rather than peak performance. Intended as a reference
/// implementation and fallback. Runs f32 and f64 operands in host memory.
#[derive(Debug, Clone)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        CpuBackend
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn supports(&self, _epilog: Epilog, dtype: DType, device: Device) -> bool {
        device.is_host() && matches!(dtype, DType::F32 | DType::F64)
    }

    fn matmul_epilog(&self, launch: &EpilogLaunch<'_>, out: &mut EpilogOutputs<'_>) -> Result<()> {
        match launch.a.dtype() {
            DType::F32 => run::<f32>(launch, out),
            DType::F64 => run::<f64>(launch, out),
            dtype => Err(MatmulError::UnsupportedEpilog {
                epilog: launch.epilog,
                dtype,
                device: Device::Cpu,
                backend: self.name().to_string(),
            }),
        }
    }
}

fn run<T>(launch: &EpilogLaunch<'_>, out: &mut EpilogOutputs<'_>) -> Result<()>
where
    T: Float + Element,
    f64: AsPrimitive<T>,
{
    let dims = launch.dims;
    let MatmulDims { m, k, n } = dims;
    let a = checked::<T>(launch.a, m * k, "a")?;
    let b = checked::<T>(launch.b, k * n, "b")?;

    let mut x = kernels::gemm(a, b, dims);

    match launch.epilog {
        Epilog::Default | Epilog::BGradA | Epilog::BGradB => {}
        Epilog::Bias
        | Epilog::Relu
        | Epilog::ReluAux
        | Epilog::ReluBias
        | Epilog::ReluAuxBias
        | Epilog::Gelu
        | Epilog::GeluAux
        | Epilog::GeluBias
        | Epilog::GeluAuxBias => forward(launch, out, &mut x)?,
        Epilog::DRelu | Epilog::DReluBGrad => {
            let mask = checked::<u8>(launch.input(AuxRole::ReluAux)?, m * n, "relu_aux")?;
            for (g, &keep) in x.iter_mut().zip(mask) {
                if keep == 0 {
                    *g = T::zero();
                }
            }
        }
        Epilog::DGelu | Epilog::DGeluBGrad => {
            let pre = checked::<T>(launch.input(AuxRole::GeluAux)?, m * n, "gelu_aux")?;
            for (g, &p) in x.iter_mut().zip(pre) {
                *g = *g * kernels::gelu_grad(p);
            }
        }
    }

    let bgrad = match launch.epilog {
        Epilog::DReluBGrad | Epilog::DGeluBGrad => Some(kernels::row_sums(&x, m, n)),
        Epilog::BGradA => Some(kernels::row_sums(a, m, k)),
        Epilog::BGradB => Some(kernels::col_sums(b, n)),
        _ => None,
    };
    if let Some(sums) = bgrad {
        store(slot(out.bgrad.as_deref_mut(), AuxRole::BGrad)?, &sums, "bgrad")?;
    }

    store(&mut *out.result, &x, "result")
}

/// Bias, auxiliary capture and activation for the forward epilogs.
fn forward<T>(launch: &EpilogLaunch<'_>, out: &mut EpilogOutputs<'_>, x: &mut [T]) -> Result<()>
where
    T: Float + Element,
    f64: AsPrimitive<T>,
{
    let MatmulDims { m, n, .. } = launch.dims;
    let epilog = launch.epilog;

    if epilog.requires().contains(&AuxRole::Bias) {
        let bias = checked::<T>(launch.input(AuxRole::Bias)?, m, "bias")?;
        kernels::add_row_bias(x, bias, n);
    }

    if epilog.emits().contains(&AuxRole::ReluAux) {
        let mask: Vec<u8> = x.iter().map(|&v| u8::from(v > T::zero())).collect();
        store(slot(out.relu_aux.as_deref_mut(), AuxRole::ReluAux)?, &mask, "relu_aux")?;
    }
    if epilog.emits().contains(&AuxRole::GeluAux) {
        store(slot(out.gelu_aux.as_deref_mut(), AuxRole::GeluAux)?, x, "gelu_aux")?;
    }

    match epilog {
        Epilog::Relu | Epilog::ReluAux | Epilog::ReluBias | Epilog::ReluAuxBias => {
            x.iter_mut().for_each(|v| *v = kernels::relu(*v));
        }
        Epilog::Gelu | Epilog::GeluAux | Epilog::GeluBias | Epilog::GeluAuxBias => {
            x.iter_mut().for_each(|v| *v = kernels::gelu(*v));
        }
        _ => {}
    }
    Ok(())
}

fn checked<'s, T: Element>(storage: &'s CpuStorage, len: usize, operand: &str) -> Result<&'s [T]> {
    let data = storage.as_slice::<T>()?;
    if data.len() != len {
        return Err(MatmulError::ShapeMismatch {
            operand: operand.to_string(),
            expected: vec![len],
            got: vec![data.len()],
        });
    }
    Ok(data)
}

fn slot(slot: Option<&mut CpuStorage>, role: AuxRole) -> Result<&mut CpuStorage> {
    slot.ok_or_else(|| MatmulError::DeviceFault(format!("no output buffer bound for '{}'", role)))
}

fn store<T: Element>(dst: &mut CpuStorage, src: &[T], operand: &str) -> Result<()> {
    let dst = dst.as_mut_slice::<T>()?;
    if dst.len() != src.len() {
        return Err(MatmulError::ShapeMismatch {
            operand: operand.to_string(),
            expected: vec![src.len()],
            got: vec![dst.len()],
        });
    }
    dst.copy_from_slice(src);
    Ok(())
}
