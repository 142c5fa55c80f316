use std::sync::Arc;

use epimat_tensor::{DType, Device, Shape, Tensor, TensorError};
use log::debug;

use crate::auxiliary::{AuxRole, AuxiliaryBundle, EpilogInputs};
use crate::backend::{ComputeBackend, EpilogLaunch, EpilogOutputs, MatmulDims};
use crate::epilog::Epilog;
use crate::error::{MatmulError, Result};
use crate::options::{Blocking, MatmulOptions};
use crate::stream::Stream;

/// What [`Matmul::multiply`] hands back.
#[derive(Debug, Clone)]
pub enum MatmulOutput {
    /// The epilog emits no side data.
    Result(Tensor),
    /// The result plus the epilog's auxiliary outputs.
    WithAuxiliary(Tensor, AuxiliaryBundle),
}

impl MatmulOutput {
    pub fn result(&self) -> &Tensor {
        match self {
            MatmulOutput::Result(t) | MatmulOutput::WithAuxiliary(t, _) => t,
        }
    }

    pub fn auxiliary(&self) -> Option<&AuxiliaryBundle> {
        match self {
            MatmulOutput::Result(_) => None,
            MatmulOutput::WithAuxiliary(_, aux) => Some(aux),
        }
    }

    pub fn into_parts(self) -> (Tensor, Option<AuxiliaryBundle>) {
        match self {
            MatmulOutput::Result(t) => (t, None),
            MatmulOutput::WithAuxiliary(t, aux) => (t, Some(aux)),
        }
    }

    pub fn into_result(self) -> Tensor {
        self.into_parts().0
    }
}

/// Fused-epilog matmul facade.
///
/// Validates operands and auxiliary inputs on the calling thread, allocates
/// the outputs, and issues the launch on its [`Stream`]. Unless the options
/// ask for [`Blocking::Always`], `multiply` returns before the numeric work
/// is done; call [`Matmul::synchronize`] before reading the results.
#[derive(Debug, Clone)]
pub struct Matmul {
    backend: Arc<dyn ComputeBackend>,
    stream: Stream,
    options: MatmulOptions,
}

impl Matmul {
    pub fn new(backend: Arc<dyn ComputeBackend>, stream: Stream) -> Self {
        Self::with_options(backend, stream, MatmulOptions::default())
    }

    pub fn with_options(
        backend: Arc<dyn ComputeBackend>,
        stream: Stream,
        options: MatmulOptions,
    ) -> Self {
        Matmul {
            backend,
            stream,
            options,
        }
    }

    pub fn backend(&self) -> &dyn ComputeBackend {
        self.backend.as_ref()
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    pub fn options(&self) -> MatmulOptions {
        self.options
    }

    /// Wait for everything issued on this facade's stream.
    pub fn synchronize(&self) -> Result<()> {
        self.stream.synchronize()
    }

    /// Compute `a @ b` with `epilog` fused in.
    ///
    /// `epilog_inputs` must carry exactly the roles the epilog requires:
    /// a bare tensor is bound to the epilog's only required role, and a
    /// bundle returned by an earlier forward call can be passed as-is.
    pub fn multiply(
        &self,
        a: &Tensor,
        b: &Tensor,
        epilog: Epilog,
        epilog_inputs: impl Into<EpilogInputs>,
    ) -> Result<MatmulOutput> {
        let dims = check_operands(a, b)?;
        let dtype = a.dtype();
        let device = a.device();

        if !self.backend.supports(epilog, dtype, device) {
            return Err(MatmulError::UnsupportedEpilog {
                epilog,
                dtype,
                device,
                backend: self.backend.name().to_string(),
            });
        }

        let inputs = epilog_inputs.into().into_bundle(epilog)?;
        check_inputs(epilog, &inputs, dims, dtype, device)?;
        if self.options.strict_pairing {
            if let Some(producer) = inputs.producer() {
                if !epilog.accepts_auxiliary_from(producer) {
                    return Err(MatmulError::IncompatibleEpilogPair {
                        producer,
                        consumer: epilog,
                    });
                }
            }
        }

        let result = Tensor::zeros(Shape::matrix(dims.m, dims.n), dtype).with_device(device);
        let outputs = epilog
            .emits()
            .iter()
            .fold(AuxiliaryBundle::new(), |bundle, &role| {
                bundle.with(role, auxiliary_output(epilog, role, dims, dtype, device))
            });

        let label = format!(
            "{} [{}x{}] @ [{}x{}] {}",
            epilog, dims.m, dims.k, dims.k, dims.n, dtype
        );
        debug!("enqueue {} on stream '{}'", label, self.stream.name());

        let pending = PendingLaunch {
            backend: Arc::clone(&self.backend),
            epilog,
            dims,
            a: a.clone(),
            b: b.clone(),
            inputs,
            result: result.clone(),
            outputs: outputs.clone(),
        };
        self.stream
            .enqueue(label, Box::new(move || pending.execute()))?;

        if self.options.blocking == Blocking::Always {
            self.stream.synchronize()?;
        }

        if epilog.emits().is_empty() {
            Ok(MatmulOutput::Result(result))
        } else {
            Ok(MatmulOutput::WithAuxiliary(result, outputs.with_producer(epilog)))
        }
    }

    /// Run `forward` and feed its auxiliary outputs into `backward`, both on
    /// the same operands.
    pub fn forward_backward(
        &self,
        a: &Tensor,
        b: &Tensor,
        forward: Epilog,
        backward: Epilog,
        forward_inputs: impl Into<EpilogInputs>,
    ) -> Result<(MatmulOutput, MatmulOutput)> {
        let fwd = self.multiply(a, b, forward, forward_inputs)?;
        let carried = fwd.auxiliary().cloned();
        let bwd = self.multiply(a, b, backward, carried)?;
        Ok((fwd, bwd))
    }
}

fn matrix_dims(t: &Tensor, operand: &str) -> Result<(usize, usize)> {
    t.shape().as_matrix().ok_or_else(|| MatmulError::NotAMatrix {
        operand: operand.to_string(),
        shape: t.shape().dims().to_vec(),
    })
}

fn check_operands(a: &Tensor, b: &Tensor) -> Result<MatmulDims> {
    let (m, k) = matrix_dims(a, "a")?;
    let (k2, n) = matrix_dims(b, "b")?;

    if b.dtype() != a.dtype() {
        return Err(MatmulError::DTypeMismatch {
            operand: "b".to_string(),
            expected: a.dtype(),
            got: b.dtype(),
        });
    }
    if b.device() != a.device() {
        return Err(MatmulError::DeviceMismatch {
            operand: "b".to_string(),
            expected: a.device(),
            got: b.device(),
        });
    }
    if k != k2 {
        return Err(MatmulError::ShapeMismatch {
            operand: "b".to_string(),
            expected: vec![k, n],
            got: vec![k2, n],
        });
    }
    // The result and every (m, n) auxiliary are sized from this product.
    if Shape::matrix(m, n).checked_numel().is_none() {
        return Err(TensorError::TooLarge { dims: vec![m, n] }.into());
    }
    Ok(MatmulDims { m, k, n })
}

fn check_inputs(
    epilog: Epilog,
    inputs: &AuxiliaryBundle,
    dims: MatmulDims,
    dtype: DType,
    device: Device,
) -> Result<()> {
    if let Some(&role) = epilog.requires().iter().find(|r| !inputs.contains(**r)) {
        return Err(MatmulError::MissingAuxiliaryInput { epilog, role });
    }
    if let Some(role) = inputs.roles().find(|r| !epilog.requires().contains(r)) {
        return Err(MatmulError::UnexpectedAuxiliaryInput {
            epilog,
            role: role.name().to_string(),
        });
    }

    let MatmulDims { m, n, .. } = dims;
    for (role, tensor) in inputs.iter() {
        let (want_dtype, shape_ok, want_dims) = match role {
            AuxRole::Bias => (dtype, tensor.shape().is_column_of(m), vec![m, 1]),
            AuxRole::ReluAux => (
                DType::U8,
                tensor.shape().as_matrix() == Some((m, n)),
                vec![m, n],
            ),
            AuxRole::GeluAux => (dtype, tensor.shape().as_matrix() == Some((m, n)), vec![m, n]),
            // Never required, so already rejected above.
            AuxRole::BGrad => continue,
        };
        if tensor.device() != device {
            return Err(MatmulError::DeviceMismatch {
                operand: role.name().to_string(),
                expected: device,
                got: tensor.device(),
            });
        }
        if tensor.dtype() != want_dtype {
            return Err(MatmulError::DTypeMismatch {
                operand: role.name().to_string(),
                expected: want_dtype,
                got: tensor.dtype(),
            });
        }
        if !shape_ok {
            return Err(MatmulError::ShapeMismatch {
                operand: role.name().to_string(),
                expected: want_dims,
                got: tensor.shape().dims().to_vec(),
            });
        }
    }
    Ok(())
}

/// Zero-filled buffer for an emitted role.
fn auxiliary_output(
    epilog: Epilog,
    role: AuxRole,
    dims: MatmulDims,
    dtype: DType,
    device: Device,
) -> Tensor {
    let MatmulDims { m, n, .. } = dims;
    let tensor = match role {
        AuxRole::ReluAux => Tensor::zeros(Shape::matrix(m, n), DType::U8),
        AuxRole::GeluAux => Tensor::zeros(Shape::matrix(m, n), dtype),
        AuxRole::BGrad if epilog == Epilog::BGradB => Tensor::zeros(Shape::matrix(n, 1), dtype),
        AuxRole::BGrad | AuxRole::Bias => Tensor::zeros(Shape::matrix(m, 1), dtype),
    };
    tensor.with_device(device)
}

/// Everything a queued launch needs, owned so it can cross to the worker.
struct PendingLaunch {
    backend: Arc<dyn ComputeBackend>,
    epilog: Epilog,
    dims: MatmulDims,
    a: Tensor,
    b: Tensor,
    inputs: AuxiliaryBundle,
    result: Tensor,
    outputs: AuxiliaryBundle,
}

impl PendingLaunch {
    fn execute(&self) -> Result<()> {
        let a = self.a.read();
        let b = self.b.read();
        let bias = self.inputs.get(AuxRole::Bias).map(Tensor::read);
        let relu_aux_in = self.inputs.get(AuxRole::ReluAux).map(Tensor::read);
        let gelu_aux_in = self.inputs.get(AuxRole::GeluAux).map(Tensor::read);

        let mut result = self.result.write();
        let mut relu_aux_out = self.outputs.get(AuxRole::ReluAux).map(Tensor::write);
        let mut gelu_aux_out = self.outputs.get(AuxRole::GeluAux).map(Tensor::write);
        let mut bgrad = self.outputs.get(AuxRole::BGrad).map(Tensor::write);

        let launch = EpilogLaunch {
            epilog: self.epilog,
            dims: self.dims,
            a: &a,
            b: &b,
            bias: bias.as_deref(),
            relu_aux: relu_aux_in.as_deref(),
            gelu_aux: gelu_aux_in.as_deref(),
        };
        let mut out = EpilogOutputs {
            result: &mut result,
            relu_aux: relu_aux_out.as_deref_mut(),
            gelu_aux: gelu_aux_out.as_deref_mut(),
            bgrad: bgrad.as_deref_mut(),
        };
        self.backend.matmul_epilog(&launch, &mut out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuBackend;
    use crate::error::ErrorKind;

    fn facade() -> Matmul {
        Matmul::new(Arc::new(CpuBackend::new()), Stream::new("test").unwrap())
    }

    fn matrix(data: Vec<f64>, rows: usize, cols: usize) -> Tensor {
        Tensor::from_vec(data, [rows, cols]).unwrap()
    }

    #[test]
    fn test_default_epilog_values() {
        let mm = facade();
        let a = matrix(vec![1.0, 2.0, 3.0, 4.0], 2, 2);
        let b = matrix(vec![5.0, 6.0, 7.0, 8.0], 2, 2);
        let out = mm.multiply(&a, &b, Epilog::Default, ()).unwrap();
        assert!(out.auxiliary().is_none());
        mm.synchronize().unwrap();
        assert_eq!(out.result().to_vec::<f64>().unwrap(), vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_accessors() {
        let options = MatmulOptions::default().with_strict_pairing(true);
        let stream = Stream::new("acc").unwrap();
        let mm = Matmul::with_options(Arc::new(CpuBackend::new()), stream.clone(), options);
        assert_eq!(mm.backend().name(), "cpu");
        assert_eq!(mm.options(), options);
        assert!(mm.stream().same_queue(&stream));
    }

    #[test]
    fn test_not_a_matrix() {
        let mm = facade();
        let a = Tensor::zeros([4], DType::F64);
        let b = Tensor::zeros([4, 1], DType::F64);
        let err = mm.multiply(&a, &b, Epilog::Default, ()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAMatrix);
    }

    #[test]
    fn test_result_size_overflow_is_an_error() {
        let mm = facade();
        let rows = usize::MAX / 2;
        // Both operands are empty, but (rows, 3) cannot be allocated.
        let a = Tensor::zeros([rows, 0], DType::F64);
        let b = Tensor::zeros([0, 3], DType::F64);
        let err = mm.multiply(&a, &b, Epilog::Default, ()).unwrap_err();
        assert_eq!(
            err,
            MatmulError::Tensor(TensorError::TooLarge { dims: vec![rows, 3] })
        );
        assert_eq!(err.kind(), ErrorKind::Tensor);
    }

    #[test]
    fn test_operand_dtype_mismatch() {
        let mm = facade();
        let a = Tensor::zeros([2, 2], DType::F64);
        let b = Tensor::zeros([2, 2], DType::F32);
        let err = mm.multiply(&a, &b, Epilog::Default, ()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DTypeMismatch);
    }

    #[test]
    fn test_operand_device_mismatch() {
        let mm = facade();
        let a = Tensor::zeros([2, 2], DType::F64);
        let b = Tensor::zeros([2, 2], DType::F64).with_device(Device::Accelerator(0));
        let err = mm.multiply(&a, &b, Epilog::Default, ()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceMismatch);
    }

    #[test]
    fn test_accelerator_operands_unsupported_on_cpu() {
        let mm = facade();
        let a = Tensor::zeros([2, 2], DType::F64).with_device(Device::Accelerator(0));
        let b = a.clone();
        let err = mm.multiply(&a, &b, Epilog::Relu, ()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedEpilog);
    }

    #[test]
    fn test_bias_dtype_checked() {
        let mm = facade();
        let a = Tensor::zeros([2, 3], DType::F64);
        let b = Tensor::zeros([3, 2], DType::F64);
        let bias = Tensor::zeros([2, 1], DType::F32);
        let err = mm.multiply(&a, &b, Epilog::Bias, bias).unwrap_err();
        assert!(matches!(err, MatmulError::DTypeMismatch { ref operand, .. } if operand == "bias"));
    }

    #[test]
    fn test_bias_shape_checked() {
        let mm = facade();
        let a = Tensor::zeros([2, 3], DType::F64);
        let b = Tensor::zeros([3, 2], DType::F64);
        let bias = Tensor::zeros([3, 1], DType::F64);
        let err = mm.multiply(&a, &b, Epilog::ReluBias, bias).unwrap_err();
        assert_eq!(
            err,
            MatmulError::ShapeMismatch {
                operand: "bias".to_string(),
                expected: vec![2, 1],
                got: vec![3, 1],
            }
        );
    }

    #[test]
    fn test_flat_bias_accepted() {
        let mm = facade();
        let a = matrix(vec![1.0, 0.0, 0.0, 1.0], 2, 2);
        let b = matrix(vec![1.0, 1.0, 1.0, 1.0], 2, 2);
        let bias = Tensor::from_vec(vec![10.0f64, 20.0], [2]).unwrap();
        let out = mm.multiply(&a, &b, Epilog::Bias, bias).unwrap();
        mm.synchronize().unwrap();
        assert_eq!(out.result().to_vec::<f64>().unwrap(), vec![11.0, 11.0, 21.0, 21.0]);
    }

    #[test]
    fn test_relu_aux_wrong_dtype() {
        let mm = facade();
        let a = Tensor::zeros([2, 2], DType::F64);
        let mask = Tensor::zeros([2, 2], DType::F64);
        let err = mm.multiply(&a, &a, Epilog::DRelu, mask).unwrap_err();
        assert!(matches!(
            err,
            MatmulError::DTypeMismatch {
                expected: DType::U8,
                ..
            }
        ));
    }

    #[test]
    fn test_bgradb_shape() {
        let mm = facade();
        let a = Tensor::ones([4, 3], DType::F32);
        let b = Tensor::ones([3, 5], DType::F32);
        let out = mm.multiply(&a, &b, Epilog::BGradB, ()).unwrap();
        mm.synchronize().unwrap();
        let bgrad = out.auxiliary().unwrap().get(AuxRole::BGrad).unwrap();
        assert_eq!(bgrad.shape().dims(), &[5, 1]);
        assert_eq!(bgrad.to_vec::<f32>().unwrap(), vec![3.0; 5]);
    }

    #[test]
    fn test_outputs_keep_operand_device() {
        #[derive(Debug)]
        struct AnyDevice;
        impl ComputeBackend for AnyDevice {
            fn name(&self) -> &str {
                "any"
            }
            fn supports(&self, _: Epilog, _: DType, _: Device) -> bool {
                true
            }
            fn matmul_epilog(
                &self,
                launch: &EpilogLaunch<'_>,
                out: &mut EpilogOutputs<'_>,
            ) -> Result<()> {
                CpuBackend::new().matmul_epilog(launch, out)
            }
        }

        let mm = Matmul::new(Arc::new(AnyDevice), Stream::new("any").unwrap());
        let device = Device::Accelerator(2);
        let a = Tensor::ones([2, 2], DType::F32).with_device(device);
        let out = mm.multiply(&a, &a, Epilog::ReluAux, ()).unwrap();
        mm.synchronize().unwrap();
        assert_eq!(out.result().device(), device);
        assert_eq!(
            out.auxiliary().unwrap().get(AuxRole::ReluAux).unwrap().device(),
            device
        );
    }
}
