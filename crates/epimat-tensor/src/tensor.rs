use std::sync::Arc;

use half::f16;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rand::Rng;

use crate::device::Device;
use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::shape::Shape;
use crate::storage::{CpuStorage, Element};

/// A shape- and dtype-tagged handle to a shared buffer.
///
/// Cloning a `Tensor` is cheap and yields a handle to the *same* buffer, so a
/// result handed back to the caller can still be filled in by work that is
/// running on a device queue. Readers take a shared lock on the buffer; an
/// in-flight writer holds the exclusive lock until it has finished.
#[derive(Debug, Clone)]
pub struct Tensor {
    buffer: Arc<RwLock<CpuStorage>>,
    shape: Shape,
    dtype: DType,
    device: Device,
}

impl Tensor {
    /// Create a tensor from typed data and a shape.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if `data.len() != shape.numel()`.
    pub fn from_vec<T: Element>(data: Vec<T>, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: shape.dims().to_vec(),
                got: vec![data.len()],
            });
        }
        Ok(Self::from_storage(CpuStorage::from_vec(data), shape))
    }

    fn from_storage(storage: CpuStorage, shape: Shape) -> Self {
        Tensor {
            dtype: storage.dtype(),
            buffer: Arc::new(RwLock::new(storage)),
            shape,
            device: Device::Cpu,
        }
    }

    /// Create a zero-filled tensor with the given shape and dtype.
    pub fn zeros(shape: impl Into<Shape>, dtype: DType) -> Self {
        let shape = shape.into();
        Self::from_storage(CpuStorage::zeros(dtype, shape.numel()), shape)
    }

    /// Create a tensor filled with ones.
    pub fn ones(shape: impl Into<Shape>, dtype: DType) -> Self {
        let shape = shape.into();
        let n = shape.numel();
        let storage = match dtype {
            DType::F16 => CpuStorage::F16(vec![f16::ONE; n]),
            DType::F32 => CpuStorage::F32(vec![1.0; n]),
            DType::F64 => CpuStorage::F64(vec![1.0; n]),
            DType::U8 => CpuStorage::U8(vec![1; n]),
        };
        Self::from_storage(storage, shape)
    }

    /// Create a tensor of samples drawn uniformly from `[0, 1)`.
    ///
    /// # Errors
    /// Returns `UnsupportedDType` for non-float dtypes.
    pub fn rand<R: Rng>(
        shape: impl Into<Shape>,
        dtype: DType,
        rng: &mut R,
    ) -> Result<Self> {
        let shape = shape.into();
        let n = shape.numel();
        let storage = match dtype {
            DType::F16 => CpuStorage::F16((0..n).map(|_| f16::from_f64(rng.gen())).collect()),
            DType::F32 => CpuStorage::F32((0..n).map(|_| rng.gen()).collect()),
            DType::F64 => CpuStorage::F64((0..n).map(|_| rng.gen()).collect()),
            DType::U8 => {
                return Err(TensorError::UnsupportedDType(format!(
                    "cannot sample uniform values for {}",
                    dtype
                )))
            }
        };
        Ok(Self::from_storage(storage, shape))
    }

    /// Retag this handle as living on `device`.
    ///
    /// Intended for backends whose device memory is host-visible; the buffer
    /// itself is not moved.
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Returns a reference to the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the tensor's data type.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the device this tensor is tagged with.
    pub fn device(&self) -> Device {
        self.device
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    /// Shared access to the underlying storage.
    ///
    /// Recursive so that the same buffer may be borrowed more than once by
    /// one thread (e.g. `a @ a`) even while a writer is queued.
    pub fn read(&self) -> RwLockReadGuard<'_, CpuStorage> {
        self.buffer.read_recursive()
    }

    /// Exclusive access to the underlying storage.
    pub fn write(&self) -> RwLockWriteGuard<'_, CpuStorage> {
        self.buffer.write()
    }

    /// Copy the data out as a typed vector.
    ///
    /// # Errors
    /// Returns `DTypeMismatch` if `T` is not this tensor's element type.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        Ok(self.read().as_slice::<T>()?.to_vec())
    }

    /// Copy the data out widened to f64.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.read().to_f64_vec()
    }

    /// True when both handles refer to the same buffer.
    pub fn same_buffer(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    /// Reshape the tensor, returning a new handle to the same buffer with
    /// a different shape.
    ///
    /// The total number of elements must remain the same.
    pub fn reshape(&self, new_shape: impl Into<Shape>) -> Result<Tensor> {
        let new_shape = new_shape.into();
        if self.shape.numel() != new_shape.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape.dims().to_vec(),
                got: new_shape.dims().to_vec(),
            });
        }
        Ok(Tensor {
            buffer: Arc::clone(&self.buffer),
            shape: new_shape,
            dtype: self.dtype,
            device: self.device,
        })
    }
}
