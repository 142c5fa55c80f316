use half::f16;

use crate::dtype::DType;
use crate::error::{Result, TensorError};

/// Host-side tensor storage.
///
/// One variant per [`DType`]. Backends that share host memory read and write
/// these buffers directly.
#[derive(Debug, Clone, PartialEq)]
pub enum CpuStorage {
    F16(Vec<f16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    U8(Vec<u8>),
}

/// Scalar types that can live in a [`CpuStorage`].
pub trait Element: Copy + Default + PartialEq + Send + Sync + std::fmt::Debug + 'static {
    const DTYPE: DType;

    fn view(storage: &CpuStorage) -> Option<&[Self]>;
    fn view_mut(storage: &mut CpuStorage) -> Option<&mut [Self]>;
    fn wrap(data: Vec<Self>) -> CpuStorage;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const DTYPE: DType = DType::$variant;

            fn view(storage: &CpuStorage) -> Option<&[Self]> {
                match storage {
                    CpuStorage::$variant(v) => Some(v.as_slice()),
                    _ => None,
                }
            }

            fn view_mut(storage: &mut CpuStorage) -> Option<&mut [Self]> {
                match storage {
                    CpuStorage::$variant(v) => Some(v.as_mut_slice()),
                    _ => None,
                }
            }

            fn wrap(data: Vec<Self>) -> CpuStorage {
                CpuStorage::$variant(data)
            }
        }
    };
}

impl_element!(f16, F16);
impl_element!(f32, F32);
impl_element!(f64, F64);
impl_element!(u8, U8);

impl CpuStorage {
    /// Number of elements in this storage.
    pub fn len(&self) -> usize {
        match self {
            CpuStorage::F16(v) => v.len(),
            CpuStorage::F32(v) => v.len(),
            CpuStorage::F64(v) => v.len(),
            CpuStorage::U8(v) => v.len(),
        }
    }

    /// Returns true if the storage contains no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the dtype of this storage.
    pub fn dtype(&self) -> DType {
        match self {
            CpuStorage::F16(_) => DType::F16,
            CpuStorage::F32(_) => DType::F32,
            CpuStorage::F64(_) => DType::F64,
            CpuStorage::U8(_) => DType::U8,
        }
    }

    /// Create zero-filled storage for the given dtype and element count.
    pub fn zeros(dtype: DType, n: usize) -> Self {
        match dtype {
            DType::F16 => CpuStorage::F16(vec![f16::ZERO; n]),
            DType::F32 => CpuStorage::F32(vec![0.0; n]),
            DType::F64 => CpuStorage::F64(vec![0.0; n]),
            DType::U8 => CpuStorage::U8(vec![0; n]),
        }
    }

    /// Create storage from a typed vector.
    pub fn from_vec<T: Element>(data: Vec<T>) -> Self {
        T::wrap(data)
    }

    /// Borrow the data as a typed slice.
    ///
    /// # Errors
    /// Returns `DTypeMismatch` if `T` is not the storage's element type.
    pub fn as_slice<T: Element>(&self) -> Result<&[T]> {
        let got = self.dtype();
        T::view(self).ok_or(TensorError::DTypeMismatch {
            expected: T::DTYPE,
            got,
        })
    }

    /// Borrow the data as a mutable typed slice.
    ///
    /// # Errors
    /// Returns `DTypeMismatch` if `T` is not the storage's element type.
    pub fn as_mut_slice<T: Element>(&mut self) -> Result<&mut [T]> {
        let got = self.dtype();
        T::view_mut(self).ok_or(TensorError::DTypeMismatch {
            expected: T::DTYPE,
            got,
        })
    }

    /// Copy the data out as f64, widening every element type.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            CpuStorage::F16(v) => v.iter().map(|x| x.to_f64()).collect(),
            CpuStorage::F32(v) => v.iter().map(|&x| x as f64).collect(),
            CpuStorage::F64(v) => v.clone(),
            CpuStorage::U8(v) => v.iter().map(|&x| x as f64).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec() {
        let s = CpuStorage::from_vec(vec![1.0f32, 2.0, 3.0]);
        assert_eq!(s.len(), 3);
        assert!(!s.is_empty());
        assert_eq!(s.dtype(), DType::F32);
        assert_eq!(s.as_slice::<f32>().unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_zeros() {
        let s = CpuStorage::zeros(DType::F64, 5);
        assert_eq!(s.as_slice::<f64>().unwrap(), &[0.0; 5]);

        let m = CpuStorage::zeros(DType::U8, 3);
        assert_eq!(m.as_slice::<u8>().unwrap(), &[0, 0, 0]);

        let h = CpuStorage::zeros(DType::F16, 2);
        assert_eq!(h.dtype(), DType::F16);
    }

    #[test]
    fn test_wrong_element_type() {
        let s = CpuStorage::from_vec(vec![1.0f64]);
        let err = s.as_slice::<f32>().unwrap_err();
        assert_eq!(
            err,
            TensorError::DTypeMismatch {
                expected: DType::F32,
                got: DType::F64
            }
        );
    }

    #[test]
    fn test_mut_slice() {
        let mut s = CpuStorage::from_vec(vec![1.0f32, 2.0]);
        let slice = s.as_mut_slice::<f32>().unwrap();
        slice[0] = 42.0;
        assert_eq!(s.as_slice::<f32>().unwrap()[0], 42.0);
    }

    #[test]
    fn test_to_f64_vec_widens() {
        let h = CpuStorage::from_vec(vec![f16::from_f32(0.5), f16::from_f32(2.0)]);
        assert_eq!(h.to_f64_vec(), vec![0.5, 2.0]);

        let m = CpuStorage::from_vec(vec![0u8, 1, 1]);
        assert_eq!(m.to_f64_vec(), vec![0.0, 1.0, 1.0]);
    }
}
