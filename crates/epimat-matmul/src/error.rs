use epimat_tensor::{DType, Device, TensorError};
use thiserror::Error;

use crate::auxiliary::AuxRole;
use crate::epilog::Epilog;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatmulError {
    #[error("shape mismatch for {operand}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        operand: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("operand {operand} must be 2-D, got shape {shape:?}")]
    NotAMatrix { operand: String, shape: Vec<usize> },
    #[error("dtype mismatch for {operand}: expected {expected}, got {got}")]
    DTypeMismatch {
        operand: String,
        expected: DType,
        got: DType,
    },
    #[error("device mismatch for {operand}: expected {expected}, got {got}")]
    DeviceMismatch {
        operand: String,
        expected: Device,
        got: Device,
    },
    #[error("epilog {epilog} requires auxiliary input '{role}'")]
    MissingAuxiliaryInput { epilog: Epilog, role: AuxRole },
    #[error("epilog {epilog} does not accept auxiliary input '{role}'")]
    UnexpectedAuxiliaryInput { epilog: Epilog, role: String },
    #[error("backend '{backend}' cannot run epilog {epilog} for {dtype} on {device}")]
    UnsupportedEpilog {
        epilog: Epilog,
        dtype: DType,
        device: Device,
        backend: String,
    },
    #[error("epilog {consumer} cannot consume auxiliary output of {producer}")]
    IncompatibleEpilogPair { producer: Epilog, consumer: Epilog },
    #[error("device fault: {0}")]
    DeviceFault(String),
    #[error("unknown epilog: {0}")]
    UnknownEpilog(String),
    #[error("unknown auxiliary role: {0}")]
    UnknownAuxRole(String),
    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),
}

/// Field-less discriminant of [`MatmulError`], for matching on the kind alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ShapeMismatch,
    NotAMatrix,
    DTypeMismatch,
    DeviceMismatch,
    MissingAuxiliaryInput,
    UnexpectedAuxiliaryInput,
    UnsupportedEpilog,
    IncompatibleEpilogPair,
    DeviceFault,
    UnknownEpilog,
    UnknownAuxRole,
    Tensor,
}

impl MatmulError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MatmulError::ShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            MatmulError::NotAMatrix { .. } => ErrorKind::NotAMatrix,
            MatmulError::DTypeMismatch { .. } => ErrorKind::DTypeMismatch,
            MatmulError::DeviceMismatch { .. } => ErrorKind::DeviceMismatch,
            MatmulError::MissingAuxiliaryInput { .. } => ErrorKind::MissingAuxiliaryInput,
            MatmulError::UnexpectedAuxiliaryInput { .. } => ErrorKind::UnexpectedAuxiliaryInput,
            MatmulError::UnsupportedEpilog { .. } => ErrorKind::UnsupportedEpilog,
            MatmulError::IncompatibleEpilogPair { .. } => ErrorKind::IncompatibleEpilogPair,
            MatmulError::DeviceFault(_) => ErrorKind::DeviceFault,
            MatmulError::UnknownEpilog(_) => ErrorKind::UnknownEpilog,
            MatmulError::UnknownAuxRole(_) => ErrorKind::UnknownAuxRole,
            MatmulError::Tensor(_) => ErrorKind::Tensor,
        }
    }
}

pub type Result<T> = std::result::Result<T, MatmulError>;
