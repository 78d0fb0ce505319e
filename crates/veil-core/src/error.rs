//! Error type shared by every Veil crate.

use std::fmt;

use crate::dtype::DType;

/// Errors raised by tensor operations and model construction.
///
/// All failures are synchronous and indicate a logic or configuration bug;
/// nothing here is retryable.
#[derive(Debug, Clone, PartialEq)]
pub enum VeilError {
    /// Invalid static configuration, detected at construction time.
    Config(String),
    /// A runtime argument violates an operation's precondition.
    InvalidArgument(String),
    /// Tensor rank/shape disagreement.
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },
    /// Inner dimensions of a matrix product disagree.
    MatmulDimMismatch { m: usize, k1: usize, k2: usize, n: usize },
    /// Axis out of range for the tensor's rank.
    InvalidAxis { axis: usize, ndim: usize },
    /// Reshape target is incompatible with the element count.
    InvalidReshape { numel: usize, shape: Vec<usize> },
    /// Shapes cannot be broadcast together.
    BroadcastError { a: Vec<usize>, b: Vec<usize> },
    /// Operands carry different dtypes.
    DTypeMismatch { expected: DType, got: DType },
    /// Operation does not support the tensor's dtype.
    UnsupportedDType(DType),
    /// Parameter path absent from a parameter blob.
    MissingParam(String),
    /// Storage, file I/O, or serialization failure.
    StorageError(String),
    /// Surface that is deliberately unfinished.
    NotImplemented(&'static str),
}

impl fmt::Display for VeilError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VeilError::Config(msg) => write!(f, "invalid configuration: {msg}"),
            VeilError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            VeilError::ShapeMismatch { expected, got } => {
                write!(f, "shape mismatch: expected {expected:?}, got {got:?}")
            }
            VeilError::MatmulDimMismatch { m, k1, k2, n } => {
                write!(f, "matmul dim mismatch: [{m}, {k1}] x [{k2}, {n}]")
            }
            VeilError::InvalidAxis { axis, ndim } => {
                write!(f, "axis {axis} out of range for tensor of rank {ndim}")
            }
            VeilError::InvalidReshape { numel, shape } => {
                write!(f, "cannot reshape {numel} elements into {shape:?}")
            }
            VeilError::BroadcastError { a, b } => {
                write!(f, "cannot broadcast shapes {a:?} and {b:?}")
            }
            VeilError::DTypeMismatch { expected, got } => {
                write!(f, "dtype mismatch: expected {expected}, got {got}")
            }
            VeilError::UnsupportedDType(dtype) => write!(f, "unsupported dtype: {dtype}"),
            VeilError::MissingParam(path) => write!(f, "missing parameter: {path}"),
            VeilError::StorageError(msg) => write!(f, "storage error: {msg}"),
            VeilError::NotImplemented(what) => write!(f, "not implemented: {what}"),
        }
    }
}

impl std::error::Error for VeilError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_shape_mismatch() {
        let e = VeilError::ShapeMismatch { expected: vec![2, 3], got: vec![3, 2] };
        assert_eq!(format!("{e}"), "shape mismatch: expected [2, 3], got [3, 2]");
    }

    #[test]
    fn test_display_matmul() {
        let e = VeilError::MatmulDimMismatch { m: 2, k1: 3, k2: 4, n: 5 };
        assert_eq!(format!("{e}"), "matmul dim mismatch: [2, 3] x [4, 5]");
    }

    #[test]
    fn test_display_config_and_missing_param() {
        let e = VeilError::Config("embed_dim 30 not divisible by 4".into());
        assert!(format!("{e}").contains("invalid configuration"));
        let e = VeilError::MissingParam("encoder.cls_token".into());
        assert_eq!(format!("{e}"), "missing parameter: encoder.cls_token");
    }

    #[test]
    fn test_error_trait_object() {
        let e: Box<dyn std::error::Error> = Box::new(VeilError::NotImplemented("x"));
        assert_eq!(e.to_string(), "not implemented: x");
    }
}
