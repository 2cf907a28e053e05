//! Error type shared by every tensor, filter and layer operation.

use crate::malgebra::shape::Shape3;

/// Structural failures of the computation engine.
///
/// None of these are recoverable by retrying: they mean the caller wired
/// layers together wrongly or handed over a wrongly sized buffer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TensorError {
    /// A tensor reached a layer or operation with the wrong shape.
    #[error("{context}: expected shape {expected}, got {got}")]
    ShapeMismatch {
        context: &'static str,
        expected: Shape3,
        got: Shape3,
    },
    /// `set_params` received a vector of the wrong length.
    #[error("invalid parameter count: expected {expected}, got {got}")]
    InvalidParameterCount { expected: usize, got: usize },
    /// Stride, scale or padding do not divide the spatial dimensions.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    /// A flat value buffer does not match the volume of its shape.
    #[error("data length {got} does not match shape volume {expected}")]
    DataLength { expected: usize, got: usize },
    #[error("filter bank must contain at least one filter")]
    EmptyFilterBank,
    /// `backward` was called on a layer that never saw a forward pass.
    #[error("{0}: backward pass requested before any forward pass")]
    BackwardBeforeForward(&'static str),
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type TensorResult<T> = Result<T, TensorError>;

/// Fails with [`TensorError::ShapeMismatch`] unless `got == expected`.
pub fn check_shape(context: &'static str, expected: Shape3, got: Shape3) -> TensorResult<()> {
    if expected != got {
        return Err(TensorError::ShapeMismatch { context, expected, got });
    }
    Ok(())
}

/// Fails with [`TensorError::InvalidParameterCount`] unless the lengths agree.
pub fn check_param_count(expected: usize, got: usize) -> TensorResult<()> {
    if expected != got {
        return Err(TensorError::InvalidParameterCount { expected, got });
    }
    Ok(())
}

impl From<std::io::Error> for TensorError {
    fn from(err: std::io::Error) -> Self {
        TensorError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TensorError {
    fn from(err: serde_json::Error) -> Self {
        TensorError::Serialization(err.to_string())
    }
}
