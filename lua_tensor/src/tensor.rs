//! TensorData trait plus the borrowed and owned `f64` tensors built on it.

use thiserror::Error;

use crate::shape::Shape;

/// Errors raised by bounds-checked element access.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// Number of indices differs from the tensor rank.
    #[error("expected {rank} indices (one per axis), got {got}")]
    Arity { rank: usize, got: usize },

    /// An index falls outside its axis.
    #[error("index {index} is out of bounds for axis {axis} of size {dim}")]
    OutOfBounds { axis: usize, index: i64, dim: usize },

    /// The flattened position falls outside the buffer.
    #[error("flat position {position} is out of bounds for {numel} elements")]
    FlatOutOfBounds { position: usize, numel: usize },
}

/// Error building a tensor from a buffer that does not fit its shape.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("data length {len} doesn't match shape {shape} (numel={numel})")]
pub struct LengthMismatch {
    pub len: usize,
    pub shape: Shape,
    pub numel: usize,
}

/// Core trait for dense row-major `f64` tensor storage.
pub trait TensorData {
    /// Get the shape of this tensor.
    fn shape(&self) -> &Shape;

    /// Get data as a contiguous f64 slice.
    fn as_slice(&self) -> &[f64];

    /// Get the total number of elements.
    fn numel(&self) -> usize {
        self.shape().numel()
    }

    /// Check if this is a scalar (0-dim tensor).
    fn is_scalar(&self) -> bool {
        self.shape().is_scalar()
    }

    /// Flatten a signed multi-index into a buffer position.
    ///
    /// Every index must satisfy `0 <= index < shape[axis]`, and exactly one
    /// index per axis is required.
    fn flat_index(&self, indices: &[i64]) -> Result<usize, IndexError> {
        let shape = self.shape();
        if indices.len() != shape.ndim() {
            return Err(IndexError::Arity {
                rank: shape.ndim(),
                got: indices.len(),
            });
        }

        let mut position = 0usize;
        for (axis, (&index, &dim)) in indices.iter().zip(shape.dims()).enumerate() {
            if index < 0 || index as u64 >= dim as u64 {
                return Err(IndexError::OutOfBounds { axis, index, dim });
            }
            position = position * dim + index as usize;
        }

        let numel = self.as_slice().len();
        if position >= numel {
            return Err(IndexError::FlatOutOfBounds { position, numel });
        }
        Ok(position)
    }

    /// Bounds-checked element access.
    fn get(&self, indices: &[i64]) -> Result<f64, IndexError> {
        let position = self.flat_index(indices)?;
        Ok(self.as_slice()[position])
    }
}

/// A borrowed, read-only view of a host buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TensorView<'a> {
    shape: &'a Shape,
    data: &'a [f64],
}

impl<'a> TensorView<'a> {
    /// Create a view, checking that the buffer holds exactly `shape.numel()` elements.
    pub fn new(shape: &'a Shape, data: &'a [f64]) -> Result<Self, LengthMismatch> {
        if data.len() != shape.numel() {
            return Err(LengthMismatch {
                len: data.len(),
                shape: shape.clone(),
                numel: shape.numel(),
            });
        }
        Ok(TensorView { shape, data })
    }

    /// Copy the viewed data into an owned tensor.
    pub fn to_tensor(&self) -> Tensor {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.to_vec(),
        }
    }
}

impl TensorData for TensorView<'_> {
    fn shape(&self) -> &Shape {
        self.shape
    }

    fn as_slice(&self) -> &[f64] {
        self.data
    }
}

/// An owned dense tensor.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    shape: Shape,
    data: Vec<f64>,
}

impl Tensor {
    /// Create a tensor from data and shape.
    pub fn from_vec(data: Vec<f64>, shape: Shape) -> Result<Self, LengthMismatch> {
        if data.len() != shape.numel() {
            return Err(LengthMismatch {
                len: data.len(),
                numel: shape.numel(),
                shape,
            });
        }
        Ok(Tensor { shape, data })
    }

    /// Create a tensor of zeros, or `None` if the buffer cannot be allocated.
    pub fn try_zeros(shape: Shape) -> Option<Self> {
        let numel = shape.checked_numel()?;
        let mut data = Vec::new();
        data.try_reserve_exact(numel).ok()?;
        data.resize(numel, 0.0);
        Some(Tensor { shape, data })
    }

    /// Create a scalar (0-dim) tensor.
    pub fn scalar(value: f64) -> Self {
        Tensor {
            shape: Shape::scalar(),
            data: vec![value],
        }
    }

    /// Borrow this tensor as a view.
    pub fn view(&self) -> TensorView<'_> {
        TensorView {
            shape: &self.shape,
            data: &self.data,
        }
    }

    /// Get mutable data as a contiguous f64 slice.
    pub fn as_slice_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

}

impl TensorData for Tensor {
    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

impl From<TensorView<'_>> for Tensor {
    fn from(view: TensorView<'_>) -> Self {
        view.to_tensor()
    }
}
