//! # lua_tensor - Dense `f64` tensors for the Lua operator
//!
//! This crate provides the host-side tensor types that the Lua operator
//! exposes to scripts and reads back from them.
//!
//! ## Overview
//!
//! The core abstractions are:
//! - [`Shape`] and [`RowMajorIndices`] - Tensor shape and row-major traversal
//! - [`TensorData`] - Trait for bounds-checked element access
//! - [`TensorView`] - Borrowed view of a host buffer
//! - [`Tensor`] - Owned buffer plus shape
//!
//! ## Example
//!
//! ```
//! use lua_tensor::prelude::*;
//!
//! let t = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], Shape::new(vec![2, 2])).unwrap();
//! assert_eq!(t.get(&[1, 0]), Ok(3.0));
//! assert!(t.get(&[2, 0]).is_err());
//! ```

pub mod shape;
pub mod tensor;

pub use shape::{RowMajorIndices, Shape};
pub use tensor::{IndexError, LengthMismatch, Tensor, TensorData, TensorView};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::shape::Shape;
    pub use crate::tensor::{IndexError, Tensor, TensorData, TensorView};
}
