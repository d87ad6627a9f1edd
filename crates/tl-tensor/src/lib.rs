//! `tl-tensor` - Dense numeric containers for tiny-llama.
//!
//! This crate provides:
//! - A row-major `Matrix<T>` with checked indexing, multiply, add and transpose
//! - An arbitrary-rank `Tensor<T>` with stride-based multi-index access
//! - Element type definitions (`f32`, `f64`, `i32`) and their byte layout
//! - Native-endian binary persistence shared with the weight file codec
//! - Reference f32 kernels (row softmax, layer norm, GELU)

pub mod dtype;
pub mod error;
pub mod io;
pub mod matrix;
pub mod ops;
pub mod shape;
pub mod tensor;

// Re-export primary types at the crate root for convenience.
pub use dtype::{DType, Element};
pub use error::{Result, TensorError};
pub use matrix::Matrix;
pub use shape::Shape;
pub use tensor::Tensor;
