use crate::dtype::Element;
use crate::error::{Result, TensorError};
use crate::matrix::Matrix;
use crate::shape::Shape;

/// A dense N-dimensional tensor.
///
/// Holds contiguous, row-major data with an associated shape. Multi-index
/// access goes through [`Shape::offset`], so the rightmost index varies
/// fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T: Element> {
    data: Vec<T>,
    shape: Shape,
}

impl<T: Element> Tensor<T> {
    /// Create a zero-filled tensor with the given shape.
    pub fn new(shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        Tensor {
            data: vec![T::default(); shape.numel()],
            shape,
        }
    }

    /// Create a tensor from row-major data and a shape.
    pub fn from_vec(shape: impl Into<Shape>, data: Vec<T>) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.numel() {
            return Err(TensorError::InvalidArgument(format!(
                "data length {} does not match shape {} (numel={})",
                data.len(),
                shape,
                shape.numel()
            )));
        }
        Ok(Tensor { data, shape })
    }

    /// Returns a reference to the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    /// Total number of elements (product of the shape).
    pub fn total_size(&self) -> usize {
        self.data.len()
    }

    /// Checked element access by multi-index.
    pub fn at(&self, indices: &[usize]) -> Result<&T> {
        let offset = self.shape.offset(indices)?;
        Ok(&self.data[offset])
    }

    /// Checked mutable element access by multi-index.
    pub fn at_mut(&mut self, indices: &[usize]) -> Result<&mut T> {
        let offset = self.shape.offset(indices)?;
        Ok(&mut self.data[offset])
    }

    /// Row-major backing storage.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Set every element to `value`.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Destructively reallocate to `shape`; contents become zero.
    pub fn resize(&mut self, shape: impl Into<Shape>) {
        self.shape = shape.into();
        self.data = vec![T::default(); self.shape.numel()];
    }

    /// Copy a rank-2 tensor into a [`Matrix`].
    ///
    /// # Errors
    /// Returns `InvalidArgument` for any rank other than 2.
    pub fn to_matrix(&self) -> Result<Matrix<T>> {
        if self.shape.ndim() != 2 {
            return Err(TensorError::InvalidArgument(format!(
                "to_matrix requires a rank-2 tensor, got shape {}",
                self.shape
            )));
        }
        Matrix::from_vec(self.shape.dim(0), self.shape.dim(1), self.data.clone())
    }
}

impl<T: Element> From<Matrix<T>> for Tensor<T> {
    fn from(m: Matrix<T>) -> Self {
        let shape = Shape::new(vec![m.rows(), m.cols()]);
        Tensor {
            data: m.into_vec(),
            shape,
        }
    }
}
