use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::dtype::Element;
use crate::error::{Result, TensorError};
use crate::io;

/// A dense row-major 2D matrix.
///
/// Owns a flat buffer whose length is always `rows * cols`. Cloning copies
/// the buffer; matrices never share storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<T: Element> {
    data: Vec<T>,
    rows: usize,
    cols: usize,
}

impl<T: Element> Matrix<T> {
    /// Create a zero-filled matrix with the given dimensions.
    pub fn new(rows: usize, cols: usize) -> Self {
        Matrix {
            data: vec![T::default(); rows * cols],
            rows,
            cols,
        }
    }

    /// Create a matrix from row-major data.
    ///
    /// Fails if `data.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(TensorError::InvalidArgument(format!(
                "data length {} does not match matrix dimensions {}x{}",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Matrix { data, rows, cols })
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of elements.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// `[rows, cols]`, the form used in error messages.
    pub fn dims(&self) -> Vec<usize> {
        vec![self.rows, self.cols]
    }

    fn index_of(&self, row: usize, col: usize) -> Result<usize> {
        if row >= self.rows || col >= self.cols {
            return Err(TensorError::OutOfRange {
                index: vec![row, col],
                shape: self.dims(),
            });
        }
        Ok(row * self.cols + col)
    }

    /// Checked element access.
    pub fn at(&self, row: usize, col: usize) -> Result<&T> {
        let idx = self.index_of(row, col)?;
        Ok(&self.data[idx])
    }

    /// Checked mutable element access.
    pub fn at_mut(&mut self, row: usize, col: usize) -> Result<&mut T> {
        let idx = self.index_of(row, col)?;
        Ok(&mut self.data[idx])
    }

    /// Checked element read.
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.at(row, col).copied()
    }

    /// Checked element write.
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        *self.at_mut(row, col)? = value;
        Ok(())
    }

    /// A single row as a slice.
    pub fn row(&self, row: usize) -> Result<&[T]> {
        if row >= self.rows {
            return Err(TensorError::OutOfRange {
                index: vec![row],
                shape: self.dims(),
            });
        }
        Ok(&self.data[row * self.cols..(row + 1) * self.cols])
    }

    /// A single row as a mutable slice.
    pub fn row_mut(&mut self, row: usize) -> Result<&mut [T]> {
        if row >= self.rows {
            return Err(TensorError::OutOfRange {
                index: vec![row],
                shape: self.dims(),
            });
        }
        let cols = self.cols;
        Ok(&mut self.data[row * cols..(row + 1) * cols])
    }

    /// Row-major backing storage.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Mutable row-major backing storage, for bulk I/O.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consume the matrix and return its row-major data.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Matrix multiplication: `self [m, k] @ other [k, n] -> [m, n]`.
    ///
    /// Classic triple loop accumulating in the element type.
    pub fn matmul(&self, other: &Matrix<T>) -> Result<Matrix<T>> {
        let (m, k, k2, n) = (self.rows, self.cols, other.rows, other.cols);
        if k != k2 {
            return Err(TensorError::MatmulMismatch { m, k, k2, n });
        }

        let mut c = vec![T::default(); m * n];
        for i in 0..m {
            for j in 0..n {
                let mut sum = T::default();
                for p in 0..k {
                    sum += self.data[i * k + p] * other.data[p * n + j];
                }
                c[i * n + j] = sum;
            }
        }
        Ok(Matrix {
            data: c,
            rows: m,
            cols: n,
        })
    }

    /// Element-wise addition. Shapes must be identical.
    pub fn add(&self, other: &Matrix<T>) -> Result<Matrix<T>> {
        let mut out = self.clone();
        out.add_assign(other)?;
        Ok(out)
    }

    /// In-place element-wise addition. Shapes must be identical.
    pub fn add_assign(&mut self, other: &Matrix<T>) -> Result<()> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(TensorError::DimensionMismatch {
                op: "add",
                left: self.dims(),
                right: other.dims(),
            });
        }
        for (a, &b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += b;
        }
        Ok(())
    }

    /// Add `bias` to every row. `bias.len()` must equal `cols`.
    pub fn add_row_vector(&mut self, bias: &[T]) -> Result<()> {
        if bias.len() != self.cols {
            return Err(TensorError::DimensionMismatch {
                op: "add_row_vector",
                left: self.dims(),
                right: vec![bias.len()],
            });
        }
        if self.cols == 0 {
            return Ok(());
        }
        for row in self.data.chunks_exact_mut(self.cols) {
            for (a, &b) in row.iter_mut().zip(bias.iter()) {
                *a += b;
            }
        }
        Ok(())
    }

    /// Returns a new matrix with rows and columns swapped.
    pub fn transpose(&self) -> Matrix<T> {
        let mut out = Matrix::new(self.cols, self.rows);
        for i in 0..self.rows {
            for j in 0..self.cols {
                out.data[j * self.rows + i] = self.data[i * self.cols + j];
            }
        }
        out
    }

    /// Copy columns `[start, start + width)` into a new `[rows, width]` matrix.
    pub fn column_slice(&self, start: usize, width: usize) -> Result<Matrix<T>> {
        if start + width > self.cols {
            return Err(TensorError::OutOfRange {
                index: vec![0, start + width],
                shape: self.dims(),
            });
        }
        let mut out = Matrix::new(self.rows, width);
        for i in 0..self.rows {
            let src = &self.data[i * self.cols + start..i * self.cols + start + width];
            out.data[i * width..(i + 1) * width].copy_from_slice(src);
        }
        Ok(out)
    }

    /// Write `src` into columns `[start, start + src.cols())`. Row counts must match.
    pub fn set_column_slice(&mut self, start: usize, src: &Matrix<T>) -> Result<()> {
        if src.rows != self.rows || start + src.cols > self.cols {
            return Err(TensorError::DimensionMismatch {
                op: "set_column_slice",
                left: self.dims(),
                right: src.dims(),
            });
        }
        let width = src.cols;
        for i in 0..self.rows {
            self.data[i * self.cols + start..i * self.cols + start + width]
                .copy_from_slice(&src.data[i * width..(i + 1) * width]);
        }
        Ok(())
    }

    /// Set every element to `value`.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Destructively reallocate to `rows x cols`; contents become zero.
    pub fn resize(&mut self, rows: usize, cols: usize) {
        self.rows = rows;
        self.cols = cols;
        self.data = vec![T::default(); rows * cols];
    }

    /// Read a matrix in the `rows | cols | payload` format from a stream.
    ///
    /// The payload is read incrementally, so a header claiming more data than
    /// the stream holds fails with an IO error rather than a huge allocation.
    pub fn read_from(reader: &mut impl Read) -> Result<Matrix<T>> {
        let (rows, cols) = Self::read_dims(reader)?;
        let data = io::read_payload(reader, (rows * cols) as u64)?;
        Ok(Matrix { data, rows, cols })
    }

    fn read_dims(reader: &mut impl Read) -> Result<(usize, usize)> {
        let rows = io::read_u64(reader)?;
        let cols = io::read_u64(reader)?;
        let count = rows
            .checked_mul(cols)
            .ok_or_else(|| io::invalid_data(format!("matrix dimensions {rows}x{cols} overflow")))?;
        io::payload_len::<T>(count)?;
        match (usize::try_from(rows), usize::try_from(cols)) {
            (Ok(r), Ok(c)) if r.checked_mul(c).is_some() => Ok((r, c)),
            _ => Err(io::invalid_data(format!(
                "matrix dimensions {rows}x{cols} do not fit in memory"
            ))),
        }
    }

    /// Write this matrix in the `rows | cols | payload` format to a stream.
    pub fn write_to(&self, writer: &mut impl Write) -> Result<()> {
        io::write_u64(writer, self.rows as u64)?;
        io::write_u64(writer, self.cols as u64)?;
        io::write_elements(writer, &self.data)
    }

    /// Replace this matrix with the one stored in `path`.
    ///
    /// A missing file, a short read, or a truncated payload is an IO error;
    /// on failure `self` is left unchanged.
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::open(path.as_ref())?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let (rows, cols) = Self::read_dims(&mut reader)?;

        let needed = io::payload_len::<T>((rows * cols) as u64)?;
        let available = file_len.saturating_sub(16);
        if available < needed {
            return Err(TensorError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("matrix {rows}x{cols} needs {needed} payload bytes, file has {available}"),
            )));
        }

        let data = io::read_payload(&mut reader, (rows * cols) as u64)?;
        *self = Matrix { data, rows, cols };
        Ok(())
    }

    /// Persist this matrix to `path`, overwriting any existing file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn m(rows: usize, cols: usize, data: &[f32]) -> Matrix<f32> {
        Matrix::from_vec(rows, cols, data.to_vec()).unwrap()
    }

    #[test]
    fn test_new_is_zeroed() {
        let a: Matrix<f32> = Matrix::new(2, 3);
        assert_eq!(a.rows(), 2);
        assert_eq!(a.cols(), 3);
        assert_eq!(a.size(), 6);
        assert!(a.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_from_vec_length_mismatch() {
        assert!(matches!(
            Matrix::from_vec(2, 2, vec![1.0f32; 3]),
            Err(TensorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_checked_access() {
        let mut a: Matrix<i32> = Matrix::new(2, 2);
        a.set(1, 0, 7).unwrap();
        assert_eq!(a.get(1, 0).unwrap(), 7);
        assert_eq!(a.as_slice(), &[0, 0, 7, 0]);
        assert!(matches!(a.get(2, 0), Err(TensorError::OutOfRange { .. })));
        assert!(matches!(a.get(0, 2), Err(TensorError::OutOfRange { .. })));
        assert!(a.set(5, 5, 1).is_err());
    }

    #[test]
    fn test_matmul() {
        let a = m(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let b = m(2, 2, &[5.0, 6.0, 7.0, 8.0]);
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.as_slice(), &[19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_matmul_rectangular() {
        let a = m(1, 3, &[1.0, 2.0, 3.0]);
        let b = m(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.dims(), vec![1, 2]);
        assert_eq!(c.as_slice(), &[4.0, 5.0]);
    }

    #[test]
    fn test_matmul_dimension_mismatch() {
        let a = m(1, 3, &[1.0, 2.0, 3.0]);
        let b = m(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        assert!(matches!(
            a.matmul(&b),
            Err(TensorError::MatmulMismatch { m: 1, k: 3, k2: 2, n: 2 })
        ));
    }

    #[test]
    fn test_add() {
        let a = m(1, 2, &[1.0, 2.0]);
        let b = m(1, 2, &[3.0, 4.0]);
        assert_eq!(a.add(&b).unwrap().as_slice(), &[4.0, 6.0]);

        let c = m(2, 1, &[3.0, 4.0]);
        assert!(matches!(
            a.add(&c),
            Err(TensorError::DimensionMismatch { op: "add", .. })
        ));
    }

    #[test]
    fn test_add_row_vector() {
        let mut a = m(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        a.add_row_vector(&[10.0, 20.0]).unwrap();
        assert_eq!(a.as_slice(), &[11.0, 22.0, 13.0, 24.0]);
        assert!(a.add_row_vector(&[1.0]).is_err());
    }

    #[test]
    fn test_transpose() {
        let a = m(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let t = a.transpose();
        assert_eq!(t.dims(), vec![3, 2]);
        assert_eq!(t.as_slice(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert_eq!(t.transpose(), a);
    }

    #[test]
    fn test_column_slices() {
        let a = m(2, 4, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let right = a.column_slice(2, 2).unwrap();
        assert_eq!(right.as_slice(), &[3.0, 4.0, 7.0, 8.0]);
        assert!(a.column_slice(3, 2).is_err());

        let mut b: Matrix<f32> = Matrix::new(2, 4);
        b.set_column_slice(2, &right).unwrap();
        assert_eq!(b.as_slice(), &[0.0, 0.0, 3.0, 4.0, 0.0, 0.0, 7.0, 8.0]);
    }

    #[test]
    fn test_fill_and_resize() {
        let mut a: Matrix<f64> = Matrix::new(2, 2);
        a.fill(1.5);
        assert!(a.as_slice().iter().all(|&v| v == 1.5));

        a.resize(3, 1);
        assert_eq!(a.dims(), vec![3, 1]);
        assert_eq!(a.size(), 3);
        assert!(a.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_clone_is_deep() {
        let a = m(1, 2, &[1.0, 2.0]);
        let mut b = a.clone();
        b.set(0, 0, 9.0).unwrap();
        assert_eq!(a.get(0, 0).unwrap(), 1.0);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.bin");

        let a = m(2, 3, &[0.1, -0.2, 0.3, 1e-7, 42.0, -1e6]);
        a.save_to_file(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 8 + 8 + 6 * 4);

        let mut b: Matrix<f32> = Matrix::new(1, 1);
        b.load_from_file(&path).unwrap();
        assert_eq!(b.dims(), vec![2, 3]);
        for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
            assert_relative_eq!(x, y, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut a: Matrix<f32> = Matrix::new(1, 1);
        let err = a.load_from_file(dir.path().join("nope.bin")).unwrap_err();
        assert!(matches!(err, TensorError::Io(_)));
    }

    #[test]
    fn test_load_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.bin");
        let a = m(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        a.save_to_file(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        let mut b: Matrix<f32> = Matrix::new(1, 1);
        assert!(matches!(b.load_from_file(&path), Err(TensorError::Io(_))));
        assert_eq!(b.dims(), vec![1, 1]);
    }

    proptest! {
        #[test]
        fn prop_shape_invariants(rows in 0usize..16, cols in 0usize..16) {
            let a: Matrix<f32> = Matrix::new(rows, cols);
            prop_assert_eq!(a.rows(), rows);
            prop_assert_eq!(a.cols(), cols);
            prop_assert_eq!(a.size(), rows * cols);
        }

        #[test]
        fn prop_matmul_shape(m_ in 1usize..6, k in 1usize..6, n in 1usize..6, k2 in 1usize..6) {
            let a: Matrix<f32> = Matrix::new(m_, k);
            let b: Matrix<f32> = Matrix::new(k, n);
            prop_assert_eq!(a.matmul(&b).unwrap().dims(), vec![m_, n]);

            let c: Matrix<f32> = Matrix::new(k2, n);
            prop_assert_eq!(a.matmul(&c).is_ok(), k == k2);
        }
    }

    #[test]
    fn test_load_rejects_oversized_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.bin");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(1u64 << 32).to_ne_bytes());
        bytes.extend_from_slice(&(1u64 << 31).to_ne_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
        std::fs::write(&path, &bytes).unwrap();

        let mut a: Matrix<f32> = Matrix::new(1, 1);
        assert!(matches!(a.load_from_file(&path), Err(TensorError::Io(_))));
        assert_eq!(a.dims(), vec![1, 1]);
    }

    #[test]
    fn test_load_rejects_header_larger_than_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("claims_more.bin");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&100_000u64.to_ne_bytes());
        bytes.extend_from_slice(&100_000u64.to_ne_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
        std::fs::write(&path, &bytes).unwrap();

        let mut a: Matrix<f32> = Matrix::new(1, 1);
        assert!(matches!(a.load_from_file(&path), Err(TensorError::Io(_))));
    }

    #[test]
    fn test_read_from_stream_claiming_too_much() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&50_000u64.to_ne_bytes());
        bytes.extend_from_slice(&50_000u64.to_ne_bytes());
        bytes.extend_from_slice(&1.0f32.to_ne_bytes());

        let result = Matrix::<f32>::read_from(&mut bytes.as_slice());
        assert!(matches!(result, Err(TensorError::Io(_))));
    }
}
