//! Reference f32 kernels shared by the model layers.
//!
//! Plain scalar loops. All functions operate row-wise on a [`Matrix<f32>`]
//! or element-wise on a slice.

use crate::error::{Result, TensorError};
use crate::matrix::Matrix;

/// sqrt(2 / pi), for the tanh approximation of GELU.
const GELU_SQRT_2_OVER_PI: f32 = 0.797_884_560_802_865_4;
const GELU_COEFF: f32 = 0.044715;

/// Numerically stable softmax over a slice: `exp(x - max) / sum`.
pub fn softmax(x: &[f32]) -> Vec<f32> {
    let mut out = x.to_vec();
    softmax_in_place(&mut out);
    out
}

/// Softmax computed in place.
pub fn softmax_in_place(x: &mut [f32]) {
    if x.is_empty() {
        return;
    }
    let max_val = x.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    let mut sum = 0.0f32;
    for v in x.iter_mut() {
        *v = (*v - max_val).exp();
        sum += *v;
    }
    for v in x.iter_mut() {
        *v /= sum;
    }
}

/// Apply softmax independently to every row of `m`.
pub fn softmax_rows(m: &mut Matrix<f32>) {
    let cols = m.cols();
    if cols == 0 {
        return;
    }
    for row in m.as_mut_slice().chunks_exact_mut(cols) {
        softmax_in_place(row);
    }
}

/// Per-row layer normalisation with learned scale and shift.
///
/// Each row is normalised to zero mean and unit (population) variance, then
/// `gamma[j] * norm + beta[j]` is applied per column.
pub fn layer_norm(
    input: &Matrix<f32>,
    gamma: &[f32],
    beta: &[f32],
    eps: f32,
) -> Result<Matrix<f32>> {
    let cols = input.cols();
    if gamma.len() != cols || beta.len() != cols {
        return Err(TensorError::DimensionMismatch {
            op: "layer_norm",
            left: input.dims(),
            right: vec![gamma.len(), beta.len()],
        });
    }

    let mut out = input.clone();
    if cols == 0 {
        return Ok(out);
    }
    for row in out.as_mut_slice().chunks_exact_mut(cols) {
        let mean = row.iter().sum::<f32>() / cols as f32;
        let var = row.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / cols as f32;
        let inv_std = 1.0 / (var + eps).sqrt();
        for (j, v) in row.iter_mut().enumerate() {
            *v = gamma[j] * ((*v - mean) * inv_std) + beta[j];
        }
    }
    Ok(out)
}

/// GELU, tanh approximation.
pub fn gelu(x: f32) -> f32 {
    0.5 * x * (1.0 + (GELU_SQRT_2_OVER_PI * (x + GELU_COEFF * x * x * x)).tanh())
}

/// Apply [`gelu`] to every element in place.
pub fn gelu_in_place(x: &mut [f32]) {
    for v in x.iter_mut() {
        *v = gelu(*v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_softmax() {
        let r = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = r.iter().sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-6);
        assert!(r[2] > r[1] && r[1] > r[0]);
    }

    #[test]
    fn test_softmax_large_inputs_stable() {
        let r = softmax(&[1000.0, 1000.0]);
        assert_relative_eq!(r[0], 0.5, epsilon = 1e-6);
        assert_relative_eq!(r[1], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_softmax_masked_value() {
        let r = softmax(&[0.0, -1e9]);
        assert_relative_eq!(r[0], 1.0, epsilon = 1e-6);
        assert_eq!(r[1], 0.0);
    }

    #[test]
    fn test_softmax_rows() {
        let mut m = Matrix::from_vec(2, 2, vec![0.0, 0.0, 1.0, 1.0]).unwrap();
        softmax_rows(&mut m);
        for v in m.as_slice() {
            assert_relative_eq!(*v, 0.5, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_layer_norm() {
        let m = Matrix::from_vec(1, 4, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let out = layer_norm(&m, &[1.0; 4], &[0.0; 4], 1e-5).unwrap();
        let row = out.row(0).unwrap();
        let mean: f32 = row.iter().sum::<f32>() / 4.0;
        let var: f32 = row.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / 4.0;
        assert_relative_eq!(mean, 0.0, epsilon = 1e-5);
        assert_relative_eq!(var, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_layer_norm_affine() {
        let m = Matrix::from_vec(1, 2, vec![5.0, 5.0]).unwrap();
        let out = layer_norm(&m, &[2.0, 2.0], &[0.5, -0.5], 1e-5).unwrap();
        // constant row normalises to zero, leaving only beta
        assert_relative_eq!(out.get(0, 0).unwrap(), 0.5, epsilon = 1e-5);
        assert_relative_eq!(out.get(0, 1).unwrap(), -0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_layer_norm_mismatch() {
        let m: Matrix<f32> = Matrix::new(1, 3);
        assert!(layer_norm(&m, &[1.0; 2], &[0.0; 3], 1e-5).is_err());
    }

    #[test]
    fn test_gelu_reference_values() {
        assert_eq!(gelu(0.0), 0.0);
        assert_relative_eq!(gelu(1.0), 0.841_192, epsilon = 1e-4);
        assert_relative_eq!(gelu(-1.0), -0.158_808, epsilon = 1e-4);
        assert_relative_eq!(gelu(3.0), 2.996_363, epsilon = 1e-4);
    }

    #[test]
    fn test_gelu_matches_tanh_formula() {
        let reference = |x: f64| {
            let inner = (2.0 / std::f64::consts::PI).sqrt() * (x + 0.044715 * x.powi(3));
            0.5 * x * (1.0 + inner.tanh())
        };
        for x in [-2.0f32, -1.0, 0.0, 1.0, 2.0] {
            assert_relative_eq!(gelu(x) as f64, reference(x as f64), epsilon = 1e-5);
        }
    }

    #[test]
    fn test_gelu_saturates() {
        for x in [6.0f32, 10.0, 50.0] {
            assert_relative_eq!(gelu(x), x, epsilon = 1e-5);
            assert!(gelu(-x).abs() < 1e-5, "gelu({}) = {}", -x, gelu(-x));
        }
    }

    #[test]
    fn test_gelu_in_place() {
        let mut v = [0.0, 1.0];
        gelu_in_place(&mut v);
        assert_eq!(v[0], 0.0);
        assert_relative_eq!(v[1], gelu(1.0));
    }
}
