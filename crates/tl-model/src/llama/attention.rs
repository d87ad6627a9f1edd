use std::path::Path;

use rand::Rng;
use tl_tensor::{ops, Matrix};

use super::weights::AttentionWeights;
use crate::error::{ModelError, Result};
use crate::tllm::parts;

/// Score assigned to masked positions before softmax.
const MASKED_SCORE: f32 = -1e9;

/// Multi-head self-attention over a single sequence (batch size 1).
///
/// Each head `h` owns the column slice `[h * head_dim, (h + 1) * head_dim)`
/// of the projected Q, K and V. Heads are computed independently and written
/// back into the same slice of a combined buffer before the output projection.
#[derive(Debug, Clone)]
pub struct MultiHeadAttention {
    weights: AttentionWeights,
    model_dim: usize,
    num_heads: usize,
    head_dim: usize,
}

impl MultiHeadAttention {
    /// Create an attention engine with Xavier-uniform initialised projections.
    ///
    /// Every weight is drawn from `U(-s, s)` with `s = sqrt(6 / (2 * model_dim))`.
    ///
    /// # Errors
    /// Returns a `Configuration` error if `num_heads` is zero or does not
    /// divide `model_dim`.
    pub fn new(model_dim: usize, num_heads: usize, rng: &mut impl Rng) -> Result<Self> {
        if num_heads == 0 || model_dim % num_heads != 0 {
            return Err(ModelError::Configuration(format!(
                "model_dim ({model_dim}) must be divisible by num_heads ({num_heads})"
            )));
        }

        let mut weights = AttentionWeights::zeros(model_dim);
        let scale = (6.0 / (2 * model_dim) as f32).sqrt();
        for m in [
            &mut weights.query,
            &mut weights.key,
            &mut weights.value,
            &mut weights.output,
        ] {
            for w in m.as_mut_slice() {
                *w = rng.gen_range(-1.0f32..=1.0) * scale;
            }
        }

        Ok(MultiHeadAttention {
            weights,
            model_dim,
            num_heads,
            head_dim: model_dim / num_heads,
        })
    }

    pub fn num_heads(&self) -> usize {
        self.num_heads
    }

    pub fn head_dim(&self) -> usize {
        self.head_dim
    }

    /// Current projection weights.
    pub fn weights(&self) -> &AttentionWeights {
        &self.weights
    }

    /// Replace all four projections. Every matrix must be `[model_dim, model_dim]`.
    pub fn set_weights(&mut self, weights: AttentionWeights) -> Result<()> {
        weights.check(self.model_dim)?;
        self.weights = weights;
        Ok(())
    }

    /// Load the projections from `<prefix>.query`, `.key`, `.value` and
    /// `.output`, one matrix file each.
    ///
    /// Nothing is replaced unless all four files load with the right shape.
    pub fn load_weights(&mut self, prefix: impl AsRef<Path>) -> Result<()> {
        let weights = parts::load_attention(prefix.as_ref(), self.model_dim)?;
        self.set_weights(weights)
    }

    /// Write the projections to the files [`Self::load_weights`] reads.
    pub fn save_weights(&self, prefix: impl AsRef<Path>) -> Result<()> {
        parts::save_attention(prefix.as_ref(), &self.weights)
    }

    /// Attend over `input` (`[seq_len, model_dim]`).
    ///
    /// `mask`, if given, must be `[seq_len, seq_len]`; a cell equal to `0.0`
    /// blocks that query/key pair.
    pub fn forward(&self, input: &Matrix<f32>, mask: Option<&Matrix<f32>>) -> Result<Matrix<f32>> {
        if input.cols() != self.model_dim {
            return Err(ModelError::Model(format!(
                "attention input has {} columns, expected model_dim {}",
                input.cols(),
                self.model_dim
            )));
        }

        let q = input
            .matmul(&self.weights.query)
            .map_err(|e| ModelError::op("attention.query", e))?;
        let k = input
            .matmul(&self.weights.key)
            .map_err(|e| ModelError::op("attention.key", e))?;
        let v = input
            .matmul(&self.weights.value)
            .map_err(|e| ModelError::op("attention.value", e))?;

        let mut combined = Matrix::new(input.rows(), self.model_dim);
        for h in 0..self.num_heads {
            let start = h * self.head_dim;
            let q_h = q.column_slice(start, self.head_dim)?;
            let k_h = k.column_slice(start, self.head_dim)?;
            let v_h = v.column_slice(start, self.head_dim)?;

            let head_out = scaled_dot_product_attention(&q_h, &k_h, &v_h, mask)?;
            combined.set_column_slice(start, &head_out)?;
        }

        combined
            .matmul(&self.weights.output)
            .map_err(|e| ModelError::op("attention.output", e))
    }
}

/// `softmax(Q Kᵗ / sqrt(d_k)) V`, with masked cells forced to `-1e9`.
///
/// `d_k` is the column count of `q`. A mask must be `[seq_len, seq_len]`
/// where `seq_len` is the row count of `q`.
pub fn scaled_dot_product_attention(
    q: &Matrix<f32>,
    k: &Matrix<f32>,
    v: &Matrix<f32>,
    mask: Option<&Matrix<f32>>,
) -> Result<Matrix<f32>> {
    let mut scores = q
        .matmul(&k.transpose())
        .map_err(|e| ModelError::op("attention.scores", e))?;

    let scale = 1.0 / (q.cols() as f32).sqrt();
    for s in scores.as_mut_slice() {
        *s *= scale;
    }

    if let Some(mask) = mask {
        if mask.rows() != scores.rows() || mask.cols() != scores.cols() {
            return Err(ModelError::Model(format!(
                "attention mask is {}x{}, expected {}x{}",
                mask.rows(),
                mask.cols(),
                scores.rows(),
                scores.cols()
            )));
        }
        for (s, &m) in scores.as_mut_slice().iter_mut().zip(mask.as_slice()) {
            if m == 0.0 {
                *s = MASKED_SCORE;
            }
        }
    }

    ops::softmax_rows(&mut scores);

    scores
        .matmul(v)
        .map_err(|e| ModelError::op("attention.values", e))
}

/// Lower-triangular `[seq_len, seq_len]` mask: `1.0` where `j <= i`, else `0.0`.
pub fn causal_mask(seq_len: usize) -> Matrix<f32> {
    let mut mask = Matrix::new(seq_len, seq_len);
    for (i, row) in mask.as_mut_slice().chunks_exact_mut(seq_len.max(1)).enumerate() {
        for v in row.iter_mut().take(i + 1) {
            *v = 1.0;
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn random_matrix(rows: usize, cols: usize, rng: &mut StdRng) -> Matrix<f32> {
        let data = (0..rows * cols).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
        Matrix::from_vec(rows, cols, data).unwrap()
    }

    #[test]
    fn test_new_rejects_indivisible_heads() {
        let err = MultiHeadAttention::new(10, 3, &mut rng()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(MultiHeadAttention::new(8, 0, &mut rng()).is_err());
    }

    #[test]
    fn test_xavier_bounds() {
        let attn = MultiHeadAttention::new(8, 2, &mut rng()).unwrap();
        let bound = (6.0f32 / 16.0).sqrt();
        let w = attn.weights();
        for m in [&w.query, &w.key, &w.value, &w.output] {
            assert_eq!(m.dims(), vec![8, 8]);
            assert!(m.as_slice().iter().all(|v| v.abs() <= bound));
            assert!(m.as_slice().iter().any(|&v| v != 0.0));
        }
        assert_eq!(attn.head_dim(), 4);
    }

    #[test]
    fn test_seeded_init_is_deterministic() {
        let a = MultiHeadAttention::new(4, 2, &mut rng()).unwrap();
        let b = MultiHeadAttention::new(4, 2, &mut rng()).unwrap();
        assert_eq!(a.weights(), b.weights());
    }

    #[test]
    fn test_forward_shape() {
        let mut r = rng();
        let attn = MultiHeadAttention::new(8, 2, &mut r).unwrap();
        let x = random_matrix(3, 8, &mut r);
        let out = attn.forward(&x, Some(&causal_mask(3))).unwrap();
        assert_eq!(out.dims(), vec![3, 8]);
        assert!(out.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_forward_rejects_wrong_width() {
        let attn = MultiHeadAttention::new(8, 2, &mut rng()).unwrap();
        let x: Matrix<f32> = Matrix::new(2, 6);
        assert_eq!(attn.forward(&x, None).unwrap_err().kind(), ErrorKind::Model);
    }

    #[test]
    fn test_mask_shape_checked() {
        let attn = MultiHeadAttention::new(4, 1, &mut rng()).unwrap();
        let x: Matrix<f32> = Matrix::new(3, 4);
        let err = attn.forward(&x, Some(&causal_mask(2))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Model);
    }

    #[test]
    fn test_set_weights_checks_shape() {
        let mut attn = MultiHeadAttention::new(4, 2, &mut rng()).unwrap();
        let mut w = AttentionWeights::zeros(4);
        w.key = Matrix::new(4, 3);
        assert!(attn.set_weights(w).is_err());
        attn.set_weights(AttentionWeights::zeros(4)).unwrap();
        assert!(attn.weights().query.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_load_weights_from_projection_files() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("attn");
        let source = MultiHeadAttention::new(4, 2, &mut StdRng::seed_from_u64(1)).unwrap();
        source.save_weights(&prefix).unwrap();
        assert!(dir.path().join("attn.query").exists());
        assert!(dir.path().join("attn.output").exists());

        let mut target = MultiHeadAttention::new(4, 2, &mut StdRng::seed_from_u64(2)).unwrap();
        assert_ne!(target.weights(), source.weights());
        target.load_weights(&prefix).unwrap();
        assert_eq!(target.weights(), source.weights());
    }

    #[test]
    fn test_load_weights_rejects_bad_projection() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("attn");
        let mut attn = MultiHeadAttention::new(4, 2, &mut rng()).unwrap();
        attn.save_weights(&prefix).unwrap();
        let before = attn.weights().clone();

        let misshapen: Matrix<f32> = Matrix::new(4, 3);
        misshapen.save_to_file(dir.path().join("attn.value")).unwrap();
        let err = attn.load_weights(&prefix).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileIo);
        let msg = err.to_string();
        assert!(msg.contains("attention.value"), "{msg}");
        assert!(msg.contains("attn.value"), "{msg}");
        assert_eq!(attn.weights(), &before);

        std::fs::remove_file(dir.path().join("attn.value")).unwrap();
        assert_eq!(attn.load_weights(&prefix).unwrap_err().kind(), ErrorKind::FileIo);
        assert_eq!(attn.weights(), &before);
    }

    #[test]
    fn test_sdpa_uniform_scores_average_values() {
        // zero queries give equal scores, so each output row is the mean of V
        let q: Matrix<f32> = Matrix::new(2, 2);
        let k = Matrix::from_vec(2, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap();
        let v = Matrix::from_vec(2, 2, vec![2.0, 4.0, 6.0, 8.0]).unwrap();
        let out = scaled_dot_product_attention(&q, &k, &v, None).unwrap();
        assert_relative_eq!(out.get(0, 0).unwrap(), 4.0, epsilon = 1e-5);
        assert_relative_eq!(out.get(1, 1).unwrap(), 6.0, epsilon = 1e-5);
    }

    #[test]
    fn test_sdpa_causal_first_row_sees_only_itself() {
        let q: Matrix<f32> = Matrix::new(2, 2);
        let k: Matrix<f32> = Matrix::new(2, 2);
        let v = Matrix::from_vec(2, 2, vec![1.0, 1.0, 9.0, 9.0]).unwrap();
        let out = scaled_dot_product_attention(&q, &k, &v, Some(&causal_mask(2))).unwrap();
        assert_relative_eq!(out.get(0, 0).unwrap(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(out.get(1, 0).unwrap(), 5.0, epsilon = 1e-5);
    }

    #[test]
    fn test_causal_mask() {
        let m = causal_mask(3);
        assert_eq!(m.as_slice(), &[1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0]);
        assert_eq!(causal_mask(0).size(), 0);
    }

    proptest! {
        #[test]
        fn prop_causal_rows_ignore_future(
            seed in any::<u64>(),
            seq_len in 2usize..6,
            split in 0usize..5,
        ) {
            let split = split % (seq_len - 1);
            let mut r = StdRng::seed_from_u64(seed);
            let attn = MultiHeadAttention::new(4, 2, &mut r).unwrap();
            let x = random_matrix(seq_len, 4, &mut r);

            // perturb every row after `split`
            let mut y = x.clone();
            for i in split + 1..seq_len {
                for v in y.row_mut(i).unwrap() {
                    *v += 3.0;
                }
            }

            let mask = causal_mask(seq_len);
            let out_x = attn.forward(&x, Some(&mask)).unwrap();
            let out_y = attn.forward(&y, Some(&mask)).unwrap();
            for i in 0..=split {
                for (a, b) in out_x.row(i).unwrap().iter().zip(out_y.row(i).unwrap()) {
                    prop_assert!((a - b).abs() < 1e-4);
                }
            }
        }
    }
}
