use std::path::Path;

use tl_tensor::{ops, Matrix};

use super::weights::FeedForwardWeights;
use crate::error::{ModelError, Result};
use crate::tllm::parts;

/// Position-wise feed-forward network: `GELU(x W1 + b1) W2 + b2`.
#[derive(Debug, Clone)]
pub struct FeedForward {
    weights: FeedForwardWeights,
    model_dim: usize,
    hidden_dim: usize,
}

impl FeedForward {
    /// Zero-initialised network.
    pub fn new(model_dim: usize, hidden_dim: usize) -> Self {
        FeedForward {
            weights: FeedForwardWeights::zeros(model_dim, hidden_dim),
            model_dim,
            hidden_dim,
        }
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    pub fn weights(&self) -> &FeedForwardWeights {
        &self.weights
    }

    /// Replace both linear layers and their biases.
    pub fn set_weights(&mut self, weights: FeedForwardWeights) -> Result<()> {
        weights.check(self.model_dim, self.hidden_dim)?;
        self.weights = weights;
        Ok(())
    }

    /// Load `linear1 | bias1 | linear2 | bias2` from a single file.
    pub fn load_weights(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let weights = parts::load_feed_forward(path.as_ref(), self.model_dim, self.hidden_dim)?;
        self.set_weights(weights)
    }

    pub fn save_weights(&self, path: impl AsRef<Path>) -> Result<()> {
        parts::save_feed_forward(path.as_ref(), &self.weights)
    }

    /// Apply the network to every row of `input` (`[seq_len, model_dim]`).
    pub fn forward(&self, input: &Matrix<f32>) -> Result<Matrix<f32>> {
        if input.cols() != self.model_dim {
            return Err(ModelError::Model(format!(
                "feed-forward input has {} columns, expected model_dim {}",
                input.cols(),
                self.model_dim
            )));
        }

        let mut hidden = input
            .matmul(&self.weights.linear1)
            .map_err(|e| ModelError::op("ffn.linear1", e))?;
        hidden
            .add_row_vector(&self.weights.bias1)
            .map_err(|e| ModelError::op("ffn.bias1", e))?;
        gelu_activation(&mut hidden);

        let mut output = hidden
            .matmul(&self.weights.linear2)
            .map_err(|e| ModelError::op("ffn.linear2", e))?;
        output
            .add_row_vector(&self.weights.bias2)
            .map_err(|e| ModelError::op("ffn.bias2", e))?;
        Ok(output)
    }
}

/// GELU (tanh approximation) applied element-wise in place.
pub fn gelu_activation(m: &mut Matrix<f32>) {
    ops::gelu_in_place(m.as_mut_slice());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use approx::assert_relative_eq;

    fn identity(n: usize) -> Matrix<f32> {
        let mut m = Matrix::new(n, n);
        for i in 0..n {
            m.set(i, i, 1.0).unwrap();
        }
        m
    }

    #[test]
    fn test_zero_weights_give_bias2() {
        let mut ffn = FeedForward::new(2, 3);
        let mut w = ffn.weights().clone();
        w.bias2 = vec![0.5, -0.5];
        ffn.set_weights(w).unwrap();

        let x = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let out = ffn.forward(&x).unwrap();
        assert_eq!(out.as_slice(), &[0.5, -0.5, 0.5, -0.5]);
    }

    #[test]
    fn test_identity_layers_apply_gelu() {
        let mut ffn = FeedForward::new(2, 2);
        ffn.set_weights(FeedForwardWeights {
            linear1: identity(2),
            bias1: vec![0.0, 0.0],
            linear2: identity(2),
            bias2: vec![0.0, 0.0],
        })
        .unwrap();

        let x = Matrix::from_vec(1, 2, vec![1.0, -1.0]).unwrap();
        let out = ffn.forward(&x).unwrap();
        assert_relative_eq!(out.get(0, 0).unwrap(), 0.841_192, epsilon = 1e-4);
        assert_relative_eq!(out.get(0, 1).unwrap(), -0.158_808, epsilon = 1e-4);
    }

    #[test]
    fn test_forward_rejects_wrong_width() {
        let ffn = FeedForward::new(4, 8);
        let x: Matrix<f32> = Matrix::new(1, 3);
        assert_eq!(ffn.forward(&x).unwrap_err().kind(), ErrorKind::Model);
    }

    #[test]
    fn test_set_weights_checks_shape() {
        let mut ffn = FeedForward::new(4, 8);
        let mut w = FeedForwardWeights::zeros(4, 8);
        w.bias1 = vec![0.0; 4];
        assert_eq!(ffn.set_weights(w).unwrap_err().kind(), ErrorKind::Model);
    }

    #[test]
    fn test_load_weights_then_forward() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ffn.bin");
        let w = FeedForwardWeights {
            linear1: identity(5),
            bias1: vec![0.0; 5],
            linear2: identity(5),
            bias2: vec![0.0; 5],
        };
        let mut source = FeedForward::new(5, 5);
        source.set_weights(w.clone()).unwrap();
        source.save_weights(&path).unwrap();

        let mut ffn = FeedForward::new(5, 5);
        ffn.load_weights(&path).unwrap();
        assert_eq!(ffn.weights(), &w);

        let x = Matrix::from_vec(1, 5, vec![-2.0, -1.0, 0.0, 1.0, 2.0]).unwrap();
        let out = ffn.forward(&x).unwrap();
        for (o, v) in out.as_slice().iter().zip(x.as_slice()) {
            assert_relative_eq!(*o, ops::gelu(*v), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_load_weights_checks_stored_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ffn.bin");
        FeedForward::new(4, 8).save_weights(&path).unwrap();

        let mut ffn = FeedForward::new(4, 6);
        let err = ffn.load_weights(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileIo);
        assert!(err.to_string().contains("ffn.linear1"));
        assert_eq!(ffn.weights(), &FeedForwardWeights::zeros(4, 6));

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();
        let mut ffn = FeedForward::new(4, 8);
        assert_eq!(ffn.load_weights(&path).unwrap_err().kind(), ErrorKind::FileIo);
    }

    #[test]
    fn test_gelu_activation() {
        let mut m = Matrix::from_vec(1, 2, vec![0.0, 3.0]).unwrap();
        gelu_activation(&mut m);
        assert_eq!(m.get(0, 0).unwrap(), 0.0);
        assert_relative_eq!(m.get(0, 1).unwrap(), 2.996_363, epsilon = 1e-4);
    }
}
