use tl_tensor::Matrix;

use super::config::ModelConfig;
use crate::error::{ModelError, Result};

/// Projection matrices of one multi-head attention engine, each
/// `[model_dim, model_dim]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttentionWeights {
    pub query: Matrix<f32>,
    pub key: Matrix<f32>,
    pub value: Matrix<f32>,
    pub output: Matrix<f32>,
}

/// Weights of one feed-forward network.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedForwardWeights {
    /// `[model_dim, ffn_hidden_dim]`
    pub linear1: Matrix<f32>,
    /// length `ffn_hidden_dim`
    pub bias1: Vec<f32>,
    /// `[ffn_hidden_dim, model_dim]`
    pub linear2: Matrix<f32>,
    /// length `model_dim`
    pub bias2: Vec<f32>,
}

/// Per-feature scale and shift of one layer norm, each of length `model_dim`.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerNormWeights {
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
}

/// All weights of a single transformer block, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerWeights {
    pub attention: AttentionWeights,
    pub feed_forward: FeedForwardWeights,
    /// Pre-attention norm.
    pub norm1: LayerNormWeights,
    /// Pre-FFN norm.
    pub norm2: LayerNormWeights,
}

/// The complete parameter set of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelWeights {
    /// `[vocab_size, model_dim]`
    pub token_embedding: Matrix<f32>,
    /// `[max_sequence_length, model_dim]`
    pub position_embedding: Matrix<f32>,
    pub layers: Vec<LayerWeights>,
    /// `[model_dim, vocab_size]`
    pub output_projection: Matrix<f32>,
}

/// Fail with a `WeightShape` error unless `m` is `[rows, cols]`.
pub fn check_matrix(name: &str, m: &Matrix<f32>, rows: usize, cols: usize) -> Result<()> {
    if m.rows() != rows || m.cols() != cols {
        return Err(ModelError::WeightShape {
            name: name.to_string(),
            expected: vec![rows, cols],
            actual: m.dims(),
        });
    }
    Ok(())
}

/// Fail with a `WeightShape` error unless `v` has length `len`.
pub fn check_vector(name: &str, v: &[f32], len: usize) -> Result<()> {
    if v.len() != len {
        return Err(ModelError::WeightShape {
            name: name.to_string(),
            expected: vec![len],
            actual: vec![v.len()],
        });
    }
    Ok(())
}

impl AttentionWeights {
    pub fn zeros(model_dim: usize) -> Self {
        AttentionWeights {
            query: Matrix::new(model_dim, model_dim),
            key: Matrix::new(model_dim, model_dim),
            value: Matrix::new(model_dim, model_dim),
            output: Matrix::new(model_dim, model_dim),
        }
    }

    pub fn check(&self, model_dim: usize) -> Result<()> {
        check_matrix("attention.query", &self.query, model_dim, model_dim)?;
        check_matrix("attention.key", &self.key, model_dim, model_dim)?;
        check_matrix("attention.value", &self.value, model_dim, model_dim)?;
        check_matrix("attention.output", &self.output, model_dim, model_dim)
    }
}

impl FeedForwardWeights {
    pub fn zeros(model_dim: usize, hidden_dim: usize) -> Self {
        FeedForwardWeights {
            linear1: Matrix::new(model_dim, hidden_dim),
            bias1: vec![0.0; hidden_dim],
            linear2: Matrix::new(hidden_dim, model_dim),
            bias2: vec![0.0; model_dim],
        }
    }

    pub fn check(&self, model_dim: usize, hidden_dim: usize) -> Result<()> {
        check_matrix("ffn.linear1", &self.linear1, model_dim, hidden_dim)?;
        check_vector("ffn.bias1", &self.bias1, hidden_dim)?;
        check_matrix("ffn.linear2", &self.linear2, hidden_dim, model_dim)?;
        check_vector("ffn.bias2", &self.bias2, model_dim)
    }
}

impl LayerNormWeights {
    pub fn zeros(model_dim: usize) -> Self {
        LayerNormWeights {
            weight: vec![0.0; model_dim],
            bias: vec![0.0; model_dim],
        }
    }

    pub fn check(&self, name: &str, model_dim: usize) -> Result<()> {
        check_vector(&format!("{name}.weight"), &self.weight, model_dim)?;
        check_vector(&format!("{name}.bias"), &self.bias, model_dim)
    }
}

impl LayerWeights {
    pub fn zeros(config: &ModelConfig) -> Self {
        LayerWeights {
            attention: AttentionWeights::zeros(config.model_dim),
            feed_forward: FeedForwardWeights::zeros(config.model_dim, config.ffn_hidden_dim),
            norm1: LayerNormWeights::zeros(config.model_dim),
            norm2: LayerNormWeights::zeros(config.model_dim),
        }
    }

    pub fn check(&self, config: &ModelConfig) -> Result<()> {
        self.attention.check(config.model_dim)?;
        self.feed_forward
            .check(config.model_dim, config.ffn_hidden_dim)?;
        self.norm1.check("layer_norm1", config.model_dim)?;
        self.norm2.check("layer_norm2", config.model_dim)
    }
}

impl ModelWeights {
    /// Zero-filled weights with every tensor shaped for `config`.
    pub fn zeros(config: &ModelConfig) -> Self {
        ModelWeights {
            token_embedding: Matrix::new(config.vocab_size, config.model_dim),
            position_embedding: Matrix::new(config.max_sequence_length, config.model_dim),
            layers: (0..config.num_layers)
                .map(|_| LayerWeights::zeros(config))
                .collect(),
            output_projection: Matrix::new(config.model_dim, config.vocab_size),
        }
    }

    /// Verify that every tensor is shaped for `config`.
    pub fn check(&self, config: &ModelConfig) -> Result<()> {
        check_matrix(
            "token_embedding",
            &self.token_embedding,
            config.vocab_size,
            config.model_dim,
        )?;
        check_matrix(
            "position_embedding",
            &self.position_embedding,
            config.max_sequence_length,
            config.model_dim,
        )?;
        if self.layers.len() != config.num_layers {
            return Err(ModelError::ConfigMismatch {
                field: "num_layers",
                expected: config.num_layers.to_string(),
                actual: self.layers.len().to_string(),
            });
        }
        for (i, layer) in self.layers.iter().enumerate() {
            layer.check(config).map_err(|e| ModelError::layer(i, e))?;
        }
        check_matrix(
            "output_projection",
            &self.output_projection,
            config.model_dim,
            config.vocab_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn tiny() -> ModelConfig {
        ModelConfig {
            model_dim: 4,
            num_layers: 2,
            num_heads: 2,
            ffn_hidden_dim: 6,
            max_sequence_length: 5,
            vocab_size: 7,
            dropout_rate: 0.0,
        }
    }

    #[test]
    fn test_zeros_are_well_shaped() {
        let cfg = tiny();
        let w = ModelWeights::zeros(&cfg);
        w.check(&cfg).unwrap();
        assert_eq!(w.layers.len(), 2);
        assert_eq!(w.output_projection.dims(), vec![4, 7]);
        assert_eq!(w.layers[0].feed_forward.bias1.len(), 6);
    }

    #[test]
    fn test_check_names_bad_tensor() {
        let cfg = tiny();
        let mut w = ModelWeights::zeros(&cfg);
        w.layers[1].feed_forward.bias2 = vec![0.0; 3];
        let err = w.check(&cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Model);
        let msg = err.to_string();
        assert!(msg.contains("layer 1"));
        assert!(msg.contains("ffn.bias2"));
    }

    #[test]
    fn test_check_layer_count() {
        let cfg = tiny();
        let mut w = ModelWeights::zeros(&cfg);
        w.layers.pop();
        assert_eq!(w.check(&cfg).unwrap_err().kind(), ErrorKind::Configuration);
    }
}
