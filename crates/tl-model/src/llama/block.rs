use std::path::Path;

use rand::Rng;
use tl_tensor::{ops, Matrix};

use super::attention::MultiHeadAttention;
use super::config::ModelConfig;
use super::feed_forward::FeedForward;
use super::weights::{LayerNormWeights, LayerWeights};
use crate::error::{ModelError, Result};
use crate::tllm::parts::{self, with_suffix, ATTENTION_SUFFIX, FFN_SUFFIX, LAYER_NORM_SUFFIX};

/// Layer norm epsilon.
pub const LAYER_NORM_EPS: f32 = 1e-5;

/// Pre-norm transformer block.
///
/// ```text
/// residual = input + attention(layer_norm1(input))
/// output   = residual + ffn(layer_norm2(residual))
/// ```
#[derive(Debug, Clone)]
pub struct TransformerBlock {
    attention: MultiHeadAttention,
    feed_forward: FeedForward,
    norm1: LayerNormWeights,
    norm2: LayerNormWeights,
    model_dim: usize,
}

impl TransformerBlock {
    pub fn new(config: &ModelConfig, rng: &mut impl Rng) -> Result<Self> {
        Ok(TransformerBlock {
            attention: MultiHeadAttention::new(config.model_dim, config.num_heads, rng)?,
            feed_forward: FeedForward::new(config.model_dim, config.ffn_hidden_dim),
            norm1: LayerNormWeights::zeros(config.model_dim),
            norm2: LayerNormWeights::zeros(config.model_dim),
            model_dim: config.model_dim,
        })
    }

    pub fn attention(&self) -> &MultiHeadAttention {
        &self.attention
    }

    pub fn feed_forward(&self) -> &FeedForward {
        &self.feed_forward
    }

    /// Snapshot of every weight in this block.
    pub fn weights(&self) -> LayerWeights {
        LayerWeights {
            attention: self.attention.weights().clone(),
            feed_forward: self.feed_forward.weights().clone(),
            norm1: self.norm1.clone(),
            norm2: self.norm2.clone(),
        }
    }

    /// Install a full set of block weights.
    ///
    /// Every tensor is shape-checked before anything is replaced, so a failure
    /// leaves the block untouched.
    pub fn set_weights(&mut self, weights: LayerWeights) -> Result<()> {
        weights.norm1.check("layer_norm1", self.model_dim)?;
        weights.norm2.check("layer_norm2", self.model_dim)?;
        let mut attention = self.attention.clone();
        attention.set_weights(weights.attention)?;
        let mut feed_forward = self.feed_forward.clone();
        feed_forward.set_weights(weights.feed_forward)?;

        self.attention = attention;
        self.feed_forward = feed_forward;
        self.norm1 = weights.norm1;
        self.norm2 = weights.norm2;
        Ok(())
    }

    /// Load the block from `<prefix>.attention.*`, `<prefix>.ffn` and
    /// `<prefix>.layernorm`.
    ///
    /// All three are read and shape-checked before anything is replaced.
    pub fn load_weights(&mut self, prefix: impl AsRef<Path>) -> Result<()> {
        let prefix = prefix.as_ref();
        let d = self.model_dim;
        let attention = parts::load_attention(&with_suffix(prefix, ATTENTION_SUFFIX), d)?;
        let feed_forward = parts::load_feed_forward(
            &with_suffix(prefix, FFN_SUFFIX),
            d,
            self.feed_forward.hidden_dim(),
        )?;
        let (norm1, norm2) = parts::load_layer_norms(&with_suffix(prefix, LAYER_NORM_SUFFIX), d)?;

        self.set_weights(LayerWeights {
            attention,
            feed_forward,
            norm1,
            norm2,
        })?;
        tracing::debug!(prefix = %prefix.display(), "transformer block weights loaded");
        Ok(())
    }

    /// Write the files [`Self::load_weights`] reads.
    pub fn save_weights(&self, prefix: impl AsRef<Path>) -> Result<()> {
        let prefix = prefix.as_ref();
        self.attention.save_weights(with_suffix(prefix, ATTENTION_SUFFIX))?;
        self.feed_forward.save_weights(with_suffix(prefix, FFN_SUFFIX))?;
        parts::save_layer_norms(&with_suffix(prefix, LAYER_NORM_SUFFIX), &self.norm1, &self.norm2)
    }

    pub fn forward(&self, input: &Matrix<f32>, mask: Option<&Matrix<f32>>) -> Result<Matrix<f32>> {
        let normed1 = layer_norm(input, &self.norm1)?;
        let attn_out = self.attention.forward(&normed1, mask)?;
        let residual = input
            .add(&attn_out)
            .map_err(|e| ModelError::op("block.attention_residual", e))?;

        let normed2 = layer_norm(&residual, &self.norm2)?;
        let ffn_out = self.feed_forward.forward(&normed2)?;
        residual
            .add(&ffn_out)
            .map_err(|e| ModelError::op("block.ffn_residual", e))
    }
}

/// Row-wise layer norm with the block's epsilon.
pub fn layer_norm(input: &Matrix<f32>, norm: &LayerNormWeights) -> Result<Matrix<f32>> {
    if input.cols() != norm.weight.len() || input.cols() != norm.bias.len() {
        return Err(ModelError::Model(format!(
            "layer norm input has {} columns, expected {} (weight) and {} (bias)",
            input.cols(),
            norm.weight.len(),
            norm.bias.len()
        )));
    }
    ops::layer_norm(input, &norm.weight, &norm.bias, LAYER_NORM_EPS)
        .map_err(|e| ModelError::op("layer_norm", e))
}
