//! Model configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Hyperparameters of a tiny transformer model.
///
/// Immutable once a model is built from it. A weight file whose header
/// disagrees with the model's config is rejected at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Embedding dimension / hidden size.
    pub model_dim: usize,
    /// Number of transformer blocks.
    pub num_layers: usize,
    /// Number of attention heads. Must divide `model_dim`.
    pub num_heads: usize,
    /// Inner dimension of the feed-forward network.
    pub ffn_hidden_dim: usize,
    /// Maximum sequence length (rows of the positional embedding).
    pub max_sequence_length: usize,
    /// Vocabulary size (rows of the token embedding, output logits).
    pub vocab_size: usize,
    /// Dropout rate. Stored and serialized, unused at inference.
    pub dropout_rate: f32,
}

impl ModelConfig {
    /// Dimension of each attention head (`model_dim / num_heads`).
    pub fn head_dim(&self) -> usize {
        if self.num_heads == 0 {
            0
        } else {
            self.model_dim / self.num_heads
        }
    }

    /// Check every field, naming the first offending parameter.
    ///
    /// # Errors
    /// Returns a `Configuration` error for zero dimensions, a dropout rate
    /// outside `[0, 1)`, a `model_dim` not divisible by `num_heads`, or a
    /// dimension too large for the weight file's 32-bit header fields.
    pub fn validate(&self) -> Result<()> {
        let dims = [
            ("model_dim", self.model_dim),
            ("num_layers", self.num_layers),
            ("num_heads", self.num_heads),
            ("ffn_hidden_dim", self.ffn_hidden_dim),
            ("max_sequence_length", self.max_sequence_length),
            ("vocab_size", self.vocab_size),
        ];
        for (name, value) in dims {
            if value == 0 {
                return Err(ModelError::Configuration(format!("{name} must be positive")));
            }
            if value > i32::MAX as usize {
                return Err(ModelError::Configuration(format!(
                    "{name} = {value} exceeds {}",
                    i32::MAX
                )));
            }
        }
        if self.model_dim % self.num_heads != 0 {
            return Err(ModelError::Configuration(format!(
                "model_dim ({}) must be divisible by num_heads ({})",
                self.model_dim, self.num_heads
            )));
        }
        if !self.dropout_rate.is_finite() || !(0.0..1.0).contains(&self.dropout_rate) {
            return Err(ModelError::Configuration(format!(
                "dropout_rate must be in [0, 1), got {}",
                self.dropout_rate
            )));
        }
        Ok(())
    }

    /// Load from a JSON file. Missing fields take their default values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ModelError::file(path, e))?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|e| ModelError::file(path, e))?;
        Ok(config)
    }

    /// Save as pretty-printed JSON.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|e| ModelError::file(path, e))?;
        Ok(())
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dim: 512,
            num_layers: 6,
            num_heads: 8,
            ffn_hidden_dim: 2048,
            max_sequence_length: 1024,
            vocab_size: 32000,
            dropout_rate: 0.1,
        }
    }
}
