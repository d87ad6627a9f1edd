pub mod attention;
pub mod block;
pub mod config;
pub mod feed_forward;
pub mod weights;

pub use attention::MultiHeadAttention;
pub use block::TransformerBlock;
pub use config::ModelConfig;
pub use feed_forward::FeedForward;
pub use weights::{
    AttentionWeights, FeedForwardWeights, LayerNormWeights, LayerWeights, ModelWeights,
};

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tl_sampler::{GreedySampler, Sampler};
use tl_tensor::Matrix;

use crate::architecture::ModelArchitecture;
use crate::error::{ModelError, Result};
use crate::generation::generate_tokens;
use crate::tllm;
use crate::tokenizer::{BpeTokenizer, Tokenizer};

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 1.0;

/// A tiny decoder-only transformer.
///
/// Owns the token and position embeddings, `num_layers` pre-norm transformer
/// blocks, the output projection, a tokenizer and the token-selection
/// strategy. Embeddings, FFN and layer norm weights start zeroed; attention
/// projections start Xavier-uniform. Meaningful values arrive through
/// [`TinyLlamaModel::load_model_weights`] or [`TinyLlamaModel::set_weights`].
pub struct TinyLlamaModel {
    config: ModelConfig,
    token_embedding: Matrix<f32>,
    position_embedding: Matrix<f32>,
    blocks: Vec<TransformerBlock>,
    output_projection: Matrix<f32>,
    tokenizer: Box<dyn Tokenizer>,
    sampler: Box<dyn Sampler>,
    temperature: f32,
    weights_loaded: bool,
}

impl TinyLlamaModel {
    /// Build a model for `config`, seeding attention initialisation from
    /// the OS entropy source.
    pub fn new(config: ModelConfig) -> Result<Self> {
        Self::with_rng(config, &mut StdRng::from_entropy())
    }

    /// Build a model whose attention initialisation is reproducible.
    pub fn with_seed(config: ModelConfig, seed: u64) -> Result<Self> {
        Self::with_rng(config, &mut StdRng::seed_from_u64(seed))
    }

    /// Build a model drawing initial attention weights from `rng`.
    ///
    /// # Errors
    /// Returns a `Configuration` error if `config` fails
    /// [`ModelConfig::validate`].
    pub fn with_rng(config: ModelConfig, rng: &mut impl Rng) -> Result<Self> {
        config.validate()?;

        let blocks = (0..config.num_layers)
            .map(|_| TransformerBlock::new(&config, rng))
            .collect::<Result<Vec<_>>>()?;

        Ok(TinyLlamaModel {
            token_embedding: Matrix::new(config.vocab_size, config.model_dim),
            position_embedding: Matrix::new(config.max_sequence_length, config.model_dim),
            output_projection: Matrix::new(config.model_dim, config.vocab_size),
            blocks,
            tokenizer: Box::new(BpeTokenizer::new()),
            sampler: Box::new(GreedySampler::new()),
            temperature: DEFAULT_TEMPERATURE,
            weights_loaded: false,
            config,
        })
    }

    /// Returns a reference to the model configuration.
    pub fn get_config(&self) -> &ModelConfig {
        &self.config
    }

    /// The configured vocabulary size (number of output logits).
    pub fn get_vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    /// True once both a tokenizer vocabulary and a full set of weights are in place.
    pub fn is_initialized(&self) -> bool {
        self.tokenizer.is_loaded() && self.weights_loaded
    }

    /// True once a full set of weights has been installed.
    pub fn has_weights(&self) -> bool {
        self.weights_loaded
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Set the fallback temperature used when a call passes `<= 0`.
    pub fn set_temperature(&mut self, temperature: f32) {
        self.temperature = temperature;
    }

    pub fn blocks(&self) -> &[TransformerBlock] {
        &self.blocks
    }

    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    pub fn set_tokenizer(&mut self, tokenizer: Box<dyn Tokenizer>) {
        self.tokenizer = tokenizer;
    }

    /// Replace the strategy that turns probabilities into token ids.
    pub fn set_sampler(&mut self, sampler: Box<dyn Sampler>) {
        self.sampler = sampler;
    }

    /// Load a BPE vocabulary and merges file.
    ///
    /// The current tokenizer is only replaced if both files load.
    pub fn load_tokenizer(
        &mut self,
        vocab_path: impl AsRef<Path>,
        merges_path: impl AsRef<Path>,
    ) -> Result<()> {
        let mut tokenizer = BpeTokenizer::new();
        tokenizer.load_vocab(vocab_path.as_ref())?;
        tokenizer.load_merges(merges_path.as_ref())?;
        tracing::info!(
            vocab = %vocab_path.as_ref().display(),
            merges = %merges_path.as_ref().display(),
            vocab_size = tokenizer.vocab_size(),
            merges_count = tokenizer.num_merges(),
            "tokenizer loaded"
        );
        self.tokenizer = Box::new(tokenizer);
        Ok(())
    }

    /// Snapshot of the full parameter set.
    pub fn weights(&self) -> ModelWeights {
        ModelWeights {
            token_embedding: self.token_embedding.clone(),
            position_embedding: self.position_embedding.clone(),
            layers: self.blocks.iter().map(TransformerBlock::weights).collect(),
            output_projection: self.output_projection.clone(),
        }
    }

    /// Install a full parameter set and mark the weights as loaded.
    ///
    /// Every tensor is shape-checked against the config first; on error the
    /// model is unchanged.
    pub fn set_weights(&mut self, weights: ModelWeights) -> Result<()> {
        weights.check(&self.config)?;

        let mut blocks = self.blocks.clone();
        for (i, (block, layer)) in blocks.iter_mut().zip(weights.layers).enumerate() {
            block.set_weights(layer).map_err(|e| ModelError::layer(i, e))?;
        }

        self.blocks = blocks;
        self.token_embedding = weights.token_embedding;
        self.position_embedding = weights.position_embedding;
        self.output_projection = weights.output_projection;
        self.weights_loaded = true;
        Ok(())
    }

    /// Load weights from a TLLM file written for this model's config.
    ///
    /// The file is decoded and validated in full before anything is
    /// installed, so a failed load leaves the model as it was.
    pub fn load_model_weights(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let weights = tllm::load_file(path, &self.config)?;
        self.set_weights(weights)?;
        tracing::info!(
            path = %path.display(),
            layers = self.config.num_layers,
            "model weights loaded"
        );
        Ok(())
    }

    /// Write the current in-memory weights to a TLLM file.
    pub fn save_model_weights(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        tllm::save_file(path, &self.config, &self.weights())?;
        tracing::info!(
            path = %path.display(),
            layers = self.config.num_layers,
            "model weights saved"
        );
        Ok(())
    }

    /// Run the transformer over `tokens` and return the next-token logits
    /// for the last position.
    ///
    /// # Errors
    /// Returns a `Model` error if no weights are loaded, `tokens` is empty
    /// or longer than `max_sequence_length`, or a token id is outside the
    /// vocabulary.
    pub fn forward(&self, tokens: &[u32]) -> Result<Vec<f32>> {
        if !self.weights_loaded {
            return Err(ModelError::NotInitialized("model weights are not loaded"));
        }
        if tokens.is_empty() {
            return Err(ModelError::Model("empty input tokens".to_string()));
        }
        let seq_len = tokens.len();
        if seq_len > self.config.max_sequence_length {
            return Err(ModelError::Model(format!(
                "input length {seq_len} exceeds max_sequence_length {}",
                self.config.max_sequence_length
            )));
        }

        let mut hidden = Matrix::new(seq_len, self.config.model_dim);
        for (pos, &id) in tokens.iter().enumerate() {
            if id as usize >= self.config.vocab_size {
                return Err(ModelError::InvalidToken {
                    id,
                    vocab_size: self.config.vocab_size,
                });
            }
            let token_row = self.token_embedding.row(id as usize)?;
            let pos_row = self.position_embedding.row(pos)?;
            for ((h, &t), &p) in hidden.row_mut(pos)?.iter_mut().zip(token_row).zip(pos_row) {
                *h = t + p;
            }
        }

        let mask = attention::causal_mask(seq_len);
        for (i, block) in self.blocks.iter().enumerate() {
            hidden = block
                .forward(&hidden, Some(&mask))
                .map_err(|e| ModelError::layer(i, e))?;
        }

        // Only the last position is projected.
        let last = Matrix::from_vec(1, self.config.model_dim, hidden.row(seq_len - 1)?.to_vec())?;
        let logits = last
            .matmul(&self.output_projection)
            .map_err(|e| ModelError::op("output_projection", e))?;
        Ok(logits.into_vec())
    }

    /// Temperature softmax over `logits`; a temperature `<= 0` uses the
    /// stored temperature.
    pub fn softmax(&self, logits: &[f32], temperature: f32) -> Vec<f32> {
        tl_sampler::softmax(logits, self.resolve_temperature(temperature))
    }

    fn resolve_temperature(&self, temperature: f32) -> f32 {
        if temperature > 0.0 {
            temperature
        } else {
            self.temperature
        }
    }

    /// Generate up to `max_tokens` tokens after `prompt` and return the
    /// prompt followed by the decoded continuation.
    ///
    /// # Errors
    /// Returns a `Model` error unless the model is fully initialised and
    /// `max_tokens` is positive. Tokenizer and forward-pass failures are
    /// propagated.
    pub fn generate_text(
        &self,
        prompt: &str,
        max_tokens: usize,
        temperature: f32,
    ) -> Result<String> {
        if !self.is_initialized() {
            return Err(ModelError::NotInitialized(
                "tokenizer and model weights must both be loaded",
            ));
        }
        if max_tokens == 0 {
            return Err(ModelError::Model("max_tokens must be positive".to_string()));
        }

        let prompt_tokens = self.tokenize(prompt)?;
        let generated = generate_tokens(
            self,
            self.sampler.as_ref(),
            &prompt_tokens,
            max_tokens,
            self.resolve_temperature(temperature),
            self.tokenizer.eos_id(),
        )?;
        let continuation = self.detokenize(&generated)?;
        Ok(format!("{prompt}{continuation}"))
    }

    pub fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        self.tokenizer.encode(text)
    }

    pub fn tokenize_to_strings(&self, text: &str) -> Result<Vec<String>> {
        self.tokenizer.encode_to_strings(text)
    }

    pub fn detokenize(&self, tokens: &[u32]) -> Result<String> {
        self.tokenizer.decode(tokens)
    }
}

impl ModelArchitecture for TinyLlamaModel {
    fn forward(&self, tokens: &[u32]) -> Result<Vec<f32>> {
        TinyLlamaModel::forward(self, tokens)
    }

    fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    fn max_sequence_length(&self) -> usize {
        self.config.max_sequence_length
    }
}
