//! Validating front door over [`TinyLlamaModel`].
//!
//! The model itself trusts its callers. `TinyLlama` checks every
//! user-supplied string, path and number first, and guards the one-way
//! uninitialised -> ready transition.

use std::path::{Path, PathBuf};

use crate::error::{ModelError, Result};
use crate::llama::{ModelConfig, TinyLlamaModel};

/// Longest accepted string or path, in bytes.
pub const MAX_STRING_LENGTH: usize = 1_000_000;
/// Largest `max_tokens` accepted by [`TinyLlama::generate`].
pub const MAX_GENERATION_TOKENS: usize = 10_000;
/// Largest token list accepted by [`TinyLlama::detokenize`].
pub const MAX_TOKEN_COUNT: usize = 100_000;
pub const MIN_TEMPERATURE: f32 = 0.01;
pub const MAX_TEMPERATURE: f32 = 1000.0;

pub const VOCAB_FILE: &str = "vocab.txt";
pub const MERGES_FILE: &str = "merges.txt";
pub const WEIGHTS_FILE: &str = "weights.bin";

fn check_string(name: &str, value: &str, allow_empty: bool) -> Result<()> {
    if !allow_empty && value.is_empty() {
        return Err(ModelError::Configuration(format!("{name} cannot be empty")));
    }
    if value.contains('\0') {
        return Err(ModelError::Configuration(format!("{name} contains null characters")));
    }
    if value.len() > MAX_STRING_LENGTH {
        return Err(ModelError::Configuration(format!(
            "{name} is too long (max {MAX_STRING_LENGTH} bytes)"
        )));
    }
    Ok(())
}

fn missing(path: &Path, what: &str) -> ModelError {
    ModelError::file(
        path,
        std::io::Error::new(std::io::ErrorKind::NotFound, what.to_string()),
    )
}

fn check_path(name: &str, path: &Path, want_dir: bool) -> Result<()> {
    let text = path.to_string_lossy();
    if text.is_empty() || text.contains('\0') || text.len() > MAX_STRING_LENGTH {
        return Err(missing(path, &format!("{name} is not a usable path")));
    }
    if !path.exists() {
        return Err(missing(path, &format!("{name} does not exist")));
    }
    if want_dir && !path.is_dir() {
        return Err(missing(path, &format!("{name} is not a directory")));
    }
    if !want_dir && path.is_dir() {
        return Err(missing(path, &format!("{name} is a directory, not a file")));
    }
    Ok(())
}

/// A model plus its tokenizer, loaded once from disk and then used for
/// tokenization and generation.
pub struct TinyLlama {
    model: TinyLlamaModel,
    ready: bool,
}

impl TinyLlama {
    /// A facade over a model with the default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(ModelConfig::default())
    }

    /// A facade over a model with `config`. Weight files must match it.
    pub fn with_config(config: ModelConfig) -> Result<Self> {
        Ok(TinyLlama {
            model: TinyLlamaModel::new(config)?,
            ready: false,
        })
    }

    /// Wrap an already constructed, not yet loaded model.
    pub fn from_model(model: TinyLlamaModel) -> Self {
        TinyLlama { model, ready: false }
    }

    /// Load `vocab.txt`, `merges.txt` and `weights.bin` from `model_dir`.
    pub fn initialize(&mut self, model_dir: impl AsRef<Path>) -> Result<()> {
        let dir = model_dir.as_ref();
        check_path("model_dir", dir, true)?;
        if self.ready {
            return Err(already_initialized());
        }

        let vocab: PathBuf = dir.join(VOCAB_FILE);
        let merges = dir.join(MERGES_FILE);
        let weights = dir.join(WEIGHTS_FILE);
        self.initialize_with_files(vocab, merges, weights)
    }

    /// Load the tokenizer and weights from explicit paths.
    ///
    /// # Errors
    /// A `FileIo` error for a missing path or a directory, a `Model` error if
    /// this instance is already initialised, and any load error from the
    /// tokenizer or weight codec.
    pub fn initialize_with_files(
        &mut self,
        vocab: impl AsRef<Path>,
        merges: impl AsRef<Path>,
        weights: impl AsRef<Path>,
    ) -> Result<()> {
        let (vocab, merges, weights) = (vocab.as_ref(), merges.as_ref(), weights.as_ref());
        check_path("vocab_file", vocab, false)?;
        check_path("merges_file", merges, false)?;
        check_path("weights_file", weights, false)?;
        if self.ready {
            return Err(already_initialized());
        }

        self.model.load_tokenizer(vocab, merges)?;
        self.model.load_model_weights(weights)?;
        self.ready = true;
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn model(&self) -> &TinyLlamaModel {
        &self.model
    }

    /// Continue `prompt` by up to `max_tokens` tokens at the stored temperature.
    pub fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String> {
        if !self.ready {
            return Err(ModelError::NotInitialized("call initialize() first"));
        }
        check_string("prompt", prompt, false)?;
        if max_tokens == 0 {
            return Err(ModelError::Configuration("max_tokens must be at least 1".to_string()));
        }
        if max_tokens > MAX_GENERATION_TOKENS {
            return Err(ModelError::Configuration(format!(
                "max_tokens is too large (max {MAX_GENERATION_TOKENS}, got {max_tokens})"
            )));
        }
        let model_max = self.model.get_config().max_sequence_length;
        if max_tokens > model_max {
            return Err(ModelError::Configuration(format!(
                "max_tokens exceeds the model's maximum sequence length \
                 (model max: {model_max}, requested: {max_tokens})"
            )));
        }

        self.model.generate_text(prompt, max_tokens, 0.0)
    }

    pub fn tokenize_to_ids(&self, text: &str) -> Result<Vec<u32>> {
        self.check_tokenizer_ready()?;
        check_string("text", text, true)?;
        self.model.tokenize(text)
    }

    pub fn tokenize_to_strings(&self, text: &str) -> Result<Vec<String>> {
        self.check_tokenizer_ready()?;
        check_string("text", text, true)?;
        self.model.tokenize_to_strings(text)
    }

    pub fn detokenize(&self, token_ids: &[u32]) -> Result<String> {
        self.check_tokenizer_ready()?;
        if token_ids.len() > MAX_TOKEN_COUNT {
            return Err(ModelError::Configuration(format!(
                "token_ids contains too many tokens (max {MAX_TOKEN_COUNT}, got {})",
                token_ids.len()
            )));
        }
        self.model.detokenize(token_ids)
    }

    /// Set the generation temperature. Must be finite and in `[0.01, 1000]`.
    pub fn set_temperature(&mut self, temperature: f32) -> Result<()> {
        let in_range = (MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&temperature);
        if !temperature.is_finite() || !in_range {
            return Err(ModelError::Configuration(format!(
                "temperature must be a finite number in [{MIN_TEMPERATURE}, {MAX_TEMPERATURE}] \
                 (got {temperature})"
            )));
        }
        self.model.set_temperature(temperature);
        Ok(())
    }

    pub fn get_vocab_size(&self) -> Result<usize> {
        if !self.ready {
            return Err(ModelError::NotInitialized("call initialize() first"));
        }
        Ok(self.model.get_vocab_size())
    }

    fn check_tokenizer_ready(&self) -> Result<()> {
        if !self.ready {
            return Err(ModelError::Tokenizer(
                "model not initialized, call initialize() first".to_string(),
            ));
        }
        Ok(())
    }
}

fn already_initialized() -> ModelError {
    ModelError::Model(
        "model is already initialized; create a new instance to reinitialize".to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn small() -> TinyLlama {
        let config = ModelConfig {
            model_dim: 8,
            num_layers: 1,
            num_heads: 2,
            ffn_hidden_dim: 16,
            max_sequence_length: 10,
            vocab_size: 20,
            dropout_rate: 0.0,
        };
        TinyLlama::from_model(TinyLlamaModel::with_seed(config, 0).unwrap())
    }

    #[test]
    fn test_uninitialized_errors() {
        let t = small();
        assert!(!t.is_ready());
        assert_eq!(t.generate("hi", 1).unwrap_err().kind(), ErrorKind::Model);
        assert_eq!(t.tokenize_to_ids("hi").unwrap_err().kind(), ErrorKind::Tokenizer);
        assert_eq!(t.tokenize_to_strings("hi").unwrap_err().kind(), ErrorKind::Tokenizer);
        assert_eq!(t.detokenize(&[1]).unwrap_err().kind(), ErrorKind::Tokenizer);
        assert_eq!(t.get_vocab_size().unwrap_err().kind(), ErrorKind::Model);
    }

    #[test]
    fn test_temperature_range() {
        let mut t = small();
        t.set_temperature(0.01).unwrap();
        t.set_temperature(1000.0).unwrap();
        assert_eq!(t.model().temperature(), 1000.0);
        for bad in [0.0, 0.009, 1000.5, f32::NAN, f32::INFINITY, -1.0] {
            let err = t.set_temperature(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration, "{bad}");
        }
        assert_eq!(t.model().temperature(), 1000.0);
    }

    #[test]
    fn test_string_checks() {
        assert!(check_string("prompt", "", false).is_err());
        assert!(check_string("text", "", true).is_ok());
        assert!(check_string("prompt", "a\0b", false).is_err());
        let long = "x".repeat(MAX_STRING_LENGTH + 1);
        assert_eq!(
            check_string("prompt", &long, false).unwrap_err().kind(),
            ErrorKind::Configuration
        );
    }

    #[test]
    fn test_missing_paths() {
        let mut t = small();
        let err = t.initialize("/nonexistent/model").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileIo);

        let dir = tempfile::tempdir().unwrap();
        let err = t.initialize(dir.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileIo);
        assert!(err.to_string().contains("vocab.txt"));

        let err = t
            .initialize_with_files(dir.path(), dir.path(), dir.path())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileIo);
        assert!(!t.is_ready());
    }
}
