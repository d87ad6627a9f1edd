pub mod bpe;
pub mod vocab;

pub use bpe::BpeTokenizer;
pub use vocab::Vocab;

use crate::error::Result;

/// Text <-> token id conversion used by the model.
///
/// Implementations must map unknown subwords to [`Tokenizer::unk_id`] and
/// decode ids outside the vocabulary as the unknown token's string.
pub trait Tokenizer: Send + Sync {
    /// Encode `text` into token ids. Empty text yields an empty vector.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Encode `text` into subword strings, before id lookup.
    fn encode_to_strings(&self, text: &str) -> Result<Vec<String>>;

    /// Decode token ids back into text.
    fn decode(&self, ids: &[u32]) -> Result<String>;

    /// Number of ids in the vocabulary.
    fn vocab_size(&self) -> usize;

    fn unk_id(&self) -> u32;
    fn pad_id(&self) -> u32;
    fn bos_id(&self) -> u32;
    fn eos_id(&self) -> u32;

    /// True once a vocabulary has been loaded.
    fn is_loaded(&self) -> bool;
}
