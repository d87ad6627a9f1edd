use crate::error::Result;

/// Strategy that selects the next token id from a probability distribution.
///
/// `probabilities[i]` is the probability of token id `i`. Implementations
/// must be deterministic for a given input unless they document otherwise.
pub trait Sampler: Send + Sync {
    /// Returns the name of this sampler.
    fn name(&self) -> &str;

    /// Select a token id from `probabilities`.
    fn sample(&self, probabilities: &[f32]) -> Result<u32>;
}
