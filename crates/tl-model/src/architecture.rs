/// Trait for model architectures that can perform autoregressive inference.
///
/// Implementations hold model weights and process a full token sequence to
/// produce next-token logits. There is no KV cache: every call recomputes the
/// whole sequence.
pub trait ModelArchitecture {
    /// Run the forward pass over `tokens`.
    ///
    /// Returns a vector of logits over the vocabulary for the last token.
    fn forward(&self, tokens: &[u32]) -> crate::Result<Vec<f32>>;

    /// Returns the vocabulary size (number of output logits).
    fn vocab_size(&self) -> usize;

    /// Returns the longest token sequence `forward` accepts.
    fn max_sequence_length(&self) -> usize;
}
