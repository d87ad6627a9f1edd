use tl_sampler::{softmax, Sampler};

use crate::architecture::ModelArchitecture;
use crate::error::Result;

/// Autoregressively extend `prompt` and return only the new tokens.
///
/// A prompt that already fills the context is cut to
/// `max_sequence_length - 1` tokens so at least one token can be generated.
/// Each step runs a full forward pass over the sequence so far, turns the
/// last-position logits into probabilities with a temperature softmax, and
/// lets `sampler` pick the next id. Generation stops after `max_tokens`
/// steps, when the sequence reaches `max_sequence_length`, or right after
/// `eos_id` is produced (the EOS token is included in the output).
pub fn generate_tokens(
    model: &impl ModelArchitecture,
    sampler: &dyn Sampler,
    prompt: &[u32],
    max_tokens: usize,
    temperature: f32,
    eos_id: u32,
) -> Result<Vec<u32>> {
    let max_len = model.max_sequence_length();
    let mut tokens = prompt.to_vec();
    if tokens.len() >= max_len {
        tracing::warn!(
            prompt_len = tokens.len(),
            max_len,
            "prompt truncated to fit max_sequence_length"
        );
        tokens.truncate(max_len.saturating_sub(1));
    }
    let prompt_len = tokens.len();

    for step in 0..max_tokens {
        if tokens.len() >= max_len {
            break;
        }

        let logits = model.forward(&tokens)?;
        let probs = softmax(&logits, temperature);
        let next = sampler.sample(&probs)?;
        tracing::debug!(step, token = next, sampler = sampler.name(), "generated token");

        tokens.push(next);
        if next == eos_id {
            break;
        }
    }

    Ok(tokens.split_off(prompt_len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, ModelError};
    use std::cell::RefCell;
    use tl_sampler::GreedySampler;

    /// Predicts `last + 1` (mod vocab) and records every sequence it sees.
    struct Counter {
        vocab: usize,
        max_len: usize,
        calls: RefCell<Vec<Vec<u32>>>,
    }

    impl Counter {
        fn new(vocab: usize, max_len: usize) -> Self {
            Counter {
                vocab,
                max_len,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl ModelArchitecture for Counter {
        fn forward(&self, tokens: &[u32]) -> Result<Vec<f32>> {
            self.calls.borrow_mut().push(tokens.to_vec());
            let last = *tokens
                .last()
                .ok_or_else(|| ModelError::Model("empty input tokens".into()))?;
            let mut logits = vec![0.0; self.vocab];
            logits[(last as usize + 1) % self.vocab] = 5.0;
            Ok(logits)
        }

        fn vocab_size(&self) -> usize {
            self.vocab
        }

        fn max_sequence_length(&self) -> usize {
            self.max_len
        }
    }

    #[test]
    fn test_stops_at_max_tokens() {
        let m = Counter::new(50, 100);
        let out = generate_tokens(&m, &GreedySampler, &[10], 3, 1.0, 3).unwrap();
        assert_eq!(out, vec![11, 12, 13]);
        assert_eq!(m.calls.borrow().len(), 3);
        assert_eq!(m.calls.borrow()[2], vec![10, 11, 12]);
    }

    #[test]
    fn test_stops_after_eos() {
        let m = Counter::new(50, 100);
        let out = generate_tokens(&m, &GreedySampler, &[0], 10, 1.0, 3).unwrap();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn test_stops_at_context_limit() {
        let m = Counter::new(50, 5);
        let out = generate_tokens(&m, &GreedySampler, &[10, 11], 10, 1.0, 3).unwrap();
        assert_eq!(out, vec![12, 13, 14]);
    }

    #[test]
    fn test_long_prompt_truncated() {
        let m = Counter::new(50, 4);
        let prompt = [10, 11, 12, 13, 14, 15];
        let out = generate_tokens(&m, &GreedySampler, &prompt, 10, 1.0, 3).unwrap();
        assert_eq!(m.calls.borrow()[0], vec![10, 11, 12]);
        assert_eq!(out, vec![13]);
    }

    #[test]
    fn test_temperature_does_not_change_argmax() {
        let m = Counter::new(50, 100);
        let cold = generate_tokens(&m, &GreedySampler, &[20], 4, 0.05, 3).unwrap();
        let hot = generate_tokens(&m, &GreedySampler, &[20], 4, 50.0, 3).unwrap();
        assert_eq!(cold, hot);
    }

    #[test]
    fn test_forward_errors_propagate() {
        let m = Counter::new(50, 100);
        let err = generate_tokens(&m, &GreedySampler, &[], 2, 1.0, 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Model);
    }

    #[test]
    fn test_zero_max_tokens_generates_nothing() {
        let m = Counter::new(50, 100);
        assert!(generate_tokens(&m, &GreedySampler, &[1], 0, 1.0, 3).unwrap().is_empty());
    }
}
