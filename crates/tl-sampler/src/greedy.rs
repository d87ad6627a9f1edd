use crate::error::{Result, SamplerError};
use crate::sampler::Sampler;

/// Greedy sampler: selects the token with the highest probability.
///
/// Ties resolve to the lowest id. NaN entries never win.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedySampler;

impl GreedySampler {
    pub fn new() -> Self {
        Self
    }
}

impl Sampler for GreedySampler {
    fn name(&self) -> &str {
        "greedy"
    }

    fn sample(&self, probabilities: &[f32]) -> Result<u32> {
        if probabilities.is_empty() {
            return Err(SamplerError::EmptyDistribution);
        }
        if probabilities.len() > u32::MAX as usize {
            return Err(SamplerError::TooLarge(probabilities.len()));
        }

        let mut best = 0usize;
        let mut best_val = probabilities[0];
        for (i, &p) in probabilities.iter().enumerate().skip(1) {
            if p > best_val || (best_val.is_nan() && !p.is_nan()) {
                best = i;
                best_val = p;
            }
        }
        Ok(best as u32)
    }
}
