use tl_tensor::ops::softmax_in_place;

/// Temperature-scaled softmax.
///
/// Each logit is divided by `temperature` before the max-subtraction, exp
/// and normalise steps. Higher temperatures produce flatter distributions,
/// lower temperatures sharpen toward the argmax. A temperature <= 0 is
/// clamped to a very small positive value.
pub fn softmax(logits: &[f32], temperature: f32) -> Vec<f32> {
    let temp = if temperature <= 0.0 { 1e-7 } else { temperature };

    let mut probs: Vec<f32> = logits.iter().map(|&l| l / temp).collect();
    softmax_in_place(&mut probs);
    probs
}
