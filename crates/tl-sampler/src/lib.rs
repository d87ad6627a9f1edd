pub mod error;
pub mod greedy;
pub mod sampler;
pub mod temperature;

pub use error::{Result, SamplerError};
pub use greedy::GreedySampler;
pub use sampler::Sampler;
pub use temperature::softmax;
