use thiserror::Error;

/// Errors raised while turning a distribution into a token id.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SamplerError {
    #[error("cannot sample from an empty distribution")]
    EmptyDistribution,

    #[error("distribution has {0} entries, more than a u32 token id can address")]
    TooLarge(usize),
}

pub type Result<T> = std::result::Result<T, SamplerError>;
