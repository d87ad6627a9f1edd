use thiserror::Error;

#[derive(Error, Debug)]
pub enum TensorError {
    #[error("index {index:?} out of range for shape {shape:?}")]
    OutOfRange { index: Vec<usize>, shape: Vec<usize> },
    #[error("{op}: dimension mismatch between {left:?} and {right:?}")]
    DimensionMismatch {
        op: &'static str,
        left: Vec<usize>,
        right: Vec<usize>,
    },
    #[error("matmul dimension mismatch: [{m}x{k}] @ [{k2}x{n}]")]
    MatmulMismatch {
        m: usize,
        k: usize,
        k2: usize,
        n: usize,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TensorError>;
