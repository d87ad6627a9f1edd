use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of a [`ModelError`], for callers that branch on
/// the kind of failure rather than its details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing, unreadable, truncated, or structurally invalid file.
    FileIo,
    /// Invalid construction parameters or a config/file mismatch.
    Configuration,
    /// Dimension mismatch inside a forward pass, bad token id, uninitialized
    /// model, or empty required input.
    Model,
    /// Raw index or shape error from the numeric containers.
    OutOfRange,
    /// Failure in the tokenizer collaborator.
    Tokenizer,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::FileIo => "file I/O",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Model => "model",
            ErrorKind::OutOfRange => "out of range",
            ErrorKind::Tokenizer => "tokenizer",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: Box<ModelError>,
    },
    #[error("invalid TLLM magic: expected 0x544C4C4D, got {0:#010X}")]
    InvalidMagic(u32),
    #[error("unsupported TLLM version: {0}")]
    UnsupportedVersion(u32),
    #[error("{field} mismatch: expected {expected}, got {actual}")]
    ConfigMismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },
    #[error("{name} dimension mismatch: expected {expected:?}, got {actual:?}")]
    WeightShape {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("{name} stored with dimensions {actual:?}, expected {expected:?}")]
    StoredShape {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("unexpected data at end of weights file")]
    TrailingData,
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("token id {id} out of range for vocabulary size {vocab_size}")]
    InvalidToken { id: u32, vocab_size: usize },
    #[error("model not initialized: {0}")]
    NotInitialized(&'static str),
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error("{0}")]
    Model(String),
    #[error("{op}: {source}")]
    Op {
        op: &'static str,
        #[source]
        source: Box<ModelError>,
    },
    #[error("layer {layer}: {source}")]
    Layer {
        layer: usize,
        #[source]
        source: Box<ModelError>,
    },
    #[error("tensor error: {0}")]
    Tensor(#[from] tl_tensor::TensorError),
    #[error("sampler error: {0}")]
    Sampler(#[from] tl_sampler::SamplerError),
    #[error("config file error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;

impl ModelError {
    /// Wrap `source` with the name of the operation that produced it.
    pub fn op(op: &'static str, source: impl Into<ModelError>) -> Self {
        ModelError::Op {
            op,
            source: Box::new(source.into()),
        }
    }

    /// Wrap `source` with the index of the transformer layer it came from.
    pub fn layer(layer: usize, source: impl Into<ModelError>) -> Self {
        ModelError::Layer {
            layer,
            source: Box::new(source.into()),
        }
    }

    /// Wrap `source` with the file it relates to.
    pub fn file(path: impl Into<PathBuf>, source: impl Into<ModelError>) -> Self {
        ModelError::File {
            path: path.into(),
            source: Box::new(source.into()),
        }
    }

    /// Reclassify a weight shape mismatch as bad data read from a file.
    ///
    /// `WeightShape` becomes `StoredShape`, also inside `Op` and `Layer`
    /// context. Other errors pass through unchanged.
    pub fn stored(self) -> Self {
        match self {
            ModelError::WeightShape {
                name,
                expected,
                actual,
            } => ModelError::StoredShape {
                name,
                expected,
                actual,
            },
            ModelError::Op { op, source } => ModelError::Op {
                op,
                source: Box::new(source.stored()),
            },
            ModelError::Layer { layer, source } => ModelError::Layer {
                layer,
                source: Box::new(source.stored()),
            },
            other => other,
        }
    }

    /// Classify this error.
    ///
    /// Raw container errors are `OutOfRange`, but once wrapped with an
    /// operation or layer they are reported as `Model` errors.
    pub fn kind(&self) -> ErrorKind {
        use tl_tensor::TensorError;

        match self {
            ModelError::Io(_)
            | ModelError::InvalidMagic(_)
            | ModelError::UnsupportedVersion(_)
            | ModelError::StoredShape { .. }
            | ModelError::TrailingData
            | ModelError::Json(_)
            | ModelError::Tensor(TensorError::Io(_)) => ErrorKind::FileIo,
            ModelError::ConfigMismatch { .. } | ModelError::Configuration(_) => {
                ErrorKind::Configuration
            }
            ModelError::InvalidToken { .. }
            | ModelError::WeightShape { .. }
            | ModelError::NotInitialized(_)
            | ModelError::Model(_)
            | ModelError::Sampler(_) => ErrorKind::Model,
            ModelError::Tensor(_) => ErrorKind::OutOfRange,
            ModelError::Tokenizer(_) => ErrorKind::Tokenizer,
            ModelError::File { source, .. } => source.kind(),
            ModelError::Op { source, .. } | ModelError::Layer { source, .. } => {
                match source.kind() {
                    ErrorKind::OutOfRange => ErrorKind::Model,
                    kind => kind,
                }
            }
        }
    }
}
