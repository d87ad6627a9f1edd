//! TLLM binary weight format.
//!
//! ```text
//! u32 magic = 0x544C4C4D ("TLLM")
//! u32 version = 1
//! i32 model_dim, num_layers, num_heads, ffn_hidden_dim,
//!     max_sequence_length, vocab_size
//! f32 dropout_rate
//! matrix token_embedding     [vocab_size, model_dim]
//! matrix position_embedding  [max_sequence_length, model_dim]
//! per layer:
//!     matrix query, key, value, output  [model_dim, model_dim]
//!     matrix linear1 [model_dim, ffn_hidden_dim]   vector bias1 [ffn_hidden_dim]
//!     matrix linear2 [ffn_hidden_dim, model_dim]   vector bias2 [model_dim]
//!     vector layer_norm1 weight, bias  [model_dim]
//!     vector layer_norm2 weight, bias  [model_dim]
//! matrix output_projection   [model_dim, vocab_size]
//! ```
//!
//! Matrices are `u64 rows | u64 cols | f32 payload`, vectors are
//! `u64 len | f32 payload`. Everything is in host byte order.

pub mod header;
pub mod parts;
pub mod reader;
pub mod writer;

pub use header::{TllmHeader, TLLM_MAGIC, TLLM_VERSION};
pub use reader::read_weights;
pub use writer::write_weights;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{ModelError, Result};
use crate::llama::{ModelConfig, ModelWeights};

/// Read and fully validate a weight file for `config`.
///
/// Nothing is returned unless the whole file decoded cleanly.
pub fn load_file(path: impl AsRef<Path>, config: &ModelConfig) -> Result<ModelWeights> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| ModelError::file(path, e))?;
    let mut reader = BufReader::new(file);
    read_weights(&mut reader, config).map_err(|e| ModelError::file(path, e))
}

/// Write `weights` for `config` to `path`, overwriting any existing file.
pub fn save_file(
    path: impl AsRef<Path>,
    config: &ModelConfig,
    weights: &ModelWeights,
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| ModelError::file(path, e))?;
    let mut writer = BufWriter::new(file);
    write_weights(&mut writer, config, weights)
        .and_then(|()| writer.flush().map_err(ModelError::from))
        .map_err(|e| ModelError::file(path, e))
}
