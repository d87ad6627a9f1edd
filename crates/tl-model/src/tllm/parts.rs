//! Per-component weight files.
//!
//! Besides the single TLLM file, the building blocks can be loaded from
//! their own headerless files, all named from one prefix:
//!
//! ```text
//! <prefix>.query  <prefix>.key  <prefix>.value  <prefix>.output   one matrix each
//! <prefix>                       linear1 | bias1 | linear2 | bias2  (feed-forward)
//! <prefix>.attention.*           the four attention files           (block)
//! <prefix>.ffn                   the feed-forward file              (block)
//! <prefix>.layernorm             weight1 | bias1 | weight2 | bias2  (block)
//! ```
//!
//! Tensors use the same matrix and vector encoding as the TLLM body.

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tl_tensor::Matrix;

use super::reader::{expect_end, read_feed_forward, read_layer_norms};
use super::writer::{write_feed_forward, write_layer_norms};
use crate::error::{ModelError, Result};
use crate::llama::weights::{
    check_matrix, AttentionWeights, FeedForwardWeights, LayerNormWeights,
};

pub const QUERY_SUFFIX: &str = ".query";
pub const KEY_SUFFIX: &str = ".key";
pub const VALUE_SUFFIX: &str = ".value";
pub const OUTPUT_SUFFIX: &str = ".output";
pub const ATTENTION_SUFFIX: &str = ".attention";
pub const FFN_SUFFIX: &str = ".ffn";
pub const LAYER_NORM_SUFFIX: &str = ".layernorm";

/// `prefix` with `suffix` appended to its last component.
pub fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn load_projection(prefix: &Path, suffix: &str, model_dim: usize) -> Result<Matrix<f32>> {
    let path = with_suffix(prefix, suffix);
    let mut m = Matrix::new(0, 0);
    m.load_from_file(&path).map_err(|e| ModelError::file(&path, e))?;
    let name = format!("attention{suffix}");
    check_matrix(&name, &m, model_dim, model_dim)
        .map_err(|e| ModelError::file(&path, e.stored()))?;
    Ok(m)
}

/// Load the four `[model_dim, model_dim]` attention projections.
pub fn load_attention(prefix: &Path, model_dim: usize) -> Result<AttentionWeights> {
    Ok(AttentionWeights {
        query: load_projection(prefix, QUERY_SUFFIX, model_dim)?,
        key: load_projection(prefix, KEY_SUFFIX, model_dim)?,
        value: load_projection(prefix, VALUE_SUFFIX, model_dim)?,
        output: load_projection(prefix, OUTPUT_SUFFIX, model_dim)?,
    })
}

pub fn save_attention(prefix: &Path, weights: &AttentionWeights) -> Result<()> {
    for (suffix, m) in [
        (QUERY_SUFFIX, &weights.query),
        (KEY_SUFFIX, &weights.key),
        (VALUE_SUFFIX, &weights.value),
        (OUTPUT_SUFFIX, &weights.output),
    ] {
        let path = with_suffix(prefix, suffix);
        m.save_to_file(&path).map_err(|e| ModelError::file(&path, e))?;
    }
    Ok(())
}

/// Open `path`, decode it with `read` and require nothing to follow.
fn load_with<T>(
    path: &Path,
    read: impl FnOnce(&mut BufReader<File>) -> Result<T>,
) -> Result<T> {
    let file = File::open(path).map_err(|e| ModelError::file(path, e))?;
    let mut reader = BufReader::new(file);
    read(&mut reader)
        .and_then(|value| expect_end(&mut reader).map(|()| value))
        .map_err(|e| ModelError::file(path, e))
}

fn save_with(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<File>) -> Result<()>,
) -> Result<()> {
    let file = File::create(path).map_err(|e| ModelError::file(path, e))?;
    let mut writer = BufWriter::new(file);
    write(&mut writer)
        .and_then(|()| writer.flush().map_err(ModelError::from))
        .map_err(|e| ModelError::file(path, e))
}

pub fn load_feed_forward(
    path: &Path,
    model_dim: usize,
    hidden_dim: usize,
) -> Result<FeedForwardWeights> {
    load_with(path, |r| read_feed_forward(r, model_dim, hidden_dim))
}

pub fn save_feed_forward(path: &Path, weights: &FeedForwardWeights) -> Result<()> {
    save_with(path, |w| write_feed_forward(w, weights))
}

/// Load the pre-attention and pre-FFN norms, in that order.
pub fn load_layer_norms(
    path: &Path,
    model_dim: usize,
) -> Result<(LayerNormWeights, LayerNormWeights)> {
    load_with(path, |r| read_layer_norms(r, model_dim))
}

pub fn save_layer_norms(
    path: &Path,
    norm1: &LayerNormWeights,
    norm2: &LayerNormWeights,
) -> Result<()> {
    save_with(path, |w| write_layer_norms(w, norm1, norm2))
}
