use std::io::Read;

use tl_tensor::{io, Matrix};

use super::header::TllmHeader;
use crate::error::{ModelError, Result};
use crate::llama::weights::{
    AttentionWeights, FeedForwardWeights, LayerNormWeights, LayerWeights, ModelWeights,
};
use crate::llama::ModelConfig;

/// Read a `rows | cols | payload` matrix, checking its dimensions against
/// the expected shape before reading the payload.
pub(crate) fn read_matrix(
    reader: &mut impl Read,
    name: &str,
    rows: usize,
    cols: usize,
) -> Result<Matrix<f32>> {
    let actual_rows = io::read_u64(reader)?;
    let actual_cols = io::read_u64(reader)?;
    if actual_rows != rows as u64 || actual_cols != cols as u64 {
        return Err(ModelError::StoredShape {
            name: name.to_string(),
            expected: vec![rows, cols],
            actual: vec![actual_rows as usize, actual_cols as usize],
        });
    }
    let mut m = Matrix::new(rows, cols);
    io::read_elements(reader, m.as_mut_slice())?;
    Ok(m)
}

/// Read a `len | payload` vector, checking its length first.
pub(crate) fn read_vector(reader: &mut impl Read, name: &str, len: usize) -> Result<Vec<f32>> {
    let actual = io::read_u64(reader)?;
    if actual != len as u64 {
        return Err(ModelError::StoredShape {
            name: name.to_string(),
            expected: vec![len],
            actual: vec![actual as usize],
        });
    }
    let mut v = vec![0.0f32; len];
    io::read_elements(reader, &mut v)?;
    Ok(v)
}

/// Read `linear1 | bias1 | linear2 | bias2`.
pub(crate) fn read_feed_forward(
    reader: &mut impl Read,
    model_dim: usize,
    hidden_dim: usize,
) -> Result<FeedForwardWeights> {
    let (d, h) = (model_dim, hidden_dim);
    Ok(FeedForwardWeights {
        linear1: read_matrix(reader, "ffn.linear1", d, h)?,
        bias1: read_vector(reader, "ffn.bias1", h)?,
        linear2: read_matrix(reader, "ffn.linear2", h, d)?,
        bias2: read_vector(reader, "ffn.bias2", d)?,
    })
}

/// Read both layer norms as `weight1 | bias1 | weight2 | bias2`.
pub(crate) fn read_layer_norms(
    reader: &mut impl Read,
    model_dim: usize,
) -> Result<(LayerNormWeights, LayerNormWeights)> {
    let d = model_dim;
    let norm1 = LayerNormWeights {
        weight: read_vector(reader, "layer_norm1.weight", d)?,
        bias: read_vector(reader, "layer_norm1.bias", d)?,
    };
    let norm2 = LayerNormWeights {
        weight: read_vector(reader, "layer_norm2.weight", d)?,
        bias: read_vector(reader, "layer_norm2.bias", d)?,
    };
    Ok((norm1, norm2))
}

/// Fail with `TrailingData` unless `reader` is exhausted.
pub(crate) fn expect_end(reader: &mut impl Read) -> Result<()> {
    let mut extra = [0u8; 1];
    if reader.read(&mut extra)? != 0 {
        return Err(ModelError::TrailingData);
    }
    Ok(())
}

fn read_layer(reader: &mut impl Read, config: &ModelConfig) -> Result<LayerWeights> {
    let d = config.model_dim;

    let attention = AttentionWeights {
        query: read_matrix(reader, "attention.query", d, d)?,
        key: read_matrix(reader, "attention.key", d, d)?,
        value: read_matrix(reader, "attention.value", d, d)?,
        output: read_matrix(reader, "attention.output", d, d)?,
    };
    let feed_forward = read_feed_forward(reader, d, config.ffn_hidden_dim)?;
    let (norm1, norm2) = read_layer_norms(reader, d)?;

    Ok(LayerWeights {
        attention,
        feed_forward,
        norm1,
        norm2,
    })
}

/// Decode a complete TLLM stream for `config`.
///
/// Fails on a bad magic or version, any header field that differs from
/// `config`, any tensor whose dimensions differ from the expected shape, a
/// short read, or any byte remaining after the output projection.
pub fn read_weights(reader: &mut impl Read, config: &ModelConfig) -> Result<ModelWeights> {
    let header = TllmHeader::parse(reader)?;
    header.check(config)?;

    let token_embedding =
        read_matrix(reader, "token_embedding", config.vocab_size, config.model_dim)?;
    let position_embedding = read_matrix(
        reader,
        "position_embedding",
        config.max_sequence_length,
        config.model_dim,
    )?;

    let mut layers = Vec::with_capacity(config.num_layers);
    for i in 0..config.num_layers {
        layers.push(read_layer(reader, config).map_err(|e| ModelError::layer(i, e))?);
    }

    let output_projection = read_matrix(
        reader,
        "output_projection",
        config.model_dim,
        config.vocab_size,
    )?;

    expect_end(reader)?;

    Ok(ModelWeights {
        token_embedding,
        position_embedding,
        layers,
        output_projection,
    })
}
