use std::io::Write;

use tl_tensor::io;

use super::header::TllmHeader;
use crate::error::Result;
use crate::llama::weights::{
    FeedForwardWeights, LayerNormWeights, LayerWeights, ModelWeights,
};
use crate::llama::ModelConfig;

pub(crate) fn write_feed_forward(
    writer: &mut impl Write,
    ffn: &FeedForwardWeights,
) -> Result<()> {
    ffn.linear1.write_to(writer)?;
    io::write_vector(writer, &ffn.bias1)?;
    ffn.linear2.write_to(writer)?;
    io::write_vector(writer, &ffn.bias2)?;
    Ok(())
}

pub(crate) fn write_layer_norms(
    writer: &mut impl Write,
    norm1: &LayerNormWeights,
    norm2: &LayerNormWeights,
) -> Result<()> {
    io::write_vector(writer, &norm1.weight)?;
    io::write_vector(writer, &norm1.bias)?;
    io::write_vector(writer, &norm2.weight)?;
    io::write_vector(writer, &norm2.bias)?;
    Ok(())
}

fn write_layer(writer: &mut impl Write, layer: &LayerWeights) -> Result<()> {
    let attn = &layer.attention;
    attn.query.write_to(writer)?;
    attn.key.write_to(writer)?;
    attn.value.write_to(writer)?;
    attn.output.write_to(writer)?;

    write_feed_forward(writer, &layer.feed_forward)?;
    write_layer_norms(writer, &layer.norm1, &layer.norm2)
}

/// Encode `weights` as a TLLM stream for `config`.
///
/// The weights are shape-checked against `config` first, so the output is
/// always a file that [`read_weights`](super::read_weights) accepts for the
/// same config.
pub fn write_weights(
    writer: &mut impl Write,
    config: &ModelConfig,
    weights: &ModelWeights,
) -> Result<()> {
    weights.check(config)?;
    TllmHeader::from_config(config)?.write(writer)?;

    weights.token_embedding.write_to(writer)?;
    weights.position_embedding.write_to(writer)?;
    for layer in &weights.layers {
        write_layer(writer, layer)?;
    }
    weights.output_projection.write_to(writer)?;
    Ok(())
}
