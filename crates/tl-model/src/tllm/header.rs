use std::io::{Read, Write};

use crate::error::{ModelError, Result};
use crate::llama::ModelConfig;

/// The magic number identifying a TLLM file: ASCII "TLLM" as a u32.
pub const TLLM_MAGIC: u32 = 0x544C_4C4D;

/// The only supported format version.
pub const TLLM_VERSION: u32 = 1;

/// Parsed TLLM file header: the model configuration the file was written for.
#[derive(Debug, Clone, PartialEq)]
pub struct TllmHeader {
    pub version: u32,
    pub model_dim: i32,
    pub num_layers: i32,
    pub num_heads: i32,
    pub ffn_hidden_dim: i32,
    pub max_sequence_length: i32,
    pub vocab_size: i32,
    pub dropout_rate: f32,
}

fn read_u32(reader: &mut impl Read) -> Result<u32> {
    let mut buf4 = [0u8; 4];
    reader.read_exact(&mut buf4)?;
    Ok(u32::from_ne_bytes(buf4))
}

fn read_i32(reader: &mut impl Read) -> Result<i32> {
    let mut buf4 = [0u8; 4];
    reader.read_exact(&mut buf4)?;
    Ok(i32::from_ne_bytes(buf4))
}

fn to_i32(field: &'static str, value: usize) -> Result<i32> {
    i32::try_from(value).map_err(|_| {
        ModelError::Configuration(format!("{field} = {value} does not fit the weight file header"))
    })
}

impl TllmHeader {
    /// Header describing `config`.
    pub fn from_config(config: &ModelConfig) -> Result<TllmHeader> {
        Ok(TllmHeader {
            version: TLLM_VERSION,
            model_dim: to_i32("model_dim", config.model_dim)?,
            num_layers: to_i32("num_layers", config.num_layers)?,
            num_heads: to_i32("num_heads", config.num_heads)?,
            ffn_hidden_dim: to_i32("ffn_hidden_dim", config.ffn_hidden_dim)?,
            max_sequence_length: to_i32("max_sequence_length", config.max_sequence_length)?,
            vocab_size: to_i32("vocab_size", config.vocab_size)?,
            dropout_rate: config.dropout_rate,
        })
    }

    /// Parse a TLLM header from the beginning of a reader.
    ///
    /// Reads and validates the magic, then the version (only version 1 is
    /// supported), then the seven configuration fields.
    pub fn parse(reader: &mut impl Read) -> Result<TllmHeader> {
        let magic = read_u32(reader)?;
        if magic != TLLM_MAGIC {
            return Err(ModelError::InvalidMagic(magic));
        }

        let version = read_u32(reader)?;
        if version != TLLM_VERSION {
            return Err(ModelError::UnsupportedVersion(version));
        }

        let model_dim = read_i32(reader)?;
        let num_layers = read_i32(reader)?;
        let num_heads = read_i32(reader)?;
        let ffn_hidden_dim = read_i32(reader)?;
        let max_sequence_length = read_i32(reader)?;
        let vocab_size = read_i32(reader)?;

        let mut buf4 = [0u8; 4];
        reader.read_exact(&mut buf4)?;
        let dropout_rate = f32::from_ne_bytes(buf4);

        Ok(TllmHeader {
            version,
            model_dim,
            num_layers,
            num_heads,
            ffn_hidden_dim,
            max_sequence_length,
            vocab_size,
            dropout_rate,
        })
    }

    /// Write magic, version and configuration fields.
    pub fn write(&self, writer: &mut impl Write) -> Result<()> {
        writer.write_all(&TLLM_MAGIC.to_ne_bytes())?;
        writer.write_all(&self.version.to_ne_bytes())?;
        for v in [
            self.model_dim,
            self.num_layers,
            self.num_heads,
            self.ffn_hidden_dim,
            self.max_sequence_length,
            self.vocab_size,
        ] {
            writer.write_all(&v.to_ne_bytes())?;
        }
        writer.write_all(&self.dropout_rate.to_ne_bytes())?;
        Ok(())
    }

    /// Compare every configuration field against `config`.
    ///
    /// # Errors
    /// Returns `ConfigMismatch` naming the first field that differs.
    pub fn check(&self, config: &ModelConfig) -> Result<()> {
        let fields = [
            ("model_dim", config.model_dim, self.model_dim),
            ("num_layers", config.num_layers, self.num_layers),
            ("num_heads", config.num_heads, self.num_heads),
            ("ffn_hidden_dim", config.ffn_hidden_dim, self.ffn_hidden_dim),
            (
                "max_sequence_length",
                config.max_sequence_length,
                self.max_sequence_length,
            ),
            ("vocab_size", config.vocab_size, self.vocab_size),
        ];
        for (field, expected, actual) in fields {
            if i64::try_from(expected).ok() != Some(i64::from(actual)) {
                return Err(ModelError::ConfigMismatch {
                    field,
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }
        if self.dropout_rate.to_bits() != config.dropout_rate.to_bits() {
            return Err(ModelError::ConfigMismatch {
                field: "dropout_rate",
                expected: config.dropout_rate.to_string(),
                actual: self.dropout_rate.to_string(),
            });
        }
        Ok(())
    }
}
