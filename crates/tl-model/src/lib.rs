//! `tl-model` - A tiny decoder-only transformer language model.
//!
//! This crate provides:
//! - `ModelConfig` and the `TinyLlamaModel` orchestrator (attention, FFN,
//!   pre-norm transformer blocks, greedy generation)
//! - The TLLM binary weight codec
//! - A file-backed BPE tokenizer
//! - `TinyLlama`, a validating facade over the model and tokenizer

pub mod architecture;
pub mod error;
pub mod facade;
pub mod generation;
pub mod llama;
pub mod tllm;
pub mod tokenizer;

pub use architecture::ModelArchitecture;
pub use error::{ErrorKind, ModelError, Result};
pub use facade::TinyLlama;
pub use generation::generate_tokens;
pub use llama::{ModelConfig, TinyLlamaModel};
pub use tokenizer::{BpeTokenizer, Tokenizer};
