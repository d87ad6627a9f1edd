use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::vocab::Vocab;
use super::Tokenizer;
use crate::error::{ModelError, Result};

/// Byte-Pair Encoding tokenizer loaded from a vocabulary file and a merges file.
#[derive(Debug, Clone, Default)]
pub struct BpeTokenizer {
    vocab: Vocab,
    /// Map from merge pair to priority rank (lower rank = higher priority).
    merge_ranks: HashMap<(String, String), usize>,
    loaded: bool,
}

impl BpeTokenizer {
    /// A tokenizer with only the special tokens and no merges.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the vocabulary. See [`Vocab::load_from_file`] for the format.
    pub fn load_vocab(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.vocab.load_from_file(path)?;
        self.loaded = true;
        Ok(())
    }

    /// Load merge rules, replacing any previous ones.
    ///
    /// Each non-blank line is `left right`; its rank is its position among
    /// the rule lines. A first line containing `#version` is a header and is
    /// skipped, as is any line with fewer than two fields.
    pub fn load_merges(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ModelError::file(path, e))?;

        let mut merge_ranks = HashMap::new();
        let mut rank = 0usize;
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| ModelError::file(path, e))?;
            if i == 0 && line.contains("#version") {
                continue;
            }
            let mut parts = line.split_whitespace();
            if let (Some(left), Some(right)) = (parts.next(), parts.next()) {
                merge_ranks.insert((left.to_string(), right.to_string()), rank);
                rank += 1;
            }
        }

        self.merge_ranks = merge_ranks;
        Ok(())
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    /// Number of loaded merge rules.
    pub fn num_merges(&self) -> usize {
        self.merge_ranks.len()
    }

    /// ASCII-lowercase and turn tabs, newlines and carriage returns into spaces.
    fn preprocess(text: &str) -> String {
        text.chars()
            .map(|c| match c {
                '\t' | '\n' | '\r' => ' ',
                c => c.to_ascii_lowercase(),
            })
            .collect()
    }

    /// Split on whitespace, emitting every whitespace character as its own
    /// `" "` word.
    fn split_words(text: &str) -> Vec<String> {
        let mut words = Vec::new();
        let mut current = String::new();
        for c in text.chars() {
            if c.is_whitespace() {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
                words.push(" ".to_string());
            } else {
                current.push(c);
            }
        }
        if !current.is_empty() {
            words.push(current);
        }
        words
    }

    /// Apply BPE merges to a single word.
    ///
    /// Starts from individual characters and repeatedly merges every
    /// occurrence (left to right) of the lowest-rank adjacent pair until no
    /// adjacent pair has a rule.
    pub fn bpe_word(&self, word: &str) -> Vec<String> {
        let mut symbols: Vec<String> = word.chars().map(String::from).collect();

        loop {
            if symbols.len() < 2 {
                break;
            }

            let mut best: Option<(usize, usize)> = None;
            for (i, pair) in symbols.windows(2).enumerate() {
                let key = (pair[0].clone(), pair[1].clone());
                if let Some(&rank) = self.merge_ranks.get(&key) {
                    if best.map_or(true, |(best_rank, _)| rank < best_rank) {
                        best = Some((rank, i));
                    }
                }
            }
            let Some((_, idx)) = best else {
                break;
            };

            let left = symbols[idx].clone();
            let right = symbols[idx + 1].clone();
            let mut merged = Vec::with_capacity(symbols.len());
            let mut i = 0;
            while i < symbols.len() {
                if i + 1 < symbols.len() && symbols[i] == left && symbols[i + 1] == right {
                    merged.push(format!("{left}{right}"));
                    i += 2;
                } else {
                    merged.push(std::mem::take(&mut symbols[i]));
                    i += 1;
                }
            }
            symbols = merged;
        }

        symbols
    }

    fn subwords(&self, text: &str) -> Vec<String> {
        Self::split_words(&Self::preprocess(text))
            .iter()
            .flat_map(|word| self.bpe_word(word))
            .collect()
    }
}

impl Tokenizer for BpeTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        Ok(self
            .subwords(text)
            .iter()
            .map(|s| self.vocab.token_id(s))
            .collect())
    }

    fn encode_to_strings(&self, text: &str) -> Result<Vec<String>> {
        Ok(self.subwords(text))
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        Ok(ids.iter().map(|&id| self.vocab.token(id)).collect())
    }

    fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    fn unk_id(&self) -> u32 {
        self.vocab.unk_id()
    }

    fn pad_id(&self) -> u32 {
        self.vocab.pad_id()
    }

    fn bos_id(&self) -> u32 {
        self.vocab.bos_id()
    }

    fn eos_id(&self) -> u32 {
        self.vocab.eos_id()
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }
}
