use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{ModelError, Result};

pub const UNK_TOKEN: &str = "<unk>";
pub const PAD_TOKEN: &str = "<pad>";
pub const BOS_TOKEN: &str = "<bos>";
pub const EOS_TOKEN: &str = "<eos>";

/// How far past the current end an explicit id may jump.
pub const MAX_ID_GAP: usize = 1 << 20;

/// Bidirectional token <-> id mapping.
///
/// The four special tokens are always present. A fresh vocabulary holds only
/// them, at ids 0 (`<unk>`), 1 (`<pad>`), 2 (`<bos>`) and 3 (`<eos>`).
#[derive(Debug, Clone)]
pub struct Vocab {
    /// Token strings, indexed by token ID. Ids skipped by an explicit-id
    /// vocabulary file hold an empty string.
    tokens: Vec<String>,
    /// Reverse mapping from token string to token ID.
    token_to_id: HashMap<String, u32>,
    unk_id: u32,
    pad_id: u32,
    bos_id: u32,
    eos_id: u32,
}

impl Default for Vocab {
    fn default() -> Self {
        Self::new()
    }
}

impl Vocab {
    /// Vocabulary holding only the special tokens.
    pub fn new() -> Self {
        let mut vocab = Vocab {
            tokens: Vec::new(),
            token_to_id: HashMap::new(),
            unk_id: 0,
            pad_id: 0,
            bos_id: 0,
            eos_id: 0,
        };
        vocab.unk_id = vocab.add_token(UNK_TOKEN);
        vocab.pad_id = vocab.add_token(PAD_TOKEN);
        vocab.bos_id = vocab.add_token(BOS_TOKEN);
        vocab.eos_id = vocab.add_token(EOS_TOKEN);
        vocab
    }

    /// Load tokens from a text file, one per line.
    ///
    /// A line is either `token id` (explicit id) or `token` (next free id).
    /// Blank lines are skipped. The special tokens keep their current ids
    /// unless the file assigns them new ones.
    ///
    /// # Errors
    /// A `Tokenizer` error naming the line if an explicit id exceeds
    /// `i32::MAX` or lies more than [`MAX_ID_GAP`] past the tokens read so far.
    /// The vocabulary is unchanged on error.
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ModelError::file(path, e))?;

        let mut vocab = self.specials_only();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| ModelError::file(path, e))?;
            vocab.parse_line(&line).map_err(|e| {
                ModelError::file(path, ModelError::Tokenizer(format!("line {}: {e}", i + 1)))
            })?;
        }
        vocab.unk_id = vocab.resolve(UNK_TOKEN, self.unk_id);
        vocab.pad_id = vocab.resolve(PAD_TOKEN, self.pad_id);
        vocab.bos_id = vocab.resolve(BOS_TOKEN, self.bos_id);
        vocab.eos_id = vocab.resolve(EOS_TOKEN, self.eos_id);

        *self = vocab;
        Ok(())
    }

    /// A copy of this vocabulary reduced to the special tokens at their
    /// current ids.
    fn specials_only(&self) -> Vocab {
        let specials = [
            (UNK_TOKEN, self.unk_id),
            (PAD_TOKEN, self.pad_id),
            (BOS_TOKEN, self.bos_id),
            (EOS_TOKEN, self.eos_id),
        ];
        let mut vocab = Vocab {
            tokens: Vec::new(),
            token_to_id: HashMap::new(),
            unk_id: self.unk_id,
            pad_id: self.pad_id,
            bos_id: self.bos_id,
            eos_id: self.eos_id,
        };
        for (token, id) in specials {
            vocab.insert_at(token, id);
        }
        vocab
    }

    fn parse_line(&mut self, line: &str) -> std::result::Result<(), String> {
        let mut parts = line.split_whitespace();
        let Some(token) = parts.next() else {
            return Ok(());
        };
        match parts.next().map(str::parse::<i64>) {
            Some(Ok(id)) if id >= 0 => {
                let limit = (self.tokens.len() + MAX_ID_GAP).min(i32::MAX as usize);
                if id as u64 > limit as u64 {
                    return Err(format!("token {token:?} has id {id}, limit is {limit}"));
                }
                self.insert_at(token, id as u32);
            }
            _ => {
                self.add_token(token);
            }
        }
        Ok(())
    }

    fn insert_at(&mut self, token: &str, id: u32) {
        let idx = id as usize;
        if idx >= self.tokens.len() {
            self.tokens.resize(idx + 1, String::new());
        }
        self.tokens[idx] = token.to_string();
        self.token_to_id.insert(token.to_string(), id);
    }

    fn resolve(&self, token: &str, fallback: u32) -> u32 {
        self.token_to_id.get(token).copied().unwrap_or(fallback)
    }

    /// Add `token` if absent and return its id.
    pub fn add_token(&mut self, token: &str) -> u32 {
        if let Some(&id) = self.token_to_id.get(token) {
            return id;
        }
        let id = self.tokens.len() as u32;
        self.tokens.push(token.to_string());
        self.token_to_id.insert(token.to_string(), id);
        id
    }

    /// Id of `token`, or the unknown id.
    pub fn token_id(&self, token: &str) -> u32 {
        self.token_to_id.get(token).copied().unwrap_or(self.unk_id)
    }

    /// String for `id`, or the unknown token's string when out of range.
    pub fn token(&self, id: u32) -> &str {
        self.tokens
            .get(id as usize)
            .or_else(|| self.tokens.get(self.unk_id as usize))
            .map(String::as_str)
            .unwrap_or(UNK_TOKEN)
    }

    /// Number of tokens in the vocabulary.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true if the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn unk_id(&self) -> u32 {
        self.unk_id
    }

    pub fn pad_id(&self) -> u32 {
        self.pad_id
    }

    pub fn bos_id(&self) -> u32 {
        self.bos_id
    }

    pub fn eos_id(&self) -> u32 {
        self.eos_id
    }
}
