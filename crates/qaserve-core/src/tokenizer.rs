use std::path::Path;

use tokenizers::Tokenizer as HfTokenizer;
use tracing::debug;

use crate::error::{CoreError, CoreResult};

const EOS_CANDIDATES: &[&str] = &["<eos>", "</s>", "<|endoftext|>"];
const BOS_CANDIDATES: &[&str] = &["<bos>", "<s>", "<|startoftext|>"];
const PAD_CANDIDATES: &[&str] = &["<pad>", "<|pad|>", "[PAD]"];

/// Thin wrapper around the Hugging Face `tokenizers` crate.
#[derive(Debug)]
pub struct Tokenizer {
    inner: HfTokenizer,
    eos_token_id: Option<u32>,
    bos_token_id: Option<u32>,
    pad_token_id: Option<u32>,
}

impl Tokenizer {
    /// Load a tokenizer from a `tokenizer.json` file.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let inner = HfTokenizer::from_file(path)
            .map_err(|e| CoreError::Tokenizer(format!("{}: {e}", path.display())))?;
        Ok(Self::from_hf(inner))
    }

    /// Wrap an already-built HF tokenizer, probing its vocabulary for the
    /// special tokens generation depends on.
    pub fn from_hf(inner: HfTokenizer) -> Self {
        let eos_token_id = Self::special_token_id(&inner, EOS_CANDIDATES);
        let bos_token_id = Self::special_token_id(&inner, BOS_CANDIDATES);
        // Models without a dedicated pad token pad with EOS.
        let pad_token_id = Self::special_token_id(&inner, PAD_CANDIDATES).or(eos_token_id);

        debug!(
            eos_token_id,
            bos_token_id,
            pad_token_id,
            vocab_size = inner.get_vocab_size(true),
            "Tokenizer loaded"
        );

        Self { inner, eos_token_id, bos_token_id, pad_token_id }
    }

    /// Encode a text string to a sequence of token ids.
    pub fn encode(&self, text: &str, add_special_tokens: bool) -> CoreResult<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, add_special_tokens)
            .map_err(|e| CoreError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Decode a sequence of token ids back to a string.
    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> CoreResult<String> {
        self.inner
            .decode(ids, skip_special_tokens)
            .map_err(|e| CoreError::Tokenizer(e.to_string()))
    }

    /// The end-of-sequence token id, if known.
    pub fn eos_token_id(&self) -> Option<u32> {
        self.eos_token_id
    }

    /// The beginning-of-sequence token id, if known.
    pub fn bos_token_id(&self) -> Option<u32> {
        self.bos_token_id
    }

    /// The padding token id; falls back to EOS when the vocabulary has none.
    pub fn pad_token_id(&self) -> Option<u32> {
        self.pad_token_id
    }

    /// Look up the token id for an exact token string (e.g. `"<eos>"`).
    pub fn token_id(&self, text: &str) -> Option<u32> {
        self.inner.get_vocab(true).get(text).copied()
    }

    fn special_token_id(tokenizer: &HfTokenizer, candidates: &[&str]) -> Option<u32> {
        let vocab = tokenizer.get_vocab(true);
        candidates.iter().find_map(|c| vocab.get(*c).copied())
    }
}
