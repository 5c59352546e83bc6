use std::path::PathBuf;

use candle_core::Device;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

/// Parameters controlling a single sampled generation.
///
/// Sampling is always on: there is no greedy mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingParams {
    pub max_new_tokens: usize,
    pub temperature: f64,
    /// Nucleus threshold in (0, 1].
    pub top_p: f64,
    /// Limit sampling to the top K tokens (applied before top_p).
    pub top_k: usize,
    /// Penalty for tokens already in the sequence (1.0 = no penalty).
    pub repetition_penalty: f64,
    /// Ban any n-gram of this size from appearing twice. 0 disables the guard.
    pub no_repeat_ngram_size: usize,
    /// Generation stops once this id is sampled.
    pub eos_token_id: Option<u32>,
    pub pad_token_id: Option<u32>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 120,
            temperature: 0.3,
            top_p: 0.8,
            top_k: 40,
            repetition_penalty: 1.8,
            no_repeat_ngram_size: 4,
            eos_token_id: None,
            pad_token_id: None,
        }
    }
}

/// Input to the model for a single generation request.
#[derive(Debug, Clone)]
pub struct GenerateInput {
    /// Pre-tokenized prompt ids.
    pub token_ids: Vec<u32>,
}

/// Everything a runtime needs to bring a model into memory.
///
/// Paths point at files already present on disk; resolving them (Hub
/// download, cache lookup) happens before `Model::load` is called.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base model repo id (e.g. `google/gemma-2b`).
    pub base_model_id: String,
    /// Base model `config.json`.
    pub config_path: PathBuf,
    /// Base model `tokenizer.json`.
    pub tokenizer_path: PathBuf,
    /// One or more safetensors shards of the base weights.
    pub weight_paths: Vec<PathBuf>,
    /// Directory holding `adapter_config.json` and `adapter_model.safetensors`.
    pub adapter_dir: PathBuf,
    /// Maximum supported sequence length (prompt + generated).
    pub max_sequence_length: usize,
}

/// The model runtime seen by the service layer.
///
/// Implementations own their tokenizer. They must be `Send + Sync` so they
/// can be shared across async tasks behind an `Arc<Mutex<dyn Model>>`.
pub trait Model: Send + Sync {
    /// Load base weights, merge the adapter, and load the tokenizer.
    fn load(config: &ModelConfig, device: &Device) -> CoreResult<Self>
    where
        Self: Sized;

    /// Tokenize prompt text, adding the tokenizer's special prefix tokens.
    fn encode(&self, text: &str) -> CoreResult<Vec<u32>>;

    /// Decode token ids to text, skipping special control tokens.
    fn decode(&self, ids: &[u32]) -> CoreResult<String>;

    fn eos_token_id(&self) -> Option<u32>;

    fn pad_token_id(&self) -> Option<u32>;

    /// Run the full sampling loop on the calling thread.
    ///
    /// Returns the complete sequence: the prompt ids followed by every
    /// generated id (including a terminating EOS, if one was sampled).
    fn generate(&mut self, input: GenerateInput, params: SamplingParams) -> CoreResult<Vec<u32>>;
}
