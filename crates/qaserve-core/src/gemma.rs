use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::gemma::{Config as GemmaConfig, Model as CandleGemma};
use tracing::{debug, info};

use crate::{
    adapter::LoraAdapter,
    error::{CoreError, CoreResult},
    model::{GenerateInput, Model, ModelConfig, SamplingParams},
    sampling::{sample_token, SampleRng},
    tokenizer::Tokenizer,
};

/// Gemma base model with a LoRA adapter merged into its weights.
///
/// Weights run in F32 on every device.
pub struct GemmaModel {
    inner: CandleGemma,
    tokenizer: Tokenizer,
    device: Device,
    max_sequence_length: usize,
}

impl std::fmt::Debug for GemmaModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GemmaModel")
            .field("device", &self.device)
            .field("max_sequence_length", &self.max_sequence_length)
            .finish()
    }
}

impl GemmaModel {
    /// Read every base shard into one CPU tensor map.
    fn load_base_tensors(paths: &[impl AsRef<Path>]) -> CoreResult<HashMap<String, Tensor>> {
        if paths.is_empty() {
            return Err(CoreError::Config {
                field: "weight_paths".to_string(),
                reason: "no safetensors weights given".to_string(),
            });
        }
        let mut tensors = HashMap::new();
        for path in paths {
            let shard = candle_core::safetensors::load(path.as_ref(), &Device::Cpu)?;
            debug!(shard = %path.as_ref().display(), tensors = shard.len(), "Loaded weight shard");
            tensors.extend(shard);
        }
        Ok(tensors)
    }

    fn read_config(path: &Path) -> CoreResult<GemmaConfig> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

impl Model for GemmaModel {
    fn load(config: &ModelConfig, device: &Device) -> CoreResult<Self> {
        info!(
            base_model_id = %config.base_model_id,
            adapter_dir = %config.adapter_dir.display(),
            "Loading Gemma base model"
        );

        let gemma_config = Self::read_config(&config.config_path)?;
        debug!(config = ?gemma_config, "Resolved Gemma config");

        let mut tensors = Self::load_base_tensors(&config.weight_paths)?;
        let adapter = LoraAdapter::load(&config.adapter_dir)?;
        let merged = adapter.merge_into(&mut tensors)?;
        info!(merged, "Applied LoRA adapter to base weights");

        let vb = VarBuilder::from_tensors(tensors, DType::F32, device);
        let inner = CandleGemma::new(false, &gemma_config, vb)?;

        let tokenizer = Tokenizer::from_file(&config.tokenizer_path)?;

        let max_sequence_length =
            config.max_sequence_length.min(gemma_config.max_position_embeddings);
        info!(max_sequence_length, "Model loaded successfully");

        Ok(Self {
            inner,
            tokenizer,
            device: device.clone(),
            max_sequence_length,
        })
    }

    fn encode(&self, text: &str) -> CoreResult<Vec<u32>> {
        self.tokenizer.encode(text, true)
    }

    fn decode(&self, ids: &[u32]) -> CoreResult<String> {
        self.tokenizer.decode(ids, true)
    }

    fn eos_token_id(&self) -> Option<u32> {
        self.tokenizer.eos_token_id()
    }

    fn pad_token_id(&self) -> Option<u32> {
        self.tokenizer.pad_token_id()
    }

    fn generate(&mut self, input: GenerateInput, params: SamplingParams) -> CoreResult<Vec<u32>> {
        let prompt_len = input.token_ids.len();
        if prompt_len == 0 {
            return Err(CoreError::Tokenizer("prompt encoded to zero tokens".to_string()));
        }
        check_sequence_budget(prompt_len, params.max_new_tokens, self.max_sequence_length)?;

        // Stale K/V from the previous request would corrupt attention.
        self.inner.clear_kv_cache();

        let mut rng = SampleRng::from_clock();
        let mut tokens = input.token_ids;
        let mut pos = 0;

        for step in 0..params.max_new_tokens {
            let context = if step == 0 { &tokens[..] } else { &tokens[tokens.len() - 1..] };
            let input_ids = Tensor::new(context, &self.device)?.unsqueeze(0)?;
            // Gemma returns logits for the last position only: (1, 1, vocab).
            let logits = self.inner.forward(&input_ids, pos)?.squeeze(0)?.squeeze(0)?;
            pos += context.len();

            let next_id = sample_token(&logits, &params, &tokens, &mut rng)?;
            tokens.push(next_id);

            if params.eos_token_id == Some(next_id) {
                break;
            }
        }

        debug!(
            prompt_tokens = prompt_len,
            generated = tokens.len() - prompt_len,
            "Generation finished"
        );
        Ok(tokens)
    }
}

/// Prompt plus requested new tokens must fit the context window.
///
/// A sum that overflows `usize` is reported as `usize::MAX`.
fn check_sequence_budget(prompt_len: usize, max_new_tokens: usize, max: usize) -> CoreResult<()> {
    let got = prompt_len.checked_add(max_new_tokens).unwrap_or(usize::MAX);
    if got > max {
        return Err(CoreError::SequenceTooLong { got, max });
    }
    Ok(())
}
