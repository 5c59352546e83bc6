pub mod ask;
pub mod serve;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use qaserve_core::{
    device_label, load_model_blocking, select_device, CoreError, EngineOptions, GemmaModel,
    ModelConfig, ModelLifecycle, RepetitionGuard,
};
use qaserve_hub::BaseModelFetcher;

use crate::config::{expand_cache_dir, hf_token, AppConfig};

/// Command-line overrides for where the model comes from.
#[derive(Debug, Clone, Default)]
pub struct ModelOverrides {
    pub base_model: Option<String>,
    pub adapter: Option<PathBuf>,
    pub gpu: bool,
}

/// Fetch the base model, merge the adapter and return a `Ready` lifecycle.
///
/// Any failure aborts: there is no degraded mode without a model.
pub async fn load_lifecycle(
    overrides: &ModelOverrides,
    config: &AppConfig,
) -> anyhow::Result<Arc<ModelLifecycle>> {
    let base_model_id = overrides
        .base_model
        .clone()
        .unwrap_or_else(|| config.model.base_model_id.clone());
    let adapter_dir = overrides
        .adapter
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.model.adapter_path));
    let revision = config.model.revision.clone();
    let cache_dir = expand_cache_dir(&config.model.cache_dir);

    let device = select_device(
        overrides.gpu || config.device.prefer_gpu,
        config.device.cuda_device_id,
    )?;
    let lifecycle = Arc::new(ModelLifecycle::new(
        adapter_dir.display().to_string(),
        device_label(&device),
    ));

    info!(
        base_model_id = %base_model_id,
        adapter_dir = %adapter_dir.display(),
        cache_dir = %cache_dir.display(),
        "Preparing model"
    );

    let max_sequence_length = config.inference.max_sequence_length;
    let loader = async move {
        let fetcher = BaseModelFetcher::new(cache_dir, hf_token())
            .map_err(|e| CoreError::Source(e.to_string()))?;
        let files = fetcher
            .fetch(&base_model_id, &revision)
            .await
            .map_err(|e| CoreError::Source(e.to_string()))?;
        let model_config = ModelConfig {
            base_model_id,
            config_path: files.config,
            tokenizer_path: files.tokenizer,
            weight_paths: files.weights,
            adapter_dir,
            max_sequence_length,
        };
        load_model_blocking::<GemmaModel>(model_config, device).await
    };

    lifecycle.load(loader).await.context("Failed to load model")?;
    Ok(lifecycle)
}

pub fn engine_options(config: &AppConfig) -> EngineOptions {
    EngineOptions {
        queue_requests: config.inference.queue_requests,
        repetition: RepetitionGuard {
            no_repeat_ngram_size: config.inference.no_repeat_ngram_size,
        },
    }
}
