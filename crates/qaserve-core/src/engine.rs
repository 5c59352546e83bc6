//! Generation invoker: prompt → runtime → decoded text → answer.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::answer::{build_prompt, extract_answer};
use crate::error::GenerationError;
use crate::generation::{GenerationConfig, RepetitionGuard};
use crate::lifecycle::{ModelLifecycle, SharedModel};
use crate::model::{GenerateInput, SamplingParams};

/// How the engine admits and shapes requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Wait for the model when busy instead of rejecting with `Busy`.
    pub queue_requests: bool,
    pub repetition: RepetitionGuard,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { queue_requests: true, repetition: RepetitionGuard::default() }
    }
}

/// The complete decoded sequence, prompt echo included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawGeneration {
    pub full_output: String,
}

/// Outcome of one answered question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerResult {
    pub question: String,
    pub answer: String,
    pub full_output: String,
    pub model_path: String,
    pub device: String,
}

/// Runs questions through the loaded model, one at a time.
pub struct AnswerEngine {
    lifecycle: Arc<ModelLifecycle>,
    gate: Arc<Semaphore>,
    options: EngineOptions,
}

impl std::fmt::Debug for AnswerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerEngine")
            .field("lifecycle", &self.lifecycle)
            .field("options", &self.options)
            .finish()
    }
}

impl AnswerEngine {
    pub fn new(lifecycle: Arc<ModelLifecycle>, options: EngineOptions) -> Self {
        Self { lifecycle, gate: Arc::new(Semaphore::new(1)), options }
    }

    pub fn lifecycle(&self) -> &ModelLifecycle {
        &self.lifecycle
    }

    /// Generate the raw decoded output for `config`.
    ///
    /// Order of checks: parameters, readiness, admission. The model is not
    /// touched unless all three pass.
    pub async fn generate(
        &self,
        config: &GenerationConfig,
    ) -> Result<RawGeneration, GenerationError> {
        config.validate()?;
        let model = self.lifecycle.model().ok_or(GenerationError::NotReady)?;
        let permit = self.admit().await?;

        let prompt = build_prompt(&config.question);
        let params = config.sampling_params(self.options.repetition);
        let started = Instant::now();

        let full_output = tokio::task::spawn_blocking(move || {
            // Released only when the model is done, even if the caller is gone.
            let _permit = permit;
            run_model(&model, &prompt, params)
        })
        .await
        .map_err(|e| GenerationError::Failed(format!("generation task panicked: {e}")))??;

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            output_chars = full_output.chars().count(),
            "Generation complete"
        );
        Ok(RawGeneration { full_output })
    }

    /// Generate and extract the answer.
    pub async fn answer(&self, config: &GenerationConfig) -> Result<AnswerResult, GenerationError> {
        let raw = self.generate(config).await?;
        let answer = extract_answer(&raw.full_output);
        debug!(answer_chars = answer.chars().count(), "Extracted answer");
        Ok(AnswerResult {
            question: config.question.clone(),
            answer,
            full_output: raw.full_output,
            model_path: self.lifecycle.model_id().to_string(),
            device: self.lifecycle.device().to_string(),
        })
    }

    async fn admit(&self) -> Result<OwnedSemaphorePermit, GenerationError> {
        if self.options.queue_requests {
            Arc::clone(&self.gate)
                .acquire_owned()
                .await
                .map_err(|_| GenerationError::Failed("admission gate closed".to_string()))
        } else {
            Arc::clone(&self.gate).try_acquire_owned().map_err(|_| {
                warn!("Rejecting request: model busy");
                GenerationError::Busy
            })
        }
    }
}

/// Encode, sample, decode. Runs on the blocking pool.
fn run_model(
    model: &SharedModel,
    prompt: &str,
    mut params: SamplingParams,
) -> Result<String, GenerationError> {
    let mut model = model.blocking_lock();
    params.eos_token_id = model.eos_token_id();
    params.pad_token_id = model.pad_token_id();

    let token_ids = model.encode(prompt)?;
    debug!(prompt_tokens = token_ids.len(), "Encoded prompt");
    let output = model.generate(GenerateInput { token_ids }, params)?;
    Ok(model.decode(&output)?)
}
