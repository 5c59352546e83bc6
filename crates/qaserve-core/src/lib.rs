//! # qaserve-core
//!
//! Model lifecycle, generation and answer extraction for qaserve.
//!
//! A Gemma base model is loaded once with a LoRA adapter merged into its
//! weights ([`GemmaModel`]). [`ModelLifecycle`] tracks readiness and owns the
//! loaded model; [`AnswerEngine`] turns a [`GenerationConfig`] into an
//! [`AnswerResult`] using the `질문:`/`답변:` prompt template.
//!
//! ## Feature Flags
//!
//! | Flag | Effect |
//! |---|---|
//! | `cuda` | Enable CUDA GPU acceleration |
//! | `metal` | Enable Apple Metal GPU acceleration |

pub mod adapter;
pub mod answer;
pub mod device;
pub mod engine;
pub mod error;
pub mod gemma;
pub mod generation;
pub mod lifecycle;
pub mod model;
pub mod sampling;
pub mod tokenizer;

pub use answer::{build_prompt, extract_answer};
pub use device::{device_label, select_device};
pub use engine::{AnswerEngine, AnswerResult, EngineOptions, RawGeneration};
pub use error::{CoreError, CoreResult, GenerationError};
pub use gemma::GemmaModel;
pub use generation::{GenerationConfig, RepetitionGuard};
pub use lifecycle::{load_model_blocking, HealthStatus, ModelLifecycle, ModelState, SharedModel};
pub use model::{GenerateInput, Model, ModelConfig, SamplingParams};
pub use tokenizer::Tokenizer;
