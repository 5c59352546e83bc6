//! Per-request generation parameters.

use crate::error::GenerationError;
use crate::model::SamplingParams;

pub const DEFAULT_MAX_TOKENS: usize = 120;
pub const DEFAULT_TEMPERATURE: f64 = 0.3;
pub const DEFAULT_TOP_K: usize = 40;
pub const DEFAULT_TOP_P: f64 = 0.8;
pub const DEFAULT_REPETITION_PENALTY: f64 = 1.8;
pub const DEFAULT_NO_REPEAT_NGRAM_SIZE: usize = 4;

/// A fully-defaulted question-answering request.
///
/// Built once per request and never shared across requests.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub question: String,
    pub max_tokens: usize,
    pub temperature: f64,
    pub top_k: usize,
    pub top_p: f64,
    pub repetition_penalty: f64,
}

/// Server-side repetition policy shared by every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepetitionGuard {
    pub no_repeat_ngram_size: usize,
}

impl Default for RepetitionGuard {
    fn default() -> Self {
        Self { no_repeat_ngram_size: DEFAULT_NO_REPEAT_NGRAM_SIZE }
    }
}

impl GenerationConfig {
    /// A config for `question` with every other field at its default.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            top_k: DEFAULT_TOP_K,
            top_p: DEFAULT_TOP_P,
            repetition_penalty: DEFAULT_REPETITION_PENALTY,
        }
    }

    /// Reject values the sampler cannot handle before the model is touched.
    pub fn validate(&self) -> Result<(), GenerationError> {
        fn invalid(field: &'static str, reason: &str) -> Result<(), GenerationError> {
            Err(GenerationError::InvalidParameter { field, reason: reason.to_string() })
        }

        if self.question.trim().is_empty() {
            return invalid("question", "must not be empty");
        }
        if self.max_tokens == 0 {
            return invalid("max_tokens", "must be a positive integer");
        }
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return invalid("temperature", "must be a positive number");
        }
        if self.top_k == 0 {
            return invalid("top_k", "must be a positive integer");
        }
        if !self.top_p.is_finite() || self.top_p <= 0.0 || self.top_p > 1.0 {
            return invalid("top_p", "must be in (0, 1]");
        }
        if !self.repetition_penalty.is_finite() || self.repetition_penalty < 1.0 {
            return invalid("repetition_penalty", "must be at least 1.0");
        }
        Ok(())
    }

    /// Sampling parameters for the runtime. EOS/PAD ids are filled in by the
    /// caller that holds the tokenizer.
    pub fn sampling_params(&self, guard: RepetitionGuard) -> SamplingParams {
        SamplingParams {
            max_new_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            repetition_penalty: self.repetition_penalty,
            no_repeat_ngram_size: guard.no_repeat_ngram_size,
            eos_token_id: None,
            pad_token_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: GenerationError) -> &'static str {
        match err {
            GenerationError::InvalidParameter { field, .. } => field,
            other => panic!("expected InvalidParameter, got {other:?}"),
        }
    }

    #[test]
    fn test_new_takes_defaults() {
        let cfg = GenerationConfig::new("오답노트는 어떻게 정리할까요?");
        assert_eq!(cfg.question, "오답노트는 어떻게 정리할까요?");
        assert_eq!(cfg.max_tokens, 120);
        assert!((cfg.temperature - 0.3).abs() < f64::EPSILON);
        assert_eq!(cfg.top_k, 40);
        assert!((cfg.top_p - 0.8).abs() < f64::EPSILON);
        assert!((cfg.repetition_penalty - 1.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(GenerationConfig::new("q").validate().is_ok());
    }

    #[test]
    fn test_rejects_blank_question() {
        assert_eq!(field_of(GenerationConfig::new("   ").validate().unwrap_err()), "question");
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let base = GenerationConfig::new("q");
        let cases = [
            (GenerationConfig { max_tokens: 0, ..base.clone() }, "max_tokens"),
            (GenerationConfig { temperature: 0.0, ..base.clone() }, "temperature"),
            (GenerationConfig { temperature: f64::NAN, ..base.clone() }, "temperature"),
            (GenerationConfig { top_k: 0, ..base.clone() }, "top_k"),
            (GenerationConfig { top_p: 0.0, ..base.clone() }, "top_p"),
            (GenerationConfig { top_p: 1.5, ..base.clone() }, "top_p"),
            (GenerationConfig { repetition_penalty: 0.9, ..base.clone() }, "repetition_penalty"),
        ];
        for (cfg, field) in cases {
            assert_eq!(field_of(cfg.validate().unwrap_err()), field);
        }
    }

    #[test]
    fn test_top_p_one_is_accepted() {
        let cfg = GenerationConfig { top_p: 1.0, ..GenerationConfig::new("q") };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_sampling_params_carry_request_and_guard() {
        let cfg = GenerationConfig { max_tokens: 64, ..GenerationConfig::new("q") };
        let p = cfg.sampling_params(RepetitionGuard { no_repeat_ngram_size: 3 });
        assert_eq!(p.max_new_tokens, 64);
        assert_eq!(p.top_k, 40);
        assert_eq!(p.no_repeat_ngram_size, 3);
        assert!(p.eos_token_id.is_none());
    }
}
