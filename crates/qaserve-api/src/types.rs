use serde::{Deserialize, Serialize};

use qaserve_core::{AnswerResult, GenerationConfig, HealthStatus};

// ─── Request types ────────────────────────────────────────────────────────────

/// Body of `POST /predict`. Omitted or `null` parameters take their defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictRequest {
    pub question: String,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f64>,
    pub top_k: Option<usize>,
    pub top_p: Option<f64>,
    pub repetition_penalty: Option<f64>,
}

impl From<PredictRequest> for GenerationConfig {
    fn from(req: PredictRequest) -> Self {
        let defaults = GenerationConfig::new(req.question);
        GenerationConfig {
            max_tokens: req.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: req.temperature.unwrap_or(defaults.temperature),
            top_k: req.top_k.unwrap_or(defaults.top_k),
            top_p: req.top_p.unwrap_or(defaults.top_p),
            repetition_penalty: req.repetition_penalty.unwrap_or(defaults.repetition_penalty),
            ..defaults
        }
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub question: String,
    pub answer: String,
    pub full_output: String,
    pub model_path: String,
    pub device: String,
}

impl From<AnswerResult> for AnswerResponse {
    fn from(r: AnswerResult) -> Self {
        Self {
            question: r.question,
            answer: r.answer,
            full_output: r.full_output,
            model_path: r.model_path,
            device: r.device,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub device: String,
}

impl From<HealthStatus> for HealthResponse {
    fn from(h: HealthStatus) -> Self {
        Self { status: h.status.to_string(), model_loaded: h.model_loaded, device: h.device }
    }
}

// ── Service description ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub message: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub endpoints: Endpoints,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize)]
pub struct Endpoints {
    pub health: &'static str,
    pub predict: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Usage {
    pub example: UsageExample,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageExample {
    pub method: &'static str,
    pub url: &'static str,
    pub body: ExampleBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExampleBody {
    pub question: &'static str,
}

impl ServiceInfo {
    pub fn current() -> Self {
        Self {
            message: "Gemma 파인튜닝 모델 API 서버",
            version: env!("CARGO_PKG_VERSION"),
            description: "수험생 Q&A 답변 모델",
            endpoints: Endpoints {
                health: "GET /health - 서버 상태 확인",
                predict: "POST /predict - 질문에 답변",
            },
            usage: Usage {
                example: UsageExample {
                    method: "POST",
                    url: "/predict",
                    body: ExampleBody { question: "오답노트는 어떻게 정리할까요?" },
                },
            },
        }
    }
}
