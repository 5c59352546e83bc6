use std::sync::Arc;

use axum::{Extension, Json};
use tracing::{info, instrument, warn};

use qaserve_core::{AnswerEngine, GenerationConfig};

use crate::{
    error::ApiResult,
    types::{AnswerResponse, PredictRequest},
};

/// `POST /predict`: answer one question.
#[instrument(
    skip_all,
    fields(question_chars = req.question.chars().count(), max_tokens = ?req.max_tokens)
)]
pub async fn predict(
    Extension(engine): Extension<Arc<AnswerEngine>>,
    Json(req): Json<PredictRequest>,
) -> ApiResult<Json<AnswerResponse>> {
    let config = GenerationConfig::from(req);
    let result = engine.answer(&config).await.map_err(|e| {
        warn!(error = %e, "Prediction failed");
        e
    })?;
    info!(answer_chars = result.answer.chars().count(), "Prediction served");
    Ok(Json(result.into()))
}
