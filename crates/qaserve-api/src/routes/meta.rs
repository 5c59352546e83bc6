use std::sync::Arc;

use axum::{Extension, Json};

use qaserve_core::AnswerEngine;

use crate::types::{HealthResponse, ServiceInfo};

/// `GET /`: service description.
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::current())
}

/// `GET /health`: readiness probe. Always 200.
pub async fn health(Extension(engine): Extension<Arc<AnswerEngine>>) -> Json<HealthResponse> {
    Json(engine.lifecycle().health().into())
}
