use std::sync::Arc;

use tracing::info;

use qaserve_api::{serve, ServerConfig};
use qaserve_core::AnswerEngine;

use super::{engine_options, load_lifecycle, ModelOverrides};
use crate::config::AppConfig;

/// Load the model, then start the HTTP server.
///
/// The listener is bound only after the model is ready.
pub async fn run(
    host: Option<&str>,
    port: Option<u16>,
    overrides: &ModelOverrides,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let lifecycle = load_lifecycle(overrides, config).await?;
    let engine = Arc::new(AnswerEngine::new(lifecycle, engine_options(config)));

    let server_config = ServerConfig {
        host: host.unwrap_or(&config.server.host).to_string(),
        port: port.unwrap_or(config.server.port),
    };

    info!(
        host = %server_config.host,
        port = server_config.port,
        queue_requests = config.inference.queue_requests,
        "Server starting"
    );

    serve(engine, server_config).await?;
    Ok(())
}
