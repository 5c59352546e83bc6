use std::time::Instant;

use qaserve_core::{AnswerEngine, GenerationConfig};

use super::{engine_options, load_lifecycle, ModelOverrides};
use crate::config::AppConfig;

/// Load the model locally and answer one question on stdout.
pub async fn run(
    question: &str,
    max_tokens: Option<usize>,
    temperature: Option<f64>,
    show_full: bool,
    overrides: &ModelOverrides,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let load_start = Instant::now();
    let lifecycle = load_lifecycle(overrides, config).await?;
    let load_elapsed = load_start.elapsed();
    let engine = AnswerEngine::new(lifecycle, engine_options(config));

    let defaults = GenerationConfig::new(question);
    let request = GenerationConfig {
        max_tokens: max_tokens.unwrap_or(defaults.max_tokens),
        temperature: temperature.unwrap_or(defaults.temperature),
        ..defaults
    };

    let gen_start = Instant::now();
    let result = engine.answer(&request).await?;
    let gen_elapsed = gen_start.elapsed();

    println!("질문: {}", result.question);
    println!("답변: {}", result.answer);
    if show_full {
        println!("\n--- full output ---\n{}", result.full_output);
    }
    eprintln!(
        "\n[load {:.1}s | generate {:.1}s | device {}]",
        load_elapsed.as_secs_f64(),
        gen_elapsed.as_secs_f64(),
        result.device
    );
    Ok(())
}
