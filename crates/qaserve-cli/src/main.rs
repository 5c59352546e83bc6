use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;

use commands::ModelOverrides;
use config::load_config;

/// qaserve: question answering over a LoRA fine-tuned Gemma model
#[derive(Debug, Parser)]
#[command(name = "qaserve", version, about, long_about = None, arg_required_else_help = true)]
struct Cli {
    /// Path to a custom configuration file (TOML).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log output format.
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = LogFormat::Pretty,
        value_name = "FORMAT"
    )]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load the model and start the HTTP server.
    Serve {
        /// Address to bind to (default from config: 0.0.0.0).
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (default from config: 7860).
        #[arg(long, short = 'p')]
        port: Option<u16>,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Load the model locally and answer a single question.
    Ask {
        /// The question to answer.
        #[arg(long, short = 'q')]
        question: String,

        /// Maximum number of new tokens (default 120).
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Sampling temperature (default 0.3).
        #[arg(long)]
        temperature: Option<f64>,

        /// Also print the full decoded output.
        #[arg(long)]
        full: bool,

        #[command(flatten)]
        model: ModelArgs,
    },
}

#[derive(Debug, clap::Args)]
struct ModelArgs {
    /// Directory with the PEFT adapter (adapter_config.json + adapter_model.safetensors).
    #[arg(long, value_name = "DIR")]
    adapter: Option<PathBuf>,

    /// Hugging Face repo id of the base model.
    #[arg(long, value_name = "REPO")]
    base_model: Option<String>,

    /// Prefer GPU acceleration (CUDA/Metal).
    #[arg(long)]
    gpu: bool,
}

impl From<ModelArgs> for ModelOverrides {
    fn from(args: ModelArgs) -> Self {
        Self { base_model: args.base_model, adapter: args.adapter, gpu: args.gpu }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_format);

    let cfg = load_config(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Serve { host, port, model } => {
            commands::serve::run(host.as_deref(), port, &model.into(), &cfg).await?;
        }
        Commands::Ask { question, max_tokens, temperature, full, model } => {
            commands::ask::run(&question, max_tokens, temperature, full, &model.into(), &cfg)
                .await?;
        }
    }

    Ok(())
}

fn init_tracing(log_format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_flags_parse() {
        let cli = Cli::parse_from([
            "qaserve",
            "--log-format",
            "json",
            "serve",
            "--port",
            "8080",
            "--adapter",
            "/srv/lora",
            "--gpu",
        ]);
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::Serve { host, port, model } => {
                assert!(host.is_none());
                assert_eq!(port, Some(8080));
                assert_eq!(model.adapter, Some(PathBuf::from("/srv/lora")));
                assert!(model.gpu);
            }
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn test_ask_requires_question() {
        assert!(Cli::try_parse_from(["qaserve", "ask"]).is_err());
        let cli = Cli::try_parse_from(["qaserve", "ask", "-q", "오답노트는?"]).unwrap();
        assert!(matches!(cli.command, Commands::Ask { .. }));
    }
}
