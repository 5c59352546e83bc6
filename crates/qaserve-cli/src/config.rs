use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Full runtime configuration loaded from TOML + env vars.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelSourceConfig,
    pub inference: InferenceConfig,
    pub device: DeviceConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelSourceConfig {
    /// Hub repo id of the base model.
    pub base_model_id: String,
    pub revision: String,
    /// Local PEFT adapter directory; also reported to clients as `model_path`.
    pub adapter_path: String,
    pub cache_dir: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InferenceConfig {
    pub no_repeat_ngram_size: usize,
    /// Wait for the model when busy instead of answering 503.
    pub queue_requests: bool,
    pub max_sequence_length: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    pub prefer_gpu: bool,
    pub cuda_device_id: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig { host: "0.0.0.0".to_string(), port: 7860 },
            model: ModelSourceConfig {
                base_model_id: "google/gemma-2b".to_string(),
                revision: "main".to_string(),
                adapter_path: "./gemma2-finetuned".to_string(),
                cache_dir: "/tmp/hf_cache".to_string(),
            },
            inference: InferenceConfig {
                no_repeat_ngram_size: 4,
                queue_requests: true,
                max_sequence_length: 8192,
            },
            device: DeviceConfig { prefer_gpu: false, cuda_device_id: 0 },
        }
    }
}

/// Load configuration from:
/// 1. Built-in defaults
/// 2. `config/default.toml` (if present)
/// 3. A custom config file path (if provided)
/// 4. Environment variables prefixed with `QASERVE_`
/// 5. `HF_HOME`, which replaces `model.cache_dir`
pub fn load_config(config_file: Option<&PathBuf>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder()
        // Layer 1: defaults baked in
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 7860_i64)?
        .set_default("model.base_model_id", "google/gemma-2b")?
        .set_default("model.revision", "main")?
        .set_default("model.adapter_path", "./gemma2-finetuned")?
        .set_default("model.cache_dir", "/tmp/hf_cache")?
        .set_default("inference.no_repeat_ngram_size", 4_i64)?
        .set_default("inference.queue_requests", true)?
        .set_default("inference.max_sequence_length", 8192_i64)?
        .set_default("device.prefer_gpu", false)?
        .set_default("device.cuda_device_id", 0_i64)?
        // Layer 2: project default.toml
        .add_source(File::with_name("config/default").required(false));

    // Layer 3: optional user-supplied config file
    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    // Layer 4: environment variables (QASERVE_SERVER__PORT, QASERVE_MODEL__CACHE_DIR, ...)
    builder = builder.add_source(
        Environment::with_prefix("QASERVE")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let mut cfg: AppConfig = builder.build()?.try_deserialize()?;
    apply_hf_home(&mut cfg, std::env::var("HF_HOME").ok());
    Ok(cfg)
}

fn apply_hf_home(cfg: &mut AppConfig, hf_home: Option<String>) {
    if let Some(dir) = hf_home.filter(|d| !d.is_empty()) {
        cfg.model.cache_dir = dir;
    }
}

/// Hub credential from the environment. Never read from config files.
pub fn hf_token() -> Option<String> {
    pick_token(std::env::var("HF_TOKEN").ok(), std::env::var("HUGGING_FACE_HUB_TOKEN").ok())
}

fn pick_token(primary: Option<String>, fallback: Option<String>) -> Option<String> {
    primary
        .filter(|t| !t.is_empty())
        .or_else(|| fallback.filter(|t| !t.is_empty()))
}

/// Expand `~` in cache_dir to the actual home directory.
pub fn expand_cache_dir(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_default_server_address() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.port, 7860);
    }

    #[test]
    fn test_default_model_source() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.model.base_model_id, "google/gemma-2b");
        assert_eq!(cfg.model.revision, "main");
        assert_eq!(cfg.model.adapter_path, "./gemma2-finetuned");
        assert_eq!(cfg.model.cache_dir, "/tmp/hf_cache");
    }

    #[test]
    fn test_default_inference_and_device() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.inference.no_repeat_ngram_size, 4);
        assert!(cfg.inference.queue_requests);
        assert!(!cfg.device.prefer_gpu);
    }

    #[test]
    fn test_load_config_matches_default() {
        let from_load = load_config(None).unwrap();
        let default = AppConfig::default();
        assert_eq!(from_load.server.port, default.server.port);
        assert_eq!(from_load.model.base_model_id, default.model.base_model_id);
        assert_eq!(
            from_load.inference.no_repeat_ngram_size,
            default.inference.no_repeat_ngram_size
        );
    }

    // ── load_config from a custom file ────────────────────────────────────────

    #[test]
    fn test_custom_config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("custom.toml");
        std::fs::write(
            &file,
            "[server]\nport = 9999\nhost = \"127.0.0.1\"\n\n[inference]\nqueue_requests = false\n",
        )
        .unwrap();

        let cfg = load_config(Some(&file)).unwrap();
        assert_eq!(cfg.server.port, 9999);
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert!(!cfg.inference.queue_requests);
        assert_eq!(cfg.model.adapter_path, "./gemma2-finetuned");
    }

    #[test]
    fn test_missing_custom_config_file_is_error() {
        let missing = PathBuf::from("/definitely/not/here.toml");
        assert!(load_config(Some(&missing)).is_err());
    }

    // ── HF_HOME / token ───────────────────────────────────────────────────────

    #[test]
    fn test_hf_home_replaces_cache_dir() {
        let mut cfg = AppConfig::default();
        apply_hf_home(&mut cfg, Some("/data/hf".to_string()));
        assert_eq!(cfg.model.cache_dir, "/data/hf");
    }

    #[test]
    fn test_empty_hf_home_ignored() {
        let mut cfg = AppConfig::default();
        apply_hf_home(&mut cfg, Some(String::new()));
        assert_eq!(cfg.model.cache_dir, "/tmp/hf_cache");
    }

    #[test]
    fn test_token_prefers_hf_token() {
        assert_eq!(
            pick_token(Some("a".into()), Some("b".into())).as_deref(),
            Some("a")
        );
    }

    #[test]
    fn test_token_falls_back_when_empty_or_absent() {
        assert_eq!(pick_token(Some(String::new()), Some("b".into())).as_deref(), Some("b"));
        assert_eq!(pick_token(None, Some("b".into())).as_deref(), Some("b"));
        assert_eq!(pick_token(None, Some(String::new())), None);
        assert_eq!(pick_token(None, None), None);
    }

    // ── expand_cache_dir ──────────────────────────────────────────────────────

    #[test]
    fn test_expand_absolute_path_unchanged() {
        assert_eq!(expand_cache_dir("/tmp/hf_cache"), PathBuf::from("/tmp/hf_cache"));
    }

    #[test]
    fn test_expand_tilde_produces_non_tilde_prefix() {
        let path = expand_cache_dir("~/.cache/huggingface");
        let s = path.to_string_lossy();
        assert!(!s.starts_with('~'), "Expanded path must not start with '~', got: {s}");
        assert!(s.ends_with(".cache/huggingface"), "got: {s}");
    }

    #[test]
    fn test_expand_relative_path_unchanged() {
        assert_eq!(expand_cache_dir("relative/path"), PathBuf::from("relative/path"));
    }
}
