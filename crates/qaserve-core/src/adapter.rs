//! LoRA adapter loading and merging.
//!
//! Reads a PEFT-format adapter directory (`adapter_config.json` +
//! `adapter_model.safetensors`) and folds each low-rank pair into the
//! matching base tensor: `W ← W + s · (B · A)`.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{CoreError, CoreResult};

pub const ADAPTER_CONFIG_FILE: &str = "adapter_config.json";
pub const ADAPTER_WEIGHTS_FILE: &str = "adapter_model.safetensors";

/// PEFT wraps the base model twice when saving (`PeftModel` → `LoraModel`).
const PEFT_PREFIX: &str = "base_model.model.";

/// Fields of `adapter_config.json` that affect merging.
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    pub r: usize,
    pub lora_alpha: f64,
    #[serde(default)]
    pub use_rslora: bool,
    /// Set when the base layer stores weights as (in, out), e.g. GPT-2 Conv1D.
    #[serde(default)]
    pub fan_in_fan_out: bool,
    /// Weight-decomposed LoRA; its magnitude vectors cannot be folded in.
    #[serde(default)]
    pub use_dora: bool,
    #[serde(default)]
    pub peft_type: Option<String>,
    #[serde(default)]
    pub base_model_name_or_path: Option<String>,
}

impl AdapterConfig {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Adapter(format!("cannot read {}: {e}", path.display()))
        })?;
        let cfg: Self = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> CoreResult<()> {
        if self.r == 0 {
            return Err(CoreError::Config {
                field: "r".to_string(),
                reason: "LoRA rank must be positive".to_string(),
            });
        }
        if let Some(kind) = self.peft_type.as_deref() {
            if !kind.eq_ignore_ascii_case("lora") {
                return Err(CoreError::Config {
                    field: "peft_type".to_string(),
                    reason: format!("unsupported adapter type '{kind}'"),
                });
            }
        }
        if self.use_dora {
            return Err(CoreError::Config {
                field: "use_dora".to_string(),
                reason: "DoRA adapters cannot be merged as plain LoRA".to_string(),
            });
        }
        Ok(())
    }

    /// Multiplier applied to `B · A`.
    pub fn scale(&self) -> f64 {
        if self.use_rslora {
            self.lora_alpha / (self.r as f64).sqrt()
        } else {
            self.lora_alpha / self.r as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoraPart {
    A,
    B,
    EmbeddingA,
    EmbeddingB,
}

/// Split an adapter tensor name into the base module path and the LoRA part.
///
/// `base_model.model.model.layers.0.self_attn.q_proj.lora_A.weight`
/// → (`model.layers.0.self_attn.q_proj`, A)
fn parse_lora_key(key: &str) -> Option<(String, LoraPart)> {
    let key = key.strip_prefix(PEFT_PREFIX).unwrap_or(key);
    const MARKERS: [(&str, LoraPart); 4] = [
        (".lora_embedding_A", LoraPart::EmbeddingA),
        (".lora_embedding_B", LoraPart::EmbeddingB),
        (".lora_A", LoraPart::A),
        (".lora_B", LoraPart::B),
    ];
    MARKERS
        .iter()
        .find_map(|(marker, part)| key.find(marker).map(|pos| (key[..pos].to_string(), *part)))
}

#[derive(Debug, Default)]
struct LoraLayer {
    a: Option<Tensor>,
    b: Option<Tensor>,
    embedding: bool,
}

/// A loaded LoRA adapter, keyed by the base tensor each pair modifies.
#[derive(Debug)]
pub struct LoraAdapter {
    config: AdapterConfig,
    layers: BTreeMap<String, LoraLayer>,
}

impl LoraAdapter {
    /// Load an adapter directory produced by PEFT's `save_pretrained`.
    pub fn load(dir: &Path) -> CoreResult<Self> {
        let config = AdapterConfig::from_file(&dir.join(ADAPTER_CONFIG_FILE))?;
        let weights_path = dir.join(ADAPTER_WEIGHTS_FILE);
        if !weights_path.exists() {
            return Err(CoreError::Adapter(format!(
                "no {ADAPTER_WEIGHTS_FILE} in {}",
                dir.display()
            )));
        }
        let tensors = candle_core::safetensors::load(&weights_path, &Device::Cpu)?;
        info!(
            adapter_dir = %dir.display(),
            rank = config.r,
            alpha = config.lora_alpha,
            tensors = tensors.len(),
            "Loaded LoRA adapter"
        );
        Self::from_tensors(config, tensors)
    }

    /// Group raw adapter tensors into A/B pairs.
    ///
    /// Tensors that are not LoRA factors (PEFT `modules_to_save` copies) are
    /// not applied, so the merged model differs from the adapter there.
    pub fn from_tensors(
        config: AdapterConfig,
        tensors: HashMap<String, Tensor>,
    ) -> CoreResult<Self> {
        let mut layers: BTreeMap<String, LoraLayer> = BTreeMap::new();
        for (key, tensor) in tensors {
            let Some((module, part)) = parse_lora_key(&key) else {
                warn!(key = %key, "Ignoring non-LoRA adapter tensor; it will not be merged");
                continue;
            };
            let layer = layers.entry(format!("{module}.weight")).or_default();
            match part {
                LoraPart::A => layer.a = Some(tensor),
                LoraPart::B => layer.b = Some(tensor),
                LoraPart::EmbeddingA => {
                    layer.a = Some(tensor);
                    layer.embedding = true;
                }
                LoraPart::EmbeddingB => {
                    layer.b = Some(tensor);
                    layer.embedding = true;
                }
            }
        }
        Ok(Self { config, layers })
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Number of base tensors this adapter modifies.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Merge every LoRA pair into `base`, in place. Returns the number of
    /// tensors merged.
    ///
    /// Merged tensors keep their original dtype; the arithmetic runs in F32.
    pub fn merge_into(&self, base: &mut HashMap<String, Tensor>) -> CoreResult<usize> {
        let scale = self.config.scale();
        for (name, layer) in &self.layers {
            let (Some(a), Some(b)) = (&layer.a, &layer.b) else {
                return Err(CoreError::Adapter(format!("incomplete LoRA pair for {name}")));
            };
            let weight = base
                .get(name)
                .ok_or_else(|| CoreError::Adapter(format!("no base tensor named {name}")))?;

            let a = a.to_dtype(DType::F32)?;
            let b = b.to_dtype(DType::F32)?;
            let mut delta = b.matmul(&a)?.affine(scale, 0.0)?;
            if layer.embedding || self.config.fan_in_fan_out {
                delta = delta.t()?;
            }
            if delta.dims() != weight.dims() {
                return Err(CoreError::Adapter(format!(
                    "shape mismatch for {name}: base {:?}, delta {:?}",
                    weight.dims(),
                    delta.dims()
                )));
            }

            let merged = weight
                .to_dtype(DType::F32)?
                .add(&delta)?
                .to_dtype(weight.dtype())?;
            base.insert(name.clone(), merged);
        }
        debug!(merged = self.layers.len(), scale, "Merged LoRA adapter");
        Ok(self.layers.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(r: usize, alpha: f64) -> AdapterConfig {
        AdapterConfig {
            r,
            lora_alpha: alpha,
            use_rslora: false,
            fan_in_fan_out: false,
            use_dora: false,
            peft_type: Some("LORA".to_string()),
            base_model_name_or_path: None,
        }
    }

    fn t(values: &[f32], shape: (usize, usize)) -> Tensor {
        Tensor::from_vec(values.to_vec(), shape, &Device::Cpu).unwrap()
    }

    fn q_proj_adapter(cfg: AdapterConfig) -> LoraAdapter {
        let mut tensors = HashMap::new();
        tensors.insert(
            "base_model.model.model.layers.0.self_attn.q_proj.lora_A.weight".to_string(),
            t(&[1.0, 2.0, 3.0], (1, 3)),
        );
        tensors.insert(
            "base_model.model.model.layers.0.self_attn.q_proj.lora_B.weight".to_string(),
            t(&[1.0, 2.0], (2, 1)),
        );
        LoraAdapter::from_tensors(cfg, tensors).unwrap()
    }

    #[test]
    fn test_parse_lora_key_linear() {
        let (module, part) =
            parse_lora_key("base_model.model.model.layers.3.mlp.down_proj.lora_B.weight").unwrap();
        assert_eq!(module, "model.layers.3.mlp.down_proj");
        assert_eq!(part, LoraPart::B);
    }

    #[test]
    fn test_parse_lora_key_embedding() {
        let (module, part) =
            parse_lora_key("base_model.model.model.embed_tokens.lora_embedding_A").unwrap();
        assert_eq!(module, "model.embed_tokens");
        assert_eq!(part, LoraPart::EmbeddingA);
    }

    #[test]
    fn test_parse_lora_key_non_lora() {
        assert!(parse_lora_key("base_model.model.lm_head.weight").is_none());
    }

    #[test]
    fn test_scale_plain_and_rslora() {
        assert!((config(8, 16.0).scale() - 2.0).abs() < 1e-12);
        let rs = AdapterConfig { use_rslora: true, ..config(16, 8.0) };
        assert!((rs.scale() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_merge_adds_scaled_delta() {
        let adapter = q_proj_adapter(config(1, 2.0));
        let name = "model.layers.0.self_attn.q_proj.weight".to_string();
        let mut base = HashMap::new();
        base.insert(name.clone(), t(&[1.0; 6], (2, 3)));

        assert_eq!(adapter.merge_into(&mut base).unwrap(), 1);

        let merged: Vec<Vec<f32>> = base[&name].to_vec2().unwrap();
        // 1 + 2 * (B · A)
        assert_eq!(merged, vec![vec![3.0, 5.0, 7.0], vec![5.0, 9.0, 13.0]]);
    }

    #[test]
    fn test_merge_keeps_base_dtype() {
        let adapter = q_proj_adapter(config(1, 1.0));
        let name = "model.layers.0.self_attn.q_proj.weight".to_string();
        let mut base = HashMap::new();
        base.insert(name.clone(), t(&[0.0; 6], (2, 3)).to_dtype(DType::BF16).unwrap());
        adapter.merge_into(&mut base).unwrap();
        assert_eq!(base[&name].dtype(), DType::BF16);
    }

    #[test]
    fn test_merge_missing_base_tensor_fails() {
        let adapter = q_proj_adapter(config(1, 1.0));
        let mut base = HashMap::new();
        let err = adapter.merge_into(&mut base).unwrap_err();
        assert!(matches!(err, CoreError::Adapter(_)));
    }

    #[test]
    fn test_merge_shape_mismatch_fails() {
        let adapter = q_proj_adapter(config(1, 1.0));
        let mut base = HashMap::new();
        base.insert(
            "model.layers.0.self_attn.q_proj.weight".to_string(),
            t(&[0.0; 6], (3, 2)),
        );
        assert!(adapter.merge_into(&mut base).is_err());
    }

    #[test]
    fn test_incomplete_pair_fails() {
        let mut tensors = HashMap::new();
        tensors.insert(
            "base_model.model.model.layers.0.mlp.up_proj.lora_A.weight".to_string(),
            t(&[1.0, 1.0], (1, 2)),
        );
        let adapter = LoraAdapter::from_tensors(config(1, 1.0), tensors).unwrap();
        let mut base = HashMap::new();
        base.insert("model.layers.0.mlp.up_proj.weight".to_string(), t(&[0.0; 2], (1, 2)));
        assert!(adapter.merge_into(&mut base).is_err());
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(ADAPTER_CONFIG_FILE),
            r#"{"peft_type":"LORA","r":1,"lora_alpha":2,"base_model_name_or_path":"google/gemma-2b","target_modules":["q_proj"]}"#,
        )
        .unwrap();
        let mut tensors = HashMap::new();
        tensors.insert(
            "base_model.model.model.layers.0.self_attn.q_proj.lora_A.weight".to_string(),
            t(&[1.0, 0.0, 0.0], (1, 3)),
        );
        tensors.insert(
            "base_model.model.model.layers.0.self_attn.q_proj.lora_B.weight".to_string(),
            t(&[1.0, 1.0], (2, 1)),
        );
        candle_core::safetensors::save(&tensors, dir.path().join(ADAPTER_WEIGHTS_FILE)).unwrap();

        let adapter = LoraAdapter::load(dir.path()).unwrap();
        assert_eq!(adapter.len(), 1);
        assert_eq!(adapter.config().base_model_name_or_path.as_deref(), Some("google/gemma-2b"));
    }

    #[test]
    fn test_load_without_weights_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ADAPTER_CONFIG_FILE), r#"{"r":4,"lora_alpha":8}"#).unwrap();
        let err = LoraAdapter::load(dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::Adapter(_)));
    }

    #[test]
    fn test_zero_rank_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ADAPTER_CONFIG_FILE);
        std::fs::write(&path, r#"{"r":0,"lora_alpha":8}"#).unwrap();
        assert!(matches!(AdapterConfig::from_file(&path), Err(CoreError::Config { .. })));
    }

    #[test]
    fn test_dora_adapter_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ADAPTER_CONFIG_FILE);
        std::fs::write(&path, r#"{"peft_type":"LORA","r":8,"lora_alpha":16,"use_dora":true}"#)
            .unwrap();
        match AdapterConfig::from_file(&path) {
            Err(CoreError::Config { field, .. }) => assert_eq!(field, "use_dora"),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_non_lora_tensors_are_not_merged() {
        let mut tensors = HashMap::new();
        tensors.insert(
            "base_model.model.model.layers.0.self_attn.q_proj.lora_A.weight".to_string(),
            t(&[1.0, 2.0, 3.0], (1, 3)),
        );
        tensors.insert(
            "base_model.model.model.layers.0.self_attn.q_proj.lora_B.weight".to_string(),
            t(&[1.0, 2.0], (2, 1)),
        );
        tensors.insert("base_model.model.lm_head.weight".to_string(), t(&[9.0; 6], (2, 3)));
        let adapter = LoraAdapter::from_tensors(config(1, 1.0), tensors).unwrap();
        assert_eq!(adapter.len(), 1);

        let mut base = HashMap::new();
        base.insert("model.layers.0.self_attn.q_proj.weight".to_string(), t(&[0.0; 6], (2, 3)));
        base.insert("lm_head.weight".to_string(), t(&[0.0; 6], (2, 3)));
        adapter.merge_into(&mut base).unwrap();
        let head: Vec<Vec<f32>> = base["lm_head.weight"].to_vec2().unwrap();
        assert_eq!(head, vec![vec![0.0; 3]; 2]);
    }
}
