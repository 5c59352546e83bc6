use std::collections::BTreeSet;
use std::path::PathBuf;

use hf_hub::{
    api::tokio::{Api, ApiBuilder},
    Repo, RepoType,
};
use tracing::{debug, info, warn};

use crate::error::{HubError, HubResult};

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const SAFETENSORS_INDEX: &str = "model.safetensors.index.json";
const SAFETENSORS_SINGLE: &str = "model.safetensors";

/// Local paths of everything needed to build the base model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    /// Safetensors shards in name order.
    pub weights: Vec<PathBuf>,
}

/// Downloads (or finds in cache) the files of a base model repository.
pub struct BaseModelFetcher {
    api: Api,
    cache_dir: PathBuf,
}

impl std::fmt::Debug for BaseModelFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseModelFetcher")
            .field("cache_dir", &self.cache_dir)
            .finish()
    }
}

impl BaseModelFetcher {
    /// Build a Hub client rooted at `cache_dir`.
    ///
    /// Without a token only public repositories are reachable; gated models
    /// such as Gemma then fail at `fetch` time.
    pub fn new(cache_dir: PathBuf, token: Option<String>) -> HubResult<Self> {
        let token = token.filter(|t| !t.is_empty());
        if token.is_none() {
            warn!("No Hugging Face token configured; only public models can be fetched");
        }
        let api = ApiBuilder::new()
            .with_cache_dir(cache_dir.clone())
            .with_token(token)
            .with_progress(false)
            .build()
            .map_err(|e| HubError::Init(e.to_string()))?;
        Ok(Self { api, cache_dir })
    }

    pub fn cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }

    /// Resolve config, tokenizer and weights for `repo_id` at `revision`.
    ///
    /// Sharded repositories are detected by their safetensors index; otherwise
    /// a single `model.safetensors` is expected.
    pub async fn fetch(&self, repo_id: &str, revision: &str) -> HubResult<BaseModelFiles> {
        info!(repo_id, revision, cache_dir = %self.cache_dir.display(), "Resolving base model");

        let repo = self.api.repo(Repo::with_revision(
            repo_id.to_string(),
            RepoType::Model,
            revision.to_string(),
        ));

        let config = repo.get(CONFIG_FILE).await?;
        let tokenizer = repo.get(TOKENIZER_FILE).await?;

        let weights = match repo.get(SAFETENSORS_INDEX).await {
            Ok(index_path) => {
                let raw = std::fs::read_to_string(&index_path)?;
                let shards = shard_files(&raw).map_err(|e| match e {
                    HubError::MissingFiles { what, .. } => HubError::MissingFiles {
                        repo_id: repo_id.to_string(),
                        what,
                    },
                    other => other,
                })?;
                let mut paths = Vec::with_capacity(shards.len());
                for shard in &shards {
                    debug!(shard = %shard, "Fetching weight shard");
                    paths.push(repo.get(shard).await?);
                }
                paths
            }
            Err(e) if is_not_found(&e.to_string()) => {
                debug!(error = %e, "No safetensors index, using single weight file");
                vec![repo.get(SAFETENSORS_SINGLE).await?]
            }
            Err(e) => {
                warn!(repo_id, error = %e, "Could not fetch safetensors index");
                return Err(e.into());
            }
        };

        info!(repo_id, shards = weights.len(), "Base model files ready");
        Ok(BaseModelFiles { config, tokenizer, weights })
    }
}

/// Whether a Hub error message reports a missing file rather than an
/// auth, network or server failure.
fn is_not_found(message: &str) -> bool {
    message.contains("404")
}

/// Distinct shard file names referenced by a safetensors index, sorted.
pub fn shard_files(index_json: &str) -> HubResult<Vec<String>> {
    let index: serde_json::Value = serde_json::from_str(index_json)?;
    let weight_map = index["weight_map"].as_object().ok_or_else(|| HubError::MissingFiles {
        repo_id: String::new(),
        what: format!("a weight_map in {SAFETENSORS_INDEX}"),
    })?;
    let shards: BTreeSet<String> = weight_map
        .values()
        .filter_map(|v| v.as_str())
        .map(String::from)
        .collect();
    if shards.is_empty() {
        return Err(HubError::MissingFiles {
            repo_id: String::new(),
            what: "weight shards".to_string(),
        });
    }
    Ok(shards.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_files_sorted_and_distinct() {
        let index = r#"{
            "metadata": {"total_size": 10},
            "weight_map": {
                "model.norm.weight": "model-00002-of-00002.safetensors",
                "model.embed_tokens.weight": "model-00001-of-00002.safetensors",
                "model.layers.0.mlp.up_proj.weight": "model-00001-of-00002.safetensors"
            }
        }"#;
        assert_eq!(
            shard_files(index).unwrap(),
            vec![
                "model-00001-of-00002.safetensors".to_string(),
                "model-00002-of-00002.safetensors".to_string(),
            ]
        );
    }

    #[test]
    fn test_shard_files_without_weight_map() {
        assert!(matches!(
            shard_files(r#"{"metadata":{}}"#),
            Err(HubError::MissingFiles { .. })
        ));
    }

    #[test]
    fn test_shard_files_empty_weight_map() {
        assert!(matches!(
            shard_files(r#"{"weight_map":{}}"#),
            Err(HubError::MissingFiles { .. })
        ));
    }

    #[test]
    fn test_shard_files_invalid_json() {
        assert!(matches!(shard_files("not json"), Err(HubError::Json(_))));
    }

    #[test]
    fn test_only_404_counts_as_missing_index() {
        assert!(is_not_found(
            "request error: HTTP status client error (404 Not Found) for url \
             (https://huggingface.co/google/gemma-2b/resolve/main/model.safetensors.index.json)"
        ));
        assert!(!is_not_found("request error: HTTP status client error (401 Unauthorized)"));
        assert!(!is_not_found("request error: HTTP status client error (403 Forbidden)"));
        assert!(!is_not_found("request error: HTTP status server error (503 Service Unavailable)"));
        assert!(!is_not_found("request error: error sending request: connection refused"));
    }

    #[test]
    fn test_fetcher_uses_given_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = BaseModelFetcher::new(dir.path().to_path_buf(), Some(String::new())).unwrap();
        assert_eq!(fetcher.cache_dir(), &dir.path().to_path_buf());
    }
}
