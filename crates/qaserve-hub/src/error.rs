use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("Hugging Face API error: {0}")]
    Api(#[from] hf_hub::api::tokio::ApiError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Repository '{repo_id}' is missing {what}")]
    MissingFiles { repo_id: String, what: String },

    #[error("Hub client initialisation failed: {0}")]
    Init(String),
}

pub type HubResult<T> = Result<T, HubError>;
