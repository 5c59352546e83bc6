//! # qaserve-hub
//!
//! Resolves base-model files from the Hugging Face Hub into a local cache.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use qaserve_hub::BaseModelFetcher;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let token = std::env::var("HF_TOKEN").ok();
//!     let fetcher = BaseModelFetcher::new("/tmp/hf_cache".into(), token)?;
//!     let files = fetcher.fetch("google/gemma-2b", "main").await?;
//!     println!("{} weight files", files.weights.len());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod fetch;

pub use error::{HubError, HubResult};
pub use fetch::{BaseModelFetcher, BaseModelFiles};
