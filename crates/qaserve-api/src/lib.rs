//! # qaserve-api
//!
//! HTTP question-answering surface for qaserve.
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | `GET` | `/` | Service description and usage example |
//! | `GET` | `/health` | Model readiness probe |
//! | `POST` | `/predict` | Answer a question with the fine-tuned model |

pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod types;


pub use error::{ApiError, ApiResult};
pub use server::{build_router, serve, ServerConfig};
