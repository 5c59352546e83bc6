//! One-time model load and readiness tracking.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use candle_core::Device;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::error::{CoreError, CoreResult};
use crate::model::{Model, ModelConfig};

/// The loaded model, shared by every request.
pub type SharedModel = Arc<Mutex<dyn Model + Send>>;

/// Readiness of the process-wide model.
///
/// `Unloaded → Loading → {Ready | Failed}`. `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModelState::Unloaded => "unloaded",
            ModelState::Loading => "loading",
            ModelState::Ready => "ready",
            ModelState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Snapshot of readiness for health probes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub model_loaded: bool,
    pub device: String,
}

/// Owns the model and the only write access to its state.
///
/// Other components query state or borrow the shared handle; nothing else
/// can transition it.
pub struct ModelLifecycle {
    state: RwLock<ModelState>,
    model: OnceLock<SharedModel>,
    model_id: String,
    device: String,
}

impl fmt::Debug for ModelLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelLifecycle")
            .field("state", &self.state())
            .field("model_id", &self.model_id)
            .field("device", &self.device)
            .finish()
    }
}

impl ModelLifecycle {
    /// A lifecycle with nothing loaded yet.
    ///
    /// `model_id` is reported to clients as the model path; `device` is the
    /// label of the device the model will live on.
    pub fn new(model_id: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(ModelState::Unloaded),
            model: OnceLock::new(),
            model_id: model_id.into(),
            device: device.into(),
        }
    }

    /// A lifecycle that is already `Ready` with `model`.
    pub fn ready<M: Model + 'static>(
        model: M,
        model_id: impl Into<String>,
        device: impl Into<String>,
    ) -> Self {
        let lifecycle = Self::new(model_id, device);
        let shared: SharedModel = Arc::new(Mutex::new(model));
        // A fresh OnceLock cannot already be set.
        let _ = lifecycle.model.set(shared);
        *lifecycle.state.write() = ModelState::Ready;
        lifecycle
    }

    pub fn state(&self) -> ModelState {
        *self.state.read()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ModelState::Ready
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// The shared model handle, only once `Ready`.
    pub fn model(&self) -> Option<SharedModel> {
        if self.is_ready() {
            self.model.get().cloned()
        } else {
            None
        }
    }

    /// Project the current state into a health report. Never fails.
    pub fn health(&self) -> HealthStatus {
        let loaded = self.is_ready();
        HealthStatus {
            status: if loaded { "healthy" } else { "model_not_loaded" },
            model_loaded: loaded,
            device: self.device.clone(),
        }
    }

    /// Bring the model from `Unloaded` to `Ready`, exactly once.
    ///
    /// `loader` performs the whole load (base weights, adapter merge,
    /// tokenizer). Any error moves the lifecycle to `Failed` and is returned
    /// so startup can abort. Calling this in any state other than `Unloaded`
    /// is rejected without touching the state.
    pub async fn load<M, Fut>(&self, loader: Fut) -> CoreResult<()>
    where
        M: Model + 'static,
        Fut: Future<Output = CoreResult<M>>,
    {
        self.begin_load()?;
        info!(model_id = %self.model_id, device = %self.device, "Loading model");
        let started = Instant::now();

        match loader.await {
            Ok(model) => {
                let shared: SharedModel = Arc::new(Mutex::new(model));
                // begin_load admits a single caller, so the cell is still empty.
                let _ = self.model.set(shared);
                *self.state.write() = ModelState::Ready;
                info!(
                    model_id = %self.model_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Model ready"
                );
                Ok(())
            }
            Err(e) => {
                *self.state.write() = ModelState::Failed;
                error!(model_id = %self.model_id, error = %e, "Model load failed");
                Err(e)
            }
        }
    }

    fn begin_load(&self) -> CoreResult<()> {
        let mut state = self.state.write();
        if *state != ModelState::Unloaded {
            return Err(CoreError::InvalidLoadState { state: *state });
        }
        *state = ModelState::Loading;
        Ok(())
    }
}

/// Run `M::load` on the blocking pool so the async runtime stays responsive.
pub async fn load_model_blocking<M>(config: ModelConfig, device: Device) -> CoreResult<M>
where
    M: Model + 'static,
{
    tokio::task::spawn_blocking(move || M::load(&config, &device))
        .await
        .map_err(|e| CoreError::Task(e.to_string()))?
}
