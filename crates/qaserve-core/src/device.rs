use candle_core::Device;
use tracing::{info, warn};

use crate::error::CoreResult;

/// Selects the compute device the model is loaded on.
///
/// CPU unless `prefer_gpu` is set and the binary was built with the `cuda`
/// or `metal` feature; any GPU initialisation error falls back to CPU.
pub fn select_device(
    prefer_gpu: bool,
    #[allow(unused_variables)] cuda_device_id: usize,
) -> CoreResult<Device> {
    #[cfg(feature = "cuda")]
    if prefer_gpu {
        match Device::new_cuda(cuda_device_id) {
            Ok(dev) => {
                info!(cuda_device_id, "Using CUDA device");
                return Ok(dev);
            }
            Err(e) => {
                warn!(error = %e, "CUDA unavailable, falling back to CPU");
            }
        }
    }

    #[cfg(feature = "metal")]
    if prefer_gpu {
        match Device::new_metal(0) {
            Ok(dev) => {
                info!("Using Metal device");
                return Ok(dev);
            }
            Err(e) => {
                warn!(error = %e, "Metal unavailable, falling back to CPU");
            }
        }
    }

    #[cfg(not(any(feature = "cuda", feature = "metal")))]
    if prefer_gpu {
        warn!("GPU requested but this binary was built without `cuda` or `metal`; using CPU");
    }

    info!("Using CPU device");
    Ok(Device::Cpu)
}

/// Device label reported in API responses (`"cpu"`, `"cuda"`, `"metal"`).
pub fn device_label(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}
