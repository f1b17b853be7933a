//! Device selection for inference.

use candle_core::Device;
use tracing::info;

/// Returns the best available device: Metal or CUDA when compiled in and
/// present, otherwise the CPU.
#[must_use]
pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            info!("running inference on Metal");
            return device;
        }
    }

    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            info!("running inference on CUDA");
            return device;
        }
    }

    info!("running inference on CPU");
    Device::Cpu
}

/// Short name of `device` for status output.
#[must_use]
pub const fn device_name(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_name() {
        assert_eq!(device_name(&Device::Cpu), "cpu");
        let _ = select_device();
    }
}
