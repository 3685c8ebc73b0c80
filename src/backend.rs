use std::{fmt::Display, str::FromStr};

use burn::{
    backend::{ndarray::NdArrayDevice, NdArray},
    tensor::backend::Backend,
};
use serde::{Deserialize, Serialize};

/// Backend executing the exported inference graph
pub type GraphBackend = NdArray<f32>;

/// Backend executing the fine-tuned model directly
#[cfg(feature = "tch")]
pub type NativeBackend = burn::backend::LibTorch<f32>;

/// Backend executing the fine-tuned model directly
#[cfg(not(feature = "tch"))]
pub type NativeBackend = NdArray<f32>;

/// Device type of the native backend, shared by every float precision
pub type NativeDevice = <NativeBackend as Backend>::Device;

/// The CPU device used for graph execution
pub fn graph_device() -> <GraphBackend as Backend>::Device {
    NdArrayDevice::Cpu
}

/// Hardware to run the native backend on
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accelerator {
    /// Use CUDA when available, fall back to the CPU
    Auto,
    /// Always use the CPU
    Cpu,
    /// Use CUDA devices
    Cuda,
    /// Use Apple Metal
    Mps,
}

impl FromStr for Accelerator {
    type Err = AcceleratorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "auto" => Ok(Accelerator::Auto),
            "cpu" => Ok(Accelerator::Cpu),
            "cuda" | "gpu" => Ok(Accelerator::Cuda),
            "mps" => Ok(Accelerator::Mps),
            _ => Err(AcceleratorError::Unknown(value.to_string())),
        }
    }
}

impl Display for Accelerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Accelerator::Auto => "auto",
            Accelerator::Cpu => "cpu",
            Accelerator::Cuda => "cuda",
            Accelerator::Mps => "mps",
        };

        write!(f, "{}", name)
    }
}

/// Accelerator Error
#[derive(thiserror::Error, Debug)]
pub enum AcceleratorError {
    /// No accelerator found for the given string
    #[error("no accelerator found for {0}")]
    Unknown(String),
}

/// Resolve the devices used for training or native inference
#[cfg(feature = "tch")]
pub fn native_devices(accelerator: Accelerator, count: usize) -> Vec<NativeDevice> {
    use burn::backend::libtorch::LibTorchDevice;

    let count = count.max(1);

    match accelerator {
        Accelerator::Cpu => vec![LibTorchDevice::Cpu],
        Accelerator::Mps => vec![LibTorchDevice::Mps],
        Accelerator::Auto | Accelerator::Cuda => {
            let available = tch::Cuda::device_count().max(0) as usize;

            if available == 0 {
                if accelerator == Accelerator::Cuda {
                    log::warn!("CUDA was requested but no device is available, using the CPU");
                }

                return vec![LibTorchDevice::Cpu];
            }

            if count > available {
                log::warn!("{count} devices requested but only {available} CUDA devices found");
            }

            (0..count.min(available)).map(LibTorchDevice::Cuda).collect()
        }
    }
}

/// Resolve the devices used for training or native inference
#[cfg(not(feature = "tch"))]
pub fn native_devices(accelerator: Accelerator, _count: usize) -> Vec<NativeDevice> {
    if !matches!(accelerator, Accelerator::Auto | Accelerator::Cpu) {
        log::warn!("Built without the `tch` feature, {accelerator} is unavailable; using the CPU");
    }

    vec![NdArrayDevice::Cpu]
}

/// The first device for the given accelerator
pub fn native_device(accelerator: Accelerator) -> NativeDevice {
    native_devices(accelerator, 1)
        .into_iter()
        .next()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_accelerators() {
        assert_eq!("auto".parse::<Accelerator>().unwrap(), Accelerator::Auto);
        assert_eq!("CPU".parse::<Accelerator>().unwrap(), Accelerator::Cpu);
        assert_eq!("gpu".parse::<Accelerator>().unwrap(), Accelerator::Cuda);
        assert!("tpu".parse::<Accelerator>().is_err());
    }

    #[test]
    fn cpu_always_resolves_a_device() {
        assert_eq!(native_devices(Accelerator::Cpu, 4).len(), 1);
    }
}
