//! Device selection

use crate::config::DevicePreference;
use allmond_core::DeviceKind;
use candle_core::Device;

/// An accelerator backend `Auto` may try
struct Backend {
    name: &'static str,
    compiled: bool,
    init: fn() -> candle_core::Result<Device>,
}

/// Pick the inference device once, at composition time.
///
/// `Auto` prefers CUDA, then Metal, then CPU. A backend that is compiled in
/// but fails to initialize (no GPU on the host) is skipped with a warning.
pub fn select_device(preference: DevicePreference) -> Device {
    if preference == DevicePreference::Cpu {
        return Device::Cpu;
    }

    first_available(&[
        Backend {
            name: "CUDA",
            compiled: candle_core::utils::cuda_is_available(),
            init: || Device::new_cuda(0),
        },
        Backend {
            name: "Metal",
            compiled: candle_core::utils::metal_is_available(),
            init: || Device::new_metal(0),
        },
    ])
}

fn first_available(backends: &[Backend]) -> Device {
    for backend in backends.iter().filter(|b| b.compiled) {
        match (backend.init)() {
            Ok(device) => {
                tracing::info!("Using {} device 0", backend.name);
                return device;
            }
            Err(e) => tracing::warn!("{} unavailable, trying next device: {}", backend.name, e),
        }
    }

    tracing::info!("No accelerator available, using CPU");
    Device::Cpu
}

/// Classify an already-constructed device
pub fn device_kind(device: &Device) -> DeviceKind {
    if device.is_cpu() {
        DeviceKind::Cpu
    } else {
        DeviceKind::Accelerator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_gpu() -> candle_core::Result<Device> {
        Err(candle_core::Error::Msg("no CUDA-capable device is detected".into()))
    }

    #[test]
    fn test_cpu_preference_is_honored() {
        let device = select_device(DevicePreference::Cpu);
        assert_eq!(device_kind(&device), DeviceKind::Cpu);
    }

    #[test]
    fn test_failed_accelerator_falls_through_to_cpu() {
        let device = first_available(&[
            Backend {
                name: "CUDA",
                compiled: true,
                init: no_gpu,
            },
            Backend {
                name: "Metal",
                compiled: true,
                init: no_gpu,
            },
        ]);
        assert!(device.is_cpu());
    }

    #[test]
    fn test_backends_not_compiled_are_skipped() {
        let device = first_available(&[Backend {
            name: "CUDA",
            compiled: false,
            init: || panic!("must not initialize a backend that is not compiled in"),
        }]);
        assert!(device.is_cpu());
    }
}
