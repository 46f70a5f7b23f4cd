//! Device enumeration and lookup.
//!
//! The expected deployment routes the source application into a virtual
//! cable (VB-Cable, BlackHole, ...) whose monitor side is our input, with
//! filtered output going to the real speakers.

use cpal::traits::{DeviceTrait, HostTrait};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DeviceType {
    Physical,
    Virtual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DeviceDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AudioDevice {
    pub name: String,
    pub direction: DeviceDirection,
    pub is_default: bool,
    pub device_type: DeviceType,
}

impl AudioDevice {
    pub fn is_virtual(&self) -> bool {
        self.device_type == DeviceType::Virtual
    }
}

const VIRTUAL_DEVICE_PATTERNS: &[&str] = &[
    "blackhole",
    "soundflower",
    "loopback",
    "virtual",
    "vb-audio",
    "voicemeeter",
    "cable",
];

fn detect_device_type(name: &str) -> DeviceType {
    let lower = name.to_lowercase();
    if VIRTUAL_DEVICE_PATTERNS.iter().any(|p| lower.contains(p)) {
        DeviceType::Virtual
    } else {
        DeviceType::Physical
    }
}

/// List devices in one direction.
pub fn list_devices(direction: DeviceDirection) -> crate::Result<Vec<AudioDevice>> {
    let host = cpal::default_host();

    let (devices, default_name) = match direction {
        DeviceDirection::Input => (
            host.input_devices()?.collect::<Vec<_>>(),
            host.default_input_device().and_then(|d| d.name().ok()),
        ),
        DeviceDirection::Output => (
            host.output_devices()?.collect::<Vec<_>>(),
            host.default_output_device().and_then(|d| d.name().ok()),
        ),
    };

    Ok(devices
        .into_iter()
        .map(|device| {
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            AudioDevice {
                is_default: default_name.as_deref() == Some(name.as_str()),
                device_type: detect_device_type(&name),
                direction,
                name,
            }
        })
        .collect())
}

/// Resolve a cpal device by name, or the default device when `name` is
/// `None`.
pub fn find_device(
    direction: DeviceDirection,
    name: Option<&str>,
) -> crate::Result<cpal::Device> {
    let host = cpal::default_host();

    match (direction, name) {
        (DeviceDirection::Input, Some(wanted)) => host
            .input_devices()?
            .find(|d| d.name().ok().as_deref() == Some(wanted))
            .ok_or_else(|| crate::AudioError::DeviceNotFound(wanted.to_string())),
        (DeviceDirection::Output, Some(wanted)) => host
            .output_devices()?
            .find(|d| d.name().ok().as_deref() == Some(wanted))
            .ok_or_else(|| crate::AudioError::DeviceNotFound(wanted.to_string())),
        (DeviceDirection::Input, None) => host
            .default_input_device()
            .ok_or_else(|| crate::AudioError::DeviceNotFound("default input".to_string())),
        (DeviceDirection::Output, None) => host
            .default_output_device()
            .ok_or_else(|| crate::AudioError::DeviceNotFound("default output".to_string())),
    }
}

/// First virtual-cable input device, if any is present.
pub fn find_virtual_device() -> crate::Result<Option<AudioDevice>> {
    let devices = list_devices(DeviceDirection::Input)?;
    Ok(devices.into_iter().find(|d| d.is_virtual()))
}
