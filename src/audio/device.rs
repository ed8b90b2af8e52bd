use cpal::traits::{DeviceTrait, HostTrait};
use tracing::debug;

use crate::error::DeviceError;

/// Snapshot of one audio input device at enumeration time.
///
/// The index is the position in that enumeration's order and is only stable
/// until the hardware changes; callers re-resolve by name before opening a
/// stream.
#[derive(Debug, Clone)]
pub struct Device {
    pub index: usize,
    pub name: String,
    pub channels: u16,
    pub sample_rate: u32,
    pub is_default: bool,
}

/// List available input devices, queried fresh on every call.
///
/// Devices that cannot report an input config are skipped. A failure to query
/// the audio subsystem itself is an error, never an empty list.
pub fn list_input_devices() -> Result<Vec<Device>, DeviceError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let mut result = Vec::new();
    for (index, device) in host.input_devices()?.enumerate() {
        let name = match device.name() {
            Ok(name) => name,
            Err(_) => continue,
        };
        let config = match device.default_input_config() {
            Ok(config) => config,
            Err(_) => {
                debug!("skipping '{}': no usable input config", name);
                continue;
            }
        };
        result.push(Device {
            index,
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            channels: config.channels(),
            sample_rate: config.sample_rate().0,
        });
    }

    Ok(result)
}

/// Resolve a mic argument (index string or case-insensitive name substring)
/// to a device snapshot. `None` selects the system default input.
pub fn resolve_input(selector: Option<&str>) -> Result<Device, DeviceError> {
    let devices = list_input_devices()?;

    let Some(selector) = selector else {
        return devices
            .iter()
            .find(|d| d.is_default)
            .or_else(|| devices.first())
            .cloned()
            .ok_or(DeviceError::NoDefault);
    };

    if let Ok(index) = selector.parse::<usize>() {
        return devices
            .into_iter()
            .find(|d| d.index == index)
            .ok_or(DeviceError::BadIndex(index));
    }

    let needle = selector.to_lowercase();
    devices
        .into_iter()
        .find(|d| d.name.to_lowercase().contains(&needle))
        .ok_or_else(|| DeviceError::NotFound(selector.to_string()))
}

/// Find the loopback input device by name hint (e.g. "BlackHole 2ch").
pub fn find_loopback(hint: &str) -> Result<Device, DeviceError> {
    let needle = hint.to_lowercase();
    list_input_devices()?
        .into_iter()
        .find(|d| d.name.to_lowercase().contains(&needle))
        .ok_or_else(|| DeviceError::LoopbackMissing(hint.to_string()))
}

/// Look an input device up again by exact name, immediately before opening a
/// stream on it. A device that was enumerated earlier but is gone now is
/// reported as vanished, not conflated with a bad selector.
pub(crate) fn open_input(name: &str) -> Result<cpal::Device, DeviceError> {
    let host = cpal::default_host();
    host.input_devices()?
        .find(|d| d.name().ok().as_deref() == Some(name))
        .ok_or_else(|| DeviceError::Vanished(name.to_string()))
}
