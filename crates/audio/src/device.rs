use cpal::traits::{DeviceTrait, HostTrait};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AudioDevice {
    pub id: String,
    pub name: String,
    pub direction: DeviceDirection,
    pub is_default: bool,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

/// List every input and output device on the default host.
pub fn list_devices() -> crate::Result<Vec<AudioDevice>> {
    let host = cpal::default_host();
    let default_input = host.default_input_device().and_then(|d| d.name().ok());
    let default_output = host.default_output_device().and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    for device in host.input_devices()? {
        devices.push(describe(&device, DeviceDirection::Input, default_input.as_deref()));
    }
    for device in host.output_devices()? {
        devices.push(describe(&device, DeviceDirection::Output, default_output.as_deref()));
    }

    Ok(devices)
}

fn describe(
    device: &cpal::Device,
    direction: DeviceDirection,
    default_name: Option<&str>,
) -> AudioDevice {
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    let config = match direction {
        DeviceDirection::Input => device.default_input_config().ok(),
        DeviceDirection::Output => device.default_output_config().ok(),
    };

    AudioDevice {
        id: name.clone(),
        is_default: default_name == Some(name.as_str()),
        name,
        direction,
        sample_rate: config.as_ref().map(|c| c.sample_rate().0),
        channels: config.as_ref().map(|c| c.channels()),
    }
}

/// Resolve a cpal device by name, or the host default when `id` is `None`.
pub(crate) fn open_device(
    host: &cpal::Host,
    id: Option<&str>,
    direction: DeviceDirection,
) -> crate::Result<cpal::Device> {
    match (id, direction) {
        (Some(id), DeviceDirection::Input) => host
            .input_devices()?
            .find(|d| d.name().ok().as_deref() == Some(id))
            .ok_or_else(|| crate::AudioError::DeviceNotFound(id.to_string())),
        (Some(id), DeviceDirection::Output) => host
            .output_devices()?
            .find(|d| d.name().ok().as_deref() == Some(id))
            .ok_or_else(|| crate::AudioError::DeviceNotFound(id.to_string())),
        (None, DeviceDirection::Input) => host
            .default_input_device()
            .ok_or_else(|| crate::AudioError::DeviceNotFound("default input".to_string())),
        (None, DeviceDirection::Output) => host
            .default_output_device()
            .ok_or_else(|| crate::AudioError::DeviceNotFound("default output".to_string())),
    }
}
