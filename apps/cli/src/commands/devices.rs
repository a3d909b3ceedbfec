use timbre_audio::{list_devices, DeviceDirection};

pub fn run(json: bool) -> anyhow::Result<()> {
    let devices = list_devices()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    for direction in [DeviceDirection::Input, DeviceDirection::Output] {
        let label = match direction {
            DeviceDirection::Input => "Input devices:",
            DeviceDirection::Output => "Output devices:",
        };
        println!("{label}");
        for device in devices.iter().filter(|d| d.direction == direction) {
            let marker = if device.is_default { "*" } else { " " };
            let rate = device
                .sample_rate
                .map(|r| format!("{r} Hz"))
                .unwrap_or_else(|| "? Hz".to_string());
            let channels = device
                .channels
                .map(|c| format!("{c} ch"))
                .unwrap_or_else(|| "? ch".to_string());
            println!("  {marker} {} ({rate}, {channels})", device.name);
        }
    }
    Ok(())
}
