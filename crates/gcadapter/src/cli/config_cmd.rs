//! `config` subcommand — show or change the driver configuration.

use super::{
    ConfigAction, ConfigOutput, FileConfig, NUM_CHANNELS, Result, Settings, channel_for_port,
    device_name, kv, kv_width,
};

fn show_config(json: bool) -> Result<()> {
    let path = Settings::path();
    let exists = path.as_deref().is_some_and(|p| p.exists());
    let settings = Settings::load();

    if json {
        let output = ConfigOutput {
            config_file: path.map(|p| p.display().to_string()),
            config_file_exists: exists,
            settings,
        };
        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
        return Ok(());
    }

    let w = kv_width(&["Config file:", "Port 1:"]);
    match &path {
        Some(p) if exists => kv("Config file:", p.display(), w),
        Some(p) => kv("Config file:", format!("{} (not created)", p.display()), w),
        None => kv("Config file:", "unavailable", w),
    }
    for chan in 0..NUM_CHANNELS {
        let rumble = if settings.rumble[chan] { "on" } else { "off" };
        kv(
            &format!("Port {}:", chan + 1),
            format!("{} (rumble {rumble})", device_name(settings.ports[chan])),
            w,
        );
    }
    Ok(())
}

fn set_config(port: usize, device: Option<super::DeviceArg>, rumble: Option<bool>) -> Result<()> {
    let chan = channel_for_port(port)?;
    if device.is_none() && rumble.is_none() {
        return Err(super::GcAdapterError::Config(
            "nothing to change: pass --device and/or --rumble".into(),
        ));
    }

    let config = FileConfig::load_default();
    config.update(|settings| {
        if let Some(device) = device {
            settings.ports[chan] = device.into();
        }
        if let Some(rumble) = rumble {
            settings.rumble[chan] = rumble;
        }
    })?;

    let settings = config.settings();
    let rumble = if settings.rumble[chan] { "on" } else { "off" };
    println!(
        "Port {port}: {} (rumble {rumble})",
        device_name(settings.ports[chan])
    );
    Ok(())
}

pub(super) fn cmd_config(action: Option<ConfigAction>, json: bool) -> Result<()> {
    match action {
        None => show_config(json),
        Some(ConfigAction::Set {
            port,
            device,
            rumble,
        }) => {
            if json {
                super::warn_json_unsupported("config set");
            }
            set_config(port, device, rumble)
        }
    }
}
