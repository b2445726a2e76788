//! CLI subcommands — adapter status, live input watch, rumble, config.

mod config_cmd;
mod rumble;
mod status;
mod watch;

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Subcommand, ValueEnum};
use serde::Serialize;

pub(super) use crate::RUNNING;
pub(super) use gcadapter_lib::GcAdapterError;
pub(super) use gcadapter_lib::adapter::{AdapterStatus, GcAdapter};
pub(super) use gcadapter_lib::config::{ChannelDevice, FileConfig, Settings, SystemRuntime};
pub(super) use gcadapter_lib::device::{DeviceError, UsbTransport};
pub(super) use gcadapter_lib::error::Result;
pub(super) use gcadapter_lib::pad;
pub(super) use gcadapter_lib::protocol::NUM_CHANNELS;

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output.
pub(super) fn kv_width(keys: &[&str]) -> usize {
    keys.iter().map(|k| k.len()).max().unwrap_or(0) + PADDING
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{key:<width$}{value}", width = w);
}

// ── Driver bring-up ──

/// Open the USB transport, start the driver, and give the scan worker a
/// moment to find the device.
pub(super) fn open_driver() -> Result<GcAdapter> {
    let transport = UsbTransport::new().map_err(GcAdapterError::Device)?;
    let adapter = GcAdapter::new(
        Arc::new(transport),
        Arc::new(FileConfig::load_default()),
        Arc::new(SystemRuntime::new()),
    );
    adapter.init();
    Ok(adapter)
}

/// Wait until the adapter leaves `NotDetected` or `timeout` elapses.
pub(super) fn wait_for_detection(adapter: &GcAdapter, timeout: Duration) -> AdapterStatus {
    let deadline = Instant::now() + timeout;
    loop {
        match adapter.status() {
            AdapterStatus::NotDetected if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(10));
            }
            status => return status,
        }
    }
}

/// Like [`wait_for_detection`], but an absent or unusable adapter is an error.
pub(super) fn require_detected(adapter: &GcAdapter, timeout: Duration) -> Result<()> {
    match wait_for_detection(adapter, timeout) {
        AdapterStatus::Detected => Ok(()),
        AdapterStatus::NotDetected => Err(GcAdapterError::Device(DeviceError::NotFound)),
        AdapterStatus::Error(code) => Err(GcAdapterError::Device(DeviceError::Open {
            code,
            details: adapter.is_detected().1.unwrap_or_default(),
        })),
    }
}

pub(super) fn device_name(device: ChannelDevice) -> &'static str {
    match device {
        ChannelDevice::None => "none",
        ChannelDevice::Standard => "standard",
        ChannelDevice::Adapter => "adapter",
    }
}

pub(super) fn controller_type_name(ty: pad::ControllerType) -> &'static str {
    match ty {
        pad::ControllerType::None => "none",
        pad::ControllerType::Wired => "wired",
        pad::ControllerType::Wireless => "wireless",
    }
}

/// Translate a 1-based user-facing port number into a channel index.
pub(super) fn channel_for_port(port: usize) -> Result<usize> {
    if (1..=NUM_CHANNELS).contains(&port) {
        Ok(port - 1)
    } else {
        Err(GcAdapterError::Config(format!(
            "port {port} is out of range (adapter has {NUM_CHANNELS} ports)"
        )))
    }
}

/// Names of the held buttons, comma-separated; "-" when none.
pub(super) fn format_buttons(mask: u16) -> String {
    const NAMES: [(u16, &str); 12] = [
        (pad::PAD_BUTTON_A, "A"),
        (pad::PAD_BUTTON_B, "B"),
        (pad::PAD_BUTTON_X, "X"),
        (pad::PAD_BUTTON_Y, "Y"),
        (pad::PAD_BUTTON_START, "Start"),
        (pad::PAD_TRIGGER_Z, "Z"),
        (pad::PAD_TRIGGER_L, "L"),
        (pad::PAD_TRIGGER_R, "R"),
        (pad::PAD_BUTTON_UP, "Up"),
        (pad::PAD_BUTTON_DOWN, "Down"),
        (pad::PAD_BUTTON_LEFT, "Left"),
        (pad::PAD_BUTTON_RIGHT, "Right"),
    ];
    let held: Vec<&str> = NAMES
        .iter()
        .filter(|(bit, _)| mask & bit != 0)
        .map(|(_, name)| *name)
        .collect();
    if held.is_empty() {
        "-".into()
    } else {
        held.join(",")
    }
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct StatusOutput {
    pub version: String,
    pub detected: bool,
    pub error: Option<String>,
    pub ports: Vec<PortJson>,
}

#[derive(Serialize)]
pub(super) struct PortJson {
    pub port: usize,
    pub connected: bool,
    pub controller_type: String,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Settings,
}

// ── Commands ──

#[derive(Clone, Copy, ValueEnum)]
pub enum DeviceArg {
    /// Port fed by the USB adapter
    Adapter,
    /// Non-adapter controller source
    Standard,
    /// Nothing on this port
    None,
}

impl From<DeviceArg> for ChannelDevice {
    fn from(arg: DeviceArg) -> Self {
        match arg {
            DeviceArg::Adapter => ChannelDevice::Adapter,
            DeviceArg::Standard => ChannelDevice::Standard,
            DeviceArg::None => ChannelDevice::None,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Show adapter detection state and per-port controllers
    Status,

    /// Continuously print decoded controller state
    Watch {
        /// Port to watch (1-4); default: all connected ports
        #[arg(long)]
        port: Option<usize>,
        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 100)]
        interval: u64,
    },

    /// Drive a port's rumble motor for a moment
    Rumble {
        /// Port to rumble (1-4)
        port: usize,
        /// Motor strength byte (0-255)
        #[arg(long, default_value_t = 1)]
        strength: u8,
        /// How long to rumble, in milliseconds
        #[arg(long, default_value_t = 500)]
        duration: u64,
    },

    /// Show or change the driver configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Update one port's settings
    Set {
        /// Port to configure (1-4)
        #[arg(long)]
        port: usize,
        /// What the port is bound to
        #[arg(long)]
        device: Option<DeviceArg>,
        /// Enable or disable rumble for the port
        #[arg(long)]
        rumble: Option<bool>,
    },
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, json: bool) -> Result<()> {
    match cmd {
        Command::Status => status::cmd_status(json),
        Command::Watch { port, interval } => {
            if json {
                warn_json_unsupported("watch");
            }
            watch::cmd_watch(port, interval)
        }
        Command::Rumble {
            port,
            strength,
            duration,
        } => {
            if json {
                warn_json_unsupported("rumble");
            }
            rumble::cmd_rumble(port, strength, duration)
        }
        Command::Config { action } => config_cmd::cmd_config(action, json),
    }
}

#[cfg(test)]
mod format_tests {
    use super::*;

    #[test]
    fn kv_width_pads_longest_key() {
        assert_eq!(kv_width(&["Adapter:", "Port 1:"]), 10);
    }

    #[test]
    fn no_buttons_is_dash() {
        assert_eq!(format_buttons(0), "-");
    }

    #[test]
    fn buttons_list_in_fixed_order() {
        let mask = pad::PAD_BUTTON_A | pad::PAD_BUTTON_START | pad::PAD_TRIGGER_Z;
        assert_eq!(format_buttons(mask), "A,Start,Z");
    }

    #[test]
    fn synthetic_bits_are_not_named() {
        assert_eq!(format_buttons(pad::PAD_ERR_STATUS), "-");
        assert_eq!(format_buttons(pad::PAD_GET_ORIGIN), "-");
    }

    #[test]
    fn port_numbers_are_one_based() {
        assert_eq!(channel_for_port(1).unwrap(), 0);
        assert_eq!(channel_for_port(4).unwrap(), 3);
        assert!(channel_for_port(0).is_err());
        assert!(channel_for_port(5).is_err());
    }
}
