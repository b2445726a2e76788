//! `status` subcommand — adapter detection state and per-port controllers.

use std::time::Duration;

use super::{
    AdapterStatus, NUM_CHANNELS, PortJson, Result, StatusOutput, controller_type_name, kv,
    kv_width, open_driver, wait_for_detection,
};

pub(super) fn cmd_status(json: bool) -> Result<()> {
    let adapter = open_driver()?;
    let status = wait_for_detection(&adapter, Duration::from_secs(1));

    if status == AdapterStatus::Detected {
        // Classification happens on the input path; give the read worker a
        // frame or two, then poll each port once.
        std::thread::sleep(Duration::from_millis(100));
        for chan in 0..NUM_CHANNELS {
            adapter.input(chan);
        }
    }

    let (detected, error) = adapter.is_detected();
    let ports: Vec<PortJson> = (0..NUM_CHANNELS)
        .map(|chan| PortJson {
            port: chan + 1,
            connected: adapter.device_connected(chan),
            controller_type: controller_type_name(adapter.controller_type(chan)).into(),
        })
        .collect();

    adapter.shutdown();

    if json {
        let output = StatusOutput {
            version: env!("CARGO_PKG_VERSION").into(),
            detected,
            error,
            ports,
        };
        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
        return Ok(());
    }

    let w = kv_width(&["Adapter:", "Port 1:"]);
    match (detected, &error) {
        (true, _) => kv("Adapter:", "detected", w),
        (false, Some(message)) => kv("Adapter:", format!("error ({message})"), w),
        (false, None) => kv("Adapter:", "not detected", w),
    }
    if detected {
        for port in &ports {
            kv(
                &format!("Port {}:", port.port),
                port.controller_type.as_str(),
                w,
            );
        }
    }
    Ok(())
}
