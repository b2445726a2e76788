//! `rumble` subcommand — drive a port's motor for a moment.

use std::time::{Duration, Instant};

use super::{GcAdapterError, Result, channel_for_port, open_driver, require_detected};

pub(super) fn cmd_rumble(port: usize, strength: u8, duration: u64) -> Result<()> {
    let chan = channel_for_port(port)?;

    let adapter = open_driver()?;
    require_detected(&adapter, Duration::from_secs(2))?;

    // Classification happens on the input path; poll until the port reports
    // a controller so wireless suppression has data to act on.
    let deadline = Instant::now() + Duration::from_millis(500);
    while Instant::now() < deadline && {
        adapter.input(chan);
        !adapter.device_connected(chan)
    } {
        std::thread::sleep(Duration::from_millis(10));
    }
    if !adapter.device_connected(chan) {
        return Err(GcAdapterError::Config(format!(
            "no controller on port {port}"
        )));
    }

    println!("Rumbling port {port} (strength {strength}) for {duration} ms...");
    adapter.output(chan, strength);
    std::thread::sleep(Duration::from_millis(duration));
    adapter.output(chan, 0);
    // Let the write worker push the stop command before teardown
    std::thread::sleep(Duration::from_millis(50));

    adapter.shutdown();
    Ok(())
}
