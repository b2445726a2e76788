//! `watch` subcommand — continuously print decoded controller state.

use std::sync::atomic::Ordering;
use std::time::Duration;

use super::{
    NUM_CHANNELS, RUNNING, Result, channel_for_port, format_buttons, open_driver, require_detected,
};

pub(super) fn cmd_watch(port: Option<usize>, interval: u64) -> Result<()> {
    let filter = port.map(channel_for_port).transpose()?;

    let adapter = open_driver()?;
    require_detected(&adapter, Duration::from_secs(2))?;

    println!("Watching... (Ctrl+C to stop)");
    while RUNNING.load(Ordering::SeqCst) {
        for chan in 0..NUM_CHANNELS {
            if let Some(filter) = filter
                && chan != filter
            {
                continue;
            }
            let pad = adapter.input(chan);
            if !adapter.device_connected(chan) && filter.is_none() {
                continue;
            }
            println!(
                "port {}  buttons={:<24} stick=({:>3},{:>3}) c=({:>3},{:>3}) trig=({:>3},{:>3})",
                chan + 1,
                format_buttons(pad.button),
                pad.stick_x,
                pad.stick_y,
                pad.substick_x,
                pad.substick_y,
                pad.trigger_left,
                pad.trigger_right,
            );
        }
        std::thread::sleep(Duration::from_millis(interval));
    }

    adapter.shutdown();
    Ok(())
}
